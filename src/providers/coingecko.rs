use crate::core::error::PriceError;
use crate::core::price::{PricePoint, PriceSeriesProvider};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Deserialize, Debug)]
struct MarketChartResponse {
    prices: Vec<(f64, f64)>,
}

/// Fetches USD market charts from the CoinGecko API.
pub struct CoinGeckoProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("argos/0.1").build()?;
        Ok(CoinGeckoProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl PriceSeriesProvider for CoinGeckoProvider {
    #[instrument(name = "CoinGeckoMarketChart", skip(self), fields(coin_id = %coin_id))]
    async fn fetch_series(&self, coin_id: &str, days: u32) -> Result<Vec<PricePoint>, PriceError> {
        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}",
            self.base_url, coin_id, days
        );
        debug!("Requesting market chart from {}", url);

        let mut request = self.client.get(&url).header("accept", "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request.send().await.map_err(|e| PriceError::Upstream {
            status: None,
            body: format!("Request error: {e} for coin: {coin_id}"),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| PriceError::Upstream {
            status: Some(status.as_u16()),
            body: format!("Failed to read response body for {coin_id}: {e}"),
        })?;

        if !status.is_success() {
            return Err(PriceError::Upstream {
                status: Some(status.as_u16()),
                body: text,
            });
        }

        let data: MarketChartResponse =
            serde_json::from_str(&text).map_err(|e| PriceError::Upstream {
                status: Some(status.as_u16()),
                body: format!("Failed to parse market chart for {coin_id}: {e}. Response: '{text}'"),
            })?;

        debug!(points = data.prices.len(), "Received market chart");
        data.prices
            .into_iter()
            .map(|(timestamp, price)| {
                to_point(timestamp, price).ok_or_else(|| PriceError::Upstream {
                    status: Some(status.as_u16()),
                    body: format!("Invalid price point [{timestamp}, {price}] for {coin_id}"),
                })
            })
            .collect()
    }
}

// `as` saturates out-of-range floats and maps NaN to 0, so check first.
fn to_point(timestamp: f64, price: f64) -> Option<PricePoint> {
    let in_range = timestamp.is_finite()
        && timestamp >= i64::MIN as f64
        && timestamp < i64::MAX as f64;
    (in_range && price.is_finite()).then(|| PricePoint::new(timestamp as i64, price))
}
