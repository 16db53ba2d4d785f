//! Pricing abstractions and core types

use crate::core::error::PriceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A single observation of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub price: f64,
}

impl PricePoint {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Coarse window a caller asks prices for. Determines the upstream `days`
/// parameter and how long a cached series stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl Timeframe {
    /// Number of days requested from the upstream API.
    pub fn days(&self) -> u32 {
        match self {
            Timeframe::OneHour | Timeframe::OneDay => 1,
            Timeframe::SevenDays => 7,
        }
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Timeframe::OneHour => "1h",
                Timeframe::OneDay => "24h",
                Timeframe::SevenDays => "7d",
            }
        )
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1h" => Ok(Timeframe::OneHour),
            "24h" => Ok(Timeframe::OneDay),
            "7d" => Ok(Timeframe::SevenDays),
            _ => Err(anyhow::anyhow!("Invalid timeframe: {}", s)),
        }
    }
}

/// Resampling granularity applied to a fetched series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn minutes(&self) -> i64 {
        match self {
            Interval::FifteenMinutes => 15,
            Interval::OneHour => 60,
            Interval::FourHours => 240,
            Interval::OneDay => 1440,
        }
    }

    pub fn millis(&self) -> i64 {
        self.minutes() * 60_000
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Interval::FifteenMinutes => "15m",
                Interval::OneHour => "1h",
                Interval::FourHours => "4h",
                Interval::OneDay => "1d",
            }
        )
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "15m" => Ok(Interval::FifteenMinutes),
            "1h" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHours),
            "1d" => Ok(Interval::OneDay),
            _ => Err(anyhow::anyhow!("Invalid interval: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub token_id: String,
    pub timeframe: Timeframe,
    pub interval: Interval,
}

impl PriceRequest {
    pub fn new(token_id: impl Into<String>, timeframe: Timeframe, interval: Interval) -> Self {
        Self {
            token_id: token_id.into(),
            timeframe,
            interval,
        }
    }

    /// Key under which the resampled series is cached.
    pub fn cache_key(&self) -> String {
        format!(
            "price_{}_{}_{}",
            self.token_id, self.timeframe, self.interval
        )
    }
}

/// Source of raw (not yet resampled) price series.
#[async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    async fn fetch_series(&self, coin_id: &str, days: u32) -> Result<Vec<PricePoint>, PriceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_format() {
        let request = PriceRequest::new("89", Timeframe::OneDay, Interval::OneHour);
        assert_eq!(request.cache_key(), "price_89_24h_1h");

        let request = PriceRequest::new("bitcoin", Timeframe::SevenDays, Interval::FifteenMinutes);
        assert_eq!(request.cache_key(), "price_bitcoin_7d_15m");
    }

    #[test]
    fn test_timeframe_parsing_and_days() {
        assert_eq!("1h".parse::<Timeframe>().unwrap(), Timeframe::OneHour);
        assert_eq!("24H".parse::<Timeframe>().unwrap(), Timeframe::OneDay);
        assert_eq!("7d".parse::<Timeframe>().unwrap(), Timeframe::SevenDays);
        assert!("30d".parse::<Timeframe>().is_err());

        assert_eq!(Timeframe::OneHour.days(), 1);
        assert_eq!(Timeframe::OneDay.days(), 1);
        assert_eq!(Timeframe::SevenDays.days(), 7);
    }

    #[test]
    fn test_interval_parsing_and_millis() {
        assert_eq!("15m".parse::<Interval>().unwrap(), Interval::FifteenMinutes);
        assert_eq!("4h".parse::<Interval>().unwrap(), Interval::FourHours);
        assert!("2h".parse::<Interval>().is_err());

        assert_eq!(Interval::FifteenMinutes.millis(), 900_000);
        assert_eq!(Interval::OneHour.millis(), 3_600_000);
        assert_eq!(Interval::FourHours.millis(), 14_400_000);
        assert_eq!(Interval::OneDay.millis(), 86_400_000);
    }

    #[test]
    fn test_price_point_output_shape() {
        let json = serde_json::to_string(&PricePoint::new(1_700_000_000_000, 0.25)).unwrap();
        assert_eq!(json, r#"{"timestamp":1700000000000,"price":0.25}"#);
    }
}
