use super::ui;
use crate::core::error::FetchError;
use crate::core::price::{Interval, PricePoint, PriceRequest, Timeframe};
use crate::pricing::PriceService;
use anyhow::{Result, bail};
use chrono::DateTime;
use comfy_table::Cell;
use futures::future::join_all;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub tokens: Vec<String>,
    pub timeframe: Timeframe,
    pub interval: Interval,
    pub json: bool,
}

pub async fn run(service: &PriceService, options: &FetchOptions) -> Result<()> {
    let pb = ui::new_progress_bar(options.tokens.len() as u64);
    let price_futures = options.tokens.iter().map(|token| {
        let pb_clone = pb.clone();
        async move {
            let request = PriceRequest::new(token.as_str(), options.timeframe, options.interval);
            let res = service.get_prices(&request).await;
            pb_clone.inc(1);
            (request, res)
        }
    });
    let results: Vec<(PriceRequest, Result<Vec<PricePoint>, FetchError>)> =
        join_all(price_futures).await;
    pb.finish_and_clear();

    let failures = results.iter().filter(|(_, res)| res.is_err()).count();

    if options.json {
        println!("{}", render_json(&results)?);
    } else {
        let num_results = results.len();
        for (i, (request, res)) in results.iter().enumerate() {
            match res {
                Ok(series) => println!("{}", render_series(request, series)),
                Err(e) => println!(
                    "Token: {}\n\n{}",
                    ui::style_text(&request.token_id, ui::StyleType::Title),
                    ui::style_text(&e.to_string(), ui::StyleType::Error)
                ),
            }
            if i < num_results - 1 {
                ui::print_separator();
            }
        }
    }

    if failures > 0 && failures == results.len() {
        bail!("Failed to fetch prices for all {} token(s)", failures);
    }
    Ok(())
}

/// A single token renders as a bare array of points; several tokens render as
/// an object keyed by token id. Failed tokens map to `{"error": ...}`.
fn render_json(results: &[(PriceRequest, Result<Vec<PricePoint>, FetchError>)]) -> Result<String> {
    let to_value = |res: &Result<Vec<PricePoint>, FetchError>| -> Result<serde_json::Value> {
        Ok(match res {
            Ok(series) => serde_json::to_value(series)?,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        })
    };

    let value = match results {
        [(_, res)] => to_value(res)?,
        _ => {
            let mut by_token = BTreeMap::new();
            for (request, res) in results {
                by_token.insert(request.token_id.clone(), to_value(res)?);
            }
            serde_json::to_value(by_token)?
        }
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn render_series(request: &PriceRequest, series: &[PricePoint]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Time (UTC)"),
        ui::header_cell("Price (USD)"),
        ui::header_cell("Change"),
    ]);

    let mut previous: Option<f64> = None;
    for point in series {
        let time = DateTime::from_timestamp_millis(point.timestamp)
            .map_or_else(|| point.timestamp.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let change = previous
            .filter(|p| *p != 0.0)
            .map(|p| (point.price - p) / p * 100.0);

        let change_cell = match change {
            Some(c) => ui::change_cell(c),
            None => ui::format_optional_cell(None::<f64>, |c| format!("{c:.2}%")),
        };
        table.add_row(vec![Cell::new(time), ui::price_cell(point.price), change_cell]);
        previous = Some(point.price);
    }

    let mut output = format!(
        "Token: {} {}\n\n",
        ui::style_text(&request.token_id, ui::StyleType::Title),
        ui::style_text(
            &format!(
                "({} @ {}, {} points)",
                request.timeframe,
                request.interval,
                series.len()
            ),
            ui::StyleType::Subtle
        )
    );
    output.push_str(&table.to_string());

    if let Some(last) = series.last() {
        output.push_str(&format!(
            "\n\n{}: {}",
            ui::style_text("Latest price", ui::StyleType::TotalLabel),
            ui::style_text(&ui::format_price(last.price), ui::StyleType::TotalValue)
        ));
    }
    output
}
