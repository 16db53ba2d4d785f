use super::ui;
use crate::pricing::quota::QuotaUsage;
use crate::pricing::sweeper::{CleanupSweeper, SweepReport};
use crate::pricing::{PriceService, UPSTREAM_LIMITER_KEY};
use anyhow::Result;
use comfy_table::Cell;

/// Runs one cleanup pass and prints what it removed.
pub async fn sweep(sweeper: &CleanupSweeper) -> Result<()> {
    let report = sweeper.sweep().await?;
    println!("{}", render_sweep_report(&report));
    Ok(())
}

pub async fn usage(service: &PriceService) -> Result<()> {
    let quota = service.quota().usage().await?;
    let in_window = service.limiter().window_len(UPSTREAM_LIMITER_KEY).await?;
    println!(
        "{}",
        render_usage(&quota, in_window, service.limiter().limit())
    );
    Ok(())
}

fn render_sweep_report(report: &SweepReport) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Collection"), ui::header_cell("Removed")]);
    table.add_row(vec![
        Cell::new("Cached price series"),
        Cell::new(report.cache_entries_removed),
    ]);
    table.add_row(vec![
        Cell::new("Usage records (past months)"),
        Cell::new(report.usage_records_removed),
    ]);

    format!(
        "{}\n\n{}",
        ui::style_text("Cleanup sweep", ui::StyleType::Title),
        table
    )
}

fn render_usage(quota: &QuotaUsage, in_window: usize, limit_per_minute: u32) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Budget"),
        ui::header_cell("Used"),
        ui::header_cell("Limit"),
        ui::header_cell("Remaining"),
    ]);
    table.add_row(vec![
        Cell::new("This month"),
        Cell::new(quota.used),
        Cell::new(quota.ceiling),
        Cell::new(quota.remaining()),
    ]);
    table.add_row(vec![
        Cell::new("Last 60 seconds"),
        Cell::new(in_window),
        Cell::new(limit_per_minute),
        Cell::new((limit_per_minute as usize).saturating_sub(in_window)),
    ]);

    let status = if quota.is_exhausted() {
        ui::style_text("Monthly quota exhausted, serving cached data only", ui::StyleType::Error)
    } else {
        ui::style_text("Upstream calls available", ui::StyleType::TotalValue)
    };

    format!(
        "{}\n\n{}\n\n{}",
        ui::style_text("Upstream API usage", ui::StyleType::Title),
        table,
        status
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_usage() {
        let quota = QuotaUsage {
            used: 9800,
            ceiling: 9800,
        };
        let output = render_usage(&quota, 12, 30);

        assert!(output.contains("This month"));
        assert!(output.contains("9800"));
        assert!(output.contains("18"));
        assert!(output.contains("Monthly quota exhausted"));
    }

    #[test]
    fn test_render_sweep_report() {
        let report = SweepReport {
            cache_entries_removed: 4,
            usage_records_removed: 17,
        };
        let output = render_sweep_report(&report);

        assert!(output.contains("Cached price series"));
        assert!(output.contains("17"));
    }
}
