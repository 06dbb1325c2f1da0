// src/bin/test_analytics.rs
use anyhow::Result;
use chrono::NaiveDate;
use dividend_dashboard_api::services::analytics::{
    dividend_capture_strategy, dividend_safety_score, TaxAssumptions,
};
use log::info;

fn main() -> Result<()> {
    env_logger::init();

    let score = dividend_safety_score(45.0, 6.5, 0.8, 0.9);
    info!("Safety score sample:\n{}", serde_json::to_string_pretty(&score)?);

    let ex_date: NaiveDate = "2025-01-01".parse()?;
    let strategy =
        dividend_capture_strategy("AAPL", ex_date, 1.0, 100.0, 60, &TaxAssumptions::default())?;
    info!(
        "Capture strategy sample:\n{}",
        serde_json::to_string_pretty(&strategy)?
    );

    Ok(())
}
