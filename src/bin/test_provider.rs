// src/bin/test_provider.rs
use dividend_dashboard_api::services::provider::{get_dividends, get_price};
use dividend_dashboard_api::BoxError;
use dotenv::dotenv;
use log::{error, info};

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    env_logger::init();

    let ticker = std::env::args().nth(1).unwrap_or_else(|| "AAPL".to_string());
    info!("Testing provider fetches for {}...", ticker);

    match get_price(&ticker).await {
        Ok(quote) => {
            info!(
                "SUCCESS: {} price: {} at {}",
                quote.ticker, quote.price, quote.timestamp
            );
        }
        Err(e) => {
            error!("ERROR: Failed to fetch price: {}", e);
            return Err(e.into());
        }
    }

    match get_dividends(&ticker, 5).await {
        Ok(payments) => {
            info!("SUCCESS: {} recent dividend payments", payments.len());
            for payment in payments {
                info!("  {}: {}", payment.date.date_naive(), payment.amount);
            }
        }
        Err(e) => {
            error!("ERROR: Failed to fetch dividends: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
