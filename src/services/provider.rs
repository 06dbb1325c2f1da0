// src/services/provider.rs
use chrono::{DateTime, TimeZone, Utc};
use log::{error, info};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::fmt;

const CHART_API_BASE: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Gateway failures, normalized so nothing upstream ever sees a panic or a
/// raw reqwest error. Handlers render these as `{"error": ...}` payloads.
#[derive(Debug)]
pub enum ProviderError {
    /// Transport-level failure: DNS, TLS, timeout, non-success status.
    Unavailable(String),
    /// The provider answered but had nothing for this ticker.
    NoData(String),
    /// The provider answered with a shape we do not understand.
    Malformed(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderError::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            ProviderError::NoData(msg) => write!(f, "{}", msg),
            ProviderError::Malformed(msg) => write!(f, "Malformed provider response: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Provider identity reported by /health. The fetchers below speak the
/// Yahoo chart API; the env var exists so a deployment can label a
/// compatible mirror without a code change.
pub fn current_provider() -> String {
    env::var("PROVIDER").unwrap_or_else(|_| "yahoo".to_string())
}

/// Cheap sanity check before a ticker reaches the provider. Covers index
/// symbols (^GSPC), class shares (BRK-B) and futures-style suffixes.
pub fn is_valid_ticker(ticker: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9.^=\-]{1,12}$")
        .map(|re| re.is_match(ticker))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub ticker: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub date: DateTime<Utc>,
    #[serde(rename = "Open")]
    pub open: Option<f64>,
    #[serde(rename = "High")]
    pub high: Option<f64>,
    #[serde(rename = "Low")]
    pub low: Option<f64>,
    #[serde(rename = "Close")]
    pub close: Option<f64>,
    #[serde(rename = "Volume")]
    pub volume: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DividendPayment {
    pub date: DateTime<Utc>,
    pub amount: f64,
}

async fn fetch_chart(ticker: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
    let url = format!("{}/{}", CHART_API_BASE, ticker);
    info!("Fetching chart data from URL: {}", url);

    let client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    let response = client
        .get(&url)
        .query(query)
        .send()
        .await
        .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    let body: Value = response
        .json()
        .await
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if let Some(err) = body.pointer("/chart/error") {
        if !err.is_null() {
            let description = err
                .pointer("/description")
                .and_then(Value::as_str)
                .unwrap_or("provider reported an error");
            error!("Provider error for {}: {}", ticker, description);
            return Err(ProviderError::NoData(description.to_string()));
        }
    }

    body.pointer("/chart/result/0")
        .cloned()
        .ok_or_else(|| ProviderError::NoData(format!("No chart data for {}", ticker)))
}

/// Latest price for a ticker, from the chart meta block.
pub async fn get_price(ticker: &str) -> Result<PriceQuote, ProviderError> {
    let result = fetch_chart(
        ticker,
        &[("range", "2d".to_string()), ("interval", "1d".to_string())],
    )
    .await?;

    let price = result
        .pointer("/meta/regularMarketPrice")
        .and_then(Value::as_f64)
        .ok_or_else(|| ProviderError::NoData(format!("No price data for {}", ticker)))?;

    let timestamp = result
        .pointer("/meta/regularMarketTime")
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(PriceQuote {
        ticker: ticker.to_uppercase(),
        price,
        timestamp,
        source: current_provider(),
    })
}

fn quote_series(quote: &Value, field: &str) -> Vec<Option<f64>> {
    quote
        .get(field)
        .and_then(Value::as_array)
        .map(|values| values.iter().map(Value::as_f64).collect())
        .unwrap_or_default()
}

/// Daily OHLCV rows for the last `days` days, oldest first.
pub async fn get_historical(ticker: &str, days: i64) -> Result<Vec<OhlcvRow>, ProviderError> {
    let result = fetch_chart(
        ticker,
        &[
            ("range", format!("{}d", days)),
            ("interval", "1d".to_string()),
        ],
    )
    .await?;

    let timestamps: Vec<i64> = result
        .pointer("/timestamp")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let quote = result
        .pointer("/indicators/quote/0")
        .cloned()
        .unwrap_or(Value::Null);
    let opens = quote_series(&quote, "open");
    let highs = quote_series(&quote, "high");
    let lows = quote_series(&quote, "low");
    let closes = quote_series(&quote, "close");
    let volumes: Vec<i64> = quote
        .get("volume")
        .and_then(Value::as_array)
        .map(|values| values.iter().map(|v| v.as_i64().unwrap_or(0)).collect())
        .unwrap_or_default();

    let rows = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &secs)| {
            let date = Utc.timestamp_opt(secs, 0).single()?;
            Some(OhlcvRow {
                date,
                open: opens.get(i).copied().flatten(),
                high: highs.get(i).copied().flatten(),
                low: lows.get(i).copied().flatten(),
                close: closes.get(i).copied().flatten(),
                volume: volumes.get(i).copied().unwrap_or(0),
            })
        })
        .collect();

    Ok(rows)
}

/// Most recent dividend payments, newest first, capped at `limit`. A
/// ticker that pays no dividends yields an empty list, not an error.
pub async fn get_dividends(
    ticker: &str,
    limit: usize,
) -> Result<Vec<DividendPayment>, ProviderError> {
    let result = fetch_chart(
        ticker,
        &[
            ("range", "10y".to_string()),
            ("interval", "3mo".to_string()),
            ("events", "div".to_string()),
        ],
    )
    .await?;

    let mut payments: Vec<DividendPayment> = result
        .pointer("/events/dividends")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .values()
                .filter_map(|entry| {
                    let amount = entry.get("amount").and_then(Value::as_f64)?;
                    let secs = entry.get("date").and_then(Value::as_i64)?;
                    let date = Utc.timestamp_opt(secs, 0).single()?;
                    Some(DividendPayment { date, amount })
                })
                .collect()
        })
        .unwrap_or_default();

    payments.sort_by(|a, b| b.date.cmp(&a.date));
    payments.truncate(limit);
    Ok(payments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_validation_accepts_common_shapes() {
        for ticker in ["AAPL", "msft", "BRK-B", "^GSPC", "BF.B", "ES=F", "A1"] {
            assert!(is_valid_ticker(ticker), "{} should be valid", ticker);
        }
    }

    #[test]
    fn ticker_validation_rejects_garbage() {
        for ticker in ["", "AAPL;DROP", "a b", "ticker/../etc", "AVERYLONGTICKER"] {
            assert!(!is_valid_ticker(ticker), "{} should be invalid", ticker);
        }
    }

    #[test]
    fn current_provider_defaults_to_yahoo() {
        // PROVIDER is unset in the test environment
        assert_eq!(current_provider(), "yahoo");
    }
}
