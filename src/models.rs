// src/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Round to 2 decimals at the serialization boundary. Intermediate values
/// stay at full precision so rounding error never compounds into the
/// probability-weighted sums.
pub fn round2<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}

/// Round to 1 decimal at the serialization boundary (average safety score).
pub fn round1<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64((value * 10.0).round() / 10.0)
}

fn default_earnings_growth() -> f64 {
    5.0
}

fn default_debt_to_equity() -> f64 {
    0.5
}

fn default_fcf_trend() -> f64 {
    1.0
}

fn default_payout_ratio() -> f64 {
    50.0
}

fn default_holding_period_days() -> i64 {
    60
}

fn default_historical_days() -> i64 {
    30
}

fn default_dividend_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyScoreRequest {
    pub ticker: Option<String>,
    pub payout_ratio: f64,
    #[serde(default = "default_earnings_growth")]
    pub earnings_growth: f64,
    #[serde(default = "default_debt_to_equity")]
    pub debt_to_equity: f64,
    #[serde(default = "default_fcf_trend")]
    pub fcf_trend: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStrategyRequest {
    pub ticker: String,
    pub ex_dividend_date: NaiveDate,
    pub dividend_amount: f64,
    pub current_price: f64,
    #[serde(default = "default_holding_period_days")]
    pub holding_period_days: i64,
}

// Holdings arrive camelCase from the dashboard frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHolding {
    pub symbol: String,
    pub shares: f64,
    pub current_price: f64,
    pub dividend_yield: f64,
    #[serde(default = "default_payout_ratio")]
    pub payout_ratio: f64,
    #[serde(default = "default_earnings_growth")]
    pub earnings_growth: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub holdings: Vec<PortfolioHolding>,
}

#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    #[serde(default = "default_historical_days")]
    pub days: i64,
}

#[derive(Debug, Deserialize)]
pub struct DividendsQuery {
    #[serde(default = "default_dividend_limit")]
    pub limit: usize,
}

/// Session token, passed as `?token=` by the dashboard. Gated handlers
/// also accept an `Authorization: Bearer` header.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    pub tier: String,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub crypto_type: String,
    pub amount: f64,
    pub token: Option<String>,
}
