// src/services/analytics.rs
use crate::models::{round1, round2, PortfolioHolding};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors from the scoring functions. These are plain data for the API
/// boundary to translate, never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    EmptyHoldings,
    InvalidInput(String),
}

impl fmt::Display for AnalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalyticsError::EmptyHoldings => write!(f, "No holdings provided"),
            AnalyticsError::InvalidInput(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AnalyticsError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLabel {
    #[serde(rename = "Very Safe")]
    VerySafe,
    Safe,
    Borderline,
    Unsafe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyScoreResult {
    pub score: i32,
    pub grade: Grade,
    pub safe: bool,
    pub label: SafetyLabel,
}

fn grade_for(score: i32) -> Grade {
    if score >= 90 {
        Grade::A
    } else if score >= 80 {
        Grade::B
    } else if score >= 70 {
        Grade::C
    } else if score >= 60 {
        Grade::D
    } else {
        Grade::F
    }
}

fn label_for(score: i32) -> SafetyLabel {
    if score >= 90 {
        SafetyLabel::VerySafe
    } else if score >= 80 {
        SafetyLabel::Safe
    } else if score >= 60 {
        SafetyLabel::Borderline
    } else {
        SafetyLabel::Unsafe
    }
}

/// Dividend safety score (0-100) with A-F grades, from payout ratio,
/// earnings growth, debt levels and free-cash-flow trend.
///
/// Point-deduction model starting at 100. Inputs outside the usual domain
/// (negative ratios, payout above 100) flow through the same step tables;
/// range-checking them is the caller's job.
pub fn dividend_safety_score(
    payout_ratio: f64,
    earnings_growth: f64,
    debt_to_equity: f64,
    fcf_trend: f64,
) -> SafetyScoreResult {
    let mut score: i32 = 100;

    // Payout ratio impact (0-40 points)
    score -= if payout_ratio <= 30.0 {
        0
    } else if payout_ratio <= 50.0 {
        10
    } else if payout_ratio <= 70.0 {
        20
    } else if payout_ratio <= 90.0 {
        30
    } else {
        40
    };

    // Earnings growth impact (0-30 points)
    score -= if earnings_growth >= 10.0 {
        0
    } else if earnings_growth >= 5.0 {
        10
    } else if earnings_growth >= 0.0 {
        20
    } else {
        30
    };

    // Debt to equity impact (0-20 points)
    score -= if debt_to_equity <= 0.5 {
        0
    } else if debt_to_equity <= 1.0 {
        10
    } else {
        20
    };

    // FCF trend impact (0-10 points)
    score -= if fcf_trend >= 1.0 {
        0
    } else if fcf_trend >= 0.8 {
        5
    } else {
        10
    };

    let score = score.clamp(0, 100);

    SafetyScoreResult {
        score,
        grade: grade_for(score),
        safe: score >= 70,
        label: label_for(score),
    }
}

/// Tax treatment knobs for the capture model. US defaults: ordinary income
/// 37%, qualified dividends 20%, 60-day qualification window.
#[derive(Debug, Clone, Copy)]
pub struct TaxAssumptions {
    pub ordinary_rate: f64,
    pub qualified_rate: f64,
    pub qualified_holding_days: i64,
}

impl Default for TaxAssumptions {
    fn default() -> Self {
        TaxAssumptions {
            ordinary_rate: 0.37,
            qualified_rate: 0.20,
            qualified_holding_days: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    #[serde(serialize_with = "round2")]
    pub price_change_pct: f64,
    pub probability: f64,
    #[serde(serialize_with = "round2")]
    pub future_price: f64,
    #[serde(serialize_with = "round2")]
    pub capital_gain_pct: f64,
    #[serde(serialize_with = "round2")]
    pub total_return_pct: f64,
    #[serde(serialize_with = "round2")]
    pub expected_return_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenarios {
    pub bullish: ScenarioOutcome,
    pub neutral: ScenarioOutcome,
    pub bearish: ScenarioOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureStrategyResult {
    pub ticker: String,
    pub ex_dividend_date: NaiveDate,
    #[serde(serialize_with = "round2")]
    pub dividend_yield_pretax: f64,
    #[serde(serialize_with = "round2")]
    pub dividend_yield_aftertax: f64,
    pub tax_rate: f64,
    pub is_qualified_dividend: bool,
    pub holding_period_days: i64,
    pub scenarios: Scenarios,
    #[serde(serialize_with = "round2")]
    pub expected_return_pct: f64,
    pub recommended: bool,
    pub risk_level: RiskLevel,
}

fn scenario_outcome(
    current_price: f64,
    after_tax_yield: f64,
    price_change: f64,
    probability: f64,
) -> ScenarioOutcome {
    let future_price = current_price * (1.0 + price_change);
    let capital_gain_pct = (future_price - current_price) / current_price * 100.0;
    let total_return_pct = capital_gain_pct + after_tax_yield;
    ScenarioOutcome {
        price_change_pct: price_change * 100.0,
        probability,
        future_price,
        capital_gain_pct,
        total_return_pct,
        expected_return_pct: total_return_pct * probability,
    }
}

/// Dividend capture feasibility: after-tax yield, three price-movement
/// scenarios and their probability-weighted expected value.
///
/// No rounding happens in here. Every figure is carried at full precision
/// and only rounded when the result is serialized.
pub fn dividend_capture_strategy(
    ticker: &str,
    ex_dividend_date: NaiveDate,
    dividend_amount: f64,
    current_price: f64,
    holding_period_days: i64,
    tax: &TaxAssumptions,
) -> Result<CaptureStrategyResult, AnalyticsError> {
    if current_price <= 0.0 {
        return Err(AnalyticsError::InvalidInput(format!(
            "current_price must be positive, got {}",
            current_price
        )));
    }
    if dividend_amount <= 0.0 {
        return Err(AnalyticsError::InvalidInput(format!(
            "dividend_amount must be positive, got {}",
            dividend_amount
        )));
    }

    let dividend_yield = dividend_amount / current_price * 100.0;

    let is_qualified = holding_period_days >= tax.qualified_holding_days;
    let tax_rate = if is_qualified {
        tax.qualified_rate
    } else {
        tax.ordinary_rate
    };
    let after_tax_yield = dividend_amount * (1.0 - tax_rate) / current_price * 100.0;

    // Fixed price-movement scenarios: +5% / flat / -5%
    let bullish = scenario_outcome(current_price, after_tax_yield, 0.05, 0.3);
    let neutral = scenario_outcome(current_price, after_tax_yield, 0.0, 0.4);
    let bearish = scenario_outcome(current_price, after_tax_yield, -0.05, 0.3);

    let expected_value = bullish.expected_return_pct
        + neutral.expected_return_pct
        + bearish.expected_return_pct;

    let bearish_magnitude = bearish.total_return_pct.abs();
    let risk_level = if bearish_magnitude <= 5.0 {
        RiskLevel::Low
    } else if bearish_magnitude <= 10.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    };

    Ok(CaptureStrategyResult {
        ticker: ticker.to_string(),
        ex_dividend_date,
        dividend_yield_pretax: dividend_yield,
        dividend_yield_aftertax: after_tax_yield,
        tax_rate: tax_rate * 100.0,
        is_qualified_dividend: is_qualified,
        holding_period_days,
        scenarios: Scenarios {
            bullish,
            neutral,
            bearish,
        },
        expected_return_pct: expected_value,
        recommended: expected_value > 0.5,
        risk_level,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAnalyticsResult {
    #[serde(serialize_with = "round2")]
    pub total_portfolio_value: f64,
    #[serde(serialize_with = "round2")]
    pub annual_dividend_income: f64,
    #[serde(serialize_with = "round2")]
    pub portfolio_yield: f64,
    #[serde(serialize_with = "round1")]
    pub avg_safety_score: f64,
    pub holdings_count: usize,
    #[serde(serialize_with = "round2")]
    pub avg_holding_price: f64,
    /// Not computed: needs a historical dividend series per holding.
    pub dividend_growth_3yr: Option<f64>,
    /// Not computed: needs a historical dividend series per holding.
    pub dividend_growth_5yr: Option<f64>,
}

/// Aggregate portfolio metrics: total value, annual dividend income,
/// weighted yield and the mean per-holding safety score.
pub fn portfolio_analytics(
    holdings: &[PortfolioHolding],
) -> Result<PortfolioAnalyticsResult, AnalyticsError> {
    if holdings.is_empty() {
        return Err(AnalyticsError::EmptyHoldings);
    }
    for holding in holdings {
        if holding.shares < 0.0 {
            return Err(AnalyticsError::InvalidInput(format!(
                "holding {}: shares must not be negative",
                holding.symbol
            )));
        }
        if holding.current_price <= 0.0 {
            return Err(AnalyticsError::InvalidInput(format!(
                "holding {}: current price must be positive",
                holding.symbol
            )));
        }
    }

    let total_value: f64 = holdings
        .iter()
        .map(|h| h.shares * h.current_price)
        .sum();
    let total_dividend_income: f64 = holdings
        .iter()
        .map(|h| h.shares * h.current_price * h.dividend_yield / 100.0)
        .sum();
    let portfolio_yield = if total_value > 0.0 {
        total_dividend_income / total_value * 100.0
    } else {
        0.0
    };

    // Per-holding safety uses the payout/growth columns; debt and FCF are
    // not part of the holding shape, so the model defaults apply.
    let safety_sum: i32 = holdings
        .iter()
        .map(|h| dividend_safety_score(h.payout_ratio, h.earnings_growth, 0.5, 1.0).score)
        .sum();
    let avg_safety_score = f64::from(safety_sum) / holdings.len() as f64;

    let avg_holding_price =
        holdings.iter().map(|h| h.current_price).sum::<f64>() / holdings.len() as f64;

    Ok(PortfolioAnalyticsResult {
        total_portfolio_value: total_value,
        annual_dividend_income: total_dividend_income,
        portfolio_yield,
        avg_safety_score,
        holdings_count: holdings.len(),
        avg_holding_price,
        dividend_growth_3yr: None,
        dividend_growth_5yr: None,
    })
}
