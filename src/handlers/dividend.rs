// src/handlers/dividend.rs
use super::auth::{require_feature, session_token};
use super::error::ApiError;
use crate::models::{CaptureStrategyRequest, SafetyScoreRequest, TokenQuery};
use crate::routes::AppContext;
use crate::services::analytics::{self, TaxAssumptions};
use crate::services::cache::ResultCache;
use log::info;
use warp::reply::Json;
use warp::Rejection;

const ANALYTICS_TTL_SECONDS: i64 = 3600;

pub async fn safety_score(
    query: TokenQuery,
    auth_header: Option<String>,
    req: SafetyScoreRequest,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    info!(
        "Handling safety score request for {}",
        req.ticker.as_deref().unwrap_or("unnamed ticker")
    );
    let token = session_token(query.token, auth_header);
    require_feature(token.as_deref(), "dividend_safety", "Dividend safety scoring", &ctx)?;

    let result = match ResultCache::key("safety_score", &req) {
        Some(key) => {
            ctx.cache
                .get_or_compute(&key, Some(ANALYTICS_TTL_SECONDS), || async {
                    analytics::dividend_safety_score(
                        req.payout_ratio,
                        req.earnings_growth,
                        req.debt_to_equity,
                        req.fcf_trend,
                    )
                })
                .await
        }
        None => analytics::dividend_safety_score(
            req.payout_ratio,
            req.earnings_growth,
            req.debt_to_equity,
            req.fcf_trend,
        ),
    };

    Ok(warp::reply::json(&result))
}

pub async fn capture_strategy(
    query: TokenQuery,
    auth_header: Option<String>,
    req: CaptureStrategyRequest,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    info!("Handling capture strategy request for {}", req.ticker);
    let token = session_token(query.token, auth_header);
    require_feature(token.as_deref(), "capture_strategy", "Capture strategy analysis", &ctx)?;

    let tax = TaxAssumptions::default();
    let result = match ResultCache::key("capture_strategy", &req) {
        Some(key) => {
            ctx.cache
                .get_or_try_compute(&key, Some(ANALYTICS_TTL_SECONDS), || async {
                    analytics::dividend_capture_strategy(
                        &req.ticker,
                        req.ex_dividend_date,
                        req.dividend_amount,
                        req.current_price,
                        req.holding_period_days,
                        &tax,
                    )
                })
                .await
        }
        None => analytics::dividend_capture_strategy(
            &req.ticker,
            req.ex_dividend_date,
            req.dividend_amount,
            req.current_price,
            req.holding_period_days,
            &tax,
        ),
    };

    match result {
        Ok(strategy) => Ok(warp::reply::json(&strategy)),
        Err(e) => Err(warp::reject::custom(ApiError::invalid_input(e.to_string()))),
    }
}
