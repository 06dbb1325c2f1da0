// src/handlers/portfolio.rs
use super::auth::{require_feature, session_token};
use super::error::ApiError;
use crate::models::{PortfolioRequest, TokenQuery};
use crate::routes::AppContext;
use crate::services::analytics;
use crate::services::cache::ResultCache;
use log::info;
use warp::reply::Json;
use warp::Rejection;

const ANALYTICS_TTL_SECONDS: i64 = 3600;

pub async fn portfolio_analytics(
    query: TokenQuery,
    auth_header: Option<String>,
    req: PortfolioRequest,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    info!(
        "Handling portfolio analytics request for {} holdings",
        req.holdings.len()
    );
    let token = session_token(query.token, auth_header);
    require_feature(token.as_deref(), "analytics", "Portfolio analytics", &ctx)?;

    let result = match ResultCache::key("portfolio_analytics", &req.holdings) {
        Some(key) => {
            ctx.cache
                .get_or_try_compute(&key, Some(ANALYTICS_TTL_SECONDS), || async {
                    analytics::portfolio_analytics(&req.holdings)
                })
                .await
        }
        None => analytics::portfolio_analytics(&req.holdings),
    };

    match result {
        Ok(report) => Ok(warp::reply::json(&report)),
        Err(e) => Err(warp::reject::custom(ApiError::invalid_input(e.to_string()))),
    }
}
