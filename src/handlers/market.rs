// src/handlers/market.rs
use super::error::ApiError;
use crate::models::{DividendsQuery, HistoricalQuery};
use crate::routes::AppContext;
use crate::services::cache::ResultCache;
use crate::services::provider;
use log::{info, warn};
use serde_json::json;
use warp::reply::Json;
use warp::Rejection;

const PRICE_TTL_SECONDS: i64 = 60;
const HISTORICAL_TTL_SECONDS: i64 = 600;
const DIVIDENDS_TTL_SECONDS: i64 = 3600;

fn reject_ticker(ticker: &str) -> Rejection {
    warp::reject::custom(ApiError::invalid_input(format!(
        "Invalid ticker symbol: {}",
        ticker
    )))
}

pub async fn get_price(ticker: String, ctx: AppContext) -> Result<Json, Rejection> {
    info!("Handling request for price of {}", ticker);
    if !provider::is_valid_ticker(&ticker) {
        return Err(reject_ticker(&ticker));
    }

    let result = match ResultCache::key("price", &ticker) {
        Some(key) => {
            ctx.cache
                .get_or_try_compute(&key, Some(PRICE_TTL_SECONDS), || {
                    provider::get_price(&ticker)
                })
                .await
        }
        None => provider::get_price(&ticker).await,
    };

    match result {
        Ok(quote) => Ok(warp::reply::json(&quote)),
        Err(e) => {
            warn!("Price fetch failed for {}: {}", ticker, e);
            // Provider failures surface as data, not status codes
            Ok(warp::reply::json(&json!({ "error": e.to_string() })))
        }
    }
}

pub async fn get_historical(
    ticker: String,
    query: HistoricalQuery,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    info!(
        "Handling request for {} days of history for {}",
        query.days, ticker
    );
    if !provider::is_valid_ticker(&ticker) {
        return Err(reject_ticker(&ticker));
    }
    if !(1..=3650).contains(&query.days) {
        return Err(warp::reject::custom(ApiError::invalid_input(
            "days must be between 1 and 3650",
        )));
    }

    let result = match ResultCache::key("historical", &(&ticker, query.days)) {
        Some(key) => {
            ctx.cache
                .get_or_try_compute(&key, Some(HISTORICAL_TTL_SECONDS), || {
                    provider::get_historical(&ticker, query.days)
                })
                .await
        }
        None => provider::get_historical(&ticker, query.days).await,
    };

    match result {
        Ok(rows) => Ok(warp::reply::json(&json!({ "data": rows }))),
        Err(e) => {
            warn!("Historical fetch failed for {}: {}", ticker, e);
            Ok(warp::reply::json(
                &json!({ "error": e.to_string(), "data": [] }),
            ))
        }
    }
}

pub async fn get_dividends(
    ticker: String,
    query: DividendsQuery,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    info!(
        "Handling request for {} dividend payments for {}",
        query.limit, ticker
    );
    if !provider::is_valid_ticker(&ticker) {
        return Err(reject_ticker(&ticker));
    }
    if !(1..=50).contains(&query.limit) {
        return Err(warp::reject::custom(ApiError::invalid_input(
            "limit must be between 1 and 50",
        )));
    }

    let result = match ResultCache::key("dividends", &(&ticker, query.limit)) {
        Some(key) => {
            ctx.cache
                .get_or_try_compute(&key, Some(DIVIDENDS_TTL_SECONDS), || {
                    provider::get_dividends(&ticker, query.limit)
                })
                .await
        }
        None => provider::get_dividends(&ticker, query.limit).await,
    };

    match result {
        Ok(payments) => Ok(warp::reply::json(&json!({ "dividends": payments }))),
        Err(e) => {
            warn!("Dividends fetch failed for {}: {}", ticker, e);
            Ok(warp::reply::json(
                &json!({ "error": e.to_string(), "dividends": [] }),
            ))
        }
    }
}
