// src/routes.rs
use std::convert::Infallible;
use std::sync::Arc;

use log::info;
use serde::de::DeserializeOwned;
use serde_json::json;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::auth::{crypto_payment, login, me, register, upgrade_subscription};
use crate::handlers::dividend::{capture_strategy, safety_score};
use crate::handlers::error::ApiError;
use crate::handlers::market::{get_dividends, get_historical, get_price};
use crate::handlers::portfolio::portfolio_analytics;
use crate::models::{DividendsQuery, HistoricalQuery, PaymentQuery, TokenQuery, UpgradeQuery};
use crate::services::auth::UserRepository;
use crate::services::cache::ResultCache;
use crate::services::provider;

/// Shared handler context, cloned into each request.
#[derive(Clone)]
pub struct AppContext {
    pub cache: Arc<ResultCache>,
    pub users: Arc<dyn UserRepository>,
    pub secret: String,
    pub provider: String,
}

impl AppContext {
    pub fn new(users: Arc<dyn UserRepository>, secret: String) -> Self {
        AppContext {
            cache: Arc::new(ResultCache::new()),
            users,
            secret,
            provider: provider::current_provider(),
        }
    }
}

fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(16 * 1024).and(warp::body::json())
}

// Add recovery handling for our custom errors
async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(api_error) = err.find::<ApiError>() {
        (api_error.status(), api_error.message.clone())
    } else if let Some(body_error) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, body_error.to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method Not Allowed".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        code,
    ))
}

pub fn routes(ctx: AppContext) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let ctx_filter = warp::any().map(move || ctx.clone());
    let bearer = warp::header::optional::<String>("authorization");

    let price_route = warp::path!("api" / "price" / String)
        .and(warp::get())
        .and(ctx_filter.clone())
        .and_then(get_price);

    let historical_route = warp::path!("api" / "historical" / String)
        .and(warp::get())
        .and(warp::query::<HistoricalQuery>())
        .and(ctx_filter.clone())
        .and_then(get_historical);

    let dividends_route = warp::path!("api" / "dividends" / String)
        .and(warp::get())
        .and(warp::query::<DividendsQuery>())
        .and(ctx_filter.clone())
        .and_then(get_dividends);

    let safety_score_route = warp::path!("api" / "dividend" / "safety-score")
        .and(warp::post())
        .and(warp::query::<TokenQuery>())
        .and(bearer.clone())
        .and(json_body())
        .and(ctx_filter.clone())
        .and_then(safety_score);

    let capture_strategy_route = warp::path!("api" / "dividend" / "capture-strategy")
        .and(warp::post())
        .and(warp::query::<TokenQuery>())
        .and(bearer.clone())
        .and(json_body())
        .and(ctx_filter.clone())
        .and_then(capture_strategy);

    let portfolio_route = warp::path!("api" / "portfolio" / "analytics")
        .and(warp::post())
        .and(warp::query::<TokenQuery>())
        .and(bearer.clone())
        .and(json_body())
        .and(ctx_filter.clone())
        .and_then(portfolio_analytics);

    let register_route = warp::path!("api" / "auth" / "register")
        .and(warp::post())
        .and(json_body())
        .and(ctx_filter.clone())
        .and_then(register);

    let login_route = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(json_body())
        .and(ctx_filter.clone())
        .and_then(login);

    let me_route = warp::path!("api" / "auth" / "me")
        .and(warp::get())
        .and(warp::query::<TokenQuery>())
        .and(bearer.clone())
        .and(ctx_filter.clone())
        .and_then(me);

    let upgrade_route = warp::path!("api" / "subscription" / "upgrade")
        .and(warp::post())
        .and(warp::query::<UpgradeQuery>())
        .and(bearer.clone())
        .and(ctx_filter.clone())
        .and_then(upgrade_subscription);

    let payment_route = warp::path!("api" / "payment" / "crypto")
        .and(warp::post())
        .and(warp::query::<PaymentQuery>())
        .and(bearer)
        .and(ctx_filter.clone())
        .and_then(crypto_payment);

    let health_route = warp::path!("health")
        .and(warp::get())
        .and(ctx_filter.clone())
        .map(|ctx: AppContext| {
            warp::reply::json(&json!({
                "status": "healthy",
                "provider": ctx.provider,
                "caching": true,
            }))
        });

    let docs_route = warp::path!("docs").and(warp::get()).map(|| {
        warp::reply::json(&json!({
            "endpoints": [
                "GET /api/price/{ticker}",
                "GET /api/historical/{ticker}?days=30",
                "GET /api/dividends/{ticker}?limit=10",
                "POST /api/dividend/safety-score",
                "POST /api/dividend/capture-strategy",
                "POST /api/portfolio/analytics",
                "POST /api/auth/register",
                "POST /api/auth/login",
                "GET /api/auth/me",
                "POST /api/subscription/upgrade",
                "POST /api/payment/crypto",
                "GET /health",
            ],
        }))
    });

    info!("All routes configured successfully.");

    price_route
        .or(historical_route)
        .or(dividends_route)
        .or(safety_score_route)
        .or(capture_strategy_route)
        .or(portfolio_route)
        .or(register_route)
        .or(login_route)
        .or(me_route)
        .or(upgrade_route)
        .or(payment_route)
        .or(health_route)
        .or(docs_route)
        .recover(handle_rejection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::{self, InMemoryUserRepository};
    use serde_json::Value;

    fn test_context() -> AppContext {
        AppContext::new(
            Arc::new(InMemoryUserRepository::with_demo_user()),
            "test-secret".to_string(),
        )
    }

    /// Token for the seeded premium demo account, signed with the test
    /// secret. The full login flow is covered by its own test below.
    fn demo_token(ctx: &AppContext) -> String {
        let user = ctx.users.find_by_email("demo@example.com").unwrap();
        auth::create_access_token(&user.id, &user.email, &ctx.secret, 30).unwrap()
    }

    #[tokio::test]
    async fn health_reports_provider_and_caching() {
        let api = routes(test_context());
        let res = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["caching"], true);
    }

    #[tokio::test]
    async fn unknown_route_is_a_json_404() {
        let api = routes(test_context());
        let res = warp::test::request()
            .method("GET")
            .path("/api/nope")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 404);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn safety_score_is_gated_for_anonymous_callers() {
        let api = routes(test_context());
        let res = warp::test::request()
            .method("POST")
            .path("/api/dividend/safety-score")
            .json(&json!({ "payout_ratio": 30.0 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 403);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert!(body["error"].as_str().unwrap().contains("Premium"));
    }

    #[tokio::test]
    async fn premium_login_unlocks_safety_score() {
        let api = routes(test_context());

        let login = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&json!({ "email": "demo@example.com", "password": "password123" }))
            .reply(&api)
            .await;
        assert_eq!(login.status(), 200);
        let body: Value = serde_json::from_slice(login.body()).unwrap();
        assert_eq!(body["user"]["subscription"], "premium");
        let token = body["access_token"].as_str().unwrap().to_string();

        let res = warp::test::request()
            .method("POST")
            .path(&format!("/api/dividend/safety-score?token={}", token))
            .json(&json!({
                "payout_ratio": 30.0,
                "earnings_growth": 10.0,
                "debt_to_equity": 0.5,
                "fcf_trend": 1.0,
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["score"], 100);
        assert_eq!(body["grade"], "A");
        assert_eq!(body["safe"], true);
        assert_eq!(body["label"], "Very Safe");
    }

    #[tokio::test]
    async fn bearer_header_works_like_the_query_param() {
        let ctx = test_context();
        let token = demo_token(&ctx);
        let api = routes(ctx);

        let res = warp::test::request()
            .method("POST")
            .path("/api/dividend/safety-score")
            .header("authorization", format!("Bearer {}", token))
            .json(&json!({ "payout_ratio": 95.0, "earnings_growth": -3.0 }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["grade"], "F");
    }

    #[tokio::test]
    async fn capture_strategy_round_trips_the_reference_numbers() {
        let ctx = test_context();
        let token = demo_token(&ctx);
        let api = routes(ctx);

        let res = warp::test::request()
            .method("POST")
            .path(&format!("/api/dividend/capture-strategy?token={}", token))
            .json(&json!({
                "ticker": "AAPL",
                "ex_dividend_date": "2025-01-01",
                "dividend_amount": 1.0,
                "current_price": 100.0,
                "holding_period_days": 60,
            }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["dividend_yield_pretax"], json!(1.0));
        assert_eq!(body["is_qualified_dividend"], true);
        assert_eq!(body["tax_rate"], json!(20.0));
        assert_eq!(body["scenarios"]["bearish"]["total_return_pct"], json!(-4.2));
        assert_eq!(body["recommended"], true);
        assert_eq!(body["risk_level"], "Low");
    }

    #[tokio::test]
    async fn empty_portfolio_returns_the_structured_error() {
        let ctx = test_context();
        let token = demo_token(&ctx);
        let api = routes(ctx);

        let res = warp::test::request()
            .method("POST")
            .path(&format!("/api/portfolio/analytics?token={}", token))
            .json(&json!({ "holdings": [] }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "No holdings provided");
    }

    #[tokio::test]
    async fn portfolio_analytics_aggregates_holdings() {
        let ctx = test_context();
        let token = demo_token(&ctx);
        let api = routes(ctx);

        let res = warp::test::request()
            .method("POST")
            .path(&format!("/api/portfolio/analytics?token={}", token))
            .json(&json!({ "holdings": [
                { "symbol": "SCHD", "shares": 10, "currentPrice": 100.0,
                  "dividendYield": 4.0, "payoutRatio": 30.0, "earningsGrowth": 10.0 },
                { "symbol": "VZ", "shares": 5, "currentPrice": 50.0,
                  "dividendYield": 2.0, "payoutRatio": 80.0, "earningsGrowth": 0.0 },
            ]}))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["total_portfolio_value"], json!(1250.0));
        assert_eq!(body["annual_dividend_income"], json!(45.0));
        assert_eq!(body["portfolio_yield"], json!(3.6));
        assert_eq!(body["avg_safety_score"], json!(75.0));
        assert_eq!(body["holdings_count"], 2);
        assert_eq!(body["dividend_growth_3yr"], Value::Null);
    }

    #[tokio::test]
    async fn registration_starts_on_the_free_tier() {
        let api = routes(test_context());

        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/register")
            .json(&json!({ "email": "new@example.com", "password": "hunter2" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["user"]["subscription"], "free");
        let token = body["access_token"].as_str().unwrap().to_string();

        // free tier cannot reach the scoring endpoint
        let gated = warp::test::request()
            .method("POST")
            .path(&format!("/api/dividend/safety-score?token={}", token))
            .json(&json!({ "payout_ratio": 30.0 }))
            .reply(&api)
            .await;
        assert_eq!(gated.status(), 403);
    }

    #[tokio::test]
    async fn upgrade_unlocks_premium_features() {
        let api = routes(test_context());

        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/register")
            .json(&json!({ "email": "upgrader@example.com", "password": "hunter2" }))
            .reply(&api)
            .await;
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        let token = body["access_token"].as_str().unwrap().to_string();

        let upgraded = warp::test::request()
            .method("POST")
            .path(&format!(
                "/api/subscription/upgrade?tier=premium&token={}",
                token
            ))
            .reply(&api)
            .await;
        assert_eq!(upgraded.status(), 200);
        let body: Value = serde_json::from_slice(upgraded.body()).unwrap();
        assert_eq!(body["user"]["subscription"], "premium");

        let scored = warp::test::request()
            .method("POST")
            .path(&format!("/api/dividend/safety-score?token={}", token))
            .json(&json!({ "payout_ratio": 30.0 }))
            .reply(&api)
            .await;
        assert_eq!(scored.status(), 200);
    }

    #[tokio::test]
    async fn me_requires_a_valid_token() {
        let ctx = test_context();
        let api = routes(ctx.clone());

        let anonymous = warp::test::request()
            .method("GET")
            .path("/api/auth/me")
            .reply(&api)
            .await;
        assert_eq!(anonymous.status(), 401);

        let token = demo_token(&ctx);
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/api/auth/me?token={}", token))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["email"], "demo@example.com");
        assert_eq!(body["subscription"], "premium");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn login_rejects_bad_credentials() {
        let api = routes(test_context());
        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&json!({ "email": "demo@example.com", "password": "wrong" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn crypto_payment_stub_issues_a_transaction_id() {
        let ctx = test_context();
        let token = demo_token(&ctx);
        let api = routes(ctx);

        let res = warp::test::request()
            .method("POST")
            .path(&format!(
                "/api/payment/crypto?crypto_type=ethereum&amount=9.99&token={}",
                token
            ))
            .reply(&api)
            .await;
        assert_eq!(res.status(), 200);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], "pending");
        assert!(!body["transaction_id"].as_str().unwrap().is_empty());
        assert!(body["wallet_address"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn invalid_ticker_is_rejected_before_the_provider() {
        let api = routes(test_context());
        let res = warp::test::request()
            .method("GET")
            .path("/api/price/not%20a%20ticker")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn historical_range_is_validated() {
        let api = routes(test_context());
        let res = warp::test::request()
            .method("GET")
            .path("/api/historical/AAPL?days=0")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);

        let res = warp::test::request()
            .method("GET")
            .path("/api/dividends/AAPL?limit=100")
            .reply(&api)
            .await;
        assert_eq!(res.status(), 400);
    }
}
