// src/handlers/auth.rs
use super::error::ApiError;
use crate::models::{CredentialsRequest, PaymentQuery, TokenQuery, UpgradeQuery};
use crate::routes::AppContext;
use crate::services::auth::{self, AuthError, Tier};
use log::{info, warn};
use serde_json::json;
use uuid::Uuid;
use warp::reply::Json;
use warp::Rejection;

/// Session token from either the `?token=` query param or an
/// `Authorization: Bearer` header. Query wins when both are present.
pub fn session_token(query_token: Option<String>, auth_header: Option<String>) -> Option<String> {
    query_token.or_else(|| {
        auth_header
            .as_deref()
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    })
}

/// Entitlement gate used by the analytics handlers. Anonymous and invalid
/// tokens resolve to the free tier, which lacks every premium feature.
pub fn require_feature(
    token: Option<&str>,
    feature: &str,
    description: &str,
    ctx: &AppContext,
) -> Result<(), Rejection> {
    let tier = auth::resolve_tier(token, &ctx.secret, ctx.users.as_ref());
    if auth::tier_allows(tier, feature) {
        Ok(())
    } else {
        warn!(
            "Rejected {} request on {} tier",
            feature,
            tier.as_str()
        );
        Err(warp::reject::custom(ApiError::forbidden(format!(
            "{} is available on Premium and Elite plans",
            description
        ))))
    }
}

fn unauthorized(err: AuthError) -> Rejection {
    warp::reject::custom(ApiError::unauthorized(err.to_string()))
}

fn issue_token(user: &auth::User, ctx: &AppContext) -> Result<String, Rejection> {
    auth::create_access_token(
        &user.id,
        &user.email,
        &ctx.secret,
        auth::ACCESS_TOKEN_EXPIRE_DAYS,
    )
    .map_err(|e| warp::reject::custom(ApiError::internal(e.to_string())))
}

pub async fn register(req: CredentialsRequest, ctx: AppContext) -> Result<Json, Rejection> {
    info!("Handling registration for {}", req.email);
    if !req.email.contains('@') {
        return Err(warp::reject::custom(ApiError::invalid_input(
            "A valid email address is required",
        )));
    }
    if req.password.is_empty() {
        return Err(warp::reject::custom(ApiError::invalid_input(
            "A password is required",
        )));
    }

    let user = ctx
        .users
        .create(&req.email, &auth::hash_password(&req.password))
        .map_err(|e| warp::reject::custom(ApiError::invalid_input(e.to_string())))?;
    let token = issue_token(&user, &ctx)?;

    Ok(warp::reply::json(&json!({
        "access_token": token,
        "token_type": "bearer",
        "user": user,
    })))
}

pub async fn login(req: CredentialsRequest, ctx: AppContext) -> Result<Json, Rejection> {
    info!("Handling login for {}", req.email);
    let user = ctx
        .users
        .find_by_email(&req.email)
        .ok_or_else(|| unauthorized(AuthError::InvalidCredentials))?;
    if user.password_hash != auth::hash_password(&req.password) {
        return Err(unauthorized(AuthError::InvalidCredentials));
    }
    let token = issue_token(&user, &ctx)?;

    Ok(warp::reply::json(&json!({
        "access_token": token,
        "token_type": "bearer",
        "user": user,
    })))
}

pub async fn me(
    query: TokenQuery,
    auth_header: Option<String>,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    let token = session_token(query.token, auth_header)
        .ok_or_else(|| unauthorized(AuthError::TokenInvalid))?;
    let claims = auth::verify_token(&token, &ctx.secret).map_err(unauthorized)?;
    let user = ctx
        .users
        .find_by_id(&claims.sub)
        .ok_or_else(|| unauthorized(AuthError::UnknownUser))?;
    Ok(warp::reply::json(&user))
}

pub async fn upgrade_subscription(
    query: UpgradeQuery,
    auth_header: Option<String>,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    info!("Handling subscription upgrade to {}", query.tier);
    let token = session_token(query.token, auth_header)
        .ok_or_else(|| unauthorized(AuthError::TokenInvalid))?;
    let claims = auth::verify_token(&token, &ctx.secret).map_err(unauthorized)?;
    let tier = Tier::parse(&query.tier)
        .map_err(|e| warp::reject::custom(ApiError::invalid_input(e.to_string())))?;
    let user = ctx
        .users
        .set_subscription(&claims.sub, tier)
        .map_err(unauthorized)?;

    Ok(warp::reply::json(&json!({
        "status": "upgraded",
        "user": user,
    })))
}

/// Mock payment rail: records nothing and never touches a chain. Kept as
/// a stub so the subscription flow is exercisable end to end.
pub async fn crypto_payment(
    query: PaymentQuery,
    auth_header: Option<String>,
    ctx: AppContext,
) -> Result<Json, Rejection> {
    let token = session_token(query.token, auth_header)
        .ok_or_else(|| unauthorized(AuthError::TokenInvalid))?;
    let claims = auth::verify_token(&token, &ctx.secret).map_err(unauthorized)?;
    if query.amount <= 0.0 {
        return Err(warp::reject::custom(ApiError::invalid_input(
            "amount must be positive",
        )));
    }

    let wallet_address = match query.crypto_type.as_str() {
        "bitcoin" => "bc1qdividenddashboardmockpayments0000000",
        _ => "0x71C7656EC7ab88b098defB751B7401B5f6d8976F",
    };
    info!(
        "Mock {} payment of {} initiated by {}",
        query.crypto_type, query.amount, claims.sub
    );

    Ok(warp::reply::json(&json!({
        "transaction_id": Uuid::new_v4().to_string(),
        "wallet_address": wallet_address,
        "crypto_type": query.crypto_type,
        "amount": query.amount,
        "status": "pending",
    })))
}
