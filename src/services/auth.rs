// src/services/auth.rs
use chrono::{Duration, NaiveDate, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::warn;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const ACCESS_TOKEN_EXPIRE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    TokenExpired,
    TokenInvalid,
    InvalidCredentials,
    EmailTaken,
    UnknownUser,
    UnknownTier(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthError::TokenExpired => write!(f, "Token expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::EmailTaken => write!(f, "An account with this email already exists"),
            AuthError::UnknownUser => write!(f, "Unknown user"),
            AuthError::UnknownTier(tier) => write!(f, "Unknown subscription tier: {}", tier),
        }
    }
}

impl std::error::Error for AuthError {}

pub fn secret_key() -> String {
    env::var("SECRET_KEY").unwrap_or_else(|_| {
        warn!("$SECRET_KEY not set, using the development default");
        "dev-secret-key-change-in-prod".to_string()
    })
}

/// Session token claims. `sub` carries the user id.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn create_access_token(
    user_id: &str,
    email: &str,
    secret: &str,
    expire_days: i64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(expire_days)).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        warn!("Failed to sign access token: {}", e);
        AuthError::TokenInvalid
    })
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    })
}

/// sha256 hex digest, matching how the mock user store keeps passwords.
/// This is a stand-in, not real credential storage.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Elite,
}

impl Tier {
    pub fn parse(value: &str) -> Result<Self, AuthError> {
        match value {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "elite" => Ok(Tier::Elite),
            other => Err(AuthError::UnknownTier(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Elite => "elite",
        }
    }
}

/// Static entitlement table: monthly price, feature slugs and usage limits
/// per subscription tier.
#[derive(Debug)]
pub struct TierPolicy {
    pub price: f64,
    pub features: &'static [&'static str],
    pub api_calls_per_day: u32,
    pub max_tickers: u32,
}

static FREE_POLICY: TierPolicy = TierPolicy {
    price: 0.0,
    features: &["basic_price", "basic_dividends", "limited_history"],
    api_calls_per_day: 100,
    max_tickers: 5,
};

static PREMIUM_POLICY: TierPolicy = TierPolicy {
    price: 9.99,
    features: &[
        "dividend_safety",
        "analytics",
        "capture_strategy",
        "tax_calculator",
    ],
    api_calls_per_day: 1_000,
    max_tickers: 50,
};

static ELITE_POLICY: TierPolicy = TierPolicy {
    price: 29.99,
    features: &[
        "dividend_safety",
        "analytics",
        "capture_strategy",
        "tax_calculator",
        "portfolio_tracking",
        "alerts",
    ],
    api_calls_per_day: 10_000,
    max_tickers: 500,
};

pub fn tier_policy(tier: Tier) -> &'static TierPolicy {
    match tier {
        Tier::Free => &FREE_POLICY,
        Tier::Premium => &PREMIUM_POLICY,
        Tier::Elite => &ELITE_POLICY,
    }
}

/// The single gating predicate. The scoring engine itself is tier-agnostic;
/// handlers call this before invoking it.
pub fn tier_allows(tier: Tier, feature: &str) -> bool {
    tier_policy(tier).features.contains(&feature)
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub subscription: Tier,
    pub created_at: NaiveDate,
    pub crypto_wallet: Option<String>,
}

/// Abstraction over the user store so the mock in-memory implementation
/// can be swapped for a real database without touching the handlers.
pub trait UserRepository: Send + Sync {
    fn find_by_email(&self, email: &str) -> Option<User>;
    fn find_by_id(&self, id: &str) -> Option<User>;
    fn create(&self, email: &str, password_hash: &str) -> Result<User, AuthError>;
    fn set_subscription(&self, user_id: &str, tier: Tier) -> Result<User, AuthError>;
}

/// In-memory user store, keyed by email. New accounts start on the free
/// tier. `with_demo_user` seeds the premium demo account the dashboard
/// ships with.
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, User>>,
    next_id: AtomicU64,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        InMemoryUserRepository {
            users: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_demo_user() -> Self {
        let repo = Self::new();
        let demo = User {
            id: "user_1".to_string(),
            email: "demo@example.com".to_string(),
            password_hash: hash_password("password123"),
            subscription: Tier::Premium,
            created_at: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap_or_default(),
            crypto_wallet: None,
        };
        if let Ok(mut users) = repo.users.lock() {
            users.insert(demo.email.clone(), demo);
        }
        repo.next_id.store(2, Ordering::SeqCst);
        repo
    }
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_email(&self, email: &str) -> Option<User> {
        self.users.lock().ok()?.get(email).cloned()
    }

    fn find_by_id(&self, id: &str) -> Option<User> {
        self.users
            .lock()
            .ok()?
            .values()
            .find(|user| user.id == id)
            .cloned()
    }

    fn create(&self, email: &str, password_hash: &str) -> Result<User, AuthError> {
        let mut users = self.users.lock().map_err(|_| AuthError::UnknownUser)?;
        if users.contains_key(email) {
            return Err(AuthError::EmailTaken);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let user = User {
            id: format!("user_{}", id),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            subscription: Tier::Free,
            created_at: Utc::now().date_naive(),
            crypto_wallet: None,
        };
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }

    fn set_subscription(&self, user_id: &str, tier: Tier) -> Result<User, AuthError> {
        let mut users = self.users.lock().map_err(|_| AuthError::UnknownUser)?;
        let user = users
            .values_mut()
            .find(|user| user.id == user_id)
            .ok_or(AuthError::UnknownUser)?;
        user.subscription = tier;
        Ok(user.clone())
    }
}

/// Resolve the caller's tier from an optional session token. Anonymous or
/// unverifiable callers are treated as free tier; gating then rejects them
/// on premium features.
pub fn resolve_tier(token: Option<&str>, secret: &str, users: &dyn UserRepository) -> Tier {
    let token = match token {
        Some(token) => token,
        None => return Tier::Free,
    };
    match verify_token(token, secret) {
        Ok(claims) => users
            .find_by_id(&claims.sub)
            .map(|user| user.subscription)
            .unwrap_or(Tier::Free),
        Err(_) => Tier::Free,
    }
}
