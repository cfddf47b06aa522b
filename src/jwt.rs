use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use rand_core::{OsRng, RngCore};

use crate::app::AppState;
use crate::errors::AppError;
use crate::utils::{token_digest, utc_now};

const DEFAULT_REFRESH_DAYS: i64 = 60;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub exp_hours: i64,
    pub refresh_days: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;
        let refresh_days = std::env::var("REFRESH_EXP_DAYS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(DEFAULT_REFRESH_DAYS))
            .map_err(|_| AppError::configuration("REFRESH_EXP_DAYS must be a valid integer"))?;

        Ok(Self::new(secret, exp_hours).with_refresh_days(refresh_days))
    }

    pub fn new(secret: impl Into<String>, exp_hours: i64) -> Self {
        Self {
            secret: Arc::new(secret.into().into_bytes()),
            exp_hours,
            refresh_days: DEFAULT_REFRESH_DAYS,
        }
    }

    pub fn with_refresh_days(mut self, days: i64) -> Self {
        self.refresh_days = days;
        self
    }

    /// Lifetime of a newly issued refresh token.
    pub fn refresh_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_days)
    }

    pub fn encode(&self, user_id: i64) -> Result<String, AppError> {
        use chrono::Duration;

        let now = utc_now();
        let exp = now + Duration::hours(self.exp_hours);

        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
            jti: hex::encode(nonce),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::token(err.to_string()))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map(|data| data.claims)
            .map_err(|err| AppError::token(err.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    /// Makes every issued token distinct, so revoking one never affects another.
    #[serde(default)]
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::token("subject is not a user id"))
    }
}

/// The authenticated caller. Produced from a valid, unrevoked bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub token_digest: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = state.jwt.decode(token)?;
        let digest = token_digest(token);

        let revoked: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM revoked_tokens WHERE token_hash = ?")
            .bind(&digest)
            .fetch_one(&state.pool)
            .await?;

        if revoked > 0 {
            return Err(AppError::unauthorized("token has been revoked"));
        }

        Ok(AuthUser {
            user_id: claims.user_id()?,
            token_digest: digest,
        })
    }
}
