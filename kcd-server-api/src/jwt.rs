use axum::{
    RequestPartsExt,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use kcd_server_domain::{
    ServiceError, ServiceResult,
    account::{AccountService, User},
    app::AppState,
    jwt::{IdentityClaim, JwtService},
};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::MyServiceError;

/// Used when no secret is configured. Anyone who knows it can forge tokens.
pub const FALLBACK_JWT_SECRET: &str = "kcd-scorekeeper-default-secret";

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    exp: usize,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct JwtServiceImpl {
    keys: Keys,
}

impl JwtServiceImpl {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            keys: Keys::new(secret),
        }
    }

    pub fn from_config(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => Self::new(secret.as_bytes()),
            None => {
                warn!("JWT secret not configured, falling back to the built-in default key");
                Self::new(FALLBACK_JWT_SECRET.as_bytes())
            }
        }
    }
}

impl JwtService for JwtServiceImpl {
    fn issue_jwt(&self, user: &User) -> ServiceResult<String> {
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp()
                as usize,
        };
        encode(&Header::default(), &claims, &self.keys.encoding)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn validate_jwt(&self, token: &str) -> ServiceResult<IdentityClaim> {
        let data = decode::<Claims>(token, &self.keys.decoding, &Validation::default())
            .map_err(|_| ServiceError::Unauthorized("Invalid token".into()))?;
        let user_id = data
            .claims
            .sub
            .parse()
            .map_err(|_| ServiceError::Unauthorized("Invalid token".into()))?;
        Ok(IdentityClaim {
            user_id,
            username: data.claims.username,
        })
    }
}

/// The caller's identity, taken from the bearer token.
pub struct Identity(pub IdentityClaim);

impl FromRequestParts<AppState> for Identity {
    type Rejection = MyServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ServiceError::Unauthorized("Missing bearer token".into()))?;
        let claim = state.account_service.validate_token(bearer.token())?;
        Ok(Identity(claim))
    }
}
