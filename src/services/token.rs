use crate::api::error::TokenError;
use crate::utils::hash::calculate_hash;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const MIN_SECRET_LEN: usize = 32;
const ISSUER: &str = "protein-scan-backend";
const AUDIENCE: &str = "protein-scan-app";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// user id
    pub sub: String,
    pub email: String,
    pub token_type: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

struct SigningKeys {
    current: String,
    previous: Option<String>,
}

/// Issues and verifies signed session credentials, with a previous-key
/// fallback so the signing secret can rotate without logging everyone out.
///
/// Key material is loaded lazily on first use and cached per instance;
/// `invalidate()` forces a reload after reconfiguration.
pub struct TokenService {
    current_secret: RwLock<Option<String>>,
    previous_secret: RwLock<Option<String>>,
    keys: RwLock<Option<Arc<SigningKeys>>>,
}

impl TokenService {
    pub fn new(current_secret: Option<String>, previous_secret: Option<String>) -> Self {
        Self {
            current_secret: RwLock::new(current_secret),
            previous_secret: RwLock::new(previous_secret),
            keys: RwLock::new(None),
        }
    }

    /// Replace the configured secrets and drop the cached key material.
    pub fn reconfigure(&self, current_secret: Option<String>, previous_secret: Option<String>) {
        *self.current_secret.write().unwrap() = current_secret;
        *self.previous_secret.write().unwrap() = previous_secret;
        self.invalidate();
    }

    /// Drop the cached key material so the next use reloads it.
    pub fn invalidate(&self) {
        *self.keys.write().unwrap() = None;
    }

    fn keys(&self) -> Result<Arc<SigningKeys>, TokenError> {
        if let Some(keys) = self.keys.read().unwrap().as_ref() {
            return Ok(keys.clone());
        }

        let current = match self.current_secret.read().unwrap().clone() {
            Some(s) if s.len() >= MIN_SECRET_LEN => s,
            _ => return Err(TokenError::MissingSecret),
        };

        let previous = match self.previous_secret.read().unwrap().clone() {
            Some(s) if s.len() >= MIN_SECRET_LEN => Some(s),
            Some(_) => {
                tracing::warn!("JWT_PREVIOUS_SECRET is too short, ignoring it");
                None
            }
            None => None,
        };

        let keys = Arc::new(SigningKeys { current, previous });
        *self.keys.write().unwrap() = Some(keys.clone());
        Ok(keys)
    }

    pub fn issue_access_token(&self, user_id: &str, email: &str) -> Result<String, TokenError> {
        self.issue(user_id, email, TokenKind::Access)
    }

    pub fn issue_refresh_token(&self, user_id: &str, email: &str) -> Result<String, TokenError> {
        self.issue(user_id, email, TokenKind::Refresh)
    }

    pub fn issue_token_pair(&self, user_id: &str, email: &str) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id, email)?,
            refresh_token: self.issue_refresh_token(user_id, email)?,
            expires_in: ACCESS_TOKEN_TTL_SECS,
            refresh_expires_at: Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        })
    }

    fn issue(&self, user_id: &str, email: &str, kind: TokenKind) -> Result<String, TokenError> {
        let keys = self.keys()?;
        let now = Utc::now();
        let exp = match kind {
            TokenKind::Access => now + Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            TokenKind::Refresh => now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
        };

        let claims = Claims {
            sub: user_id.to_owned(),
            email: email.to_owned(),
            token_type: kind.as_str().to_owned(),
            iss: ISSUER.to_owned(),
            aud: AUDIENCE.to_owned(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: match kind {
                TokenKind::Access => None,
                TokenKind::Refresh => Some(Uuid::new_v4().to_string()),
            },
        };

        // New tokens are always signed with the current key, never the
        // previous one.
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(keys.current.as_bytes()),
        )
        .map_err(|_| TokenError::Invalid)
    }

    /// Verify against the current key, falling back once to the previous
    /// key on a signature mismatch. Expiry and type mismatches never
    /// trigger the fallback: an expired token is expired under any key.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let keys = self.keys()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);

        let data = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(keys.current.as_bytes()),
            &validation,
        ) {
            Ok(data) => data,
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => return Err(TokenError::Expired),
                ErrorKind::InvalidSignature => {
                    let previous = keys.previous.as_ref().ok_or(TokenError::Invalid)?;
                    decode::<Claims>(
                        token,
                        &DecodingKey::from_secret(previous.as_bytes()),
                        &validation,
                    )
                    .map_err(|e| match e.kind() {
                        ErrorKind::ExpiredSignature => TokenError::Expired,
                        _ => TokenError::Invalid,
                    })?
                }
                _ => return Err(TokenError::Invalid),
            },
        };

        let claims = data.claims;
        if claims.token_type != expected.as_str() {
            return Err(TokenError::WrongType);
        }
        if claims.sub.is_empty() || claims.email.is_empty() {
            return Err(TokenError::Invalid);
        }

        Ok(claims)
    }

    /// SHA-256 of the raw refresh token, so the database never holds a
    /// usable credential.
    pub fn hash_for_storage(raw_token: &str) -> String {
        calculate_hash(raw_token.as_bytes())
    }
}
