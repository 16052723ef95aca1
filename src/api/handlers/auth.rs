use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use crate::entities::{prelude::*, *};
use crate::services::session::DeviceInfo;
use crate::services::token::{TokenKind, TokenPair};
use crate::utils::validation::{validate_email, validate_password};
use argon2::{
    Argon2,
    password_hash::{PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::HeaderMap, http::StatusCode};
use base64::Engine;
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

const VERIFY_EMAIL_TTL_HOURS: i64 = 24;
const RESET_PASSWORD_TTL_HOURS: i64 = 1;

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_expires_at: chrono::DateTime<Utc>,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyEmailRequest {
    pub token: String,
}

fn device_info(headers: &HeaderMap) -> DeviceInfo {
    DeviceInfo {
        user_agent: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string()),
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    Ok(argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .to_string())
}

fn generate_one_time_token() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.r#gen()).collect();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

async fn issue_one_time_token(
    state: &crate::AppState,
    user_id: &str,
    purpose: &str,
    ttl_hours: i64,
) -> Result<String, AppError> {
    let raw = generate_one_time_token();

    let row = one_time_tokens::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        token_hash: Set(crate::utils::hash::calculate_hash(raw.as_bytes())),
        purpose: Set(purpose.to_string()),
        expires_at: Set(Utc::now() + Duration::hours(ttl_hours)),
        used_at: Set(None),
        created_at: Set(Utc::now()),
    };
    row.insert(&state.db).await?;

    Ok(raw)
}

async fn consume_one_time_token(
    state: &crate::AppState,
    raw: &str,
    purpose: &str,
) -> Result<one_time_tokens::Model, AppError> {
    let hash = crate::utils::hash::calculate_hash(raw.as_bytes());

    let row = OneTimeTokens::find()
        .filter(one_time_tokens::Column::TokenHash.eq(&hash))
        .filter(one_time_tokens::Column::Purpose.eq(purpose))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    if row.used_at.is_some() || row.expires_at < Utc::now() {
        return Err(AppError::Unauthorized(
            "Invalid or expired token".to_string(),
        ));
    }

    let consumed = row.clone();
    let mut active: one_time_tokens::ActiveModel = row.into();
    active.used_at = Set(Some(Utc::now()));
    active.update(&state.db).await?;

    Ok(consumed)
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully"),
        (status = 400, description = "Invalid input or email already in use")
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<crate::AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<StatusCode, AppError> {
    validate_email(&payload.email).map_err(AppError::Validation)?;
    validate_password(&payload.password).map_err(AppError::Validation)?;

    let password_hash = hash_password(&payload.password)?;
    let id = Uuid::new_v4().to_string();

    let user = users::ActiveModel {
        id: Set(id.clone()),
        email: Set(payload.email.to_lowercase()),
        password_hash: Set(password_hash),
        display_name: Set(payload.display_name),
        plan: Set("free".to_string()),
        billing_customer_id: Set(None),
        email_verified: Set(false),
        created_at: Set(Some(Utc::now())),
    };

    let user = user
        .insert(&state.db)
        .await
        .map_err(|_e| AppError::Validation("Email already in use".to_string()))?;

    let verify_token =
        issue_one_time_token(&state, &id, "verify_email", VERIFY_EMAIL_TTL_HOURS).await?;
    if let Err(e) = state
        .mailer
        .send_verification_email(&user.email, &verify_token, &state.config.app_base_url)
        .await
    {
        tracing::error!("Failed to send verification email: {}", e);
    }

    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPairResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    let user = Users::find()
        .filter(users::Column::Email.eq(payload.email.to_lowercase()))
        .one(&state.db)
        .await?
        .ok_or(AppError::Unauthorized("Invalid credentials".to_string()))?;

    let argon2 = Argon2::default();
    let parsed_hash = argon2::PasswordHash::new(&user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    argon2
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let pair = state.tokens.issue_token_pair(&user.id, &user.email)?;

    state
        .sessions
        .store_refresh_token(&user.id, &pair.refresh_token, &device_info(&headers))
        .await?;

    Ok(Json(pair.into()))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair rotated", body = TokenPairResponse),
        (status = 401, description = "Invalid, expired or revoked refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    // Signature/expiry first, then the stored-hash check: a token that
    // cryptographically verifies can still be revoked server-side.
    let claims = state
        .tokens
        .verify(&payload.refresh_token, TokenKind::Refresh)?;

    let pair = state.tokens.issue_token_pair(&claims.sub, &claims.email)?;

    state
        .sessions
        .rotate_refresh_token(
            &claims.sub,
            &payload.refresh_token,
            &pair.refresh_token,
            &device_info(&headers),
        )
        .await?;

    Ok(Json(pair.into()))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Session revoked")
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<crate::AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    // Revocation works even for an expired JWT: only the stored hash matters
    state
        .sessions
        .revoke_by_raw_token(&payload.refresh_token)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 202, description = "Reset email sent if the account exists")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    State(state): State<crate::AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<StatusCode, AppError> {
    // Same response whether or not the account exists
    let user = Users::find()
        .filter(users::Column::Email.eq(payload.email.to_lowercase()))
        .one(&state.db)
        .await?;

    if let Some(user) = user {
        let token =
            issue_one_time_token(&state, &user.id, "reset_password", RESET_PASSWORD_TTL_HOURS)
                .await?;
        if let Err(e) = state
            .mailer
            .send_password_reset_email(&user.email, &token, &state.config.app_base_url)
            .await
        {
            tracing::error!("Failed to send password reset email: {}", e);
        }
    }

    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password changed, all sessions revoked"),
        (status = 401, description = "Invalid or expired reset token")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    State(state): State<crate::AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    validate_password(&payload.new_password).map_err(AppError::Validation)?;

    let token_row = consume_one_time_token(&state, &payload.token, "reset_password").await?;

    let user = Users::find_by_id(&token_row.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let email = user.email.clone();
    let mut active: users::ActiveModel = user.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.update(&state.db).await?;

    // A password reset invalidates every outstanding session
    let revoked = state.sessions.revoke_all_for_user(&token_row.user_id).await?;
    tracing::info!(
        "🔒 Password reset for {}: revoked {} refresh tokens",
        token_row.user_id,
        revoked
    );

    if let Err(e) = state.mailer.send_password_changed_email(&email).await {
        tracing::error!("Failed to send password changed email: {}", e);
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 401, description = "Invalid or expired verification token")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    State(state): State<crate::AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<StatusCode, AppError> {
    let token_row = consume_one_time_token(&state, &payload.token, "verify_email").await?;

    let user = Users::find_by_id(&token_row.user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut active: users::ActiveModel = user.into();
    active.email_verified = Set(true);
    active.update(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize, ToSchema)]
pub struct SessionInfo {
    pub id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub expires_at: chrono::DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/auth/sessions",
    responses(
        (status = 200, description = "Live sessions for the caller", body = [SessionInfo])
    ),
    tag = "auth"
)]
pub async fn list_sessions(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<SessionInfo>>, AppError> {
    let rows = RefreshTokens::find()
        .filter(refresh_tokens::Column::UserId.eq(&user.id))
        .filter(refresh_tokens::Column::RevokedAt.is_null())
        .filter(refresh_tokens::Column::ExpiresAt.gt(Utc::now()))
        .all(&state.db)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|r| SessionInfo {
                id: r.id,
                user_agent: r.user_agent,
                ip_address: r.ip_address,
                created_at: r.created_at,
                expires_at: r.expires_at,
            })
            .collect(),
    ))
}
