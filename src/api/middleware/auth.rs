use crate::api::error::AppError;
use crate::services::token::TokenKind;
use crate::{AppState, entities::prelude::Users};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sea_orm::EntityTrait;

/// Authenticated caller, injected into request extensions after the access
/// token verifies.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = state.tokens.verify(&token, TokenKind::Access)?;

    // Check if user still exists in DB
    let user_exists = Users::find_by_id(claims.sub.clone())
        .one(&state.db)
        .await?
        .is_some();

    if !user_exists {
        return Err(AppError::Unauthorized("Unknown user".to_string()));
    }

    req.extensions_mut().insert(AuthUser {
        id: claims.sub,
        email: claims.email,
    });
    Ok(next.run(req).await)
}
