use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use crate::entities::prelude::*;
use axum::{Extension, Json, extract::State};
use sea_orm::EntityTrait;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub plan: String,
    pub email_verified: bool,
    pub analyses_this_month: i32,
    pub monthly_limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile of the caller", body = UserProfileResponse)
    ),
    tag = "users"
)]
pub async fn get_profile(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfileResponse>, AppError> {
    let account = Users::find_by_id(&user.id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let analyses_this_month = state.usage.monthly_analysis_count(&account.id).await?;

    let monthly_limit = if account.plan == "free" {
        Some(state.config.free_monthly_limit)
    } else {
        None
    };

    Ok(Json(UserProfileResponse {
        id: account.id,
        email: account.email,
        display_name: account.display_name,
        plan: account.plan,
        email_verified: account.email_verified,
        analyses_this_month,
        monthly_limit,
    }))
}
