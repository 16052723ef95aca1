use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use crate::entities::{prelude::*, *};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct BillingUrlResponse {
    pub url: String,
}

#[utoipa::path(
    post,
    path = "/billing/checkout",
    responses(
        (status = 200, description = "Hosted checkout URL", body = BillingUrlResponse)
    ),
    tag = "billing"
)]
pub async fn create_checkout(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BillingUrlResponse>, AppError> {
    let account = Users::find_by_id(&user.id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let base = &state.config.app_base_url;
    let url = state
        .billing
        .create_checkout_session(
            &account.id,
            &account.email,
            account.billing_customer_id.as_deref(),
            &format!("{}/billing/success", base),
            &format!("{}/billing/cancel", base),
        )
        .await?;

    Ok(Json(BillingUrlResponse { url }))
}

#[utoipa::path(
    post,
    path = "/billing/portal",
    responses(
        (status = 200, description = "Customer portal URL", body = BillingUrlResponse),
        (status = 400, description = "No billing account yet")
    ),
    tag = "billing"
)]
pub async fn create_portal(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<BillingUrlResponse>, AppError> {
    let account = Users::find_by_id(&user.id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let customer_id = account.billing_customer_id.ok_or_else(|| {
        AppError::Validation("No billing account for this user".to_string())
    })?;

    let url = state
        .billing
        .create_portal_session(&customer_id, &format!("{}/settings", state.config.app_base_url))
        .await?;

    Ok(Json(BillingUrlResponse { url }))
}

#[utoipa::path(
    post,
    path = "/webhooks/billing",
    responses(
        (status = 200, description = "Event processed"),
        (status = 400, description = "Bad signature or malformed event")
    ),
    tag = "billing"
)]
pub async fn billing_webhook(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing webhook signature".to_string()))?;

    state.billing.verify_webhook_signature(&body, signature)?;

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {}", e)))?;

    let event_type = event["type"].as_str().unwrap_or_default();
    let object = &event["data"]["object"];

    match event_type {
        "checkout.session.completed" => {
            let user_id = object["client_reference_id"].as_str().ok_or_else(|| {
                AppError::Validation("Checkout event missing client_reference_id".to_string())
            })?;
            let customer_id = object["customer"].as_str().map(|s| s.to_string());

            let user = Users::find_by_id(user_id)
                .one(&state.db)
                .await?
                .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

            let mut active: users::ActiveModel = user.into();
            active.plan = Set("pro".to_string());
            active.billing_customer_id = Set(customer_id);
            active.update(&state.db).await?;

            tracing::info!("💳 Checkout completed for user {}", user_id);
        }
        "customer.subscription.deleted" => {
            let customer_id = object["customer"].as_str().ok_or_else(|| {
                AppError::Validation("Subscription event missing customer".to_string())
            })?;

            let user = Users::find()
                .filter(users::Column::BillingCustomerId.eq(customer_id))
                .one(&state.db)
                .await?;

            if let Some(user) = user {
                let user_id = user.id.clone();
                let mut active: users::ActiveModel = user.into();
                active.plan = Set("free".to_string());
                active.update(&state.db).await?;
                tracing::info!("💳 Subscription ended for user {}", user_id);
            } else {
                tracing::warn!("Subscription event for unknown customer {}", customer_id);
            }
        }
        other => {
            tracing::debug!("Ignoring webhook event type {}", other);
        }
    }

    Ok(StatusCode::OK)
}
