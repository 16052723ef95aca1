use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

const UPLOAD_URL_TTL_SECS: u64 = 15 * 60;

const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
];

#[derive(Deserialize, ToSchema)]
pub struct UploadUrlRequest {
    pub content_type: String,
}

#[derive(Serialize, ToSchema)]
pub struct UploadUrlResponse {
    /// Storage object name; pass it to POST /analyses after uploading
    pub blob_name: String,
    pub upload_url: String,
    pub expires_in: u64,
}

#[utoipa::path(
    post,
    path = "/uploads",
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Presigned upload URL issued", body = UploadUrlResponse),
        (status = 400, description = "Unsupported content type")
    ),
    tag = "uploads"
)]
pub async fn create_upload_url(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let extension = ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(ct, _)| *ct == payload.content_type)
        .map(|(_, ext)| *ext)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Unsupported content type: {}",
                payload.content_type
            ))
        })?;

    let blob_name = format!("meals/{}/{}.{}", user.id, Uuid::new_v4(), extension);

    let upload_url = state
        .blob
        .presigned_upload_url(&blob_name, &payload.content_type, UPLOAD_URL_TTL_SECS)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to presign upload URL: {}", e)))?;

    Ok(Json(UploadUrlResponse {
        blob_name,
        upload_url,
        expires_in: UPLOAD_URL_TTL_SECS,
    }))
}
