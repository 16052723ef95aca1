use crate::api::error::AppError;
use crate::api::middleware::auth::AuthUser;
use crate::entities::{prelude::*, *};
use crate::services::analysis_cache::AnalysisCache;
use crate::utils::validation::{validate_blob_name, validate_note};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How long the vision service gets to fetch the image.
const READ_URL_TTL_SECS: u64 = 10 * 60;

#[derive(Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub blob_name: String,
}

#[derive(Serialize, ToSchema)]
pub struct FoodItemResponse {
    pub name: String,
    pub portion: String,
    pub protein_grams: f64,
    pub carbs_grams: Option<f64>,
    pub fat_grams: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisResponse {
    pub id: String,
    pub blob_name: String,
    pub total_protein: f64,
    pub total_carbs: Option<f64>,
    pub total_fat: Option<f64>,
    pub confidence: String,
    pub note: Option<String>,
    pub share_id: String,
    pub is_public: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub foods: Vec<FoodItemResponse>,
    /// True when the result was cloned from a prior analysis instead of a
    /// fresh vision-AI call
    pub from_cache: bool,
}

async fn to_response(
    db: &sea_orm::DatabaseConnection,
    record: meal_analyses::Model,
    from_cache: bool,
) -> Result<AnalysisResponse, AppError> {
    let foods = FoodItems::find()
        .filter(food_items::Column::AnalysisId.eq(&record.id))
        .all(db)
        .await?
        .into_iter()
        .map(|i| FoodItemResponse {
            name: i.name,
            portion: i.portion,
            protein_grams: i.protein_grams,
            carbs_grams: i.carbs_grams,
            fat_grams: i.fat_grams,
        })
        .collect();

    Ok(AnalysisResponse {
        id: record.id,
        blob_name: record.blob_name,
        total_protein: record.total_protein,
        total_carbs: record.total_carbs,
        total_fat: record.total_fat,
        confidence: record.confidence,
        note: record.note,
        share_id: record.share_id,
        is_public: record.is_public,
        created_at: record.created_at,
        foods,
        from_cache,
    })
}

#[utoipa::path(
    post,
    path = "/analyses",
    request_body = AnalyzeRequest,
    responses(
        (status = 201, description = "Analysis created", body = AnalysisResponse),
        (status = 400, description = "Invalid object name"),
        (status = 403, description = "Monthly analysis limit reached")
    ),
    tag = "analyses"
)]
pub async fn analyze(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalysisResponse>), AppError> {
    validate_blob_name(&payload.blob_name).map_err(AppError::Validation)?;

    let account = Users::find_by_id(&user.id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if account.plan == "free" {
        let used = state.usage.monthly_analysis_count(&user.id).await?;
        if used >= state.config.free_monthly_limit as i32 {
            return Err(AppError::Forbidden(
                "Monthly analysis limit reached, upgrade to continue".to_string(),
            ));
        }
    }

    let digest = AnalysisCache::hash_blob_name(&payload.blob_name);

    // Read-then-act without a lock: concurrent first-time requests for the
    // same image may both call the vision service. Accepted cost.
    let mut from_cache = false;
    let record = match state.cache.lookup(&digest).await? {
        Some(source) => {
            match state
                .cache
                .create_from_cache(&user.id, &payload.blob_name, &digest, &source.id)
                .await
            {
                Ok(record) => {
                    tracing::info!("♻️  Cache hit for digest {} (source {})", digest, source.id);
                    from_cache = true;
                    record
                }
                // Source deleted between lookup and copy: fall back to a
                // fresh analysis
                Err(AppError::NotFound(_)) => {
                    tracing::warn!("Cache source {} vanished, re-analyzing", source.id);
                    analyze_fresh(&state, &user.id, &payload.blob_name, &digest).await?
                }
                Err(e) => return Err(e),
            }
        }
        None => analyze_fresh(&state, &user.id, &payload.blob_name, &digest).await?,
    };

    // Accounting only; never fails the request
    state.usage.record_analysis(&user.id).await;

    let response = to_response(&state.db, record, from_cache).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn analyze_fresh(
    state: &crate::AppState,
    user_id: &str,
    blob_name: &str,
    digest: &str,
) -> Result<meal_analyses::Model, AppError> {
    let exists = state
        .blob
        .object_exists(blob_name)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to check object: {}", e)))?;
    if !exists {
        return Err(AppError::Validation(
            "No uploaded object with that name".to_string(),
        ));
    }

    let image_url = state
        .blob
        .presigned_read_url(blob_name, READ_URL_TTL_SECS)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to presign read URL: {}", e)))?;

    // Vision errors propagate uncaught by the cache layer
    let analysis = state
        .vision
        .analyze(&image_url)
        .await
        .map_err(|e| AppError::Internal(format!("Vision analysis failed: {}", e)))?;

    state
        .cache
        .create_from_analysis(user_id, blob_name, &analysis, digest)
        .await
}

#[derive(Deserialize, ToSchema)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/analyses",
    responses(
        (status = 200, description = "The caller's analyses, newest first", body = [AnalysisResponse])
    ),
    tag = "analyses"
)]
pub async fn list_analyses(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AnalysisResponse>>, AppError> {
    let limit = query.limit.unwrap_or(50).min(200);

    let records = MealAnalyses::find()
        .filter(meal_analyses::Column::UserId.eq(&user.id))
        .order_by_desc(meal_analyses::Column::CreatedAt)
        .offset(query.offset.unwrap_or(0))
        .limit(limit)
        .all(&state.db)
        .await?;

    let mut out = Vec::with_capacity(records.len());
    for record in records {
        out.push(to_response(&state.db, record, false).await?);
    }

    Ok(Json(out))
}

async fn find_owned(
    state: &crate::AppState,
    user_id: &str,
    analysis_id: &str,
) -> Result<meal_analyses::Model, AppError> {
    let record = MealAnalyses::find_by_id(analysis_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))?;

    if record.user_id != user_id {
        return Err(AppError::Forbidden(
            "Analysis belongs to another user".to_string(),
        ));
    }

    Ok(record)
}

#[utoipa::path(
    get,
    path = "/analyses/{id}",
    responses(
        (status = 200, description = "One analysis", body = AnalysisResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such analysis")
    ),
    tag = "analyses"
)]
pub async fn get_analysis(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let record = find_owned(&state, &user.id, &id).await?;
    Ok(Json(to_response(&state.db, record, false).await?))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateAnalysisRequest {
    pub is_public: Option<bool>,
    pub note: Option<String>,
    /// User-supplied correction of the estimated total
    pub total_protein: Option<f64>,
}

#[utoipa::path(
    patch,
    path = "/analyses/{id}",
    request_body = UpdateAnalysisRequest,
    responses(
        (status = 200, description = "Analysis updated", body = AnalysisResponse),
        (status = 403, description = "Not the owner")
    ),
    tag = "analyses"
)]
pub async fn update_analysis(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateAnalysisRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let record = find_owned(&state, &user.id, &id).await?;

    if let Some(note) = &payload.note {
        validate_note(note).map_err(AppError::Validation)?;
    }
    if let Some(total) = payload.total_protein
        && !(0.0..=10_000.0).contains(&total)
    {
        return Err(AppError::Validation(
            "total_protein out of range".to_string(),
        ));
    }

    // Records are immutable apart from the privacy flag and user-supplied
    // corrections
    let mut active: meal_analyses::ActiveModel = record.into();
    if let Some(is_public) = payload.is_public {
        active.is_public = Set(is_public);
    }
    if let Some(note) = payload.note {
        active.note = Set(Some(note));
    }
    if let Some(total) = payload.total_protein {
        active.total_protein = Set(total);
    }
    let updated = active.update(&state.db).await?;

    Ok(Json(to_response(&state.db, updated, false).await?))
}

#[utoipa::path(
    delete,
    path = "/analyses/{id}",
    responses(
        (status = 204, description = "Analysis and food items deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such analysis")
    ),
    tag = "analyses"
)]
pub async fn delete_analysis(
    State(state): State<crate::AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let record = find_owned(&state, &user.id, &id).await?;

    state.cache.delete_record(&record.id).await?;

    // Best-effort blob cleanup once the last record for this object is gone
    if state.cache.lookup(&record.blob_hash).await?.is_none()
        && let Err(e) = state.blob.delete_object(&record.blob_name).await
    {
        tracing::warn!("Failed to delete blob {}: {}", record.blob_name, e);
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/shared/{share_id}",
    responses(
        (status = 200, description = "A publicly shared analysis", body = AnalysisResponse),
        (status = 404, description = "Unknown or private share id")
    ),
    tag = "analyses"
)]
pub async fn get_shared_analysis(
    State(state): State<crate::AppState>,
    Path(share_id): Path<String>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let record = MealAnalyses::find()
        .filter(meal_analyses::Column::ShareId.eq(&share_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Share not found".to_string()))?;

    // Private records look exactly like missing ones from the outside
    if !record.is_public {
        return Err(AppError::NotFound("Share not found".to_string()));
    }

    Ok(Json(to_response(&state.db, record, false).await?))
}
