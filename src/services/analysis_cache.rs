use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::vision::{FoodEstimate, MealAnalysis};
use crate::utils::hash::calculate_hash;
use base64::Engine;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

/// Avoids redundant vision-AI calls when the same storage object has
/// already been analyzed. Records are linked by a digest of the storage
/// object *name*; lookup returns the most recent match.
///
/// There is no locking across lookup-then-create: concurrent requests for
/// a never-before-seen image may both miss and both call the AI service.
/// Each still produces a valid, independently-owned record.
pub struct AnalysisCache {
    db: DatabaseConnection,
}

impl AnalysisCache {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Deterministic digest of a storage object name.
    pub fn hash_blob_name(blob_name: &str) -> String {
        calculate_hash(blob_name.as_bytes())
    }

    /// URL-safe random token for public share links
    pub fn generate_share_id() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..24).map(|_| rng.r#gen()).collect();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Most recently created record matching the digest. A miss is the
    /// normal "no entry" branch, not an error.
    pub async fn lookup(&self, digest: &str) -> Result<Option<meal_analyses::Model>, AppError> {
        let record = MealAnalyses::find()
            .filter(meal_analyses::Column::BlobHash.eq(digest))
            .order_by_desc(meal_analyses::Column::CreatedAt)
            .one(&self.db)
            .await?;

        Ok(record)
    }

    /// Persist a fresh AI analysis together with its food line items.
    pub async fn create_from_analysis(
        &self,
        user_id: &str,
        blob_name: &str,
        analysis: &MealAnalysis,
        digest: &str,
    ) -> Result<meal_analyses::Model, AppError> {
        let raw = serde_json::to_value(analysis)
            .map_err(|e| AppError::Internal(format!("Failed to serialize AI response: {}", e)))?;

        let items: Vec<FoodEstimate> = analysis.foods.clone();
        let total_carbs = sum_optional(items.iter().map(|f| f.carbs_grams));
        let total_fat = sum_optional(items.iter().map(|f| f.fat_grams));

        self.insert_record(
            user_id,
            blob_name,
            digest,
            raw,
            analysis.total_protein,
            total_carbs,
            total_fat,
            normalize_confidence(&analysis.confidence),
            analysis.notes.clone(),
            items,
        )
        .await
    }

    /// Clone a prior record (payload, totals, confidence, food items) into
    /// a new record owned by the requesting user.
    ///
    /// Fails with NotFound if the source was deleted between lookup and
    /// copy; the caller falls back to the cache-miss branch.
    pub async fn create_from_cache(
        &self,
        user_id: &str,
        blob_name: &str,
        digest: &str,
        source_record_id: &str,
    ) -> Result<meal_analyses::Model, AppError> {
        let source = MealAnalyses::find_by_id(source_record_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Source analysis no longer exists".to_string()))?;

        let items: Vec<FoodEstimate> = FoodItems::find()
            .filter(food_items::Column::AnalysisId.eq(&source.id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|i| FoodEstimate {
                name: i.name,
                portion: i.portion,
                protein_grams: i.protein_grams,
                carbs_grams: i.carbs_grams,
                fat_grams: i.fat_grams,
            })
            .collect();

        self.insert_record(
            user_id,
            blob_name,
            digest,
            source.ai_response_raw.clone(),
            source.total_protein,
            source.total_carbs,
            source.total_fat,
            source.confidence.clone(),
            source.note.clone(),
            items,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_record(
        &self,
        user_id: &str,
        blob_name: &str,
        digest: &str,
        raw: serde_json::Value,
        total_protein: f64,
        total_carbs: Option<f64>,
        total_fat: Option<f64>,
        confidence: String,
        note: Option<String>,
        items: Vec<FoodEstimate>,
    ) -> Result<meal_analyses::Model, AppError> {
        let id = Uuid::new_v4().to_string();

        let record = meal_analyses::ActiveModel {
            id: Set(id.clone()),
            user_id: Set(user_id.to_string()),
            blob_name: Set(blob_name.to_string()),
            blob_hash: Set(digest.to_string()),
            ai_response_raw: Set(raw),
            total_protein: Set(total_protein),
            total_carbs: Set(total_carbs),
            total_fat: Set(total_fat),
            confidence: Set(confidence),
            note: Set(note),
            share_id: Set(Self::generate_share_id()),
            is_public: Set(true),
            created_at: Set(Utc::now()),
        };

        // Record and line items land together or not at all
        let txn = self.db.begin().await?;

        let inserted = record.insert(&txn).await?;

        for item in items {
            let food = food_items::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                analysis_id: Set(id.clone()),
                name: Set(item.name),
                portion: Set(item.portion),
                protein_grams: Set(item.protein_grams),
                carbs_grams: Set(item.carbs_grams),
                fat_grams: Set(item.fat_grams),
            };
            food.insert(&txn).await?;
        }

        txn.commit().await?;

        Ok(inserted)
    }

    /// Delete a record and its food line items in one transaction.
    pub async fn delete_record(&self, record_id: &str) -> Result<(), AppError> {
        let txn = self.db.begin().await?;

        FoodItems::delete_many()
            .filter(food_items::Column::AnalysisId.eq(record_id))
            .exec(&txn)
            .await?;

        MealAnalyses::delete_by_id(record_id).exec(&txn).await?;

        txn.commit().await?;
        Ok(())
    }
}

fn sum_optional(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let mut total = None;
    for v in values.flatten() {
        total = Some(total.unwrap_or(0.0) + v);
    }
    total
}

fn normalize_confidence(confidence: &str) -> String {
    match confidence.to_lowercase().as_str() {
        "high" => "high".to_string(),
        "medium" => "medium".to_string(),
        _ => "low".to_string(),
    }
}
