use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

pub const USAGE_KIND_ANALYSIS: &str = "analysis";

/// Side accounting for plan limits, keyed by (user, kind, YYYY-MM).
pub struct UsageService {
    db: DatabaseConnection,
}

impl UsageService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn current_period() -> String {
        Utc::now().format("%Y-%m").to_string()
    }

    /// Record one analysis for the current period. Failures are logged and
    /// swallowed: usage accounting must never fail the primary request.
    pub async fn record_analysis(&self, user_id: &str) {
        if let Err(e) = self.increment(user_id, USAGE_KIND_ANALYSIS).await {
            tracing::error!("Failed to record usage for {}: {}", user_id, e);
        }
    }

    async fn increment(&self, user_id: &str, kind: &str) -> Result<(), AppError> {
        let period = Self::current_period();

        let existing = UsageRecords::find()
            .filter(usage_records::Column::UserId.eq(user_id))
            .filter(usage_records::Column::Kind.eq(kind))
            .filter(usage_records::Column::Period.eq(&period))
            .one(&self.db)
            .await?;

        match existing {
            Some(row) => {
                let count = row.count;
                let mut active: usage_records::ActiveModel = row.into();
                active.count = Set(count + 1);
                active.update(&self.db).await?;
            }
            None => {
                let row = usage_records::ActiveModel {
                    id: Set(Uuid::new_v4().to_string()),
                    user_id: Set(user_id.to_string()),
                    kind: Set(kind.to_string()),
                    period: Set(period),
                    count: Set(1),
                };
                row.insert(&self.db).await?;
            }
        }

        Ok(())
    }

    /// Analyses recorded for the user in the current period.
    pub async fn monthly_analysis_count(&self, user_id: &str) -> Result<i32, AppError> {
        let period = Self::current_period();

        let row = UsageRecords::find()
            .filter(usage_records::Column::UserId.eq(user_id))
            .filter(usage_records::Column::Kind.eq(USAGE_KIND_ANALYSIS))
            .filter(usage_records::Column::Period.eq(&period))
            .one(&self.db)
            .await?;

        Ok(row.map(|r| r.count).unwrap_or(0))
    }
}
