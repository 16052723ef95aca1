use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::services::token::{REFRESH_TOKEN_TTL_DAYS, TokenService};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use uuid::Uuid;

/// Client metadata captured when a refresh token is issued.
#[derive(Debug, Default, Clone)]
pub struct DeviceInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Owns the persisted side of refresh tokens: storing hashes, the rotation
/// transaction, and revocation. Rows are never physically deleted.
pub struct SessionService {
    db: DatabaseConnection,
}

impl SessionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Store the hash of a freshly issued refresh token.
    pub async fn store_refresh_token(
        &self,
        user_id: &str,
        raw_token: &str,
        device: &DeviceInfo,
    ) -> Result<refresh_tokens::Model, AppError> {
        let row = refresh_tokens::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            token_hash: Set(TokenService::hash_for_storage(raw_token)),
            user_agent: Set(device.user_agent.clone()),
            ip_address: Set(device.ip_address.clone()),
            expires_at: Set(Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS)),
            revoked_at: Set(None),
            created_at: Set(Utc::now()),
        };

        Ok(row.insert(&self.db).await?)
    }

    /// Rotate a refresh token: the presented hash must belong to a live
    /// row, which is revoked and replaced by the successor inside one
    /// transaction. A crash between the two steps never leaves two live
    /// tokens on the same chain.
    pub async fn rotate_refresh_token(
        &self,
        user_id: &str,
        old_raw_token: &str,
        new_raw_token: &str,
        device: &DeviceInfo,
    ) -> Result<refresh_tokens::Model, AppError> {
        let old_hash = TokenService::hash_for_storage(old_raw_token);

        let existing = RefreshTokens::find()
            .filter(refresh_tokens::Column::TokenHash.eq(&old_hash))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

        if existing.user_id != user_id
            || existing.revoked_at.is_some()
            || existing.expires_at < Utc::now()
        {
            return Err(AppError::Unauthorized("Invalid refresh token".to_string()));
        }

        let txn = self.db.begin().await?;

        let mut revoked: refresh_tokens::ActiveModel = existing.into();
        revoked.revoked_at = Set(Some(Utc::now()));
        revoked.update(&txn).await?;

        let successor = refresh_tokens::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            token_hash: Set(TokenService::hash_for_storage(new_raw_token)),
            user_agent: Set(device.user_agent.clone()),
            ip_address: Set(device.ip_address.clone()),
            expires_at: Set(Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS)),
            revoked_at: Set(None),
            created_at: Set(Utc::now()),
        };
        let inserted = successor.insert(&txn).await?;

        txn.commit().await?;

        Ok(inserted)
    }

    /// Revoke the chain behind a presented raw token (logout). Revoking an
    /// unknown or already-revoked token is not an error.
    pub async fn revoke_by_raw_token(&self, raw_token: &str) -> Result<(), AppError> {
        let hash = TokenService::hash_for_storage(raw_token);

        let existing = RefreshTokens::find()
            .filter(refresh_tokens::Column::TokenHash.eq(&hash))
            .one(&self.db)
            .await?;

        if let Some(row) = existing
            && row.revoked_at.is_none()
        {
            let mut active: refresh_tokens::ActiveModel = row.into();
            active.revoked_at = Set(Some(Utc::now()));
            active.update(&self.db).await?;
        }

        Ok(())
    }

    /// Revoke every live token for a user (password reset).
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let result = RefreshTokens::update_many()
            .col_expr(
                refresh_tokens::Column::RevokedAt,
                sea_orm::sea_query::Expr::value(Some(Utc::now())),
            )
            .filter(refresh_tokens::Column::UserId.eq(user_id))
            .filter(refresh_tokens::Column::RevokedAt.is_null())
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
