use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per analysis performed for a user. `blob_hash` is deliberately
/// NOT unique: several users scanning the same photo each get their own
/// record, linked by hash for cache lookup.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "meal_analyses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub blob_name: String,
    pub blob_hash: String,
    pub ai_response_raw: Json,
    pub total_protein: f64,
    pub total_carbs: Option<f64>,
    pub total_fat: Option<f64>,
    /// "high", "medium" or "low"
    pub confidence: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub note: Option<String>,
    #[sea_orm(unique)]
    pub share_id: String,
    pub is_public: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    Users,
    #[sea_orm(has_many = "super::food_items::Entity")]
    FoodItems,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::food_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FoodItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
