use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "food_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub analysis_id: String,
    pub name: String,
    pub portion: String,
    pub protein_grams: f64,
    pub carbs_grams: Option<f64>,
    pub fat_grams: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::meal_analyses::Entity",
        from = "Column::AnalysisId",
        to = "super::meal_analyses::Column::Id"
    )]
    MealAnalyses,
}

impl Related<super::meal_analyses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MealAnalyses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
