pub use super::food_items::Entity as FoodItems;
pub use super::meal_analyses::Entity as MealAnalyses;
pub use super::one_time_tokens::Entity as OneTimeTokens;
pub use super::refresh_tokens::Entity as RefreshTokens;
pub use super::usage_records::Entity as UsageRecords;
pub use super::users::Entity as Users;
