pub mod prelude;

pub mod food_items;
pub mod meal_analyses;
pub mod one_time_tokens;
pub mod refresh_tokens;
pub mod usage_records;
pub mod users;
