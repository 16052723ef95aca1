use crate::entities::{
    food_items, meal_analyses, one_time_tokens, refresh_tokens, usage_records, users,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm::{ConnectionTrait, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    // Order matters for foreign keys: users first
    let stmts = vec![
        (
            "users",
            schema
                .create_table_from_entity(users::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "refresh_tokens",
            schema
                .create_table_from_entity(refresh_tokens::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "one_time_tokens",
            schema
                .create_table_from_entity(one_time_tokens::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "meal_analyses",
            schema
                .create_table_from_entity(meal_analyses::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "food_items",
            schema
                .create_table_from_entity(food_items::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "usage_records",
            schema
                .create_table_from_entity(usage_records::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        let stmt = builder.build(&stmt);
        match db.execute(stmt).await {
            Ok(_) => info!("   - Table '{}' checked/created", name),
            Err(e) => tracing::warn!("   - Failed to create table '{}': {}", name, e),
        }
    }

    info!("🔄 Checking for indexes...");

    // blob_hash is intentionally non-unique: several users may hold records
    // for the same photo, and cache lookup takes the most recent one.
    let index_statements = vec![
        "CREATE INDEX IF NOT EXISTS idx_meal_analyses_blob_hash ON meal_analyses(blob_hash)",
        "CREATE INDEX IF NOT EXISTS idx_meal_analyses_user_id ON meal_analyses(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_meal_analyses_created_at ON meal_analyses(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_food_items_analysis_id ON food_items(analysis_id)",
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_usage_records_user_period ON usage_records(user_id, kind, period)",
    ];

    for query in index_statements {
        match db
            .execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await
        {
            Ok(_) => info!("   - Executed: {}", query),
            Err(e) => {
                let err_msg = e.to_string().to_lowercase();
                if err_msg.contains("already exists") {
                    info!("   - Index already present (skipped): {}", query);
                } else {
                    tracing::warn!("   - Index creation warning: {} -> {}", query, e);
                }
            }
        }
    }

    Ok(())
}
