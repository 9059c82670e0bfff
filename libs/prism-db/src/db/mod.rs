use anyhow::Result;
use sqlx::SqlitePool;
use std::env;

pub async fn init_db() -> Result<SqlitePool> {
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://prism.db".to_string());

    if !database_url.starts_with("sqlite:") {
        return Err(anyhow::anyhow!("DATABASE_URL must start with sqlite:"));
    }

    crate::connect(&database_url).await
}
