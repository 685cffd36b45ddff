use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}
