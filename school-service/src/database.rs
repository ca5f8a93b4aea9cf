//! Database connection pool management

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};

const CREATE_TEACHERS: &str = "CREATE TABLE IF NOT EXISTS teachers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    class TEXT NOT NULL,
    subject TEXT NOT NULL
)";

/// Create a SQLite connection pool with retry logic and ensure the schema exists
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let pool = create_pool_with_retries(config, config.max_retries).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Create the `teachers` table if it is missing
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_TEACHERS)
        .execute(pool)
        .await
        .map_err(|e| Error::Database(DatabaseError::from(e).during(DatabaseOperation::Migration)))?;
    Ok(())
}

/// Uses exponential backoff strategy for retries
async fn create_pool_with_retries(config: &DatabaseConfig, max_retries: u32) -> Result<SqlitePool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                if attempt > 0 {
                    tracing::info!(
                        "Database connection established after {} attempt(s)",
                        attempt + 1
                    );
                } else {
                    tracing::info!(
                        "Database connection pool created: max={}",
                        config.max_connections
                    );
                }
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.pow(attempt.saturating_sub(1));

                tracing::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            Error::Database(DatabaseError::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::Configuration,
                format!("invalid database url '{}': {}", config.url, e),
            ))
        })?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(config.connection_timeout_secs));

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect_with(options)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::new(
                DatabaseOperation::Connect,
                DatabaseErrorKind::ConnectionFailed,
                format!("{}: {}", categorize_db_error(&e), e),
            ))
        })
}

/// Categorize database error for better operator guidance
fn categorize_db_error(err: &sqlx::Error) -> &'static str {
    use sqlx::Error;
    match err {
        Error::Configuration(_) => "Configuration error",
        Error::Database(_) => "Database query error",
        Error::Io(_) => "I/O error - check the database file path and permissions",
        Error::PoolTimedOut => "Connection pool timeout - database may be locked",
        Error::PoolClosed => "Connection pool closed",
        Error::WorkerCrashed => "Database worker crashed",
        _ => "Connection error",
    }
}

/// Single-connection in-memory pool with the schema applied
///
/// One connection that never expires, so every query sees the same database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
