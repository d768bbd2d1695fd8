pub mod events;
pub mod models;
pub mod users;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;

const SCHEMA: &str = include_str!("../../migrations/001_initial.sql");

/// Open the calendar store and bring its schema up to date.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    tracing::debug!(database_url, "Calendar store ready");

    Ok(pool)
}

/// Apply the schema one statement at a time. Every statement is
/// `IF NOT EXISTS`, so this is safe on an existing store.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in schema_statements(SCHEMA) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// Split a schema file on `;`, dropping segments that hold only comments or
/// whitespace. A comment in front of a statement stays attached to it.
fn schema_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|segment| {
        segment.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("--")
        })
    })
}

/// In-memory store with the schema applied, for tests.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    // One connection, since every connection to `:memory:` is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .expect("Failed to enable foreign keys");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}
