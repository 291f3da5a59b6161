//! Catalog database access
//!
//! SQLite-backed catalog store. The schema is created on startup with
//! `CREATE TABLE IF NOT EXISTS`; foreign keys are enforced per connection.

pub mod users;
pub mod works;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use vwlib_common::Result;

/// Open (or create) the catalog database and initialize its schema
pub async fn init_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    tracing::debug!(path = %db_path.display(), "Connecting to catalog database");
    let pool = SqlitePool::connect_with(options).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// In-memory pool for tests (single connection so state is shared)
pub async fn memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(":memory:")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create catalog tables if they don't exist
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS circles (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS works (
            id INTEGER PRIMARY KEY,
            root TEXT NOT NULL,
            dir TEXT NOT NULL,
            title TEXT NOT NULL,
            circle_id INTEGER REFERENCES circles(id),
            nsfw INTEGER NOT NULL DEFAULT 0,
            release TEXT,
            dl_count INTEGER NOT NULL DEFAULT 0,
            price INTEGER NOT NULL DEFAULT 0,
            review_count INTEGER NOT NULL DEFAULT 0,
            rate_count INTEGER NOT NULL DEFAULT 0,
            rate_average_2dp INTEGER NOT NULL DEFAULT 0,
            rank_history TEXT NOT NULL DEFAULT '[]',
            memo TEXT,
            has_lyric INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS works_tags (
            work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tags(id),
            PRIMARY KEY (work_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS voice_actors (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS works_voice_actors (
            work_id INTEGER NOT NULL REFERENCES works(id) ON DELETE CASCADE,
            va_id TEXT NOT NULL REFERENCES voice_actors(id),
            PRIMARY KEY (work_id, va_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            name TEXT PRIMARY KEY,
            password_digest TEXT NOT NULL,
            user_group TEXT NOT NULL DEFAULT 'user'
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::debug!("Catalog schema initialized");
    Ok(())
}
