//! Administrative account bootstrap

use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use vwlib_common::Result;

const DEFAULT_ADMIN_NAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Ensure the default administrative account exists.
///
/// Idempotent: an already-present row is success, whatever its password.
/// Anything else is a bootstrap failure and fatal to the scan.
pub async fn ensure_default_admin(pool: &SqlitePool) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO users (name, password_digest, user_group) \
         VALUES (?, ?, 'administrator')",
    )
    .bind(DEFAULT_ADMIN_NAME)
    .bind(password_digest(DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_PASSWORD))
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        tracing::info!(name = DEFAULT_ADMIN_NAME, "Created default admin account");
    }
    Ok(())
}

fn password_digest(name: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use sqlx::Row;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let pool = memory_pool().await.unwrap();

        ensure_default_admin(&pool).await.unwrap();
        ensure_default_admin(&pool).await.unwrap();

        let rows = sqlx::query("SELECT name, password_digest, user_group FROM users")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("name"), "admin");
        assert_eq!(rows[0].get::<String, _>("user_group"), "administrator");
        // never stored in the clear
        assert_ne!(rows[0].get::<String, _>("password_digest"), "admin");
    }

    #[tokio::test]
    async fn existing_row_is_left_untouched() {
        let pool = memory_pool().await.unwrap();
        sqlx::query("INSERT INTO users (name, password_digest, user_group) VALUES ('admin', 'custom', 'administrator')")
            .execute(&pool)
            .await
            .unwrap();

        ensure_default_admin(&pool).await.unwrap();

        let digest: String = sqlx::query("SELECT password_digest FROM users WHERE name = 'admin'")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get("password_digest");
        assert_eq!(digest, "custom");
    }
}
