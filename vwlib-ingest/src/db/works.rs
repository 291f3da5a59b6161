//! Work record operations
//!
//! All mutation paths run in a transaction. Deleting a work (or rewriting
//! its associations) garbage-collects circle, tag and voice-actor rows no
//! longer referenced by any work, keeping the association tables
//! foreign-key-consistent.

use crate::memo::Memo;
use crate::scraper::{
    merge_rank_history, voice_actor_id, DynamicMetadata, RankEntry, StaticMetadata,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use vwlib_common::rcode::WorkId;
use vwlib_common::{Error, Result};

/// Stored work row (listing projection)
#[derive(Debug, Clone)]
pub struct WorkRow {
    pub id: WorkId,
    /// Root-folder alias the work was discovered under
    pub root: String,
    /// Directory relative to that root
    pub dir: String,
    pub title: String,
    pub has_lyric: bool,
}

/// True when a record with this id exists
pub async fn exists(pool: &SqlitePool, id: WorkId) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM works WHERE id = ?")
        .bind(id.raw() as i64)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// All stored works
pub async fn list(pool: &SqlitePool) -> Result<Vec<WorkRow>> {
    let rows = sqlx::query("SELECT id, root, dir, title, has_lyric FROM works ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut works = Vec::with_capacity(rows.len());
    for row in rows {
        let raw: i64 = row.get("id");
        let id = WorkId::from_raw(raw as u64)
            .map_err(|e| Error::Internal(format!("corrupt work id {raw}: {e}")))?;
        works.push(WorkRow {
            id,
            root: row.get("root"),
            dir: row.get("dir"),
            title: row.get("title"),
            has_lyric: row.get::<i64, _>("has_lyric") != 0,
        });
    }
    Ok(works)
}

/// Insert a new work with its associations.
///
/// The caller must have deduplicated upstream; an existing id fails with
/// [`Error::Duplicate`].
pub async fn insert(
    pool: &SqlitePool,
    id: WorkId,
    root: &str,
    dir: &str,
    meta: &StaticMetadata,
    dynamic: &DynamicMetadata,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let circle_id = upsert_circle(&mut tx, meta).await?;

    let insert = sqlx::query(
        r#"
        INSERT INTO works (
            id, root, dir, title, circle_id, nsfw, release,
            dl_count, price, review_count, rate_count, rate_average_2dp,
            rank_history
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.raw() as i64)
    .bind(root)
    .bind(dir)
    .bind(&meta.title)
    .bind(circle_id)
    .bind(meta.nsfw)
    .bind(&meta.release)
    .bind(dynamic.dl_count)
    .bind(dynamic.price)
    .bind(dynamic.review_count)
    .bind(dynamic.rate_count)
    .bind(dynamic.rate_average_2dp)
    .bind(rank_json(&dynamic.ranks)?)
    .execute(&mut *tx)
    .await;

    if let Err(e) = insert {
        let duplicate = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
        return Err(if duplicate {
            Error::Duplicate(id.code())
        } else {
            Error::Database(e)
        });
    }

    link_tags(&mut tx, id, &meta.tags).await?;
    link_voice_actors(&mut tx, id, &meta.voice_actors).await?;

    tx.commit().await?;
    Ok(())
}

/// Rewrite static fields and associations (full refresh)
pub async fn update_static(pool: &SqlitePool, id: WorkId, meta: &StaticMetadata) -> Result<()> {
    let mut tx = pool.begin().await?;

    let circle_id = upsert_circle(&mut tx, meta).await?;
    if circle_id.is_some() {
        sqlx::query(
            "UPDATE works SET title = ?, circle_id = ?, nsfw = ?, release = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&meta.title)
        .bind(circle_id)
        .bind(meta.nsfw)
        .bind(&meta.release)
        .bind(id.raw() as i64)
        .execute(&mut *tx)
        .await?;
    } else {
        // provider without circle knowledge: keep the stored circle
        sqlx::query(
            "UPDATE works SET title = ?, nsfw = ?, release = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&meta.title)
        .bind(meta.nsfw)
        .bind(&meta.release)
        .bind(id.raw() as i64)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM works_tags WHERE work_id = ?")
        .bind(id.raw() as i64)
        .execute(&mut *tx)
        .await?;
    link_tags(&mut tx, id, &meta.tags).await?;

    sqlx::query("DELETE FROM works_voice_actors WHERE work_id = ?")
        .bind(id.raw() as i64)
        .execute(&mut *tx)
        .await?;
    link_voice_actors(&mut tx, id, &meta.voice_actors).await?;

    collect_orphans(&mut tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Refresh sales counters and append new rank observations
pub async fn update_dynamic(pool: &SqlitePool, id: WorkId, dynamic: &DynamicMetadata) -> Result<()> {
    let mut tx = pool.begin().await?;

    let stored: String = sqlx::query("SELECT rank_history FROM works WHERE id = ?")
        .bind(id.raw() as i64)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.get("rank_history"))
        .ok_or_else(|| Error::NotFound(id.code()))?;

    let history: Vec<RankEntry> = serde_json::from_str(&stored).unwrap_or_default();
    let merged = merge_rank_history(history, &dynamic.ranks);

    sqlx::query(
        "UPDATE works SET dl_count = ?, price = ?, review_count = ?, rate_count = ?, \
         rate_average_2dp = ?, rank_history = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(dynamic.dl_count)
    .bind(dynamic.price)
    .bind(dynamic.review_count)
    .bind(dynamic.rate_count)
    .bind(dynamic.rate_average_2dp)
    .bind(rank_json(&merged)?)
    .bind(id.raw() as i64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Delete a work, its association rows, and any rows they orphaned
pub async fn delete(pool: &SqlitePool, id: WorkId) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM works WHERE id = ?")
        .bind(id.raw() as i64)
        .execute(&mut *tx)
        .await?;

    collect_orphans(&mut tx).await?;
    tx.commit().await?;
    Ok(())
}

/// Rewrite the voice-actor associations of one work
pub async fn replace_voice_actors(pool: &SqlitePool, id: WorkId, names: &[String]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM works_voice_actors WHERE work_id = ?")
        .bind(id.raw() as i64)
        .execute(&mut *tx)
        .await?;
    link_voice_actors(&mut tx, id, names).await?;
    collect_orphans(&mut tx).await?;

    tx.commit().await?;
    Ok(())
}

/// Persist the file memo blob
pub async fn set_memo(pool: &SqlitePool, id: WorkId, memo: &Memo) -> Result<()> {
    let json = serde_json::to_string(memo)
        .map_err(|e| Error::Internal(format!("memo serialization: {e}")))?;
    sqlx::query("UPDATE works SET memo = ?, has_lyric = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(json)
        .bind(memo.lyric)
        .bind(id.raw() as i64)
        .execute(pool)
        .await?;
    Ok(())
}

/// Load the stored file memo, if any
pub async fn get_memo(pool: &SqlitePool, id: WorkId) -> Result<Option<Memo>> {
    let row = sqlx::query("SELECT memo FROM works WHERE id = ?")
        .bind(id.raw() as i64)
        .fetch_optional(pool)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let json: Option<String> = row.get("memo");
    match json {
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| Error::Internal(format!("corrupt memo for {id}: {e}"))),
        None => Ok(None),
    }
}

pub async fn set_lyric_status(pool: &SqlitePool, id: WorkId, has_lyric: bool) -> Result<()> {
    sqlx::query("UPDATE works SET has_lyric = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(has_lyric)
        .bind(id.raw() as i64)
        .execute(pool)
        .await?;
    Ok(())
}

/// Tag names of one work (sorted)
pub async fn tag_names(pool: &SqlitePool, id: WorkId) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT t.name FROM tags t JOIN works_tags wt ON wt.tag_id = t.id \
         WHERE wt.work_id = ? ORDER BY t.name",
    )
    .bind(id.raw() as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get("name")).collect())
}

/// Voice-actor names of one work (sorted)
pub async fn voice_actor_names(pool: &SqlitePool, id: WorkId) -> Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT v.name FROM voice_actors v JOIN works_voice_actors wv ON wv.va_id = v.id \
         WHERE wv.work_id = ? ORDER BY v.name",
    )
    .bind(id.raw() as i64)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.get("name")).collect())
}

async fn upsert_circle(
    tx: &mut Transaction<'_, Sqlite>,
    meta: &StaticMetadata,
) -> Result<Option<i64>> {
    let Some(circle) = &meta.circle else {
        return Ok(None);
    };
    sqlx::query(
        "INSERT INTO circles (id, name) VALUES (?, ?) \
         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
    )
    .bind(circle.id)
    .bind(&circle.name)
    .execute(&mut **tx)
    .await?;
    Ok(Some(circle.id))
}

async fn link_tags(tx: &mut Transaction<'_, Sqlite>, id: WorkId, tags: &[String]) -> Result<()> {
    for tag in tags {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(tag)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            "INSERT OR IGNORE INTO works_tags (work_id, tag_id) \
             SELECT ?, id FROM tags WHERE name = ?",
        )
        .bind(id.raw() as i64)
        .bind(tag)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn link_voice_actors(
    tx: &mut Transaction<'_, Sqlite>,
    id: WorkId,
    names: &[String],
) -> Result<()> {
    for name in names {
        let va_id = voice_actor_id(name).to_string();
        sqlx::query("INSERT OR IGNORE INTO voice_actors (id, name) VALUES (?, ?)")
            .bind(&va_id)
            .bind(name.trim())
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO works_voice_actors (work_id, va_id) VALUES (?, ?)")
            .bind(id.raw() as i64)
            .bind(&va_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Remove circle/tag/voice-actor rows no work references anymore
async fn collect_orphans(tx: &mut Transaction<'_, Sqlite>) -> Result<()> {
    sqlx::query(
        "DELETE FROM circles WHERE NOT EXISTS \
         (SELECT 1 FROM works WHERE works.circle_id = circles.id)",
    )
    .execute(&mut **tx)
    .await?;
    sqlx::query(
        "DELETE FROM tags WHERE NOT EXISTS \
         (SELECT 1 FROM works_tags WHERE works_tags.tag_id = tags.id)",
    )
    .execute(&mut **tx)
    .await?;
    sqlx::query(
        "DELETE FROM voice_actors WHERE NOT EXISTS \
         (SELECT 1 FROM works_voice_actors WHERE works_voice_actors.va_id = voice_actors.id)",
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn rank_json(ranks: &[RankEntry]) -> Result<String> {
    serde_json::to_string(ranks)
        .map_err(|e| Error::Internal(format!("rank history serialization: {e}")))
}
