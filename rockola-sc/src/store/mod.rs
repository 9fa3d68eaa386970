//! Queue persistence
//!
//! CRUD operations for the venue queue. Every multi-statement mutation runs
//! in one sqlite transaction so cross-session writes linearize per venue;
//! this layer never merges concurrent mutations, it surfaces them as
//! `Conflict` for the caller to reload.
//!
//! Position invariant: within a venue, the pending items carry dense,
//! unique, ascending positions starting at 1. Every insertion, removal and
//! reorder renumbers inside the same transaction to restore density.

use chrono::{DateTime, Utc};
use rockola_common::model::{ItemStatus, QueueItem, Track};
use rockola_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

const COLUMNS: &str = "id, venue_id, catalog_id, title, artist, album, duration_ms, \
                       artwork_url, contributor, position, status, created_at, resolved_at";

/// Raw queue_items row
#[derive(Debug, Clone, sqlx::FromRow)]
struct QueueItemRow {
    id: String,
    venue_id: String,
    catalog_id: String,
    title: String,
    artist: String,
    album: Option<String>,
    duration_ms: i64,
    artwork_url: Option<String>,
    contributor: String,
    position: Option<i64>,
    status: String,
    created_at: String,
    resolved_at: Option<String>,
}

impl QueueItemRow {
    fn into_item(self) -> Result<QueueItem> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| Error::Internal(format!("invalid queue item id: {}", e)))?;
        let status = ItemStatus::parse(&self.status)
            .ok_or_else(|| Error::Internal(format!("invalid item status: {}", self.status)))?;
        Ok(QueueItem {
            id,
            venue_id: self.venue_id,
            track: Track {
                catalog_id: self.catalog_id,
                title: self.title,
                artist: self.artist,
                album: self.album,
                duration_ms: self.duration_ms.max(0) as u64,
                artwork_url: self.artwork_url,
            },
            contributor: self.contributor,
            position: self.position,
            status,
            created_at: parse_timestamp(&self.created_at)?,
            resolved_at: self.resolved_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp {}: {}", s, e)))
}

/// All pending items for a venue, ascending by position
pub async fn get_pending(db: &SqlitePool, venue_id: &str) -> Result<Vec<QueueItem>> {
    let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items WHERE venue_id = ? AND status = 'pending' ORDER BY position ASC",
        COLUMNS
    ))
    .bind(venue_id)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(QueueItemRow::into_item).collect()
}

/// The venue's currently playing item, if any
pub async fn get_current(db: &SqlitePool, venue_id: &str) -> Result<Option<QueueItem>> {
    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items WHERE venue_id = ? AND status = 'playing'",
        COLUMNS
    ))
    .bind(venue_id)
    .fetch_optional(db)
    .await?;
    row.map(QueueItemRow::into_item).transpose()
}

/// Played and skipped items, most recently resolved first
pub async fn get_history(db: &SqlitePool, venue_id: &str, limit: i64) -> Result<Vec<QueueItem>> {
    let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items
         WHERE venue_id = ? AND status IN ('played', 'skipped')
         ORDER BY resolved_at DESC LIMIT ?",
        COLUMNS
    ))
    .bind(venue_id)
    .bind(limit)
    .fetch_all(db)
    .await?;
    rows.into_iter().map(QueueItemRow::into_item).collect()
}

/// Fetch one item by id
pub async fn get_item(db: &SqlitePool, venue_id: &str, item_id: Uuid) -> Result<QueueItem> {
    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items WHERE venue_id = ? AND id = ?",
        COLUMNS
    ))
    .bind(venue_id)
    .bind(item_id.to_string())
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("queue item {}", item_id)))?;
    row.into_item()
}

/// Append a track to the end of the pending queue. Returns the created item.
pub async fn enqueue(
    db: &SqlitePool,
    venue_id: &str,
    track: &Track,
    contributor: &str,
) -> Result<QueueItem> {
    let mut tx = db.begin().await?;

    let max_position: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(position) FROM queue_items WHERE venue_id = ? AND status = 'pending'",
    )
    .bind(venue_id)
    .fetch_one(&mut *tx)
    .await?;
    let position = max_position.unwrap_or(0) + 1;

    let item = insert_item(&mut tx, venue_id, track, contributor, position).await?;
    tx.commit().await?;
    Ok(item)
}

/// Insert a track at position 1, shifting every other pending item down by
/// one. Used for "play this right now" insertions.
pub async fn enqueue_front(
    db: &SqlitePool,
    venue_id: &str,
    track: &Track,
    contributor: &str,
) -> Result<QueueItem> {
    let mut tx = db.begin().await?;

    sqlx::query(
        "UPDATE queue_items SET position = position + 1
         WHERE venue_id = ? AND status = 'pending'",
    )
    .bind(venue_id)
    .execute(&mut *tx)
    .await?;

    let item = insert_item(&mut tx, venue_id, track, contributor, 1).await?;
    tx.commit().await?;
    Ok(item)
}

/// Promote a pending item to playing.
///
/// Demotes any prior playing item to played in the same transaction, so at
/// most one item per venue is ever playing, then renumbers the remaining
/// pending items. Fails with `Conflict` when the item is no longer pending
/// (another session already advanced past it).
pub async fn set_current_playing(
    db: &SqlitePool,
    venue_id: &str,
    item_id: Uuid,
) -> Result<QueueItem> {
    let now = Utc::now().to_rfc3339();
    let mut tx = db.begin().await?;

    sqlx::query(
        "UPDATE queue_items SET status = 'played', position = NULL, resolved_at = ?
         WHERE venue_id = ? AND status = 'playing'",
    )
    .bind(&now)
    .bind(venue_id)
    .execute(&mut *tx)
    .await?;

    let promoted = sqlx::query(
        "UPDATE queue_items SET status = 'playing', position = NULL
         WHERE venue_id = ? AND id = ? AND status = 'pending'",
    )
    .bind(venue_id)
    .bind(item_id.to_string())
    .execute(&mut *tx)
    .await?;

    if promoted.rows_affected() == 0 {
        return Err(Error::Conflict(format!(
            "queue item {} is not pending",
            item_id
        )));
    }

    renumber_pending(&mut tx, venue_id).await?;

    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items WHERE venue_id = ? AND id = ?",
        COLUMNS
    ))
    .bind(venue_id)
    .bind(item_id.to_string())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    row.into_item()
}

/// Move the currently playing item to history with the given final status.
/// Returns the resolved item, or None when nothing was playing (another
/// session may have resolved it first; that is not an error).
pub async fn resolve_current(
    db: &SqlitePool,
    venue_id: &str,
    status: ItemStatus,
) -> Result<Option<QueueItem>> {
    debug_assert!(matches!(status, ItemStatus::Played | ItemStatus::Skipped));
    let now = Utc::now().to_rfc3339();
    let mut tx = db.begin().await?;

    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items WHERE venue_id = ? AND status = 'playing'",
        COLUMNS
    ))
    .bind(venue_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    sqlx::query(
        "UPDATE queue_items SET status = ?, resolved_at = ? WHERE id = ? AND status = 'playing'",
    )
    .bind(status.as_str())
    .bind(&now)
    .bind(&row.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    let mut item = row.into_item()?;
    item.status = status;
    item.resolved_at = Some(parse_timestamp(&now)?);
    Ok(Some(item))
}

/// Remove an item outright (operator action). Removal of the currently
/// playing item is permitted; it simply stops being tracked. Remaining
/// pending positions are renumbered to stay dense.
pub async fn remove(db: &SqlitePool, venue_id: &str, item_id: Uuid) -> Result<QueueItem> {
    let mut tx = db.begin().await?;

    let row = sqlx::query_as::<_, QueueItemRow>(&format!(
        "SELECT {} FROM queue_items WHERE venue_id = ? AND id = ?",
        COLUMNS
    ))
    .bind(venue_id)
    .bind(item_id.to_string())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound(format!("queue item {}", item_id)))?;

    sqlx::query("DELETE FROM queue_items WHERE id = ?")
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;

    if row.status == "pending" {
        renumber_pending(&mut tx, venue_id).await?;
    }

    tx.commit().await?;
    row.into_item()
}

/// Move a pending item to a new position.
///
/// Fails with `NotFound` when the item is not in pending state. The target
/// position is clamped into [1, pending count]. Returns the full re-derived
/// pending ordering; callers must use it instead of any optimistic local
/// order.
pub async fn reorder(
    db: &SqlitePool,
    venue_id: &str,
    item_id: Uuid,
    target_position: i64,
) -> Result<Vec<QueueItem>> {
    let mut tx = db.begin().await?;

    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM queue_items WHERE venue_id = ? AND id = ?")
            .bind(venue_id)
            .bind(item_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

    match status.as_deref() {
        Some("pending") => {}
        _ => {
            return Err(Error::NotFound(format!(
                "queue item {} is not in the pending queue",
                item_id
            )))
        }
    }

    let mut ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM queue_items
         WHERE venue_id = ? AND status = 'pending' ORDER BY position ASC",
    )
    .bind(venue_id)
    .fetch_all(&mut *tx)
    .await?;

    let id_string = item_id.to_string();
    let from_index = ids
        .iter()
        .position(|id| *id == id_string)
        .ok_or_else(|| Error::NotFound(format!("queue item {}", item_id)))?;
    ids.remove(from_index);

    let to_index = (target_position.max(1) as usize - 1).min(ids.len());
    ids.insert(to_index, id_string);

    for (index, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE queue_items SET position = ? WHERE id = ?")
            .bind(index as i64 + 1)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    // Re-derive the ordering from the store rather than trusting the
    // mutation we just made
    get_pending(db, venue_id).await
}

async fn insert_item(
    tx: &mut Transaction<'_, Sqlite>,
    venue_id: &str,
    track: &Track,
    contributor: &str,
    position: i64,
) -> Result<QueueItem> {
    let id = Uuid::new_v4();
    let created_at = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO queue_items (
            id, venue_id, catalog_id, title, artist, album, duration_ms,
            artwork_url, contributor, position, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(id.to_string())
    .bind(venue_id)
    .bind(&track.catalog_id)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(track.duration_ms as i64)
    .bind(&track.artwork_url)
    .bind(contributor)
    .bind(position)
    .bind(created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(QueueItem {
        id,
        venue_id: venue_id.to_string(),
        track: track.clone(),
        contributor: contributor.to_string(),
        position: Some(position),
        status: ItemStatus::Pending,
        created_at,
        resolved_at: None,
    })
}

/// Reassign positions 1..n to the venue's pending items in their current
/// order
async fn renumber_pending(tx: &mut Transaction<'_, Sqlite>, venue_id: &str) -> Result<()> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT id FROM queue_items
         WHERE venue_id = ? AND status = 'pending' ORDER BY position ASC",
    )
    .bind(venue_id)
    .fetch_all(&mut **tx)
    .await?;

    for (index, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE queue_items SET position = ? WHERE id = ?")
            .bind(index as i64 + 1)
            .bind(id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
