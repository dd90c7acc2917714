//! SQLite-backed implementation of `PlaylistStateStore`.
//!
//! One row per playlist; the two persisted aggregates (per-pool assignment
//! maps and the pruned identity list) are stored as JSON columns, since
//! they are opaque to every component except the scheduler itself.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::PlaylistStateStore;
use crate::model::{PlaylistAbState, PlaylistId};

pub struct SqlitePlaylistStateStore {
    pool: SqlitePool,
}

impl SqlitePlaylistStateStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and ensure the schema exists.
    pub async fn new(path: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(path).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS playlist_ab_state (
                playlist_id TEXT PRIMARY KEY,
                assignments_json TEXT NOT NULL,
                identities_json TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PlaylistStateStore for SqlitePlaylistStateStore {
    async fn load(&self, playlist_id: PlaylistId) -> anyhow::Result<Option<PlaylistAbState>> {
        let row = sqlx::query(
            "SELECT assignments_json, identities_json FROM playlist_ab_state WHERE playlist_id = ?",
        )
        .bind(playlist_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let assignments_json: String = row.get("assignments_json");
        let identities_json: String = row.get("identities_json");

        let state = PlaylistAbState {
            assignments: serde_json::from_str(&assignments_json).map_err(|e| {
                anyhow::anyhow!("invalid assignments JSON for playlist {playlist_id}: {e}")
            })?,
            identities: serde_json::from_str(&identities_json).map_err(|e| {
                anyhow::anyhow!("invalid identities JSON for playlist {playlist_id}: {e}")
            })?,
        };

        Ok(Some(state))
    }

    /// Upsert: a new playlist is inserted, an existing one fully replaced.
    async fn save(&self, playlist_id: PlaylistId, state: &PlaylistAbState) -> anyhow::Result<()> {
        let assignments_json = serde_json::to_string(&state.assignments)?;
        let identities_json = serde_json::to_string(&state.identities)?;
        let updated_at_ms = chrono::Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO playlist_ab_state (
                playlist_id, assignments_json, identities_json, updated_at_ms
            )
            VALUES (?, ?, ?, ?)
            ON CONFLICT(playlist_id) DO UPDATE SET
                assignments_json = excluded.assignments_json,
                identities_json = excluded.identities_json,
                updated_at_ms = excluded.updated_at_ms;
        "#,
        )
        .bind(playlist_id.to_string())
        .bind(assignments_json)
        .bind(identities_json)
        .bind(updated_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, playlist_id: PlaylistId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM playlist_ab_state WHERE playlist_id = ?")
            .bind(playlist_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
