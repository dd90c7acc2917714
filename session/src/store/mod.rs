pub mod sqlite_store;

use crate::model::{PlaylistAbState, PlaylistId};

/// Durable storage for the scheduler's per-playlist state. The state is
/// owned exclusively by the running pass and handed back atomically at the
/// end; the store only has to provide whole-document load/save.
#[async_trait::async_trait]
pub trait PlaylistStateStore: Send + Sync {
    async fn load(&self, playlist_id: PlaylistId) -> anyhow::Result<Option<PlaylistAbState>>;
    async fn save(&self, playlist_id: PlaylistId, state: &PlaylistAbState) -> anyhow::Result<()>;
    async fn delete(&self, playlist_id: PlaylistId) -> anyhow::Result<()>;
}
