use sqlx::SqlitePool;
use uuid::Uuid;

use session::model::{PlaylistAbState, PoolAssignments, SessionAssignment, SessionIdentity};
use session::store::PlaylistStateStore;
use session::store::sqlite_store::SqlitePlaylistStateStore;
use timeline::types::PlayerId;

async fn setup_store(pool: SqlitePool) -> anyhow::Result<SqlitePlaylistStateStore> {
    let store = SqlitePlaylistStateStore::from_pool(pool);
    store.ensure_schema().await?;
    Ok(store)
}

fn sample_state() -> PlaylistAbState {
    let session_id = Uuid::new_v4();
    let mut assignments = PoolAssignments::new();
    assignments.insert(
        session_id,
        SessionAssignment {
            session_id,
            player_id: PlayerId::Index(2),
            lookahead: false,
        },
    );

    let mut state = PlaylistAbState::default();
    state.assignments.insert("players".to_owned(), assignments);
    state.identities.push(SessionIdentity {
        id: session_id,
        name: "players_main".to_owned(),
        infinite_instance_id: None,
        part_instance_ids: vec![Uuid::new_v4()],
        lookahead_for_part_id: None,
        touched: 0,
    });
    state
}

#[sqlx::test]
async fn load_of_an_unknown_playlist_is_none(pool: SqlitePool) -> anyhow::Result<()> {
    let store = setup_store(pool).await?;
    assert!(store.load(Uuid::new_v4()).await?.is_none());
    Ok(())
}

#[sqlx::test]
async fn save_then_load_round_trips(pool: SqlitePool) -> anyhow::Result<()> {
    let store = setup_store(pool).await?;
    let playlist_id = Uuid::new_v4();
    let state = sample_state();

    store.save(playlist_id, &state).await?;
    let loaded = store.load(playlist_id).await?.unwrap();

    assert_eq!(loaded.identities.len(), 1);
    assert_eq!(loaded.identities[0].name, "players_main");
    let pool_assignments = &loaded.assignments["players"];
    let assignment = pool_assignments.values().next().unwrap();
    assert_eq!(assignment.player_id, PlayerId::Index(2));
    Ok(())
}

#[sqlx::test]
async fn saving_again_replaces_the_whole_document(pool: SqlitePool) -> anyhow::Result<()> {
    let store = setup_store(pool).await?;
    let playlist_id = Uuid::new_v4();

    store.save(playlist_id, &sample_state()).await?;
    store.save(playlist_id, &PlaylistAbState::default()).await?;

    let loaded = store.load(playlist_id).await?.unwrap();
    assert!(loaded.assignments.is_empty());
    assert!(loaded.identities.is_empty());
    Ok(())
}

#[sqlx::test]
async fn delete_removes_the_playlist_state(pool: SqlitePool) -> anyhow::Result<()> {
    let store = setup_store(pool).await?;
    let playlist_id = Uuid::new_v4();

    store.save(playlist_id, &sample_state()).await?;
    store.delete(playlist_id).await?;

    assert!(store.load(playlist_id).await?.is_none());
    Ok(())
}

#[sqlx::test]
async fn playlists_do_not_leak_into_each_other(pool: SqlitePool) -> anyhow::Result<()> {
    let store = setup_store(pool).await?;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    store.save(first, &sample_state()).await?;
    store.save(second, &PlaylistAbState::default()).await?;

    assert_eq!(store.load(first).await?.unwrap().identities.len(), 1);
    assert!(store.load(second).await?.unwrap().identities.is_empty());
    Ok(())
}
