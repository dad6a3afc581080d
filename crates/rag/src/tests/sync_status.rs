use super::support::*;
use crate::store::{InMemoryStore, VectorStore};
use crate::types::SyncStatus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn index(fixture: &Fixture, store: Arc<InMemoryStore>) {
    fixture
        .indexer(Arc::new(CountingEmbedder::new()), store)
        .reindex_vault(&fixture.vault, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_missing_or_unreachable_store_is_unavailable() {
    let fixture = Fixture::new();
    fixture.seed_garden();

    let service = fixture.sync_service(None);
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::Unavailable
    );

    let service = fixture.sync_service(Some(Arc::new(UnreachableStore) as Arc<dyn VectorStore>));
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::Unavailable
    );
}

#[tokio::test]
async fn test_unreachable_wins_over_local_changes() {
    let fixture = Fixture::new();
    fixture.seed_garden();
    index(&fixture, Arc::new(InMemoryStore::new())).await;
    fixture.write("new.md", "# New\n\nUnindexed.\n");

    let service = fixture.sync_service(Some(Arc::new(UnreachableStore) as Arc<dyn VectorStore>));
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::Unavailable
    );
}

#[tokio::test]
async fn test_rejected_lookup_is_out_of_sync() {
    let fixture = Fixture::new();
    fixture.seed_garden();

    let service = fixture.sync_service(Some(Arc::new(RejectingStore::default()) as Arc<dyn VectorStore>));
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::OutOfSync
    );
}

#[tokio::test]
async fn test_empty_collection_is_not_indexed() {
    let fixture = Fixture::new();
    fixture.seed_garden();

    let service = fixture.sync_service(Some(Arc::new(InMemoryStore::new()) as Arc<dyn VectorStore>));
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::NotIndexed
    );
}

#[tokio::test]
async fn test_status_follows_vault_changes() {
    let fixture = Fixture::new();
    fixture.seed_garden();
    let store = Arc::new(InMemoryStore::new());
    index(&fixture, store.clone()).await;

    let dyn_store: Arc<dyn VectorStore> = store.clone();
    let service = fixture.sync_service(Some(dyn_store));
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::Synced
    );

    fixture.write("tomatoes.md", "# Tomatoes\n\nSwitched to drip irrigation.\n");
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::OutOfSync
    );

    index(&fixture, store.clone()).await;
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::Synced
    );

    fixture.remove("basil.md");
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::OutOfSync
    );

    index(&fixture, store).await;
    assert_eq!(
        service.check_sync_status(&fixture.vault).await,
        SyncStatus::Synced
    );
}

#[tokio::test]
async fn test_check_has_no_side_effects() {
    let fixture = Fixture::new();
    fixture.seed_garden();
    let store = Arc::new(InMemoryStore::new());
    index(&fixture, store.clone()).await;
    fixture.write("new.md", "# New\n\nUnindexed.\n");

    let metadata_path = fixture
        .metadata()
        .path_for(&crate::store::collection_key(&fixture.vault));
    let before = std::fs::read(&metadata_path).unwrap();

    let service = fixture.sync_service(Some(store as Arc<dyn VectorStore>));
    for _ in 0..2 {
        assert_eq!(
            service.check_sync_status(&fixture.vault).await,
            SyncStatus::OutOfSync
        );
    }
    assert_eq!(std::fs::read(&metadata_path).unwrap(), before);
}

#[test]
fn test_diff_vault() {
    let fixture = Fixture::new();
    fixture.seed_garden();
    let service = fixture.sync_service(None);

    let mut indexed = HashMap::new();
    indexed.insert(
        "tomatoes.md".to_string(),
        crate::fs::ContentHasher::hash(
            &crate::fs::Sha256Hasher,
            b"# Tomatoes\n\nTomatoes need full sun and deep watering twice a week.\n",
        ),
    );
    indexed.insert("basil.md".to_string(), "stale".to_string());
    indexed.insert("old/archived.md".to_string(), "x".to_string());

    let diff = service.diff_vault(&fixture.vault, &indexed).unwrap();
    assert_eq!(
        diff.added.iter().collect::<Vec<_>>(),
        vec!["journal/2024-03-01.md"]
    );
    assert_eq!(diff.changed.iter().collect::<Vec<_>>(), vec!["basil.md"]);
    assert_eq!(diff.removed.iter().collect::<Vec<_>>(), vec!["old/archived.md"]);
    assert_eq!(diff.len(), 3);
}
