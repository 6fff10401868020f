//! End-to-end tests: refresh publishes snapshots that retrieval reads.

use std::sync::Arc;

use ragline_core::config::EmbeddingFailurePolicy;
use ragline_core::error::RaglineError;
use ragline_vector::embedding::{HashEmbedding, SharedEmbedding};
use ragline_vector::index::{FlatL2Index, VectorIndex};
use ragline_vector::refresh::{RefreshController, RefreshOutcome};
use ragline_vector::retrieval::Retriever;
use ragline_vector::snapshot::{CorpusSnapshot, SnapshotStore};
use ragline_vector::source::StaticCorpus;

const DIM: usize = 32;

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn shared_embedder() -> SharedEmbedding {
    SharedEmbedding::new(HashEmbedding::with_dimensions(DIM))
}

#[tokio::test]
async fn test_query_after_refresh_returns_documents() {
    let corpus = StaticCorpus::from_pairs([
        ("https://a.example", "Rust has a borrow checker."),
        ("https://b.example", "  Tokio   is an async runtime.\n"),
        ("https://c.example", "Serde serializes data."),
    ]);
    let store: SnapshotStore = SnapshotStore::new();
    let embedder = shared_embedder();
    let controller = RefreshController::new(
        corpus,
        embedder.clone(),
        ids(&["https://a.example", "https://b.example", "https://c.example"]),
        store.clone(),
    );
    let retriever: Retriever = Retriever::new_dyn(store, embedder);

    assert!(matches!(
        retriever.retrieve("tokio", 3).await,
        Err(RaglineError::NoSnapshot)
    ));

    assert!(controller.refresh_once().await.is_published());

    let result = retriever.retrieve("Tokio is an async runtime.", 3).await.unwrap();
    assert_eq!(result.generation, 1);
    assert_eq!(result.len(), 3);
    assert_eq!(result.documents[0].document.source_id, "https://b.example");
    assert_eq!(result.documents[0].document.normalized_text, "Tokio is an async runtime.");
    assert_eq!(result.documents[0].distance, 0.0);
}

#[tokio::test]
async fn test_failed_refresh_keeps_serving_previous_results() {
    let corpus = StaticCorpus::from_pairs([("a", "first document"), ("b", "second document")]);
    let store: SnapshotStore = SnapshotStore::new();
    let embedder = shared_embedder();
    let controller = RefreshController::new(
        corpus.clone(),
        embedder.clone(),
        ids(&["a", "b"]),
        store.clone(),
    );
    let retriever: Retriever = Retriever::new_dyn(store, embedder);

    controller.refresh_once().await;
    let before = retriever.retrieve("first document", 2).await.unwrap();

    corpus.fail_all();
    assert!(matches!(
        controller.refresh_once().await,
        RefreshOutcome::Failed { .. }
    ));

    let after = retriever.retrieve("first document", 2).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_see_whole_snapshots() {
    let corpus = StaticCorpus::from_pairs([("a", "gen text a"), ("b", "gen text b")]);
    let store: SnapshotStore = SnapshotStore::new();
    let embedder = shared_embedder();
    let controller = Arc::new(RefreshController::new(
        corpus.clone(),
        embedder.clone(),
        ids(&["a", "b", "c"]),
        store.clone(),
    ));
    controller.refresh_once().await;
    let retriever: Retriever = Retriever::new_dyn(store, embedder);

    let refresher = {
        let controller = Arc::clone(&controller);
        let corpus = corpus.clone();
        tokio::spawn(async move {
            for round in 0..20 {
                // Alternate between a two- and three-document corpus.
                if round % 2 == 0 {
                    corpus.set("c", "gen text c");
                } else {
                    corpus.fail("c");
                }
                controller.refresh_once().await;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let retriever = retriever.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let result = retriever.retrieve("gen text", 10).await.unwrap();
                // Every entry belongs to one snapshot: positions are unique
                // and within that snapshot's size.
                let mut positions = result.positions();
                positions.sort_unstable();
                positions.dedup();
                assert_eq!(positions.len(), result.len());
                assert!(result.len() == 2 || result.len() == 3);
                assert!(positions.iter().all(|&p| p < result.len()));
                tokio::task::yield_now().await;
            }
        }));
    }

    refresher.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(controller.store().generation(), 21);
}

#[tokio::test]
async fn test_abort_policy_still_drops_blank_documents() {
    let corpus = StaticCorpus::from_pairs([("a", "fine"), ("b", "fine too")]);
    let store: SnapshotStore = SnapshotStore::new();
    let controller = RefreshController::new(
        corpus.clone(),
        shared_embedder(),
        ids(&["a", "b"]),
        store.clone(),
    )
    .with_policy(EmbeddingFailurePolicy::Abort);

    controller.refresh_once().await;
    assert_eq!(store.generation(), 1);

    // Whitespace-only text is dropped before embedding, not an embedding failure.
    corpus.set("b", "   ");
    match controller.refresh_once().await {
        RefreshOutcome::Published {
            generation,
            documents,
            dropped,
        } => {
            assert_eq!(generation, 2);
            assert_eq!(documents, 1);
            assert_eq!(dropped, 1);
        }
        other => panic!("Expected publish, got {:?}", other),
    }
}

#[tokio::test]
async fn test_warm_start_from_persisted_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = StaticCorpus::from_pairs([("a", "persist me"), ("b", "and me")]);
    let store: SnapshotStore = SnapshotStore::new();
    let controller = RefreshController::new(
        corpus,
        shared_embedder(),
        ids(&["a", "b"]),
        store.clone(),
    )
    .with_persist_dir(dir.path());
    controller.refresh_once().await;
    controller.refresh_once().await;

    // A fresh process restores the snapshot instead of refetching.
    let restored: CorpusSnapshot =
        CorpusSnapshot::restore(dir.path(), DIM, &format!("hash-{}", DIM)).unwrap();
    assert_eq!(restored.generation(), 2);

    let fresh_store: SnapshotStore = SnapshotStore::new();
    fresh_store.publish(restored);
    let retriever: Retriever = Retriever::new_dyn(fresh_store.clone(), shared_embedder());
    let result = retriever.retrieve("and me", 1).await.unwrap();
    assert_eq!(result.generation, 2);
    assert_eq!(result.documents[0].document.source_id, "b");

    // The next refresh continues the generation sequence.
    let next = RefreshController::new(
        StaticCorpus::from_pairs([("a", "persist me")]),
        shared_embedder(),
        ids(&["a"]),
        fresh_store,
    );
    assert!(matches!(
        next.refresh_once().await,
        RefreshOutcome::Published { generation: 3, .. }
    ));
}

#[test]
fn test_index_load_with_wrong_dimension_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.bin");
    let vectors = (0..4)
        .map(|i| (0..384).map(|j| (i * j) as f32).collect())
        .collect();
    FlatL2Index::build(vectors).unwrap().save(&path).unwrap();

    assert!(matches!(
        FlatL2Index::load(&path, 256),
        Err(RaglineError::CorruptIndex(_))
    ));
    assert_eq!(FlatL2Index::load(&path, 384).unwrap().len(), 4);
}
