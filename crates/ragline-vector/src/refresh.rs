//! Background corpus refresh.
//!
//! The RefreshController re-ingests the corpus on a timer (or on demand),
//! builds a complete new snapshot off to the side and publishes it in one
//! step. Queries keep running against whatever snapshot they captured.
//!
//! A failed cycle leaves the published snapshot alone and waits for the next
//! tick; it never retries immediately.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use ragline_core::config::EmbeddingFailurePolicy;
use ragline_core::error::{RaglineError, Result};
use ragline_core::types::{Document, EmbeddingVector};

use crate::embedding::EmbeddingService;
use crate::index::{FlatL2Index, VectorIndex};
use crate::normalize::normalize_document;
use crate::snapshot::{CorpusSnapshot, SnapshotStore};
use crate::source::CorpusSource;

/// Shortest interval `run` accepts; smaller values are raised to it.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Whether a refresh cycle is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// What a single call to [`RefreshController::refresh_once`] did.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A new snapshot is live.
    Published {
        generation: u64,
        documents: usize,
        /// Identifiers that failed to fetch, normalized to nothing, or failed to embed.
        dropped: usize,
    },
    /// The cycle failed; the previous snapshot is still published.
    Failed { error: RaglineError },
    /// Another cycle was already running.
    Skipped,
}

impl RefreshOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, RefreshOutcome::Published { .. })
    }
}

/// Cloneable handle for nudging or stopping a running controller.
#[derive(Debug, Clone)]
pub struct RefreshHandle {
    trigger: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl RefreshHandle {
    /// Ask for a refresh now instead of waiting for the timer.
    ///
    /// Triggers received while a cycle is running collapse into one
    /// follow-up cycle that starts after the current one finishes. Direct
    /// [`RefreshController::refresh_once`] calls made during a cycle return
    /// [`RefreshOutcome::Skipped`] instead.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the controller loop after the current cycle.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Clears the running flag when a cycle ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically rebuilds and publishes corpus snapshots.
pub struct RefreshController<S, E, I = FlatL2Index> {
    source: S,
    embedder: E,
    identifiers: Vec<String>,
    store: SnapshotStore<I>,
    policy: EmbeddingFailurePolicy,
    persist_dir: Option<PathBuf>,
    running: AtomicBool,
    trigger: Arc<Notify>,
    shutdown: Arc<Notify>,
}

impl<S, E, I> RefreshController<S, E, I>
where
    S: CorpusSource,
    E: EmbeddingService,
    I: VectorIndex + 'static,
{
    /// Create a controller that publishes into `store`.
    ///
    /// Defaults: embedding failures skip the document, nothing is persisted.
    pub fn new(source: S, embedder: E, identifiers: Vec<String>, store: SnapshotStore<I>) -> Self {
        Self {
            source,
            embedder,
            identifiers,
            store,
            policy: EmbeddingFailurePolicy::Skip,
            persist_dir: None,
            running: AtomicBool::new(false),
            trigger: Arc::new(Notify::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_policy(mut self, policy: EmbeddingFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Persist every published snapshot into `dir`.
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    pub fn handle(&self) -> RefreshHandle {
        RefreshHandle {
            trigger: Arc::clone(&self.trigger),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    pub fn store(&self) -> &SnapshotStore<I> {
        &self.store
    }

    pub fn state(&self) -> RefreshState {
        if self.running.load(Ordering::Acquire) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Run refresh cycles until [`RefreshHandle::shutdown`] is called.
    ///
    /// The first scheduled cycle fires one full `interval` after start, so
    /// callers that need a snapshot immediately should call
    /// [`refresh_once`](Self::refresh_once) first. Intervals shorter than
    /// [`MIN_REFRESH_INTERVAL`] are raised to it.
    pub async fn run(&self, interval: Duration) {
        if interval < MIN_REFRESH_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Refresh interval too short, using the minimum"
            );
        }
        let interval = interval.max(MIN_REFRESH_INTERVAL);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = interval.as_secs(), "Refresh loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Scheduled refresh");
                }
                _ = self.trigger.notified() => {
                    debug!("Manual refresh triggered");
                }
                _ = self.shutdown.notified() => {
                    info!("Refresh loop stopped");
                    return;
                }
            }

            // Outcomes are logged inside refresh_once.
            let _ = self.refresh_once().await;
        }
    }

    /// Run one refresh cycle now, unless one is already running.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let started = Instant::now();
        let generation = self.store.generation() + 1;
        info!(
            generation,
            identifiers = self.identifiers.len(),
            "Refreshing corpus"
        );

        let (snapshot, dropped) = match self.build_snapshot(generation).await {
            Ok(built) => built,
            Err(e) => {
                error!(
                    generation,
                    error = %e,
                    "Refresh failed, keeping previously published snapshot"
                );
                return RefreshOutcome::Failed { error: e };
            }
        };

        let documents = snapshot.len();
        let published = self.store.publish(snapshot);
        info!(
            generation,
            documents,
            dropped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Snapshot published"
        );

        if let Some(dir) = self.persist_dir.clone() {
            let persisted =
                tokio::task::spawn_blocking(move || published.persist(&dir)).await;
            match persisted {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(generation, error = %e, "Failed to persist snapshot"),
                Err(e) => warn!(generation, error = %e, "Persist task panicked"),
            }
        }

        RefreshOutcome::Published {
            generation,
            documents,
            dropped,
        }
    }

    /// Fetch, normalize, embed and index the whole corpus.
    async fn build_snapshot(&self, generation: u64) -> Result<(CorpusSnapshot<I>, usize)> {
        let fetched = self.source.fetch_all(&self.identifiers).await;

        let mut dropped = 0;
        let mut documents = Vec::with_capacity(fetched.len());
        for (identifier, result) in fetched {
            match result {
                Ok(raw_text) => match normalize_document(&identifier, raw_text) {
                    Some(document) => documents.push(document),
                    None => {
                        debug!(identifier = %identifier, "Dropping document with no text");
                        dropped += 1;
                    }
                },
                Err(e) => {
                    warn!(identifier = %identifier, error = %e, "Fetch failed, dropping document");
                    dropped += 1;
                }
            }
        }

        if documents.is_empty() {
            return Err(RaglineError::EmptyCorpus);
        }

        let (documents, vectors) = self.embed_documents(documents, &mut dropped).await?;

        let dimension = self.embedder.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RaglineError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let index = I::build(vectors)?;
        let snapshot = CorpusSnapshot::new(documents, index, generation, self.embedder.model_id())?;
        Ok((snapshot, dropped))
    }

    /// Embed documents according to the failure policy.
    ///
    /// Returned documents and vectors are position-aligned.
    async fn embed_documents(
        &self,
        documents: Vec<Document>,
        dropped: &mut usize,
    ) -> Result<(Vec<Document>, Vec<EmbeddingVector>)> {
        match self.policy {
            EmbeddingFailurePolicy::Abort => {
                let texts: Vec<String> = documents
                    .iter()
                    .map(|d| d.normalized_text.clone())
                    .collect();
                let vectors = self.embedder.embed_many(&texts).await?;
                Ok((documents, vectors))
            }
            EmbeddingFailurePolicy::Skip => {
                let mut kept = Vec::with_capacity(documents.len());
                let mut vectors = Vec::with_capacity(documents.len());
                for document in documents {
                    match self.embedder.embed_one(&document.normalized_text).await {
                        Ok(vector) => {
                            kept.push(document);
                            vectors.push(vector);
                        }
                        Err(e @ RaglineError::Embedding { .. }) => {
                            warn!(
                                identifier = %document.source_id,
                                error = %e,
                                "Embedding failed, dropping document"
                            );
                            *dropped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok((kept, vectors))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::source::StaticCorpus;

    /// Embedder that fails for any text containing a marker word.
    struct FlakyEmbedding {
        inner: HashEmbedding,
        poison: &'static str,
    }

    impl EmbeddingService for FlakyEmbedding {
        async fn embed_one(&self, text: &str) -> Result<EmbeddingVector> {
            if text.contains(self.poison) {
                return Err(RaglineError::embedding(text, "model rejected input"));
            }
            self.inner.embed_one(text).await
        }

        fn dimensions(&self) -> usize {
            EmbeddingService::dimensions(&self.inner)
        }

        fn model_id(&self) -> &str {
            EmbeddingService::model_id(&self.inner)
        }
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn controller(
        corpus: StaticCorpus,
        names: &[&str],
    ) -> RefreshController<StaticCorpus, HashEmbedding> {
        RefreshController::new(
            corpus,
            HashEmbedding::with_dimensions(16),
            ids(names),
            SnapshotStore::new(),
        )
    }

    #[tokio::test]
    async fn test_refresh_publishes_first_generation() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha text"), ("b", "beta text")]);
        let ctl = controller(corpus, &["a", "b"]);

        let outcome = ctl.refresh_once().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Published {
                generation: 1,
                documents: 2,
                dropped: 0
            }
        ));

        let snap = ctl.store().current().unwrap();
        assert_eq!(snap.generation(), 1);
        assert_eq!(snap.documents()[0].source_id, "a");
        assert_eq!(snap.documents()[1].source_id, "b");
        assert_eq!(snap.model_id(), "hash-16");
        assert_eq!(ctl.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_generations_increase() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha")]);
        let ctl = controller(corpus, &["a"]);

        ctl.refresh_once().await;
        ctl.refresh_once().await;
        let outcome = ctl.refresh_once().await;

        assert!(matches!(outcome, RefreshOutcome::Published { generation: 3, .. }));
        assert_eq!(ctl.store().generation(), 3);
    }

    #[tokio::test]
    async fn test_fetch_failures_and_empty_text_are_dropped() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha"), ("b", "  \n "), ("c", "gamma")]);
        corpus.fail("c");
        let ctl = controller(corpus, &["a", "b", "c", "unknown"]);

        let outcome = ctl.refresh_once().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Published {
                documents: 1,
                dropped: 3,
                ..
            }
        ));
        let snap = ctl.store().current().unwrap();
        assert_eq!(snap.documents()[0].normalized_text, "alpha");
        assert_eq!(snap.index().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha"), ("b", "beta")]);
        let ctl = controller(corpus.clone(), &["a", "b"]);
        assert!(ctl.refresh_once().await.is_published());

        corpus.fail_all();
        let outcome = ctl.refresh_once().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed {
                error: RaglineError::EmptyCorpus
            }
        ));

        let snap = ctl.store().current().unwrap();
        assert_eq!(snap.generation(), 1);
        assert_eq!(snap.len(), 2);
        assert_eq!(ctl.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_empty_identifier_list_fails_cycle() {
        let ctl = controller(StaticCorpus::new(), &[]);
        let outcome = ctl.refresh_once().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Failed {
                error: RaglineError::EmptyCorpus
            }
        ));
        assert!(ctl.store().current().is_none());
    }

    #[tokio::test]
    async fn test_skip_policy_drops_failing_document() {
        let corpus = StaticCorpus::from_pairs([
            ("a", "keep me"),
            ("b", "poison pill"),
            ("c", "keep me too"),
        ]);
        let ctl = RefreshController::new(
            corpus,
            FlakyEmbedding {
                inner: HashEmbedding::with_dimensions(8),
                poison: "poison",
            },
            ids(&["a", "b", "c"]),
            SnapshotStore::<FlatL2Index>::new(),
        );

        let outcome = ctl.refresh_once().await;
        assert!(matches!(
            outcome,
            RefreshOutcome::Published {
                documents: 2,
                dropped: 1,
                ..
            }
        ));

        let snap = ctl.store().current().unwrap();
        let ids: Vec<&str> = snap.documents().iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(snap.index().len(), 2);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_cycle() {
        let corpus = StaticCorpus::from_pairs([("a", "keep me"), ("b", "poison pill")]);
        let ctl = RefreshController::new(
            corpus,
            FlakyEmbedding {
                inner: HashEmbedding::with_dimensions(8),
                poison: "poison",
            },
            ids(&["a", "b"]),
            SnapshotStore::<FlatL2Index>::new(),
        )
        .with_policy(EmbeddingFailurePolicy::Abort);

        match ctl.refresh_once().await {
            RefreshOutcome::Failed {
                error: RaglineError::Embedding { text, .. },
            } => assert_eq!(text, "poison pill"),
            other => panic!("Expected embedding failure, got {:?}", other),
        }
        assert!(ctl.store().current().is_none());
    }

    #[tokio::test]
    async fn test_skip_policy_all_failing_is_empty_corpus() {
        let corpus = StaticCorpus::from_pairs([("a", "poison one"), ("b", "poison two")]);
        let ctl = RefreshController::new(
            corpus,
            FlakyEmbedding {
                inner: HashEmbedding::with_dimensions(8),
                poison: "poison",
            },
            ids(&["a", "b"]),
            SnapshotStore::<FlatL2Index>::new(),
        );

        assert!(matches!(
            ctl.refresh_once().await,
            RefreshOutcome::Failed {
                error: RaglineError::EmptyCorpus
            }
        ));
    }

    #[tokio::test]
    async fn test_refresh_persists_after_publish() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = StaticCorpus::from_pairs([("a", "alpha"), ("b", "beta")]);
        let ctl = controller(corpus, &["a", "b"]).with_persist_dir(dir.path());

        assert!(ctl.refresh_once().await.is_published());

        let restored: CorpusSnapshot = CorpusSnapshot::restore(dir.path(), 16, "hash-16").unwrap();
        let published = ctl.store().current().unwrap();
        assert_eq!(restored.generation(), 1);
        assert_eq!(restored.documents(), published.documents());
        assert_eq!(restored.index(), published.index());
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let corpus = StaticCorpus::from_pairs([("a", "alpha")]);
        let ctl = controller(corpus, &["a"]).with_persist_dir(blocker.join("data"));

        assert!(ctl.refresh_once().await.is_published());
        assert_eq!(ctl.store().generation(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_skipped() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha")]);
        let ctl = controller(corpus, &["a"]);

        ctl.running.store(true, Ordering::Release);
        assert_eq!(ctl.state(), RefreshState::Refreshing);
        assert!(matches!(ctl.refresh_once().await, RefreshOutcome::Skipped));
        assert!(ctl.store().current().is_none());

        ctl.running.store(false, Ordering::Release);
        assert!(ctl.refresh_once().await.is_published());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_refreshes_on_trigger_and_timer() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha")]);
        let ctl = Arc::new(controller(corpus, &["a"]));
        let handle = ctl.handle();
        let mut rx = ctl.store().subscribe();

        let runner = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move { ctl.run(Duration::from_secs(3600)).await })
        };

        handle.trigger();
        rx.changed().await.unwrap();
        assert_eq!(ctl.store().generation(), 1);

        // Paused time auto-advances to the next timer deadline.
        rx.changed().await.unwrap();
        assert_eq!(ctl.store().generation(), 2);

        handle.shutdown();
        runner.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_raises_zero_interval_to_minimum() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha")]);
        let ctl = Arc::new(controller(corpus, &["a"]));
        let handle = ctl.handle();
        let mut rx = ctl.store().subscribe();

        let started = tokio::time::Instant::now();
        let runner = {
            let ctl = Arc::clone(&ctl);
            tokio::spawn(async move { ctl.run(Duration::ZERO).await })
        };

        rx.changed().await.unwrap();
        assert_eq!(ctl.store().generation(), 1);
        assert!(started.elapsed() >= MIN_REFRESH_INTERVAL);

        handle.shutdown();
        runner.await.unwrap();
    }
}
