//! Corpus source interface.
//!
//! Where raw text comes from (HTTP, files, an API) does not matter to the
//! engine; it only needs identifiers in, text or a failure out.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use ragline_core::error::{RaglineError, Result};

/// Supplier of raw document text.
pub trait CorpusSource: Send + Sync {
    /// Fetch the raw text behind one identifier.
    fn fetch(&self, identifier: &str) -> impl Future<Output = Result<String>> + Send;

    /// Fetch every identifier, returning results in identifier order.
    ///
    /// A failure for one identifier never affects the others.
    fn fetch_all(
        &self,
        identifiers: &[String],
    ) -> impl Future<Output = Vec<(String, Result<String>)>> + Send {
        async move {
            let mut results = Vec::with_capacity(identifiers.len());
            for identifier in identifiers {
                results.push((identifier.clone(), self.fetch(identifier).await));
            }
            results
        }
    }
}

impl<S: CorpusSource> CorpusSource for Arc<S> {
    fn fetch(&self, identifier: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).fetch(identifier)
    }

    fn fetch_all(
        &self,
        identifiers: &[String],
    ) -> impl Future<Output = Vec<(String, Result<String>)>> + Send {
        (**self).fetch_all(identifiers)
    }
}

/// In-memory corpus whose entries can be changed or failed at runtime.
///
/// Clones share the same entries, so a test can keep one clone and mutate
/// the corpus a refresh controller is reading from.
#[derive(Debug, Clone, Default)]
pub struct StaticCorpus {
    entries: Arc<RwLock<HashMap<String, Option<String>>>>,
}

impl StaticCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from `(identifier, text)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let corpus = Self::new();
        for (identifier, text) in pairs {
            corpus.set(identifier, text);
        }
        corpus
    }

    /// Set (or replace) the text behind an identifier.
    pub fn set(&self, identifier: impl Into<String>, text: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(identifier.into(), Some(text.into()));
        }
    }

    /// Make every future fetch of `identifier` fail.
    pub fn fail(&self, identifier: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(identifier.into(), None);
        }
    }

    /// Make every known identifier fail.
    pub fn fail_all(&self) {
        if let Ok(mut entries) = self.entries.write() {
            for value in entries.values_mut() {
                *value = None;
            }
        }
    }
}

impl CorpusSource for StaticCorpus {
    async fn fetch(&self, identifier: &str) -> Result<String> {
        let entries = self
            .entries
            .read()
            .map_err(|e| RaglineError::fetch(identifier, format!("lock poisoned: {}", e)))?;
        match entries.get(identifier) {
            Some(Some(text)) => Ok(text.clone()),
            Some(None) => Err(RaglineError::fetch(identifier, "source unavailable")),
            None => Err(RaglineError::fetch(identifier, "unknown identifier")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_corpus_fetch() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha"), ("b", "beta")]);
        assert_eq!(corpus.fetch("a").await.unwrap(), "alpha");
        assert!(matches!(
            corpus.fetch("missing").await,
            Err(RaglineError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_all_keeps_order_and_isolates_failures() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha"), ("b", "beta"), ("c", "gamma")]);
        corpus.fail("b");

        let ids: Vec<String> = ["c", "b", "a"].iter().map(|s| s.to_string()).collect();
        let results = corpus.fetch_all(&ids).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "c");
        assert_eq!(results[0].1.as_ref().unwrap(), "gamma");
        assert_eq!(results[1].0, "b");
        assert!(results[1].1.is_err());
        assert_eq!(results[2].1.as_ref().unwrap(), "alpha");
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let corpus = StaticCorpus::from_pairs([("a", "alpha")]);
        let handle = corpus.clone();
        handle.set("a", "changed");
        assert_eq!(corpus.fetch("a").await.unwrap(), "changed");

        handle.fail_all();
        assert!(corpus.fetch("a").await.is_err());
    }

    #[tokio::test]
    async fn test_arc_source_delegates() {
        let corpus = Arc::new(StaticCorpus::from_pairs([("a", "alpha")]));
        assert_eq!(corpus.fetch("a").await.unwrap(), "alpha");
    }
}
