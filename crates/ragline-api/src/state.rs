//! Application state shared across all route handlers.

use std::time::Instant;

use ragline_core::config::RetrievalConfig;
use ragline_vector::refresh::RefreshHandle;
use ragline_vector::retrieval::Retriever;

/// Shared application state.
///
/// Every field is cheap to clone; the retriever and refresh handle share
/// their underlying store and signals.
#[derive(Clone)]
pub struct AppState {
    /// Query-time retriever over the published snapshot.
    pub retriever: Retriever,
    /// Signals the background refresh controller.
    pub refresh: RefreshHandle,
    /// Default and maximum `k` for queries.
    pub retrieval: RetrievalConfig,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(retriever: Retriever, refresh: RefreshHandle, retrieval: RetrievalConfig) -> Self {
        Self {
            retriever,
            refresh,
            retrieval,
            start_time: Instant::now(),
        }
    }
}
