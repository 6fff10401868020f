//! Corpus source backed by plain HTTP GETs.
//!
//! Each identifier is a URL. The page body is reduced to the text of its
//! `<p>` elements, joined by single spaces.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use ragline_core::config::CorpusConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_vector::source::CorpusSource;

/// Fetches documents over HTTP with a bounded number of requests in flight.
#[derive(Debug, Clone)]
pub struct HttpCorpusSource {
    client: Client,
    paragraph: Selector,
    max_concurrent: usize,
}

impl HttpCorpusSource {
    pub fn new(timeout: Duration, user_agent: &str, max_concurrent: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| RaglineError::Config(format!("failed to build HTTP client: {}", e)))?;
        let paragraph = Selector::parse("p")
            .map_err(|e| RaglineError::Config(format!("paragraph selector: {}", e)))?;

        Ok(Self {
            client,
            paragraph,
            max_concurrent: max_concurrent.max(1),
        })
    }

    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        Self::new(
            Duration::from_secs(config.request_timeout_secs),
            &config.user_agent,
            config.max_concurrent_fetches,
        )
    }

    /// Text of every `<p>` element in document order.
    pub fn extract_paragraphs(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .select(&self.paragraph)
            .map(|p| p.text().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CorpusSource for HttpCorpusSource {
    async fn fetch(&self, identifier: &str) -> Result<String> {
        debug!(url = identifier, "Fetching document");

        let response = self
            .client
            .get(identifier)
            .send()
            .await
            .map_err(|e| RaglineError::fetch(identifier, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RaglineError::fetch(
                identifier,
                format!("HTTP status {}", status),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RaglineError::fetch(identifier, format!("failed to read body: {}", e)))?;

        Ok(self.extract_paragraphs(&body))
    }

    async fn fetch_all(&self, identifiers: &[String]) -> Vec<(String, Result<String>)> {
        stream::iter(identifiers.iter().cloned())
            .map(|identifier| async move {
                let result = self.fetch(&identifier).await;
                (identifier, result)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await
    }
}
