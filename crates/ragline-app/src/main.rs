//! Ragline application binary - composition root.
//!
//! Ties together all Ragline crates into a single executable:
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Load the embedding backend and the URL list
//! 3. Restore the last persisted snapshot, or build one from the corpus
//! 4. Either answer one `--query` and exit, or start the refresh loop and
//!    serve the REST API until Ctrl-C

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use ragline_api::routes;
use ragline_api::state::AppState;
use ragline_core::config::{expand_home, EmbeddingBackend, EmbeddingConfig, RaglineConfig};
use ragline_core::error::RaglineError;
use ragline_vector::embedding::{EmbeddingService, HashEmbedding, OnnxEmbeddingService, SharedEmbedding};
use ragline_vector::refresh::{RefreshController, RefreshOutcome};
use ragline_vector::retrieval::Retriever;
use ragline_vector::snapshot::{CorpusSnapshot, SnapshotStore};
use ragline_web::delivery::{ConfiguredDelivery, DeliveryChannel};
use ragline_web::response::compose_response;
use ragline_web::source::HttpCorpusSource;
use ragline_web::urls::load_identifiers;

use crate::cli::CliArgs;

type Controller = RefreshController<HttpCorpusSource, SharedEmbedding>;

/// Load the configured embedding backend.
fn load_embedder(config: &EmbeddingConfig) -> Result<SharedEmbedding, RaglineError> {
    match config.backend {
        EmbeddingBackend::Onnx => {
            let model_dir = expand_home(&config.model_dir);
            let service = OnnxEmbeddingService::from_directory(&model_dir, &config.model_id)?;
            Ok(SharedEmbedding::new(service))
        }
        EmbeddingBackend::Hash => {
            tracing::warn!(
                dimension = config.dimension,
                "Using hash embeddings; retrieval will not be semantic"
            );
            Ok(SharedEmbedding::new(HashEmbedding::with_dimensions(config.dimension)))
        }
    }
}

/// Publish the snapshot persisted in `data_dir`, if it is usable.
fn warm_start(
    store: &SnapshotStore,
    data_dir: &Path,
    embedder: &SharedEmbedding,
) -> bool {
    match CorpusSnapshot::restore(data_dir, embedder.dimensions(), embedder.model_id()) {
        Ok(snapshot) => {
            store.publish(snapshot);
            true
        }
        Err(e) => {
            tracing::info!(error = %e, "No usable persisted snapshot, rebuilding from source");
            false
        }
    }
}

/// Answer one query, deliver or print the response, and return.
async fn run_one_shot(
    config: &RaglineConfig,
    cli: &CliArgs,
    question: &str,
    controller: &Controller,
    retriever: &Retriever,
    data_dir: &Path,
    embedder: &SharedEmbedding,
) -> Result<(), Box<dyn std::error::Error>> {
    if let RefreshOutcome::Failed { error } = controller.refresh_once().await {
        tracing::warn!(error = %error, "Refresh failed, trying persisted snapshot");
        if !config.refresh.persist || !warm_start(controller.store(), data_dir, embedder) {
            return Err(error.into());
        }
    }

    let k = cli.k.unwrap_or(config.retrieval.default_k);
    let result = retriever.retrieve(question, k).await?;
    let response = compose_response(&result, config.retrieval.response_chars);

    match &cli.user_id {
        Some(user_id) => {
            let timeout = Duration::from_secs(config.corpus.request_timeout_secs);
            let delivery = ConfiguredDelivery::from_config(&config.delivery, timeout)?;
            // Delivery problems are reported, never fatal.
            if let Err(e) = delivery.deliver(user_id, &response).await {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to deliver response");
            }
        }
        None => println!("{}", response),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = cli.resolve_config_path();
    let (mut config, config_error) = match RaglineConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (RaglineConfig::default(), Some(e)),
    };
    cli.apply_overrides(&mut config);
    let log_level = cli
        .resolve_log_level()
        .unwrap_or_else(|| config.general.log_level.clone());

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Ragline v{}", env!("CARGO_PKG_VERSION"));
    match config_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    if cli.write_config {
        config.save(&config_file)?;
        return Ok(());
    }

    // Data directory.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    // Embedding model, shared by refresh and retrieval.
    let embedder = load_embedder(&config.embedding)?;
    tracing::info!(
        model_id = embedder.model_id(),
        dimensions = embedder.dimensions(),
        "Embedding backend ready"
    );

    // Corpus.
    let identifiers = load_identifiers(Path::new(&config.corpus.url_file))?;
    let source = HttpCorpusSource::from_config(&config.corpus)?;

    let store: SnapshotStore = SnapshotStore::new();
    let mut controller: Controller =
        RefreshController::new(source, embedder.clone(), identifiers, store.clone())
            .with_policy(config.refresh.on_embedding_failure);
    if config.refresh.persist {
        controller = controller.with_persist_dir(&data_dir);
    }
    let retriever = Retriever::new_dyn(store.clone(), embedder.clone());

    // === One-shot mode ===

    if let Some(question) = &cli.query {
        return run_one_shot(
            &config,
            &cli,
            question,
            &controller,
            &retriever,
            &data_dir,
            &embedder,
        )
        .await;
    }

    // === Serve mode ===

    let warm = config.refresh.persist && warm_start(&store, &data_dir, &embedder);
    if !warm {
        if let RefreshOutcome::Failed { error } = controller.refresh_once().await {
            // The API still starts; queries return 503 until a refresh succeeds.
            tracing::warn!(error = %error, "Initial refresh failed");
        }
    }

    let controller = Arc::new(controller);
    let handle = controller.handle();
    let interval = Duration::from_secs(config.refresh.interval_secs);
    let refresh_task = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(interval).await })
    };

    let state = AppState::new(retriever, handle.clone(), config.retrieval.clone());
    let port = cli.resolve_port(config.api.port);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        tracing::info!("Shutdown requested");
    };

    let served = routes::start_server(port, state, shutdown).await;

    handle.shutdown();
    if let Err(e) = refresh_task.await {
        tracing::warn!(error = %e, "Refresh task ended abnormally");
    }

    if let Err(e) = served {
        tracing::error!(error = %e, "API server failed");
        tracing::error!("Try: RAGLINE_PORT={} ragline", port.saturating_add(1));
        return Err(e.into());
    }

    tracing::info!("Ragline stopped");
    Ok(())
}
