use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dental_seg_rs::{
    server, AnalysisHistory, ClassCatalog, Config, Model, SegmentationPipeline,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter).context("Invalid log filter")?)
        .init();

    let catalog = match &config.catalog {
        Some(path) => ClassCatalog::from_json_file(path)
            .with_context(|| format!("Failed to load class catalog: {}", path.display()))?,
        None => ClassCatalog::dental(),
    };
    info!(classes = catalog.len(), "class catalog ready");

    let pipeline = load_pipeline(&config, catalog)?;
    let state = Arc::new(server::AppState {
        pipeline: pipeline.map(Arc::new),
        history: AnalysisHistory::new(config.history_capacity),
        model_path: config.model_path.clone(),
    });
    let app = server::router(state, config.max_upload_bytes);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Loads the model once. A model that fails to load leaves the service up so the
/// health check can report it; uploads are then refused.
fn load_pipeline(
    config: &Config,
    catalog: ClassCatalog,
) -> Result<Option<SegmentationPipeline<Model>>> {
    if !config.model_path.exists() {
        warn!(
            "Model file not found at {} (working directory: {})",
            config.model_path.display(),
            std::env::current_dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default()
        );
        return Ok(None);
    }

    info!("Loading model from {}...", config.model_path.display());
    match Model::new(
        &config.model_path,
        config.device_id,
        config.layout,
        config.image_size,
    ) {
        Ok(model) => {
            let pipeline = SegmentationPipeline::new(model, catalog).with_alpha(config.alpha)?;
            Ok(Some(pipeline))
        }
        Err(e) => {
            error!(error = ?e, "Failed to initialize model");
            Ok(None)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
