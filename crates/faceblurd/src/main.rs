use anyhow::{Context, Result};
use faceblur_core::ScrfdDetector;
use faceblurd::{config, engine, server};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "faceblurd starting");

    let config = config::Config::from_env();
    let model_path = config.detector_model_path();

    // Loaded once; the engine thread owns it from here on.
    let detector = ScrfdDetector::load(&model_path, config.detector_options())
        .with_context(|| format!("loading face detector from {}", model_path.display()))?;

    let engine = engine::spawn_engine(Box::new(detector), config.queue_depth)?;
    tracing::info!(model = %model_path.display(), "faceblurd ready");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = server::serve(stdin, stdout, engine) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    tracing::info!("faceblurd shutting down");
    Ok(())
}
