use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;
mod otp;

use config::Config;
use rollguard_core::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollguardd starting");

    let config = Config::from_env();
    tracing::info!(
        model_dir = %config.model_dir.display(),
        face_threshold = config.face_distance_threshold,
        signature_threshold = config.signature_similarity_threshold,
        face_selection = ?config.face_selection,
        ordering = ?config.match_ordering,
        "configuration loaded"
    );

    // Fail-fast: model loading happens before the listener binds.
    let engine = engine::spawn_engine(
        &config.detector_model_path(),
        &config.encoder_model_path(),
        config.face_selection,
        Duration::from_secs(config.extract_timeout_secs),
    )?;

    let state = http::AppState {
        engine,
        faces: Arc::new(MemoryStore::new()),
        signatures: Arc::new(MemoryStore::new()),
        fingerprints: Arc::new(MemoryStore::new()),
        otp: Arc::new(otp::MemoryOtpCache::new(Duration::from_secs(config.otp_ttl_secs))),
        face_config: config.face_match_config(),
        signature_config: config.signature_match_config(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "rollguardd listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("rollguardd shutting down");
        })
        .await?;

    Ok(())
}
