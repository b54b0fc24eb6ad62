/**
 * NeuroLock TEE Server
 * Runs inside the enclave; brainprint templates never leave it in
 * plaintext form
 *
 * Handles:
 * - Enrolment (multi-trial averaging + salted digest)
 * - Authentication (cosine similarity against the stored template)
 * - Template listing and deletion
 */

use std::sync::Arc;

use neurolock_tee::api::{self, AppState};
use neurolock_tee::{BiometricService, Config};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("Starting NeuroLock TEE Server");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    info!(
        "Templates in {} (dimension {}, threshold {:.2}, {} trials)",
        config.template_dir.display(),
        config.feature_dimension,
        config.similarity_threshold,
        config.enrolment_trials
    );

    let bind_addr = config.bind_addr.clone();
    let biometric = match BiometricService::new(config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to initialise biometric service: {}", e);
            std::process::exit(2);
        }
    };

    let app = api::router(AppState { biometric });

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind listener");

    info!("NeuroLock TEE Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
