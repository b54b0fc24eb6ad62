/**
 * HTTP Surface
 * Enrol / authenticate / delete endpoints over the biometric service
 */

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::biometric::{BiometricService, EnrolmentReceipt};
use crate::error::NeuroLockError;
use crate::features::{FeatureVector, MentalTask};
use crate::template::AuthResult;

#[derive(Clone)]
pub struct AppState {
    pub biometric: Arc<BiometricService>,
}

#[derive(Deserialize)]
pub struct EnrollRequest {
    #[serde(default)]
    pub task: MentalTask,
    pub trials: Vec<String>, // Base64 encoded little-endian f32
}

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    pub features: String, // Base64 encoded little-endian f32
    #[serde(default)]
    pub task: Option<MentalTask>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub owners: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/templates", get(list_templates))
        .route("/templates/:owner_id", delete(delete_template))
        .route("/templates/:owner_id/enroll", post(enroll))
        .route("/templates/:owner_id/authenticate", post(authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_templates(State(state): State<AppState>) -> Result<Json<ListResponse>, StatusCode> {
    let owners = run_blocking(move || state.biometric.list()).await?;
    Ok(Json(ListResponse { owners }))
}

async fn enroll(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(request): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<EnrolmentReceipt>), StatusCode> {
    info!("Enrol request: owner_id={}, task={}", owner_id, request.task);

    let task = request.task;
    let trials = request
        .trials
        .iter()
        .map(|encoded| decode_features(encoded, task))
        .collect::<Result<Vec<_>, _>>()?;

    let receipt = run_blocking(move || state.biometric.enroll(&owner_id, &trials, task)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn authenticate(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Json(request): Json<AuthenticateRequest>,
) -> Result<Json<AuthResult>, StatusCode> {
    info!("Authentication request: owner_id={}", owner_id);

    // Without a task the candidate is tagged from the enrolled template
    // once it is loaded.
    let candidate = decode_features(&request.features, request.task.unwrap_or_default())?;
    let result = match request.task {
        Some(_) => run_blocking(move || state.biometric.authenticate(&owner_id, &candidate)).await?,
        None => {
            run_blocking(move || state.biometric.authenticate_untagged(&owner_id, candidate)).await?
        }
    };
    Ok(Json(result))
}

async fn delete_template(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    run_blocking(move || state.biometric.delete(&owner_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn decode_features(encoded: &str, task: MentalTask) -> Result<FeatureVector, StatusCode> {
    let bytes = zeroize::Zeroizing::new(
        STANDARD
            .decode(encoded)
            .map_err(|_| StatusCode::BAD_REQUEST)?,
    );
    FeatureVector::from_le_bytes(&bytes, task, crate::features::now_millis())
        .map_err(|_| StatusCode::BAD_REQUEST)
}

/// Core operations are synchronous file and hash work; keep them off the
/// async workers.
async fn run_blocking<T, F>(op: F) -> Result<T, StatusCode>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| {
            error!("Blocking task panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| status_for(&e))
}

pub fn status_for(err: &NeuroLockError) -> StatusCode {
    let status = match err {
        NeuroLockError::NotFound(_) => StatusCode::NOT_FOUND,
        NeuroLockError::AlreadyExists(_) => StatusCode::CONFLICT,
        NeuroLockError::InvalidInput(_)
        | NeuroLockError::DimensionMismatch { .. }
        | NeuroLockError::DegenerateVector { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    status
}
