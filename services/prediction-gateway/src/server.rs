//! Request handling and startup loading.
//!
//! The artifact is resolved and deserialized exactly once, before the
//! listener binds; handlers share the resulting context read-only through
//! an `Arc`. There is no reload path: a new model means a new process.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use housing_core::artifact::ModelArtifact;
use housing_core::config::{GatewayConfig, ModelSource};
use housing_core::features::HouseFeatures;
use housing_core::registry::RegistryClient;
use housing_core::{CoreError, Result};

/// Immutable per-process serving state, built once before the listener
/// binds.
pub struct AppContext {
    pub artifact: ModelArtifact,
    /// Registry version number when the artifact came from the registry.
    pub model_version: Option<String>,
}

/// Resolves the configured source, fetches and parses the artifact, and
/// verifies its schema. Any failure here must keep the process from ever
/// serving.
pub async fn load_context(cfg: &GatewayConfig, source: &ModelSource) -> Result<Arc<AppContext>> {
    let expected_digest = cfg.model_sha256.as_deref();
    let (artifact, model_version) = match source {
        ModelSource::LocalFile(path) => {
            info!(path = %path.display(), "loading artifact from file");
            (ModelArtifact::load(path, expected_digest)?, None)
        }
        ModelSource::RegistryStage { name, stage } => {
            let client = registry_client(cfg)?;
            let version = client.latest_version_for_stage(name, stage).await?;
            info!(%name, %stage, version = %version.version, source = %version.source, "resolved stage to version");
            let bytes = client.fetch_artifact(&version.source).await?;
            (
                ModelArtifact::from_bytes(&bytes, expected_digest)?,
                Some(version.version),
            )
        }
        ModelSource::RegistryAlias { name, alias } => {
            let client = registry_client(cfg)?;
            let version = client.version_for_alias(name, alias).await?;
            info!(%name, %alias, version = %version.version, source = %version.source, "resolved alias to version");
            let bytes = client.fetch_artifact(&version.source).await?;
            (
                ModelArtifact::from_bytes(&bytes, expected_digest)?,
                Some(version.version),
            )
        }
    };
    artifact.check_schema()?;
    Ok(Arc::new(AppContext {
        artifact,
        model_version,
    }))
}

fn registry_client(cfg: &GatewayConfig) -> Result<RegistryClient> {
    let uri = cfg
        .tracking_uri
        .as_deref()
        .ok_or_else(|| CoreError::Config("TRACKING_URI is not set".into()))?;
    Ok(RegistryClient::new(uri))
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .with_state(ctx)
}

/// Reachable only once the artifact load succeeded, so a plain ok is the
/// truthful answer.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
struct Prediction {
    predicted_price: f64,
}

type Rejection = (StatusCode, Json<Value>);

fn reject(status: StatusCode, detail: String) -> Rejection {
    (status, Json(json!({ "error": detail })))
}

/// Validates the record against the fixed schema, then runs the single
/// inference call. Malformed bodies never reach the model.
async fn predict(
    State(ctx): State<Arc<AppContext>>,
    payload: std::result::Result<Json<HouseFeatures>, JsonRejection>,
) -> std::result::Result<Json<Prediction>, Rejection> {
    let Json(record) = payload.map_err(|rejection| {
        let status = rejection.status();
        reject(status, rejection.body_text())
    })?;
    record
        .validate()
        .map_err(|e| reject(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let value = ctx.artifact.predict(&record).map_err(|e| {
        error!(error = %e, "inference failed");
        reject(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(Prediction {
        predicted_price: f64::from(value),
    }))
}
