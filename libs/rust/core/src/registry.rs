//! Client for the MLflow tracking server and model registry (REST 2.0).
//!
//! The trainer records runs (params + metrics) and registers artifact
//! versions; the serving process resolves a (name, stage) or (name, alias)
//! pair to a concrete version exactly once at startup and fetches the
//! artifact bytes from the version's source URI.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{CoreError, Result};

const ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";
const DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// One concrete version of a registered model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelVersionInfo {
    pub name: String,
    pub version: String,
    /// URI of the artifact this version was registered from.
    pub source: String,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

pub struct RegistryClient {
    base: String,
    http: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct ApiError {
    error_code: Option<String>,
    message: Option<String>,
}

impl RegistryClient {
    pub fn new(tracking_uri: &str) -> Self {
        Self {
            base: tracking_uri.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let resp = self.http.post(self.api(path)).json(&body).send().await?;
        Self::decode(resp).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let resp = self.http.get(self.api(path)).query(query).send().await?;
        Self::decode(resp).await
    }

    async fn decode(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&bytes)?);
        }
        let err: ApiError = serde_json::from_slice(&bytes).unwrap_or_default();
        Err(CoreError::RegistryApi {
            code: err.error_code.unwrap_or_else(|| status.to_string()),
            message: err.message.unwrap_or_default(),
        })
    }

    fn field<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value> {
        value
            .pointer(pointer)
            .ok_or_else(|| CoreError::Registry(format!("missing field {pointer} in response")))
    }

    fn string_field(value: &Value, pointer: &str) -> Result<String> {
        Ok(Self::field(value, pointer)?
            .as_str()
            .ok_or_else(|| CoreError::Registry(format!("field {pointer} is not a string")))?
            .to_string())
    }

    // --- tracking ---

    /// Returns the experiment id, creating the experiment when absent.
    pub async fn ensure_experiment(&self, name: &str) -> Result<String> {
        match self
            .get("experiments/get-by-name", &[("experiment_name", name)])
            .await
        {
            Ok(body) => Self::string_field(&body, "/experiment/experiment_id"),
            Err(CoreError::RegistryApi { code, .. }) if code == DOES_NOT_EXIST => {
                let body = self.post("experiments/create", json!({ "name": name })).await?;
                Self::string_field(&body, "/experiment_id")
            }
            Err(e) => Err(e),
        }
    }

    /// Starts a run and returns its id.
    pub async fn create_run(&self, experiment_id: &str) -> Result<String> {
        let body = self
            .post(
                "runs/create",
                json!({
                    "experiment_id": experiment_id,
                    "start_time": chrono::Utc::now().timestamp_millis(),
                }),
            )
            .await?;
        Self::string_field(&body, "/run/info/run_id")
    }

    pub async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.post(
            "runs/log-parameter",
            json!({ "run_id": run_id, "key": key, "value": value }),
        )
        .await?;
        Ok(())
    }

    pub async fn log_metric(&self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.post(
            "runs/log-metric",
            json!({
                "run_id": run_id,
                "key": key,
                "value": value,
                "timestamp": chrono::Utc::now().timestamp_millis(),
                "step": 0,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn end_run(&self, run_id: &str) -> Result<()> {
        self.post(
            "runs/update",
            json!({
                "run_id": run_id,
                "status": "FINISHED",
                "end_time": chrono::Utc::now().timestamp_millis(),
            }),
        )
        .await?;
        Ok(())
    }

    // --- registry ---

    /// Creates the registered-model slot when it does not exist yet.
    pub async fn ensure_registered_model(&self, name: &str) -> Result<()> {
        match self
            .post("registered-models/create", json!({ "name": name }))
            .await
        {
            Ok(_) => Ok(()),
            Err(CoreError::RegistryApi { code, .. }) if code == ALREADY_EXISTS => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Registers an artifact as a new version and returns the version
    /// number assigned by the registry.
    pub async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<String> {
        let mut payload = json!({ "name": name, "source": source });
        if let Some(run_id) = run_id {
            payload["run_id"] = json!(run_id);
        }
        let body = self.post("model-versions/create", payload).await?;
        Self::string_field(&body, "/model_version/version")
    }

    pub async fn transition_stage(&self, name: &str, version: &str, stage: &str) -> Result<()> {
        self.post(
            "model-versions/transition-stage",
            json!({
                "name": name,
                "version": version,
                "stage": stage,
                "archive_existing_versions": false,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn set_alias(&self, name: &str, alias: &str, version: &str) -> Result<()> {
        self.post(
            "registered-models/alias",
            json!({ "name": name, "alias": alias, "version": version }),
        )
        .await?;
        Ok(())
    }

    // --- resolution ---

    /// Latest version currently carrying `stage`.
    pub async fn latest_version_for_stage(
        &self,
        name: &str,
        stage: &str,
    ) -> Result<ModelVersionInfo> {
        let body = self
            .post(
                "registered-models/get-latest-versions",
                json!({ "name": name, "stages": [stage] }),
            )
            .await?;
        // a stage with no versions comes back as an empty or absent list
        let first = body
            .pointer("/model_versions")
            .and_then(|v| v.as_array())
            .and_then(|list| list.first())
            .ok_or_else(|| CoreError::VersionNotFound {
                name: name.to_string(),
                selector: format!("stage {stage}"),
            })?;
        Ok(serde_json::from_value(first.clone())?)
    }

    /// Version the alias points at.
    pub async fn version_for_alias(&self, name: &str, alias: &str) -> Result<ModelVersionInfo> {
        let body = match self
            .get("registered-models/alias", &[("name", name), ("alias", alias)])
            .await
        {
            Ok(body) => body,
            Err(CoreError::RegistryApi { code, .. }) if code == DOES_NOT_EXIST => {
                return Err(CoreError::VersionNotFound {
                    name: name.to_string(),
                    selector: format!("alias {alias}"),
                })
            }
            Err(e) => return Err(e),
        };
        let version = Self::field(&body, "/model_version")?;
        Ok(serde_json::from_value(version.clone())?)
    }

    /// Reads the artifact bytes a model version's source URI points at.
    /// Plain paths and `file://` URIs come from local disk, `http(s)://`
    /// sources are fetched over the wire.
    pub async fn fetch_artifact(&self, source: &str) -> Result<Vec<u8>> {
        if let Some(path) = source.strip_prefix("file://") {
            return Ok(std::fs::read(path)?);
        }
        if source.starts_with("http://") || source.starts_with("https://") {
            let resp = self.http.get(source).send().await?;
            if !resp.status().is_success() {
                return Err(CoreError::Registry(format!(
                    "artifact fetch from {source} failed with {}",
                    resp.status()
                )));
            }
            return Ok(resp.bytes().await?.to_vec());
        }
        Ok(std::fs::read(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn model_version_payload_deserializes() {
        // shape returned by model-versions/create and registered-models/alias
        let payload = json!({
            "name": "housing",
            "version": "3",
            "source": "file:///models/model.json",
            "current_stage": "Production",
            "run_id": "abc123",
            "creation_timestamp": 1_700_000_000_000_u64,
        });
        let info: ModelVersionInfo = serde_json::from_value(payload).unwrap();
        assert_eq!(info.version, "3");
        assert_eq!(info.source, "file:///models/model.json");
        assert_eq!(info.current_stage.as_deref(), Some("Production"));
    }

    #[tokio::test]
    async fn fetch_artifact_reads_plain_paths_and_file_uris() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"artifact-bytes").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let client = RegistryClient::new("http://localhost:5000/");
        assert_eq!(client.fetch_artifact(&path).await.unwrap(), b"artifact-bytes");
        assert_eq!(
            client
                .fetch_artifact(&format!("file://{path}"))
                .await
                .unwrap(),
            b"artifact-bytes"
        );
    }

    #[tokio::test]
    async fn fetch_artifact_missing_file_is_an_error() {
        let client = RegistryClient::new("http://localhost:5000");
        assert!(client.fetch_artifact("/nonexistent/model.json").await.is_err());
    }

    #[test]
    fn base_uri_trailing_slash_is_trimmed() {
        let client = RegistryClient::new("http://mlflow:5000/");
        assert_eq!(
            client.api("runs/create"),
            "http://mlflow:5000/api/2.0/mlflow/runs/create"
        );
    }
}
