//! Environment-driven configuration, read once at process startup.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// Where the serving process finds its artifact. The three modes are
/// independent alternatives selected by configuration, never fallbacks for
/// one another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Flat serialized-estimator file on local disk.
    LocalFile(PathBuf),
    /// Latest registry version carrying the given stage.
    RegistryStage { name: String, stage: String },
    /// Registry version the given alias points at.
    RegistryAlias { name: String, alias: String },
}

/// Prediction service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub bind_addr: String,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_stage: Option<String>,
    #[serde(default)]
    pub model_alias: Option<String>,
    #[serde(default)]
    pub tracking_uri: Option<String>,
    #[serde(default)]
    pub model_sha256: Option<String>,
}

impl GatewayConfig {
    /// Reads `BIND_ADDR`, `MODEL_PATH`, `MODEL_NAME`, `MODEL_STAGE`,
    /// `MODEL_ALIAS`, `TRACKING_URI` and `MODEL_SHA256`.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:8000")?
            .add_source(config::Environment::default())
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Picks exactly one resolution mode from the configured variables.
    /// Ambiguous combinations are rejected instead of silently ranked.
    pub fn model_source(&self) -> Result<ModelSource> {
        match (&self.model_path, &self.model_name) {
            (Some(_), Some(_)) => Err(CoreError::Config(
                "MODEL_PATH and MODEL_NAME are mutually exclusive".into(),
            )),
            (Some(path), None) => {
                if self.model_stage.is_some() || self.model_alias.is_some() {
                    return Err(CoreError::Config(
                        "MODEL_STAGE/MODEL_ALIAS require MODEL_NAME, not MODEL_PATH".into(),
                    ));
                }
                Ok(ModelSource::LocalFile(PathBuf::from(path)))
            }
            (None, Some(name)) => {
                if self.tracking_uri.is_none() {
                    return Err(CoreError::Config(
                        "TRACKING_URI is required when loading from the registry".into(),
                    ));
                }
                match (&self.model_stage, &self.model_alias) {
                    (Some(_), Some(_)) => Err(CoreError::Config(
                        "MODEL_STAGE and MODEL_ALIAS are mutually exclusive".into(),
                    )),
                    (Some(stage), None) => Ok(ModelSource::RegistryStage {
                        name: name.clone(),
                        stage: stage.clone(),
                    }),
                    (None, Some(alias)) => Ok(ModelSource::RegistryAlias {
                        name: name.clone(),
                        alias: alias.clone(),
                    }),
                    (None, None) => Err(CoreError::Config(
                        "MODEL_NAME needs either MODEL_STAGE or MODEL_ALIAS".into(),
                    )),
                }
            }
            (None, None) => Err(CoreError::Config(
                "no model source configured: set MODEL_PATH, or MODEL_NAME with a stage or alias"
                    .into(),
            )),
        }
    }
}

/// Trainer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainerConfig {
    pub dataset_path: String,
    pub model_out: String,
    pub n_estimators: usize,
    #[serde(default)]
    pub max_depth: Option<usize>,
    pub seed: u64,
    pub test_size: f32,
    #[serde(default)]
    pub tracking_uri: Option<String>,
    pub experiment: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_stage: Option<String>,
    #[serde(default)]
    pub model_alias: Option<String>,
}

impl TrainerConfig {
    /// Reads `DATASET_PATH` (required), `MODEL_OUT`, `N_ESTIMATORS`,
    /// `MAX_DEPTH`, `SEED`, `TEST_SIZE`, `TRACKING_URI`, `EXPERIMENT`,
    /// `MODEL_NAME`, `MODEL_STAGE` and `MODEL_ALIAS`.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .set_default("model_out", "model.json")?
            .set_default("n_estimators", 100_i64)?
            .set_default("seed", 42_i64)?
            .set_default("test_size", 0.2_f64)?
            .set_default("experiment", "housing-regression")?
            .add_source(config::Environment::default())
            .build()?;
        Ok(cfg.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(
        path: Option<&str>,
        name: Option<&str>,
        stage: Option<&str>,
        alias: Option<&str>,
        tracking: Option<&str>,
    ) -> GatewayConfig {
        GatewayConfig {
            bind_addr: "0.0.0.0:8000".into(),
            model_path: path.map(Into::into),
            model_name: name.map(Into::into),
            model_stage: stage.map(Into::into),
            model_alias: alias.map(Into::into),
            tracking_uri: tracking.map(Into::into),
            model_sha256: None,
        }
    }

    #[test]
    fn file_mode() {
        let src = gateway(Some("model.json"), None, None, None, None)
            .model_source()
            .unwrap();
        assert_eq!(src, ModelSource::LocalFile(PathBuf::from("model.json")));
    }

    #[test]
    fn stage_mode() {
        let src = gateway(None, Some("housing"), Some("Production"), None, Some("http://mlflow:5000"))
            .model_source()
            .unwrap();
        assert_eq!(
            src,
            ModelSource::RegistryStage {
                name: "housing".into(),
                stage: "Production".into()
            }
        );
    }

    #[test]
    fn alias_mode() {
        let src = gateway(None, Some("housing"), None, Some("champion"), Some("http://mlflow:5000"))
            .model_source()
            .unwrap();
        assert_eq!(
            src,
            ModelSource::RegistryAlias {
                name: "housing".into(),
                alias: "champion".into()
            }
        );
    }

    #[test]
    fn ambiguous_modes_are_rejected() {
        assert!(gateway(Some("m.json"), Some("housing"), None, None, None)
            .model_source()
            .is_err());
        assert!(gateway(
            None,
            Some("housing"),
            Some("Production"),
            Some("champion"),
            Some("http://mlflow:5000")
        )
        .model_source()
        .is_err());
        assert!(gateway(Some("m.json"), None, Some("Production"), None, None)
            .model_source()
            .is_err());
    }

    #[test]
    fn registry_mode_requires_tracking_uri() {
        assert!(gateway(None, Some("housing"), Some("Production"), None, None)
            .model_source()
            .is_err());
    }

    #[test]
    fn unconfigured_source_is_an_error() {
        assert!(gateway(None, None, None, None, None).model_source().is_err());
    }

    #[test]
    fn stage_without_name_is_an_error() {
        // a stage or alias alone configures nothing
        assert!(gateway(None, None, Some("Production"), None, None)
            .model_source()
            .is_err());
    }
}
