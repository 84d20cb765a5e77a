//! Model artifact persistence.
//!
//! An artifact is the fitted forest plus the schema and provenance needed
//! to serve it safely: feature order, hyperparameters, holdout metrics, and
//! a creation timestamp. Serialized as a flat JSON file; loads can demand a
//! sha256 digest so a swapped or truncated file fails closed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};
use crate::features::{HouseFeatures, FEATURE_NAMES, TARGET_NAME};
use crate::forest::RandomForestRegressor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
    pub test_size: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub mse: f32,
    pub rmse: f32,
    pub r_squared: f32,
}

/// A trained estimator, sealed for serving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: RandomForestRegressor,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub params: Hyperparameters,
    pub metrics: EvalMetrics,
    pub created_at: String,
}

impl ModelArtifact {
    pub fn new(model: RandomForestRegressor, params: Hyperparameters, metrics: EvalMetrics) -> Self {
        Self {
            model,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            target_name: TARGET_NAME.to_string(),
            params,
            metrics,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Runs one record through the forest.
    pub fn predict(&self, record: &HouseFeatures) -> Result<f32> {
        self.model.predict_row(&record.as_row())
    }

    /// The artifact must carry exactly the feature schema this build was
    /// compiled against, in the same order.
    pub fn check_schema(&self) -> Result<()> {
        if self.feature_names != FEATURE_NAMES {
            return Err(CoreError::Artifact(format!(
                "artifact schema {:?} does not match expected feature order {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }
        if !self.model.is_fitted() {
            return Err(CoreError::NotFitted);
        }
        Ok(())
    }

    /// Writes the artifact and returns the sha256 digest of the bytes on
    /// disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        std::fs::write(path, &bytes)?;
        Ok(sha256_hex(&bytes))
    }

    /// Parses artifact bytes, verifying the digest first when one is
    /// expected.
    pub fn from_bytes(bytes: &[u8], expected_sha256: Option<&str>) -> Result<Self> {
        if let Some(expected) = expected_sha256 {
            let actual = sha256_hex(bytes);
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(CoreError::DigestMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load<P: AsRef<Path>>(path: P, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, expected_sha256)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Matrix;

    fn fitted_artifact() -> ModelArtifact {
        let mut data = Vec::new();
        let mut targets = Vec::new();
        for i in 0..12 {
            let v = i as f32;
            data.extend_from_slice(&[
                v * 0.5,
                v,
                v + 4.0,
                1.0,
                v * 10.0,
                2.5,
                37.0 + v * 0.01,
                -122.0 - v * 0.01,
            ]);
            targets.push(v * 0.3 + 1.0);
        }
        let x = Matrix::from_vec(12, 8, data).unwrap();
        let mut model = RandomForestRegressor::new(4).with_seed(42);
        model.fit(&x, &targets).unwrap();
        ModelArtifact::new(
            model,
            Hyperparameters {
                n_estimators: 4,
                max_depth: None,
                seed: 42,
                test_size: 0.2,
            },
            EvalMetrics {
                mse: 0.1,
                rmse: 0.316,
                r_squared: 0.9,
            },
        )
    }

    fn example_record() -> HouseFeatures {
        serde_json::from_str(
            r#"{"MedInc":8.3,"HouseAge":41,"AveRooms":6.98,"AveBedrms":1.02,"Population":322,"AveOccup":2.55,"Latitude":37.88,"Longitude":-122.23}"#,
        )
        .unwrap()
    }

    #[test]
    fn save_load_round_trip_preserves_predictions() {
        let artifact = fitted_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let digest = artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path, Some(&digest)).unwrap();
        loaded.check_schema().unwrap();

        let record = example_record();
        assert_eq!(
            artifact.predict(&record).unwrap().to_bits(),
            loaded.predict(&record).unwrap().to_bits()
        );
    }

    #[test]
    fn wrong_digest_fails_closed() {
        let artifact = fitted_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path).unwrap();

        let err = ModelArtifact::load(&path, Some("deadbeef")).unwrap_err();
        assert!(matches!(err, CoreError::DigestMismatch { .. }));
    }

    #[test]
    fn digest_comparison_ignores_case() {
        let artifact = fitted_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let digest = artifact.save(&path).unwrap().to_uppercase();
        assert!(ModelArtifact::load(&path, Some(&digest)).is_ok());
    }

    #[test]
    fn schema_drift_is_detected() {
        let mut artifact = fitted_artifact();
        artifact.feature_names.swap(0, 1);
        assert!(artifact.check_schema().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ModelArtifact::load("/nonexistent/model.json", None).is_err());
    }
}
