//! The training pipeline: load, split, fit, evaluate, persist, and
//! optionally record the run and register the artifact.
//!
//! Every failure is fatal and bubbles out of `run` with context; the
//! trainer never retries and never leaves a partially written artifact
//! behind a successful exit code.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use housing_core::artifact::{EvalMetrics, Hyperparameters, ModelArtifact};
use housing_core::config::TrainerConfig;
use housing_core::dataset::{train_test_split, HousingDataset};
use housing_core::forest::RandomForestRegressor;
use housing_core::metrics::{mse, r_squared, rmse};
use housing_core::registry::RegistryClient;
use tracing::info;

pub struct TrainOutcome {
    pub model_path: PathBuf,
    pub digest: String,
    pub metrics: EvalMetrics,
    pub registered_version: Option<String>,
}

pub async fn run(cfg: &TrainerConfig) -> Result<TrainOutcome> {
    let dataset = HousingDataset::from_csv(&cfg.dataset_path)
        .with_context(|| format!("loading dataset {}", cfg.dataset_path))?;
    info!(samples = dataset.n_samples(), "dataset loaded");

    let (x_train, x_test, y_train, y_test) =
        train_test_split(&dataset.features, &dataset.targets, cfg.test_size, cfg.seed)
            .context("splitting dataset")?;

    let mut model = RandomForestRegressor::new(cfg.n_estimators).with_seed(cfg.seed);
    if let Some(depth) = cfg.max_depth {
        model = model.with_max_depth(depth);
    }
    model.fit(&x_train, &y_train).context("fitting forest")?;
    info!(
        train_samples = y_train.len(),
        test_samples = y_test.len(),
        "forest fitted"
    );

    let predictions = model.predict(&x_test).context("scoring holdout partition")?;
    let metrics = EvalMetrics {
        mse: mse(&predictions, &y_test)?,
        rmse: rmse(&predictions, &y_test)?,
        r_squared: r_squared(&predictions, &y_test)?,
    };

    let params = Hyperparameters {
        n_estimators: cfg.n_estimators,
        max_depth: cfg.max_depth,
        seed: cfg.seed,
        test_size: cfg.test_size,
    };
    let artifact = ModelArtifact::new(model, params, metrics.clone());
    let model_path = PathBuf::from(&cfg.model_out);
    let digest = artifact
        .save(&model_path)
        .with_context(|| format!("writing artifact {}", model_path.display()))?;
    info!(path = %model_path.display(), %digest, "artifact written");

    let registered_version = match &cfg.tracking_uri {
        Some(uri) => record_run(cfg, uri, &model_path, &metrics).await?,
        None => None,
    };

    Ok(TrainOutcome {
        model_path,
        digest,
        metrics,
        registered_version,
    })
}

/// Logs params and metrics as one tracking run, then registers the artifact
/// when a model name is configured. Registration may apply a stage and an
/// alias; serving picks one of those labels, but nothing stops a version
/// from carrying both.
async fn record_run(
    cfg: &TrainerConfig,
    tracking_uri: &str,
    model_path: &Path,
    metrics: &EvalMetrics,
) -> Result<Option<String>> {
    let client = RegistryClient::new(tracking_uri);
    let experiment_id = client
        .ensure_experiment(&cfg.experiment)
        .await
        .with_context(|| format!("resolving experiment {}", cfg.experiment))?;
    let run_id = client.create_run(&experiment_id).await.context("creating run")?;

    client
        .log_param(&run_id, "n_estimators", &cfg.n_estimators.to_string())
        .await?;
    if let Some(depth) = cfg.max_depth {
        client.log_param(&run_id, "max_depth", &depth.to_string()).await?;
    }
    client.log_param(&run_id, "seed", &cfg.seed.to_string()).await?;
    client
        .log_param(&run_id, "test_size", &cfg.test_size.to_string())
        .await?;

    client.log_metric(&run_id, "mse", f64::from(metrics.mse)).await?;
    client.log_metric(&run_id, "rmse", f64::from(metrics.rmse)).await?;
    client
        .log_metric(&run_id, "r_squared", f64::from(metrics.r_squared))
        .await?;
    client.end_run(&run_id).await.context("closing run")?;
    info!(%run_id, "tracking run recorded");

    let Some(name) = &cfg.model_name else {
        return Ok(None);
    };
    client
        .ensure_registered_model(name)
        .await
        .with_context(|| format!("ensuring registered model {name}"))?;
    let source = std::fs::canonicalize(model_path)
        .unwrap_or_else(|_| model_path.to_path_buf())
        .display()
        .to_string();
    let version = client
        .create_model_version(name, &source, Some(&run_id))
        .await
        .context("registering model version")?;
    if let Some(stage) = &cfg.model_stage {
        client
            .transition_stage(name, &version, stage)
            .await
            .with_context(|| format!("transitioning version {version} to {stage}"))?;
    }
    if let Some(alias) = &cfg.model_alias {
        client
            .set_alias(name, alias, &version)
            .await
            .with_context(|| format!("pointing alias {alias} at version {version}"))?;
    }
    info!(%name, %version, "model version registered");
    Ok(Some(version))
}
