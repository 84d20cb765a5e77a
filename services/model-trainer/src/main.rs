use anyhow::{Context, Result};
use housing_core::{config::TrainerConfig, init_tracing};
use tracing::info;

mod train;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("model-trainer");

    let cfg = TrainerConfig::from_env().context("loading trainer configuration")?;
    info!(
        dataset = %cfg.dataset_path,
        n_estimators = cfg.n_estimators,
        seed = cfg.seed,
        "starting training run"
    );

    let outcome = train::run(&cfg).await?;
    info!(
        model = %outcome.model_path.display(),
        digest = %outcome.digest,
        mse = f64::from(outcome.metrics.mse),
        rmse = f64::from(outcome.metrics.rmse),
        r_squared = f64::from(outcome.metrics.r_squared),
        registered_version = outcome.registered_version.as_deref().unwrap_or("-"),
        "training complete"
    );
    Ok(())
}
