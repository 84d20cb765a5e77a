//! Core shared library for the housing valuation services.
//!
//! Holds everything both binaries need: the feature schema, dataset loading
//! and splitting, the random-forest estimator, artifact persistence with
//! integrity checking, the model-registry client, and service configuration.

pub mod artifact;
pub mod config;
pub mod dataset;
mod error;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod registry;

pub use error::{CoreError, Result};

/// Installs the process-wide tracing subscriber.
///
/// Filtering comes from `RUST_LOG`; set `HOUSING_JSON_LOG=1` for JSON
/// output. Safe to call more than once (later calls are no-ops), so tests
/// can initialize freely.
pub fn init_tracing(service: &str) {
    let json = std::env::var("HOUSING_JSON_LOG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true);
    let installed = if json {
        builder.json().flatten_event(true).try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };
    if installed {
        tracing::info!(target: "housing_core", service, "tracing initialized");
    }
}
