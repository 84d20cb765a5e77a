//! Regression evaluation metrics.

use crate::error::{CoreError, Result};

fn check_lengths(predictions: &[f32], targets: &[f32]) -> Result<()> {
    if predictions.len() != targets.len() {
        return Err(CoreError::ShapeMismatch {
            expected: format!("{} predictions", targets.len()),
            actual: format!("{} predictions", predictions.len()),
        });
    }
    if targets.is_empty() {
        return Err(CoreError::Dataset("cannot score an empty sample".into()));
    }
    Ok(())
}

/// Mean squared error.
pub fn mse(predictions: &[f32], targets: &[f32]) -> Result<f32> {
    check_lengths(predictions, targets)?;
    let sum: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (f64::from(*p) - f64::from(*t)).powi(2))
        .sum();
    Ok((sum / targets.len() as f64) as f32)
}

/// Root mean squared error.
pub fn rmse(predictions: &[f32], targets: &[f32]) -> Result<f32> {
    Ok(mse(predictions, targets)?.sqrt())
}

/// Coefficient of determination. Returns 0.0 for a constant target, where
/// the score is undefined.
pub fn r_squared(predictions: &[f32], targets: &[f32]) -> Result<f32> {
    check_lengths(predictions, targets)?;
    let n = targets.len() as f64;
    let mean: f64 = targets.iter().map(|t| f64::from(*t)).sum::<f64>() / n;
    let ss_res: f64 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (f64::from(*t) - f64::from(*p)).powi(2))
        .sum();
    let ss_tot: f64 = targets.iter().map(|t| (f64::from(*t) - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(0.0);
    }
    Ok((1.0 - ss_res / ss_tot) as f32)
}
