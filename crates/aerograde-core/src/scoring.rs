//! Error-to-score curves and conditional-error computation.
//!
//! Both curves are contracts: segment boundaries and endpoints must match
//! numerically across implementations, since downstream grade ladders and
//! tail-risk thresholds are calibrated against them.

use serde::{Deserialize, Serialize};

use crate::schema::{numeric_value, FieldMap, SCHEMA_FIELDS};

/// Map a mean absolute error to a [0, 100] score.
///
/// Segments: `[0,5): 100→90`, `[5,20): 90→70`, `[20,50): 70→50`,
/// `[50,100): 50→30`, `[100,200): 30→15`, then a slow decay floored at 5.
pub fn mae_to_score(mae: f64) -> f64 {
    if mae < 5.0 {
        100.0 - (mae / 5.0) * 10.0
    } else if mae < 20.0 {
        90.0 - ((mae - 5.0) / 15.0) * 20.0
    } else if mae < 50.0 {
        70.0 - ((mae - 20.0) / 30.0) * 20.0
    } else if mae < 100.0 {
        50.0 - ((mae - 50.0) / 50.0) * 20.0
    } else if mae < 200.0 {
        30.0 - ((mae - 100.0) / 100.0) * 15.0
    } else {
        (15.0 - ((mae - 200.0) / 100.0) * 10.0).max(5.0)
    }
}

/// Map a root-mean-square error to a [0, 100] score.
///
/// Same shape as [`mae_to_score`] with breakpoints 10/50/100/200/300.
pub fn rmse_to_score(rmse: f64) -> f64 {
    if rmse < 10.0 {
        100.0 - (rmse / 10.0) * 10.0
    } else if rmse < 50.0 {
        90.0 - ((rmse - 10.0) / 40.0) * 20.0
    } else if rmse < 100.0 {
        70.0 - ((rmse - 50.0) / 50.0) * 20.0
    } else if rmse < 200.0 {
        50.0 - ((rmse - 100.0) / 100.0) * 20.0
    } else if rmse < 300.0 {
        30.0 - ((rmse - 200.0) / 100.0) * 15.0
    } else {
        (15.0 - ((rmse - 300.0) / 100.0) * 10.0).max(5.0)
    }
}

/// Prediction error against the reference state, with curve scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalError {
    pub mae: f64,
    pub rmse: f64,
    pub mae_score: f64,
    pub rmse_score: f64,
    /// Arithmetic mean of the two curve scores; the predictive-quality
    /// dimension score is this divided by 100.
    pub combined_score: f64,
}

/// Compute the conditional error of a prediction against gold.
///
/// Per-field absolute errors are collected over every schema field present
/// in both maps; array values are compared element-wise, zipping on the
/// shorter side. Returns `None` when no comparable value pair exists.
pub fn conditional_error(prediction: &FieldMap, gold: &FieldMap) -> Option<ConditionalError> {
    let mut errors: Vec<f64> = Vec::new();

    for field in SCHEMA_FIELDS {
        let (pred, truth) = match (prediction.get(field), gold.get(field)) {
            (Some(p), Some(g)) => (p, g),
            _ => continue,
        };
        for (p, g) in pred.timesteps().into_iter().zip(truth.timesteps()) {
            if let (Some(p), Some(g)) = (numeric_value(p), numeric_value(g)) {
                errors.push((p - g).abs());
            }
        }
    }

    if errors.is_empty() {
        return None;
    }

    let n = errors.len() as f64;
    let mae = errors.iter().sum::<f64>() / n;
    let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
    let mae_score = mae_to_score(mae);
    let rmse_score = rmse_to_score(rmse);

    Some(ConditionalError {
        mae,
        rmse,
        mae_score,
        rmse_score,
        combined_score: (mae_score + rmse_score) / 2.0,
    })
}
