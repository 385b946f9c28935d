//! Run configuration: task specs, field limits, jump thresholds.
//!
//! Configuration is loaded once per run and frozen; its hash is stamped into
//! every record (see [`crate::trace`]). All maps are ordered so serialized
//! bytes, and therefore hashes, are stable.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{F_GROUND_TRACK, F_MAG_HEADING, SCHEMA_FIELDS};

/// Fatal configuration problems. Per-run, not per-sample.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field limits missing schema field: {0}")]
    MissingFieldLimit(String),

    #[error("malformed limit for {field}: [{lower}, {upper}]")]
    MalformedLimit { field: String, lower: f64, upper: f64 },

    #[error("malformed jump threshold for {field}: {threshold}")]
    MalformedThreshold { field: String, threshold: f64 },
}

/// Per-task specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    /// `single_value` for S1/M1, `array_value` for M3.
    pub protocol: String,
    /// File stem of the aligned reference-data stream.
    pub reference_source: String,
    /// Prediction horizon in seconds (array length for array-valued tasks).
    pub horizon: usize,
    /// Index shift applied when looking up gold records. Gold lookup is
    /// aligned by sample index; any dataset-specific shift lives here.
    #[serde(default)]
    pub gold_index_offset: usize,
}

/// Frozen evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub version: String,
    /// S1 / M1 / M3 task specs, keyed by task id string.
    pub task_specs: BTreeMap<String, TaskSpec>,
    /// Inclusive [lower, upper] bounds per schema field.
    pub field_limits: BTreeMap<String, (f64, f64)>,
    /// Maximum plausible adjacent-second change per field. Partial map.
    pub jump_thresholds: BTreeMap<String, f64>,
    /// Fields compared by circular difference.
    pub angle_fields: BTreeSet<String>,
}

impl EvalConfig {
    /// Load from a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: EvalConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the verifiers rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for field in SCHEMA_FIELDS {
            let (lower, upper) = self
                .field_limits
                .get(field)
                .copied()
                .ok_or_else(|| ConfigError::MissingFieldLimit(field.to_string()))?;
            if !lower.is_finite() || !upper.is_finite() || lower > upper {
                return Err(ConfigError::MalformedLimit {
                    field: field.to_string(),
                    lower,
                    upper,
                });
            }
        }
        for (field, &threshold) in &self.jump_thresholds {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ConfigError::MalformedThreshold {
                    field: field.clone(),
                    threshold,
                });
            }
        }
        Ok(())
    }

    pub fn field_limit(&self, field: &str) -> Option<(f64, f64)> {
        self.field_limits.get(field).copied()
    }

    pub fn jump_threshold(&self, field: &str) -> Option<f64> {
        self.jump_thresholds.get(field).copied()
    }

    pub fn is_angle_field(&self, field: &str) -> bool {
        self.angle_fields.contains(field)
    }

    pub fn task_spec(&self, task: crate::schema::TaskId) -> Option<&TaskSpec> {
        self.task_specs.get(&task.to_string())
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        let mut task_specs = BTreeMap::new();
        task_specs.insert(
            "S1".to_string(),
            TaskSpec {
                name: "Next Second Prediction".to_string(),
                protocol: "single_value".to_string(),
                reference_source: "next_second_pairs.jsonl".to_string(),
                horizon: 1,
                gold_index_offset: 0,
            },
        );
        task_specs.insert(
            "M1".to_string(),
            TaskSpec {
                name: "Next Second from 3-Window".to_string(),
                protocol: "single_value".to_string(),
                reference_source: "flight_3window_samples.jsonl".to_string(),
                horizon: 1,
                gold_index_offset: 0,
            },
        );
        task_specs.insert(
            "M3".to_string(),
            TaskSpec {
                name: "Next 3 Seconds from 3-Window".to_string(),
                protocol: "array_value".to_string(),
                reference_source: "flight_3window_samples.jsonl".to_string(),
                horizon: 3,
                gold_index_offset: 0,
            },
        );

        let field_limits: BTreeMap<String, (f64, f64)> = [
            ("Latitude (WGS84 deg)", (-90.0, 90.0)),
            ("Longitude (WGS84 deg)", (-180.0, 180.0)),
            ("GPS Altitude (WGS84 ft)", (-1000.0, 60000.0)),
            ("GPS Ground Track (deg true)", (0.0, 360.0)),
            ("Magnetic Heading (deg)", (0.0, 360.0)),
            ("GPS Velocity E (m/s)", (-200.0, 200.0)),
            ("GPS Velocity N (m/s)", (-200.0, 200.0)),
            ("GPS Velocity U (m/s)", (-100.0, 100.0)),
            ("GPS Ground Speed (kt)", (0.0, 500.0)),
            ("Roll (deg)", (-180.0, 180.0)),
            ("Pitch (deg)", (-90.0, 90.0)),
            ("Turn Rate (deg/sec)", (-60.0, 60.0)),
            ("Slip/Skid", (-10.0, 10.0)),
            ("Normal Acceleration (G)", (-10.0, 10.0)),
            ("Lateral Acceleration (G)", (-10.0, 10.0)),
            ("Vertical Speed (fpm)", (-10000.0, 10000.0)),
            ("Indicated Airspeed (kt)", (0.0, 500.0)),
            ("Baro Altitude (ft)", (-1000.0, 60000.0)),
            ("Pressure Altitude (ft)", (-1000.0, 60000.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let jump_thresholds: BTreeMap<String, f64> = [
            ("Latitude (WGS84 deg)", 0.01),
            ("Longitude (WGS84 deg)", 0.01),
            ("GPS Altitude (WGS84 ft)", 200.0),
            ("GPS Ground Track (deg true)", 30.0),
            ("Magnetic Heading (deg)", 30.0),
            ("GPS Velocity E (m/s)", 20.0),
            ("GPS Velocity N (m/s)", 20.0),
            ("GPS Velocity U (m/s)", 10.0),
            ("GPS Ground Speed (kt)", 20.0),
            ("Roll (deg)", 30.0),
            ("Pitch (deg)", 15.0),
            ("Turn Rate (deg/sec)", 10.0),
            ("Slip/Skid", 2.0),
            ("Normal Acceleration (G)", 2.0),
            ("Lateral Acceleration (G)", 2.0),
            ("Vertical Speed (fpm)", 1500.0),
            ("Indicated Airspeed (kt)", 20.0),
            ("Baro Altitude (ft)", 200.0),
            ("Pressure Altitude (ft)", 200.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let angle_fields: BTreeSet<String> = [F_GROUND_TRACK, F_MAG_HEADING]
            .into_iter()
            .map(|f| f.to_string())
            .collect();

        EvalConfig {
            version: "1.0.0".to_string(),
            task_specs,
            field_limits,
            jump_thresholds,
            angle_fields,
        }
    }
}
