//! The fixed avionics output schema.
//!
//! Every prediction task shares the same nineteen numeric fields. The schema
//! is fixed and enumerable: verifiers iterate [`SCHEMA_FIELDS`] in order, and
//! the parser keeps a string-keyed [`FieldMap`] view only at the boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The nineteen required output fields, in canonical order.
pub const SCHEMA_FIELDS: [&str; 19] = [
    "Latitude (WGS84 deg)",
    "Longitude (WGS84 deg)",
    "GPS Altitude (WGS84 ft)",
    "GPS Ground Track (deg true)",
    "Magnetic Heading (deg)",
    "GPS Velocity E (m/s)",
    "GPS Velocity N (m/s)",
    "GPS Velocity U (m/s)",
    "GPS Ground Speed (kt)",
    "Roll (deg)",
    "Pitch (deg)",
    "Turn Rate (deg/sec)",
    "Slip/Skid",
    "Normal Acceleration (G)",
    "Lateral Acceleration (G)",
    "Vertical Speed (fpm)",
    "Indicated Airspeed (kt)",
    "Baro Altitude (ft)",
    "Pressure Altitude (ft)",
];

// Field names referenced by name in cross-field, physics, and safety rules.
pub const F_LATITUDE: &str = "Latitude (WGS84 deg)";
pub const F_GPS_ALTITUDE: &str = "GPS Altitude (WGS84 ft)";
pub const F_BARO_ALTITUDE: &str = "Baro Altitude (ft)";
pub const F_GROUND_TRACK: &str = "GPS Ground Track (deg true)";
pub const F_MAG_HEADING: &str = "Magnetic Heading (deg)";
pub const F_VELOCITY_E: &str = "GPS Velocity E (m/s)";
pub const F_VELOCITY_N: &str = "GPS Velocity N (m/s)";
pub const F_VELOCITY_U: &str = "GPS Velocity U (m/s)";
pub const F_GROUND_SPEED: &str = "GPS Ground Speed (kt)";
pub const F_ROLL: &str = "Roll (deg)";
pub const F_PITCH: &str = "Pitch (deg)";
pub const F_VERTICAL_SPEED: &str = "Vertical Speed (fpm)";
pub const F_AIRSPEED: &str = "Indicated Airspeed (kt)";

/// Prediction task identifier.
///
/// S1 and M1 predict a single next-second state; M3 predicts a short
/// multi-second horizon where every field is an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskId {
    S1,
    M1,
    M3,
}

impl TaskId {
    /// All tasks, in reporting order.
    pub const ALL: [TaskId; 3] = [TaskId::S1, TaskId::M1, TaskId::M3];

    /// Whether the task's output schema is array-valued per field.
    pub fn is_multi_step(self) -> bool {
        matches!(self, TaskId::M3)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::S1 => write!(f, "S1"),
            TaskId::M1 => write!(f, "M1"),
            TaskId::M3 => write!(f, "M3"),
        }
    }
}

impl FromStr for TaskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S1" => Ok(TaskId::S1),
            "M1" => Ok(TaskId::M1),
            "M3" => Ok(TaskId::M3),
            other => Err(format!("unknown task id: {}", other)),
        }
    }
}

/// A single field's value as extracted from the reply.
///
/// Values are preserved verbatim (including non-numeric junk) so the
/// numeric-validity verifier can reject them with evidence; conversion is
/// deferred to [`numeric_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Series(Vec<Value>),
    Scalar(Value),
}

impl FieldValue {
    /// View the value as a slice of timesteps; a scalar is a length-1 series.
    pub fn timesteps(&self) -> Vec<&Value> {
        match self {
            FieldValue::Scalar(v) => vec![v],
            FieldValue::Series(vs) => vs.iter().collect(),
        }
    }

    /// Number of timesteps carried (1 for scalars).
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Scalar(_) => 1,
            FieldValue::Series(vs) => vs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recent value: the scalar itself, or the last array element.
    pub fn last(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(v) => Some(v),
            FieldValue::Series(vs) => vs.last(),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Array(vs) => FieldValue::Series(vs),
            other => FieldValue::Scalar(other),
        }
    }
}

/// Parsed reply: field name → scalar or array value.
///
/// Absent keys model missing fields. Keys outside the schema are retained
/// (they do not fail verification but are visible in the record).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMap(pub BTreeMap<String, FieldValue>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(field.into(), value.into());
    }

    /// Schema fields absent from this map, in schema order.
    pub fn missing_fields(&self) -> Vec<String> {
        SCHEMA_FIELDS
            .iter()
            .filter(|f| !self.contains(f))
            .map(|f| f.to_string())
            .collect()
    }
}

impl From<serde_json::Map<String, Value>> for FieldMap {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        FieldMap(map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect())
    }
}

/// Convert a raw JSON value to a finite f64, accepting numeric strings.
///
/// Returns `None` for null, non-finite numbers, the conventional junk
/// strings (`null`, `none`, `nan`, `n/a`, `undefined`, empty), and anything
/// that does not parse as a real number.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.to_ascii_lowercase().as_str() {
                "null" | "none" | "nan" | "n/a" | "undefined" => None,
                _ => trimmed.parse::<f64>().ok().filter(|f| f.is_finite()),
            }
        }
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Circular difference between two angles in degrees, in [0, 180].
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}
