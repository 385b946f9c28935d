//! Reproducibility envelope: content hashes and the per-record trace.
//!
//! Hashes are computed over canonical (sorted-key) JSON bytes, so identical
//! configuration always yields byte-identical hashes across runs and
//! machines. Every emitted record carries a [`Trace`].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EvalConfig;
use crate::schema::SCHEMA_FIELDS;

/// Version of the evaluator itself, stamped into every trace.
pub const EVALUATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// First 16 hex chars of the SHA-256, the width used in traces.
pub fn sha256_hex16(bytes: &[u8]) -> String {
    let mut hex = sha256_hex(bytes);
    hex.truncate(16);
    hex
}

/// Hash of the full frozen configuration.
pub fn config_hash(config: &EvalConfig) -> String {
    // EvalConfig's maps are BTree-ordered, so this serialization is canonical.
    let bytes = serde_json::to_vec(config).unwrap_or_default();
    sha256_hex16(&bytes)
}

/// Hash of the fixed output schema (the nineteen ordered field names).
pub fn schema_hash() -> String {
    let joined = SCHEMA_FIELDS.join("\n");
    sha256_hex16(joined.as_bytes())
}

/// Hash of the constraint library: field limits, jump thresholds, angle set.
pub fn constraint_lib_hash(config: &EvalConfig) -> String {
    let subset = serde_json::json!({
        "field_limits": config.field_limits,
        "jump_thresholds": config.jump_thresholds,
        "angle_fields": config.angle_fields,
    });
    sha256_hex16(subset.to_string().as_bytes())
}

/// The reproducibility stamp carried by every record and by the run-level
/// version-info envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub config_hash: String,
    pub schema_hash: String,
    pub constraint_lib_hash: String,
    pub evaluator_version: String,
    /// ISO-8601 UTC timestamp of emission.
    pub timestamp: String,
    /// Identifier of the LLM judge model, when the LLM adjudicator ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge_model: Option<String>,
}

impl Trace {
    /// Stamp a trace for the given frozen configuration.
    pub fn stamp(config: &EvalConfig, judge_model: Option<String>) -> Self {
        Trace {
            config_hash: config_hash(config),
            schema_hash: schema_hash(),
            constraint_lib_hash: constraint_lib_hash(config),
            evaluator_version: EVALUATOR_VERSION.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            judge_model,
        }
    }
}
