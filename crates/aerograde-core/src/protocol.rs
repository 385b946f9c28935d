//! Protocol summary: did the reply parse, and how complete is it?

use serde::{Deserialize, Serialize};

use crate::parser::ParseOutcome;
use crate::schema::{FieldMap, SCHEMA_FIELDS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCompleteness {
    /// Share of required fields present, in percent [0, 100].
    pub completeness_rate: f64,
    /// Absent fields in schema order.
    pub missing_fields: Vec<String>,
}

/// Parsing + completeness summary for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolResult {
    pub parsing: ParsingResult,
    pub field_completeness: FieldCompleteness,
}

impl ProtocolResult {
    /// Summarize a parse outcome against the expected schema.
    pub fn summarize(outcome: &ParseOutcome) -> Self {
        match outcome {
            ParseOutcome::Parsed(map) => Self::from_field_map(map),
            ParseOutcome::TransportError { marker } => Self::failed(format!(
                "transport error detected in reply: {}",
                marker
            )),
            ParseOutcome::NoJson => Self::failed("no JSON object found in reply".to_string()),
        }
    }

    fn from_field_map(map: &FieldMap) -> Self {
        let missing_fields = map.missing_fields();
        let present = SCHEMA_FIELDS.len() - missing_fields.len();
        let completeness_rate = present as f64 / SCHEMA_FIELDS.len() as f64 * 100.0;
        ProtocolResult {
            parsing: ParsingResult {
                success: true,
                error: None,
            },
            field_completeness: FieldCompleteness {
                completeness_rate,
                missing_fields,
            },
        }
    }

    /// The fixed shape for a reply that never produced a field map.
    pub fn failed(error: String) -> Self {
        ProtocolResult {
            parsing: ParsingResult {
                success: false,
                error: Some(error),
            },
            field_completeness: FieldCompleteness {
                completeness_rate: 0.0,
                missing_fields: SCHEMA_FIELDS.iter().map(|f| f.to_string()).collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_reply;
    use serde_json::json;

    #[test]
    fn full_map_is_fully_complete() {
        let mut map = FieldMap::new();
        for field in SCHEMA_FIELDS {
            map.insert(field, json!(0.0));
        }
        let result = ProtocolResult::summarize(&ParseOutcome::Parsed(map));
        assert!(result.parsing.success);
        assert_eq!(result.field_completeness.completeness_rate, 100.0);
        assert!(result.field_completeness.missing_fields.is_empty());
    }

    #[test]
    fn partial_map_reports_missing_fields() {
        let mut map = FieldMap::new();
        map.insert("Pitch (deg)", json!(1.0));
        let result = ProtocolResult::summarize(&ParseOutcome::Parsed(map));
        assert!(result.parsing.success);
        assert_eq!(result.field_completeness.missing_fields.len(), 18);
        assert!((result.field_completeness.completeness_rate - 100.0 / 19.0).abs() < 1e-9);
    }

    #[test]
    fn parse_failure_has_fixed_shape() {
        let result = ProtocolResult::summarize(&parse_reply("not json at all"));
        assert!(!result.parsing.success);
        assert_eq!(result.field_completeness.completeness_rate, 0.0);
        assert_eq!(result.field_completeness.missing_fields.len(), 19);
    }
}
