//! Range-sanity checks against the configured per-field limits.

use std::collections::BTreeMap;

use crate::config::EvalConfig;
use crate::evidence::{AtomDraft, EvidenceType, Severity};
use crate::graph::{Verifier, VerifierError, VerifyContext};
use crate::schema::{numeric_value, FieldMap, FieldValue};

pub(super) const ID: &str = "RANGE_SANITY";
const CHECKER: &str = "RangeSanityChecker";

/// Checks every present value against its inclusive `[lower, upper]` bound.
///
/// Severity scales with how far outside the bound a value lands, normalized
/// by the bound width: beyond half the width is critical, anything else is
/// a warning.
pub struct RangeSanityChecker {
    field_limits: BTreeMap<String, (f64, f64)>,
}

impl RangeSanityChecker {
    pub fn new(config: &EvalConfig) -> Self {
        Self {
            field_limits: config.field_limits.clone(),
        }
    }

    fn check_value(
        &self,
        field: &str,
        field_label: String,
        value: &serde_json::Value,
        drafts: &mut Vec<AtomDraft>,
    ) {
        let Some((lower, upper)) = self.field_limits.get(field).copied() else {
            return;
        };

        // Non-numeric values already failed numeric validity upstream; a
        // second atom here would double-count the same defect.
        let Some(v) = numeric_value(value) else {
            return;
        };

        if v >= lower && v <= upper {
            drafts.push(
                AtomDraft::pass(
                    EvidenceType::RangeSanity,
                    format!("field {} within valid range", field_label),
                )
                .field(field_label)
                .meta("checker", CHECKER)
                .meta("rule", "range")
                .meta("lower", lower)
                .meta("upper", upper)
                .meta("value", v),
            );
            return;
        }

        let nearest = if v < lower { lower } else { upper };
        let width = upper - lower;
        let excess = if width > 0.0 {
            (v - nearest).abs() / width
        } else {
            1.0
        };
        let severity = if excess > 0.5 {
            Severity::Critical
        } else {
            Severity::Warning
        };

        drafts.push(
            AtomDraft::fail(
                EvidenceType::RangeSanity,
                severity,
                format!(
                    "field {} out of range: {} not in [{}, {}]",
                    field_label, v, lower, upper
                ),
            )
            .field(field_label)
            .meta("checker", CHECKER)
            .meta("rule", "range")
            .meta("lower", lower)
            .meta("upper", upper)
            .meta("value", v)
            .meta("normalized_excess", excess),
        );
    }
}

impl Verifier for RangeSanityChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn evidence_type(&self) -> EvidenceType {
        EvidenceType::RangeSanity
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["range_sanity"]
    }

    fn verify(
        &self,
        fields: &FieldMap,
        ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError> {
        let mut drafts = Vec::new();

        for &field in ctx.required_fields {
            // Missing fields are the numeric-validity checker's finding.
            let Some(value) = fields.get(field) else {
                continue;
            };
            match value {
                FieldValue::Scalar(v) => {
                    self.check_value(field, field.to_string(), v, &mut drafts)
                }
                FieldValue::Series(vs) => {
                    for (i, v) in vs.iter().enumerate() {
                        self.check_value(field, format!("{}[{}]", field, i), v, &mut drafts);
                    }
                }
            }
        }

        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TaskId;
    use serde_json::json;

    fn run(fields: &FieldMap, required: &'static [&'static str]) -> Vec<AtomDraft> {
        let checker = RangeSanityChecker::new(&EvalConfig::default());
        let ctx = VerifyContext {
            task: TaskId::S1,
            required_fields: required,
            previous: None,
            gold: None,
        };
        checker.verify(fields, &ctx).unwrap()
    }

    #[test]
    fn in_range_value_passes() {
        let mut fields = FieldMap::new();
        fields.insert("Pitch (deg)", json!(10.0));
        let drafts = run(&fields, &["Pitch (deg)"]);
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].pass);
    }

    #[test]
    fn slightly_out_of_range_is_warning() {
        // Pitch limits are [-90, 90]; 95 exceeds by 5/180 of the width.
        let mut fields = FieldMap::new();
        fields.insert("Pitch (deg)", json!(95.0));
        let drafts = run(&fields, &["Pitch (deg)"]);
        assert!(!drafts[0].pass);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn far_out_of_range_is_critical() {
        // 200 exceeds the upper bound by 110/180 > 0.5 of the width.
        let mut fields = FieldMap::new();
        fields.insert("Pitch (deg)", json!(200.0));
        let drafts = run(&fields, &["Pitch (deg)"]);
        assert!(!drafts[0].pass);
        assert_eq!(drafts[0].severity, Severity::Critical);
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut fields = FieldMap::new();
        fields.insert("Pitch (deg)", json!(90.0));
        let drafts = run(&fields, &["Pitch (deg)"]);
        assert!(drafts[0].pass);
    }

    #[test]
    fn non_numeric_is_left_to_numeric_validity() {
        let mut fields = FieldMap::new();
        fields.insert("Pitch (deg)", json!("steep"));
        assert!(run(&fields, &["Pitch (deg)"]).is_empty());
    }

    #[test]
    fn arrays_emit_one_atom_per_value() {
        let mut fields = FieldMap::new();
        fields.insert("Pitch (deg)", json!([0.0, 95.0, 10.0]));
        let drafts = run(&fields, &["Pitch (deg)"]);
        assert_eq!(drafts.len(), 3);
        assert!(drafts[0].pass);
        assert!(!drafts[1].pass);
        assert!(drafts[2].pass);
    }

    #[test]
    fn missing_field_emits_nothing() {
        let drafts = run(&FieldMap::new(), &["Pitch (deg)"]);
        assert!(drafts.is_empty());
    }
}
