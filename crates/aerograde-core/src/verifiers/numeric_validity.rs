//! Numeric-validity checks: missing fields, NaN/Inf, junk strings.

use crate::evidence::{AtomDraft, EvidenceType, Severity};
use crate::graph::{Verifier, VerifierError, VerifyContext};
use crate::schema::{numeric_value, FieldMap, FieldValue};

pub(super) const ID: &str = "NUMERIC_VALIDITY";
const CHECKER: &str = "NumericValidityChecker";

/// First node in the graph: every later check assumes this one ran.
pub struct NumericValidityChecker;

impl NumericValidityChecker {
    pub fn new() -> Self {
        Self
    }

    fn check_value(
        &self,
        field_label: String,
        value: &serde_json::Value,
        drafts: &mut Vec<AtomDraft>,
    ) {
        if numeric_value(value).is_some() {
            drafts.push(
                AtomDraft::pass(
                    EvidenceType::NumericValidity,
                    format!("field {} has a valid numeric value", field_label),
                )
                .field(field_label)
                .meta("checker", CHECKER)
                .meta("rule", "valid_value")
                .meta("value", value.to_string()),
            );
        } else {
            drafts.push(
                AtomDraft::fail(
                    EvidenceType::NumericValidity,
                    Severity::Critical,
                    format!("field {} has invalid numeric value: {}", field_label, value),
                )
                .field(field_label)
                .meta("checker", CHECKER)
                .meta("rule", "invalid_value")
                .meta("value", value.to_string()),
            );
        }
    }
}

impl Default for NumericValidityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier for NumericValidityChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn evidence_type(&self) -> EvidenceType {
        EvidenceType::NumericValidity
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["numeric_validity"]
    }

    fn verify(
        &self,
        fields: &FieldMap,
        ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError> {
        let mut drafts = Vec::new();

        for &field in ctx.required_fields {
            let Some(value) = fields.get(field) else {
                drafts.push(
                    AtomDraft::fail(
                        EvidenceType::NumericValidity,
                        Severity::Critical,
                        format!("field {} is missing", field),
                    )
                    .field(field)
                    .meta("checker", CHECKER)
                    .meta("rule", "missing"),
                );
                continue;
            };

            match value {
                FieldValue::Scalar(v) => self.check_value(field.to_string(), v, &mut drafts),
                FieldValue::Series(vs) => {
                    for (i, v) in vs.iter().enumerate() {
                        self.check_value(format!("{}[{}]", field, i), v, &mut drafts);
                    }
                }
            }
        }

        Ok(drafts)
    }
}
