//! Jump-dynamics checks: implausibly large changes between seconds.
//!
//! Two modes. Multi-step arrays are checked internally, step against step.
//! Single-step tasks are checked against the same model's most recent
//! committed prediction for the field; with no prior the field is simply
//! not yet constrained and no atom is emitted.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::EvalConfig;
use crate::evidence::{AtomDraft, EvidenceType, Severity};
use crate::graph::{Verifier, VerifierError, VerifyContext};
use crate::schema::{angle_difference, numeric_value, FieldMap, FieldValue, TaskId};

pub(super) const ID: &str = "JUMP_DYNAMICS";
const CHECKER: &str = "JumpDynamicsChecker";

/// Severity boundary: observed change beyond twice the threshold is critical.
const CRITICAL_RATIO: f64 = 2.0;

pub struct JumpDynamicsChecker {
    thresholds: BTreeMap<String, f64>,
    angle_fields: BTreeSet<String>,
}

impl JumpDynamicsChecker {
    pub fn new(config: &EvalConfig) -> Self {
        Self {
            thresholds: config.jump_thresholds.clone(),
            angle_fields: config.angle_fields.clone(),
        }
    }

    fn change(&self, field: &str, prev: f64, curr: f64) -> f64 {
        if self.angle_fields.contains(field) {
            angle_difference(curr, prev)
        } else {
            (curr - prev).abs()
        }
    }

    fn fail_severity(max_change: f64, threshold: f64) -> Severity {
        if threshold > 0.0 && max_change / threshold > CRITICAL_RATIO {
            Severity::Critical
        } else {
            Severity::Warning
        }
    }

    /// Adjacent-step scan over an array value. Returns (max_change, first
    /// violating step) when at least one numeric pair exists.
    fn scan_series(&self, field: &str, threshold: f64, values: &[serde_json::Value]) -> Option<(f64, Option<usize>)> {
        let mut max_change: Option<f64> = None;
        let mut violation_step = None;
        for i in 1..values.len() {
            let (Some(prev), Some(curr)) = (
                numeric_value(&values[i - 1]),
                numeric_value(&values[i]),
            ) else {
                continue;
            };
            let change = self.change(field, prev, curr);
            if change > threshold && violation_step.is_none() {
                violation_step = Some(i);
            }
            max_change = Some(max_change.map_or(change, |m: f64| m.max(change)));
        }
        max_change.map(|m| (m, violation_step))
    }

    fn check_field(
        &self,
        field: &'static str,
        value: &FieldValue,
        ctx: &VerifyContext<'_>,
        drafts: &mut Vec<AtomDraft>,
    ) {
        let Some(threshold) = self.thresholds.get(field).copied() else {
            return;
        };

        if ctx.task == TaskId::M3 {
            let FieldValue::Series(values) = value else {
                return;
            };
            if values.len() < 2 {
                return;
            }
            let Some((max_change, violation)) = self.scan_series(field, threshold, values) else {
                return;
            };
            match violation {
                Some(step) => drafts.push(
                    AtomDraft::fail(
                        EvidenceType::JumpDynamics,
                        Self::fail_severity(max_change, threshold),
                        format!(
                            "field {} mutation too large at step {}: max change {:.6} > {:.6}",
                            field, step, max_change, threshold
                        ),
                    )
                    .field(field)
                    .meta("checker", CHECKER)
                    .meta("rule", "m3_array_jump")
                    .meta("threshold", threshold)
                    .meta("max_change", max_change)
                    .meta("violation_ratio", max_change / threshold),
                ),
                None => drafts.push(
                    AtomDraft::pass(
                        EvidenceType::JumpDynamics,
                        format!("field {} mutation check passed", field),
                    )
                    .field(field)
                    .meta("checker", CHECKER)
                    .meta("rule", "m3_array_jump")
                    .meta("threshold", threshold)
                    .meta("max_change", max_change),
                ),
            }
            return;
        }

        // S1/M1: compare against the previously committed prediction. The
        // field is unconstrained until a prior exists.
        let Some(prev_value) = ctx.previous.and_then(|p| p.get(field)) else {
            return;
        };
        let (Some(prev), Some(curr)) = (
            prev_value.last().and_then(numeric_value),
            value.last().and_then(numeric_value),
        ) else {
            return;
        };

        let change = self.change(field, prev, curr);
        if change > threshold {
            drafts.push(
                AtomDraft::fail(
                    EvidenceType::JumpDynamics,
                    Self::fail_severity(change, threshold),
                    format!(
                        "field {} mutation too large: {:.6} > {:.6}",
                        field, change, threshold
                    ),
                )
                .field(field)
                .meta("checker", CHECKER)
                .meta("rule", "single_step_jump")
                .meta("threshold", threshold)
                .meta("max_change", change)
                .meta("violation_ratio", change / threshold),
            );
        } else {
            drafts.push(
                AtomDraft::pass(
                    EvidenceType::JumpDynamics,
                    format!("field {} mutation check passed", field),
                )
                .field(field)
                .meta("checker", CHECKER)
                .meta("rule", "single_step_jump")
                .meta("threshold", threshold)
                .meta("max_change", change),
            );
        }
    }
}

impl Verifier for JumpDynamicsChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn evidence_type(&self) -> EvidenceType {
        EvidenceType::JumpDynamics
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["jump_dynamics"]
    }

    fn verify(
        &self,
        fields: &FieldMap,
        ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError> {
        let mut drafts = Vec::new();
        for &field in ctx.required_fields {
            if let Some(value) = fields.get(field) {
                self.check_field(field, value, ctx, &mut drafts);
            }
        }
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checker() -> JumpDynamicsChecker {
        JumpDynamicsChecker::new(&EvalConfig::default())
    }

    fn ctx_with<'a>(
        task: TaskId,
        previous: Option<&'a BTreeMap<String, FieldValue>>,
    ) -> VerifyContext<'a> {
        VerifyContext {
            task,
            required_fields: &["GPS Altitude (WGS84 ft)", "GPS Ground Track (deg true)"],
            previous,
            gold: None,
        }
    }

    #[test]
    fn m3_array_violation_reports_max_change() {
        // Altitude threshold is 200; the 1010 -> 5000 step is the maximum.
        let mut fields = FieldMap::new();
        fields.insert("GPS Altitude (WGS84 ft)", json!([1000.0, 1010.0, 5000.0, 5010.0]));

        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::M3, None))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(!drafts[0].pass);
        assert_eq!(drafts[0].severity, Severity::Critical);
        let max_change = drafts[0].meta.get("max_change").unwrap().as_f64().unwrap();
        assert!((max_change - 3990.0).abs() < 1e-9);
    }

    #[test]
    fn m3_smooth_array_passes() {
        let mut fields = FieldMap::new();
        fields.insert("GPS Altitude (WGS84 ft)", json!([1000.0, 1050.0, 1100.0]));
        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::M3, None))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].pass);
    }

    #[test]
    fn single_step_without_prior_emits_nothing() {
        let mut fields = FieldMap::new();
        fields.insert("GPS Altitude (WGS84 ft)", json!(1000.0));
        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::S1, None))
            .unwrap();
        assert!(drafts.is_empty());
    }

    #[test]
    fn single_step_against_prior_uses_last_array_element() {
        let mut previous = BTreeMap::new();
        previous.insert(
            "GPS Altitude (WGS84 ft)".to_string(),
            FieldValue::from(json!([900.0, 950.0, 1000.0])),
        );

        let mut fields = FieldMap::new();
        fields.insert("GPS Altitude (WGS84 ft)", json!(1250.0));

        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::S1, Some(&previous)))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        // Change is measured from the prior array's last element (1000),
        // so 250 exceeds the 200 threshold.
        assert!(!drafts[0].pass);
        assert_eq!(drafts[0].severity, Severity::Warning);
        let change = drafts[0].meta.get("max_change").unwrap().as_f64().unwrap();
        assert!((change - 250.0).abs() < 1e-9);
    }

    #[test]
    fn severity_scales_with_violation_ratio() {
        let mut previous = BTreeMap::new();
        previous.insert(
            "GPS Altitude (WGS84 ft)".to_string(),
            FieldValue::from(json!(1000.0)),
        );

        // 300 over threshold 200: ratio 1.5 -> warning.
        let mut fields = FieldMap::new();
        fields.insert("GPS Altitude (WGS84 ft)", json!(1300.0));
        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::S1, Some(&previous)))
            .unwrap();
        assert_eq!(drafts[0].severity, Severity::Warning);

        // 500 over threshold 200: ratio 2.5 -> critical.
        let mut fields = FieldMap::new();
        fields.insert("GPS Altitude (WGS84 ft)", json!(1500.0));
        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::S1, Some(&previous)))
            .unwrap();
        assert_eq!(drafts[0].severity, Severity::Critical);
    }

    #[test]
    fn angle_fields_use_circular_difference() {
        let mut previous = BTreeMap::new();
        previous.insert(
            "GPS Ground Track (deg true)".to_string(),
            FieldValue::from(json!(355.0)),
        );

        // 355 -> 5 is a 10-degree change, well under the 30-degree threshold.
        let mut fields = FieldMap::new();
        fields.insert("GPS Ground Track (deg true)", json!(5.0));
        let drafts = checker()
            .verify(&fields, &ctx_with(TaskId::S1, Some(&previous)))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].pass);
    }
}
