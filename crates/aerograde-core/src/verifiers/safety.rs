//! Safety-constraint checks over the predicted state.
//!
//! All four rules evaluate per timestep and emit atoms only on failure;
//! dense pass atoms are omitted to bound evidence size.

use crate::evidence::{AtomDraft, EvidenceType, Scope, Severity};
use crate::graph::{Verifier, VerifierError, VerifyContext};
use crate::schema::{
    numeric_value, FieldMap, F_AIRSPEED, F_GPS_ALTITUDE, F_PITCH, F_VERTICAL_SPEED,
};

pub(super) const ID: &str = "SAFETY_CONSTRAINT";
const CHECKER: &str = "SafetyConstraintChecker";

const RAPID_DESCENT_CRITICAL_FPM: f64 = -3000.0;
const RAPID_DESCENT_WARNING_FPM: f64 = -2000.0;
const STALL_SPEED_KT: f64 = 30.0;
const OVERSPEED_KT: f64 = 180.0;
const MAX_ALTITUDE_FT: f64 = 15000.0;

// Stall composite thresholds.
const STALL_COMPOSITE_IAS_KT: f64 = 50.0;
const STALL_COMPOSITE_PITCH_DEG: f64 = 15.0;
const STALL_COMPOSITE_VS_FPM: f64 = 500.0;

pub struct SafetyConstraintChecker;

impl SafetyConstraintChecker {
    pub fn new() -> Self {
        Self
    }

    fn numeric_steps(fields: &FieldMap, field: &str) -> Vec<Option<f64>> {
        fields
            .get(field)
            .map(|v| v.timesteps().into_iter().map(numeric_value).collect())
            .unwrap_or_default()
    }

    fn prefix(multi_step: bool, idx: usize) -> String {
        if multi_step {
            format!("[t={}] ", idx)
        } else {
            String::new()
        }
    }

    fn rapid_descent(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let vs_steps = Self::numeric_steps(fields, F_VERTICAL_SPEED);
        let multi_step = vs_steps.len() > 1;
        for (idx, vs) in vs_steps.into_iter().enumerate() {
            let Some(vs) = vs else { continue };
            let (severity, threshold) = if vs < RAPID_DESCENT_CRITICAL_FPM {
                (Severity::Critical, RAPID_DESCENT_CRITICAL_FPM)
            } else if vs < RAPID_DESCENT_WARNING_FPM {
                (Severity::Warning, RAPID_DESCENT_WARNING_FPM)
            } else {
                continue;
            };
            let mut draft = AtomDraft::fail(
                EvidenceType::SafetyConstraint,
                severity,
                format!(
                    "{}rapid descent: {:.1} fpm (threshold {:.0} fpm)",
                    Self::prefix(multi_step, idx),
                    vs,
                    threshold
                ),
            )
            .field("Rapid_Descent")
            .scope(Scope::Sample)
            .meta("checker", CHECKER)
            .meta("rule", "rapid_descent")
            .meta("vertical_speed", vs)
            .meta("threshold", threshold);
            if multi_step {
                draft = draft.meta("timestep", idx as u64);
            }
            drafts.push(draft);
        }
    }

    fn extreme_airspeed(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let ias_steps = Self::numeric_steps(fields, F_AIRSPEED);
        let multi_step = ias_steps.len() > 1;
        for (idx, ias) in ias_steps.into_iter().enumerate() {
            let Some(ias) = ias else { continue };
            let (severity, threshold, label) = if ias < STALL_SPEED_KT {
                (Severity::Critical, STALL_SPEED_KT, "stall risk")
            } else if ias > OVERSPEED_KT {
                (Severity::Warning, OVERSPEED_KT, "overspeed")
            } else {
                continue;
            };
            let mut draft = AtomDraft::fail(
                EvidenceType::SafetyConstraint,
                severity,
                format!(
                    "{}extreme airspeed: {:.1} kt ({} threshold {:.0} kt)",
                    Self::prefix(multi_step, idx),
                    ias,
                    label,
                    threshold
                ),
            )
            .field("Extreme_Speed")
            .scope(Scope::Field)
            .meta("checker", CHECKER)
            .meta("rule", "extreme_speed")
            .meta("airspeed", ias)
            .meta("threshold", threshold);
            if multi_step {
                draft = draft.meta("timestep", idx as u64);
            }
            drafts.push(draft);
        }
    }

    fn extreme_altitude(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let alt_steps = Self::numeric_steps(fields, F_GPS_ALTITUDE);
        let multi_step = alt_steps.len() > 1;
        for (idx, alt) in alt_steps.into_iter().enumerate() {
            let Some(alt) = alt else { continue };
            let (severity, threshold, label) = if alt < 0.0 {
                (Severity::Critical, 0.0, "ground contact risk")
            } else if alt > MAX_ALTITUDE_FT {
                (Severity::Warning, MAX_ALTITUDE_FT, "high altitude")
            } else {
                continue;
            };
            let mut draft = AtomDraft::fail(
                EvidenceType::SafetyConstraint,
                severity,
                format!(
                    "{}extreme altitude: {:.1} ft ({} threshold {:.0} ft)",
                    Self::prefix(multi_step, idx),
                    alt,
                    label,
                    threshold
                ),
            )
            .field("Extreme_Altitude")
            .scope(Scope::Field)
            .meta("checker", CHECKER)
            .meta("rule", "extreme_altitude")
            .meta("altitude", alt)
            .meta("threshold", threshold);
            if multi_step {
                draft = draft.meta("timestep", idx as u64);
            }
            drafts.push(draft);
        }
    }

    fn stall_composite(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let ias_steps = Self::numeric_steps(fields, F_AIRSPEED);
        let pitch_steps = Self::numeric_steps(fields, F_PITCH);
        let vs_steps = Self::numeric_steps(fields, F_VERTICAL_SPEED);
        if ias_steps.is_empty() || pitch_steps.is_empty() || vs_steps.is_empty() {
            return;
        }
        let multi_step = ias_steps.len() > 1;
        for (idx, ((ias, pitch), vs)) in ias_steps
            .into_iter()
            .zip(pitch_steps)
            .zip(vs_steps)
            .enumerate()
        {
            let (Some(ias), Some(pitch), Some(vs)) = (ias, pitch, vs) else {
                continue;
            };
            if ias < STALL_COMPOSITE_IAS_KT
                && pitch > STALL_COMPOSITE_PITCH_DEG
                && vs < STALL_COMPOSITE_VS_FPM
            {
                let mut draft = AtomDraft::fail(
                    EvidenceType::SafetyConstraint,
                    Severity::Critical,
                    format!(
                        "{}stall-like condition: airspeed {:.1}kt, pitch {:.1} deg, vertical speed {:.1}fpm",
                        Self::prefix(multi_step, idx),
                        ias,
                        pitch,
                        vs
                    ),
                )
                .field("Stall_Condition")
                .scope(Scope::Sample)
                .meta("checker", CHECKER)
                .meta("rule", "stall_condition")
                .meta("airspeed", ias)
                .meta("pitch", pitch)
                .meta("vertical_speed", vs);
                if multi_step {
                    draft = draft.meta("timestep", idx as u64);
                }
                drafts.push(draft);
            }
        }
    }
}

impl Default for SafetyConstraintChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier for SafetyConstraintChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn evidence_type(&self) -> EvidenceType {
        EvidenceType::SafetyConstraint
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["safety_constraints"]
    }

    fn verify(
        &self,
        fields: &FieldMap,
        _ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError> {
        let mut drafts = Vec::new();
        self.rapid_descent(fields, &mut drafts);
        self.extreme_airspeed(fields, &mut drafts);
        self.extreme_altitude(fields, &mut drafts);
        self.stall_composite(fields, &mut drafts);
        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TaskId;
    use serde_json::json;

    fn run(fields: &FieldMap) -> Vec<AtomDraft> {
        let ctx = VerifyContext {
            task: TaskId::S1,
            required_fields: &[],
            previous: None,
            gold: None,
        };
        SafetyConstraintChecker::new().verify(fields, &ctx).unwrap()
    }

    #[test]
    fn nominal_state_emits_no_atoms() {
        let mut fields = FieldMap::new();
        fields.insert(F_VERTICAL_SPEED, json!(-500.0));
        fields.insert(F_AIRSPEED, json!(100.0));
        fields.insert(F_GPS_ALTITUDE, json!(5000.0));
        fields.insert(F_PITCH, json!(2.0));
        assert!(run(&fields).is_empty());
    }

    #[test]
    fn rapid_descent_ladder() {
        let mut fields = FieldMap::new();
        fields.insert(F_VERTICAL_SPEED, json!(-3500.0));
        let drafts = run(&fields);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].severity, Severity::Critical);
        assert_eq!(drafts[0].field.as_deref(), Some("Rapid_Descent"));

        let mut fields = FieldMap::new();
        fields.insert(F_VERTICAL_SPEED, json!(-2500.0));
        let drafts = run(&fields);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn extreme_airspeed_thresholds() {
        let mut fields = FieldMap::new();
        fields.insert(F_AIRSPEED, json!(25.0));
        let drafts = run(&fields);
        assert_eq!(drafts[0].severity, Severity::Critical);

        let mut fields = FieldMap::new();
        fields.insert(F_AIRSPEED, json!(190.0));
        let drafts = run(&fields);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn extreme_altitude_thresholds() {
        let mut fields = FieldMap::new();
        fields.insert(F_GPS_ALTITUDE, json!(-50.0));
        let drafts = run(&fields);
        assert_eq!(drafts[0].severity, Severity::Critical);

        let mut fields = FieldMap::new();
        fields.insert(F_GPS_ALTITUDE, json!(16000.0));
        let drafts = run(&fields);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn stall_composite_requires_all_three_conditions() {
        let mut fields = FieldMap::new();
        fields.insert(F_AIRSPEED, json!(45.0));
        fields.insert(F_PITCH, json!(20.0));
        fields.insert(F_VERTICAL_SPEED, json!(100.0));
        let drafts = run(&fields);
        assert!(drafts
            .iter()
            .any(|d| d.field.as_deref() == Some("Stall_Condition")));

        // High airspeed defuses the composite.
        let mut fields = FieldMap::new();
        fields.insert(F_AIRSPEED, json!(120.0));
        fields.insert(F_PITCH, json!(20.0));
        fields.insert(F_VERTICAL_SPEED, json!(100.0));
        let drafts = run(&fields);
        assert!(!drafts
            .iter()
            .any(|d| d.field.as_deref() == Some("Stall_Condition")));
    }

    #[test]
    fn multi_step_arrays_emit_per_violating_timestep() {
        let mut fields = FieldMap::new();
        fields.insert(F_VERTICAL_SPEED, json!([-500.0, -3500.0, -3200.0]));
        let drafts = run(&fields);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].meta.get("timestep").unwrap(), 1);
        assert_eq!(drafts[1].meta.get("timestep").unwrap(), 2);
    }
}
