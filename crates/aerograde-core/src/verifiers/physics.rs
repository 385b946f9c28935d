//! Physics-constraint checks: trajectory continuity and kinematic sanity.

use std::collections::BTreeMap;

use crate::config::EvalConfig;
use crate::evidence::{AtomDraft, EvidenceType, Scope, Severity};
use crate::graph::{Verifier, VerifierError, VerifyContext};
use crate::schema::{
    numeric_value, FieldMap, FieldValue, TaskId, F_GPS_ALTITUDE, F_PITCH, F_ROLL,
    F_VELOCITY_U, F_VERTICAL_SPEED,
};

pub(super) const ID: &str = "PHYSICS_CONSTRAINT";
const CHECKER: &str = "PhysicsConstraintChecker";

/// Continuity allows twice the single-second jump threshold per step.
const CONTINUITY_FACTOR: f64 = 2.0;
/// Beyond 1.5x the continuity threshold the violation is critical.
const CONTINUITY_CRITICAL_FACTOR: f64 = 1.5;

const LOW_ALTITUDE_FT: f64 = 1000.0;
const LOW_ALTITUDE_MAX_VS_FPM: f64 = 2000.0;
const MAX_VS_FPM: f64 = 5000.0;

const EXTREME_ATTITUDE_DEG: f64 = 60.0;
const STEEP_PITCH_DEG: f64 = 15.0;

pub struct PhysicsConstraintChecker {
    jump_thresholds: BTreeMap<String, f64>,
}

impl PhysicsConstraintChecker {
    pub fn new(config: &EvalConfig) -> Self {
        Self {
            jump_thresholds: config.jump_thresholds.clone(),
        }
    }

    fn numeric_steps(fields: &FieldMap, field: &str) -> Option<Vec<Option<f64>>> {
        fields
            .get(field)
            .map(|v| v.timesteps().into_iter().map(numeric_value).collect())
    }

    /// M3 arrays must form a reachable trajectory: each adjacent step is
    /// bounded by twice the field's jump threshold. One summary atom per
    /// field, per the whole-sequence convention.
    fn continuity(&self, fields: &FieldMap, ctx: &VerifyContext<'_>, drafts: &mut Vec<AtomDraft>) {
        if ctx.task != TaskId::M3 {
            return;
        }

        for &field in ctx.required_fields {
            let Some(FieldValue::Series(values)) = fields.get(field) else {
                continue;
            };
            if values.len() < 2 {
                continue;
            }
            let Some(base) = self.jump_thresholds.get(field).copied() else {
                continue;
            };
            let threshold = base * CONTINUITY_FACTOR;

            let mut violations = 0usize;
            let mut max_change = 0.0f64;
            for i in 1..values.len() {
                let (Some(prev), Some(curr)) =
                    (numeric_value(&values[i - 1]), numeric_value(&values[i]))
                else {
                    continue;
                };
                let change = (curr - prev).abs();
                if change > threshold {
                    violations += 1;
                    max_change = max_change.max(change);
                }
            }

            let label = format!("{}_continuity", field);
            if violations > 0 {
                let severity = if max_change > threshold * CONTINUITY_CRITICAL_FACTOR {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                drafts.push(
                    AtomDraft::fail(
                        EvidenceType::PhysicsConstraint,
                        severity,
                        format!(
                            "field {} has {} continuity violations (max change {:.3} > {:.3})",
                            field, violations, max_change, threshold
                        ),
                    )
                    .field(label)
                    .meta("checker", CHECKER)
                    .meta("rule", "m3_array_continuity")
                    .meta("violations", violations as u64)
                    .meta("max_change", max_change)
                    .meta("threshold", threshold),
                );
            } else {
                drafts.push(
                    AtomDraft::pass(
                        EvidenceType::PhysicsConstraint,
                        format!("field {} continuity check passed", field),
                    )
                    .field(label)
                    .meta("checker", CHECKER)
                    .meta("rule", "m3_array_continuity")
                    .meta("array_length", values.len() as u64)
                    .meta("threshold", threshold),
                );
            }
        }
    }

    /// Vertical speed must stay plausible for the altitude band.
    fn velocity_altitude(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let (Some(alt), Some(vs)) = (
            Self::numeric_steps(fields, F_GPS_ALTITUDE),
            Self::numeric_steps(fields, F_VERTICAL_SPEED),
        ) else {
            return;
        };
        let multi_step = alt.len() > 1;
        for (idx, (alt, vs)) in alt.into_iter().zip(vs).enumerate() {
            let (Some(alt), Some(vs)) = (alt, vs) else { continue };
            let max_vs = if alt < LOW_ALTITUDE_FT {
                LOW_ALTITUDE_MAX_VS_FPM
            } else {
                MAX_VS_FPM
            };
            let pass = vs.abs() <= max_vs;
            if pass && idx != 0 {
                continue;
            }
            let prefix = if multi_step {
                format!("[t={}] ", idx)
            } else {
                String::new()
            };
            let message = format!(
                "{}altitude {:.1}ft with vertical speed {:.1}fpm {} limit {:.0}fpm",
                prefix,
                alt,
                vs,
                if pass { "within" } else { "exceeds" },
                max_vs
            );
            let mut draft = if pass {
                AtomDraft::pass(EvidenceType::PhysicsConstraint, message)
            } else {
                AtomDraft::fail(EvidenceType::PhysicsConstraint, Severity::Warning, message)
            };
            draft = draft
                .field("Velocity_Altitude_Consistency")
                .scope(Scope::CrossField)
                .meta("checker", CHECKER)
                .meta("rule", "velocity_altitude_consistency")
                .meta("altitude", alt)
                .meta("vertical_speed", vs)
                .meta("max_vs", max_vs);
            if multi_step {
                draft = draft.meta("timestep", idx as u64);
            }
            drafts.push(draft);
        }
    }

    /// Extreme attitudes are critical; a steep pitch should come with a
    /// commensurate vertical velocity.
    fn attitude_velocity(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let (Some(roll), Some(pitch), Some(vu)) = (
            Self::numeric_steps(fields, F_ROLL),
            Self::numeric_steps(fields, F_PITCH),
            Self::numeric_steps(fields, F_VELOCITY_U),
        ) else {
            return;
        };
        let multi_step = roll.len() > 1;
        for (idx, ((roll, pitch), vu)) in roll.into_iter().zip(pitch).zip(vu).enumerate() {
            let (Some(roll), Some(pitch), Some(vu)) = (roll, pitch, vu) else {
                continue;
            };

            let (pass, severity, reason) =
                if roll.abs() > EXTREME_ATTITUDE_DEG || pitch.abs() > EXTREME_ATTITUDE_DEG {
                    (false, Severity::Critical, "extreme_attitude")
                } else if pitch.abs() > STEEP_PITCH_DEG {
                    let expected_vu = pitch.abs() / 30.0 * 5.0;
                    if vu.abs() < expected_vu * 0.3 {
                        (false, Severity::Warning, "pitch_velocity_mismatch")
                    } else {
                        (true, Severity::Info, "normal")
                    }
                } else {
                    (true, Severity::Info, "normal")
                };

            if pass && idx != 0 {
                continue;
            }
            let prefix = if multi_step {
                format!("[t={}] ", idx)
            } else {
                String::new()
            };
            let message = format!(
                "{}roll={:.1} deg, pitch={:.1} deg, Vu={:.2}m/s: {}",
                prefix, roll, pitch, vu, reason
            );
            let mut draft = if pass {
                AtomDraft::pass(EvidenceType::PhysicsConstraint, message)
            } else {
                AtomDraft::fail(EvidenceType::PhysicsConstraint, severity, message)
            };
            draft = draft
                .field("Attitude_Velocity_Consistency")
                .scope(Scope::CrossField)
                .meta("checker", CHECKER)
                .meta("rule", "attitude_velocity_consistency")
                .meta("roll", roll)
                .meta("pitch", pitch)
                .meta("vertical_velocity", vu)
                .meta("reason", reason);
            if multi_step {
                draft = draft.meta("timestep", idx as u64);
            }
            drafts.push(draft);
        }
    }
}

impl Verifier for PhysicsConstraintChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn evidence_type(&self) -> EvidenceType {
        EvidenceType::PhysicsConstraint
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["physics_constraints"]
    }

    fn verify(
        &self,
        fields: &FieldMap,
        ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError> {
        let mut drafts = Vec::new();
        self.continuity(fields, ctx, &mut drafts);
        self.velocity_altitude(fields, &mut drafts);
        self.attitude_velocity(fields, &mut drafts);
        Ok(drafts)
    }
}
