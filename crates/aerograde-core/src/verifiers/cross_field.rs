//! Cross-field consistency: related fields must tell the same story.
//!
//! Three rules, each evaluated per timestep with arrays zipped on the
//! shorter side. Failing timesteps each get an atom; a passing rule emits
//! only its first-timestep atom, which bounds evidence size while still
//! proving the rule ran.

use crate::evidence::{AtomDraft, EvidenceType, Scope, Severity};
use crate::graph::{Verifier, VerifierError, VerifyContext};
use crate::schema::{
    angle_difference, numeric_value, FieldMap, F_BARO_ALTITUDE, F_GPS_ALTITUDE, F_GROUND_SPEED,
    F_GROUND_TRACK, F_VELOCITY_E, F_VELOCITY_N,
};

pub(super) const ID: &str = "CROSS_FIELD_CONSISTENCY";
const CHECKER: &str = "CrossFieldConsistencyChecker";

/// Knots per metre-per-second.
const MS_TO_KT: f64 = 1.944;

// Contractual thresholds, (warning, critical) per rule.
const ALTITUDE_LIMITS: (f64, f64) = (2000.0, 3000.0);
const SPEED_LIMITS: (f64, f64) = (5.0, 15.0);
const TRACK_LIMITS: (f64, f64) = (10.0, 30.0);

pub struct CrossFieldConsistencyChecker;

impl CrossFieldConsistencyChecker {
    pub fn new() -> Self {
        Self
    }

    /// Numeric timesteps of a field, zipped later on the shorter side.
    fn numeric_steps(fields: &FieldMap, field: &str) -> Option<Vec<Option<f64>>> {
        fields
            .get(field)
            .map(|v| v.timesteps().into_iter().map(numeric_value).collect())
    }

    fn severity_for(diff: f64, limits: (f64, f64)) -> (bool, Severity) {
        if diff > limits.1 {
            (false, Severity::Critical)
        } else if diff > limits.0 {
            (false, Severity::Warning)
        } else {
            (true, Severity::Info)
        }
    }

    fn emit(
        drafts: &mut Vec<AtomDraft>,
        rule: &'static str,
        field: &'static str,
        pass: bool,
        severity: Severity,
        multi_step: bool,
        idx: usize,
        message: String,
        threshold: f64,
        diff: f64,
    ) {
        if !pass || idx == 0 {
            let prefix = if multi_step {
                format!("[t={}] ", idx)
            } else {
                String::new()
            };
            let mut draft = if pass {
                AtomDraft::pass(EvidenceType::CrossFieldConsistency, format!("{}{}", prefix, message))
            } else {
                AtomDraft::fail(
                    EvidenceType::CrossFieldConsistency,
                    severity,
                    format!("{}{}", prefix, message),
                )
            };
            draft = draft
                .field(field)
                .scope(Scope::CrossField)
                .meta("checker", CHECKER)
                .meta("rule", rule)
                .meta("threshold", threshold)
                .meta("difference", diff);
            if multi_step {
                draft = draft.meta("timestep", idx as u64);
            }
            drafts.push(draft);
        }
    }

    fn altitude_parity(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let (Some(gps), Some(baro)) = (
            Self::numeric_steps(fields, F_GPS_ALTITUDE),
            Self::numeric_steps(fields, F_BARO_ALTITUDE),
        ) else {
            return;
        };
        let multi_step = gps.len() > 1;
        for (idx, (g, b)) in gps.into_iter().zip(baro).enumerate() {
            let (Some(g), Some(b)) = (g, b) else { continue };
            let diff = (g - b).abs();
            let (pass, severity) = Self::severity_for(diff, ALTITUDE_LIMITS);
            Self::emit(
                drafts,
                "altitude_consistency",
                "GPS_Alt_vs_Baro_Alt",
                pass,
                severity,
                multi_step,
                idx,
                format!(
                    "GPS altitude ({:.1}ft) vs baro altitude ({:.1}ft) difference: {:.1}ft",
                    g, b, diff
                ),
                ALTITUDE_LIMITS.0,
                diff,
            );
        }
    }

    fn speed_parity(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let (Some(gs), Some(ve), Some(vn)) = (
            Self::numeric_steps(fields, F_GROUND_SPEED),
            Self::numeric_steps(fields, F_VELOCITY_E),
            Self::numeric_steps(fields, F_VELOCITY_N),
        ) else {
            return;
        };
        let multi_step = gs.len() > 1;
        for (idx, ((gs, ve), vn)) in gs.into_iter().zip(ve).zip(vn).enumerate() {
            let (Some(gs), Some(ve), Some(vn)) = (gs, ve, vn) else {
                continue;
            };
            let calculated = ((ve * MS_TO_KT).powi(2) + (vn * MS_TO_KT).powi(2)).sqrt();
            let diff = (gs - calculated).abs();
            let (pass, severity) = Self::severity_for(diff, SPEED_LIMITS);
            Self::emit(
                drafts,
                "speed_consistency",
                "Ground_Speed_vs_Velocity",
                pass,
                severity,
                multi_step,
                idx,
                format!(
                    "ground speed ({:.1}kt) vs Ve/Vn-derived speed ({:.1}kt) difference: {:.1}kt",
                    gs, calculated, diff
                ),
                SPEED_LIMITS.0,
                diff,
            );
        }
    }

    fn track_parity(&self, fields: &FieldMap, drafts: &mut Vec<AtomDraft>) {
        let (Some(track), Some(ve), Some(vn)) = (
            Self::numeric_steps(fields, F_GROUND_TRACK),
            Self::numeric_steps(fields, F_VELOCITY_E),
            Self::numeric_steps(fields, F_VELOCITY_N),
        ) else {
            return;
        };
        let multi_step = track.len() > 1;
        for (idx, ((track, ve), vn)) in track.into_iter().zip(ve).zip(vn).enumerate() {
            let (Some(track), Some(ve), Some(vn)) = (track, ve, vn) else {
                continue;
            };
            let mut calculated = ve.atan2(vn).to_degrees();
            if calculated < 0.0 {
                calculated += 360.0;
            }
            let diff = angle_difference(track, calculated);
            let (pass, severity) = Self::severity_for(diff, TRACK_LIMITS);
            Self::emit(
                drafts,
                "track_consistency",
                "Track_vs_Velocity_Direction",
                pass,
                severity,
                multi_step,
                idx,
                format!(
                    "track ({:.1} deg) vs Ve/Vn-derived direction ({:.1} deg) difference: {:.1} deg",
                    track, calculated, diff
                ),
                TRACK_LIMITS.0,
                diff,
            );
        }
    }
}

impl Default for CrossFieldConsistencyChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier for CrossFieldConsistencyChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn evidence_type(&self) -> EvidenceType {
        EvidenceType::CrossFieldConsistency
    }

    fn capabilities(&self) -> &'static [&'static str] {
        &["cross_field_consistency"]
    }

    fn verify(
        &self,
        fields: &FieldMap,
        _ctx: &VerifyContext<'_>,
    ) -> Result<Vec<AtomDraft>, VerifierError> {
        let mut drafts = Vec::new();
        self.altitude_parity(fields, &mut drafts);
        self.speed_parity(fields, &mut drafts);
        self.track_parity(fields, &mut drafts);
        Ok(drafts)
    }
}
