//! Per-task and per-model aggregation of sample records.
//!
//! Aggregators are pure functions over emitted records. Records may arrive
//! out of order; everything here sorts by (task, model, sample_id) first so
//! reports are stable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evidence::{EvidenceType, Severity};
use crate::record::{Record, Verdict};
use crate::schema::TaskId;

/// Tail-risk exceedance thresholds over the conditional-error score.
pub const EXCEEDANCE_THRESHOLDS: [f64; 3] = [50.0, 70.0, 90.0];

/// Summary statistics over a score population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: usize,
}

impl Distribution {
    /// `None` for an empty population.
    pub fn of(values: &[f64]) -> Option<Distribution> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mean = mean(values);
        Some(Distribution {
            mean,
            median: percentile(&sorted, 50.0),
            std: std_dev(values, mean),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            count: values.len(),
        })
    }
}

/// Tail risk: high percentiles plus share of samples under each threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailRisk {
    pub p95: f64,
    pub p99: f64,
    /// `below_<threshold>` → percent of eligible samples scoring under it.
    pub exceedance_rates: BTreeMap<String, f64>,
}

/// Violation counts for one constraint family across a record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintStats {
    pub total_violations: usize,
    pub critical: usize,
    pub warning: usize,
    /// pass/(pass+fail) in percent; 100 when no atoms exist.
    pub compliance_rate: f64,
}

/// Task-level aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub total_samples: usize,
    pub eligible_samples: usize,
    pub ineligible_samples: usize,
    /// Constraint family → compliance in percent.
    pub compliance_rate: BTreeMap<String, f64>,
    /// Mean field-completeness rate in percent.
    pub availability_rate: f64,
    pub constraint_satisfaction: BTreeMap<String, ConstraintStats>,
    /// Error-score distribution over eligible samples only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_error: Option<Distribution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_risk: Option<TailRisk>,
    /// Failure-mode histogram keyed by verifier family (plus `other`).
    pub failure_modes: BTreeMap<String, usize>,
}

impl TaskSummary {
    /// Aggregate all records belonging to one task.
    pub fn compute(records: &[&Record], task_id: TaskId) -> TaskSummary {
        let mut records: Vec<&Record> = records
            .iter()
            .copied()
            .filter(|r| r.task_id == task_id)
            .collect();
        records.sort_by(|a, b| {
            (&a.model_name, &a.sample_id).cmp(&(&b.model_name, &b.sample_id))
        });

        let total_samples = records.len();
        let eligible_samples = records
            .iter()
            .filter(|r| r.agent_output.verdict == Verdict::Eligible)
            .count();

        let availability_rate = if records.is_empty() {
            0.0
        } else {
            mean(
                &records
                    .iter()
                    .map(|r| r.protocol_result.field_completeness.completeness_rate)
                    .collect::<Vec<_>>(),
            )
        };

        let mut compliance_rate = BTreeMap::new();
        let mut constraint_satisfaction = BTreeMap::new();
        for evidence_type in EvidenceType::ALL {
            let mut pass = 0usize;
            let mut critical = 0usize;
            let mut warning = 0usize;
            let mut fail = 0usize;
            for record in &records {
                for atom in record.evidence.by_type(evidence_type) {
                    if atom.pass {
                        pass += 1;
                    } else {
                        fail += 1;
                        match atom.severity {
                            Severity::Critical => critical += 1,
                            Severity::Warning => warning += 1,
                            Severity::Info => {}
                        }
                    }
                }
            }
            let total = pass + fail;
            let rate = if total == 0 {
                100.0
            } else {
                pass as f64 / total as f64 * 100.0
            };
            compliance_rate.insert(evidence_type.as_str().to_string(), rate);
            constraint_satisfaction.insert(
                evidence_type.as_str().to_string(),
                ConstraintStats {
                    total_violations: fail,
                    critical,
                    warning,
                    compliance_rate: rate,
                },
            );
        }

        let error_scores: Vec<f64> = records
            .iter()
            .filter(|r| r.agent_output.verdict == Verdict::Eligible)
            .filter_map(|r| r.scores.conditional_error.as_ref())
            .map(|e| e.combined_score)
            .collect();
        let conditional_error = Distribution::of(&error_scores);
        let tail_risk = conditional_error.as_ref().map(|dist| TailRisk {
            p95: dist.p95,
            p99: dist.p99,
            exceedance_rates: EXCEEDANCE_THRESHOLDS
                .iter()
                .map(|&threshold| {
                    let below = error_scores.iter().filter(|&&s| s < threshold).count();
                    (
                        format!("below_{:.0}", threshold),
                        below as f64 / error_scores.len() as f64 * 100.0,
                    )
                })
                .collect(),
        });

        let failure_modes = failure_mode_histogram(&records);

        TaskSummary {
            task_id,
            total_samples,
            eligible_samples,
            ineligible_samples: total_samples - eligible_samples,
            compliance_rate,
            availability_rate,
            constraint_satisfaction,
            conditional_error,
            tail_risk,
            failure_modes,
        }
    }
}

/// Externally supplied per-model confidence prior, passed through verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfidence {
    #[serde(default)]
    pub model_name: String,
    #[serde(rename = "S1_score")]
    pub s1_score: Option<f64>,
    #[serde(rename = "M1_score")]
    pub m1_score: Option<f64>,
    #[serde(rename = "M3_score")]
    pub m3_score: Option<f64>,
    #[serde(default)]
    pub calculation_source: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Model-level aggregate: per-task summaries plus overall statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model_name: String,
    pub total_samples: usize,
    pub eligible_samples: usize,
    /// Percent of samples gated eligible.
    pub eligibility_rate: f64,
    /// Task id string → task summary restricted to this model.
    pub task_summaries: BTreeMap<String, TaskSummary>,
    /// Overall-score distribution across all this model's records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<Distribution>,
    /// Violation counts per constraint family.
    pub constraint_violations: BTreeMap<String, usize>,
    pub failure_modes: BTreeMap<String, usize>,
    /// Pass-through of the external calibration prior.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_prior: Option<ModelConfidence>,
}

impl ModelProfile {
    /// Aggregate all records belonging to one model.
    pub fn compute(
        records: &[&Record],
        model_name: &str,
        confidence_prior: Option<ModelConfidence>,
    ) -> ModelProfile {
        let mut records: Vec<&Record> = records
            .iter()
            .copied()
            .filter(|r| r.model_name == model_name)
            .collect();
        records.sort_by(|a, b| (a.task_id, &a.sample_id).cmp(&(b.task_id, &b.sample_id)));

        let total_samples = records.len();
        let eligible_samples = records
            .iter()
            .filter(|r| r.agent_output.verdict == Verdict::Eligible)
            .count();
        let eligibility_rate = if total_samples == 0 {
            0.0
        } else {
            eligible_samples as f64 / total_samples as f64 * 100.0
        };

        let mut task_summaries = BTreeMap::new();
        for task in TaskId::ALL {
            if records.iter().any(|r| r.task_id == task) {
                task_summaries.insert(task.to_string(), TaskSummary::compute(&records, task));
            }
        }

        let overall_scores: Vec<f64> = records.iter().map(|r| r.scores.overall_score).collect();

        let mut constraint_violations = BTreeMap::new();
        for evidence_type in EvidenceType::ALL {
            let count: usize = records
                .iter()
                .map(|r| r.evidence.by_type(evidence_type).filter(|a| !a.pass).count())
                .sum();
            if count > 0 {
                constraint_violations.insert(evidence_type.as_str().to_string(), count);
            }
        }

        ModelProfile {
            model_name: model_name.to_string(),
            total_samples,
            eligible_samples,
            eligibility_rate,
            task_summaries,
            overall_score: Distribution::of(&overall_scores),
            constraint_violations,
            failure_modes: failure_mode_histogram(&records),
            confidence_prior,
        }
    }
}

/// Failure-mode histogram over ineligible records.
///
/// The bucket is the evidence type of each attribution entry, so the
/// vocabulary is exactly the verifier families plus `other` for records
/// that became ineligible without any failing atoms (e.g. parse failures).
fn failure_mode_histogram(records: &[&Record]) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for record in records {
        if record.agent_output.verdict != Verdict::Ineligible {
            continue;
        }
        if record.agent_output.attribution.is_empty() {
            *histogram.entry("other".to_string()).or_insert(0) += 1;
            continue;
        }
        for entry in &record.agent_output.attribution {
            *histogram
                .entry(entry.evidence_type.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
    histogram
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolation percentile over a pre-sorted slice.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (sorted.len() - 1) as f64 * q / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = rank - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudicator::{build_agent_output, lowest_scores, rule_scores};
    use crate::config::EvalConfig;
    use crate::evidence::{AtomDraft, EvidencePack};
    use crate::gating::gate;
    use crate::parser::ParseOutcome;
    use crate::protocol::ProtocolResult;
    use crate::schema::{FieldMap, SCHEMA_FIELDS};
    use crate::trace::Trace;
    use serde_json::json;
    use std::collections::BTreeMap as Map;

    fn complete_protocol() -> ProtocolResult {
        let mut map = FieldMap::new();
        for field in SCHEMA_FIELDS {
            map.insert(field, json!(0.0));
        }
        ProtocolResult::summarize(&ParseOutcome::Parsed(map))
    }

    fn record(sample_id: &str, model: &str, task: TaskId, evidence: EvidencePack) -> Record {
        let protocol = complete_protocol();
        let decision = gate(&evidence, &protocol);
        let scores = if decision.is_eligible() {
            rule_scores(&evidence, &protocol, None)
        } else {
            lowest_scores(None)
        };
        Record {
            sample_id: sample_id.to_string(),
            model_name: model.to_string(),
            task_id: task,
            protocol_result: protocol,
            agent_output: build_agent_output(&evidence, &decision, "rule", Map::new()),
            evidence,
            scores,
            trace: Trace::stamp(&EvalConfig::default(), None),
        }
    }

    fn clean_pack() -> EvidencePack {
        let mut pack = EvidencePack::new();
        pack.push(AtomDraft::pass(EvidenceType::NumericValidity, "ok"));
        pack
    }

    fn critical_pack() -> EvidencePack {
        let mut pack = EvidencePack::new();
        pack.push(AtomDraft::fail(
            EvidenceType::SafetyConstraint,
            Severity::Critical,
            "rapid descent",
        ));
        pack
    }

    #[test]
    fn task_summary_counts_eligibility() {
        let a = record("S1_000", "m1", TaskId::S1, clean_pack());
        let b = record("S1_001", "m1", TaskId::S1, critical_pack());
        let c = record("M1_000", "m1", TaskId::M1, clean_pack());
        let records: Vec<&Record> = vec![&a, &b, &c];

        let summary = TaskSummary::compute(&records, TaskId::S1);
        assert_eq!(summary.total_samples, 2);
        assert_eq!(summary.eligible_samples, 1);
        assert_eq!(summary.ineligible_samples, 1);
    }

    #[test]
    fn compliance_rates_span_all_families() {
        let a = record("S1_000", "m1", TaskId::S1, critical_pack());
        let records: Vec<&Record> = vec![&a];
        let summary = TaskSummary::compute(&records, TaskId::S1);

        assert_eq!(summary.compliance_rate["safety_constraint"], 0.0);
        // No jump atoms: vacuous compliance.
        assert_eq!(summary.compliance_rate["jump_dynamics"], 100.0);
        assert_eq!(
            summary.constraint_satisfaction["safety_constraint"].critical,
            1
        );
    }

    #[test]
    fn failure_modes_use_atom_types_not_reason_strings() {
        let a = record("S1_000", "m1", TaskId::S1, critical_pack());
        let records: Vec<&Record> = vec![&a];
        let summary = TaskSummary::compute(&records, TaskId::S1);
        assert_eq!(summary.failure_modes["safety_constraint"], 1);
        assert!(!summary.failure_modes.contains_key("other"));
    }

    #[test]
    fn model_profile_nests_task_summaries() {
        let a = record("S1_000", "m1", TaskId::S1, clean_pack());
        let b = record("M3_000", "m1", TaskId::M3, clean_pack());
        let c = record("S1_000", "m2", TaskId::S1, clean_pack());
        let records: Vec<&Record> = vec![&a, &b, &c];

        let profile = ModelProfile::compute(&records, "m1", None);
        assert_eq!(profile.total_samples, 2);
        assert_eq!(profile.task_summaries.len(), 2);
        assert!(profile.task_summaries.contains_key("S1"));
        assert!(profile.task_summaries.contains_key("M3"));
        assert_eq!(profile.eligibility_rate, 100.0);
    }

    #[test]
    fn confidence_prior_passes_through() {
        let prior = ModelConfidence {
            model_name: "m1".to_string(),
            s1_score: Some(0.7),
            m1_score: None,
            m3_score: Some(0.4),
            calculation_source: "calibration".to_string(),
            version: "v8".to_string(),
            metadata: Map::new(),
        };
        let profile = ModelProfile::compute(&[], "m1", Some(prior));
        assert_eq!(profile.confidence_prior.as_ref().unwrap().s1_score, Some(0.7));
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let sorted = vec![0.0, 10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&sorted, 50.0), 20.0);
        assert_eq!(percentile(&sorted, 95.0), 38.0);
        assert_eq!(percentile(&sorted, 100.0), 40.0);
        assert_eq!(percentile(&[7.0], 95.0), 7.0);
    }

    #[test]
    fn distribution_of_empty_is_none() {
        assert!(Distribution::of(&[]).is_none());
    }
}
