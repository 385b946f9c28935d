//! # aerograde-core
//!
//! Deterministic grading engine for machine-generated flight-state
//! predictions.
//!
//! The pipeline takes a raw reply, parses it into a field map, runs a
//! dependency-ordered graph of verifiers that emit traceable evidence
//! atoms, gates eligibility, grades the five-dimension rubric, and emits
//! one [`Record`] per sample.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: same configuration and inputs always produce the
//!    same evidence, grades, and hashes. No LLM calls live in this crate.
//! 2. **Traceable**: every grade and verdict cites evidence atom IDs.
//! 3. **Total**: a record is always emitted per sample, whatever went wrong.
//!
//! ## Example
//!
//! ```rust,ignore
//! use aerograde_core::{EvalConfig, Pipeline};
//!
//! let config = EvalConfig::default();
//! let mut pipeline = Pipeline::new(config);
//! let record = pipeline.evaluate(&sample, &reply);
//! assert!(record.citations_resolve());
//! ```

pub mod adjudicator;
pub mod aggregate;
pub mod config;
pub mod evidence;
pub mod gating;
pub mod graph;
pub mod parser;
pub mod protocol;
pub mod record;
pub mod rubric;
pub mod schema;
pub mod scoring;
pub mod trace;
pub mod verifiers;

pub use aggregate::{ModelConfidence, ModelProfile, TaskSummary};
pub use config::{ConfigError, EvalConfig};
pub use evidence::{AtomDraft, EvidenceAtom, EvidencePack, EvidenceType, Scope, Severity};
pub use gating::{gate, GateDecision};
pub use graph::{Verifier, VerifierGraph, VerifyContext};
pub use parser::{parse_reply, ParseOutcome};
pub use protocol::ProtocolResult;
pub use record::{AgentOutput, ModelReply, Record, Sample, SampleContext, Verdict};
pub use rubric::{Dimension, Grade};
pub use schema::{FieldMap, FieldValue, TaskId, SCHEMA_FIELDS};
pub use trace::Trace;

use std::collections::BTreeMap;

use evidence::Scope as AtomScope;

/// The full per-sample evaluation pipeline with its cross-sample state.
///
/// The only state shared across samples is the per-model map of previously
/// committed predictions, read by jump-dynamics. Samples for one model must
/// be evaluated in sample-index order; see the runtime crate's runner.
pub struct Pipeline {
    config: EvalConfig,
    graph: VerifierGraph,
    trace_template: Trace,
    /// model name → field → last committed prediction.
    previous: BTreeMap<String, BTreeMap<String, FieldValue>>,
}

impl Pipeline {
    /// Freeze a configuration and build the standard verifier graph.
    pub fn new(config: EvalConfig) -> Self {
        let graph = verifiers::standard_graph(&config);
        let trace_template = Trace::stamp(&config, None);
        Self {
            config,
            graph,
            trace_template,
            previous: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Record the judge model identifier into every subsequent trace.
    pub fn set_judge_model(&mut self, model: impl Into<String>) {
        self.trace_template.judge_model = Some(model.into());
    }

    /// Evaluate one sample with the deterministic rule adjudicator.
    ///
    /// Never fails: transport and parse failures produce a terminal record
    /// with the fixed shape (ineligible, all dimensions D).
    pub fn evaluate(&mut self, sample: &Sample, reply: &ModelReply) -> Record {
        let outcome = parse_reply(&reply.response);

        let fields = match &outcome {
            ParseOutcome::Parsed(map) => map.clone(),
            ParseOutcome::TransportError { marker } => {
                return self.terminal_record(
                    sample,
                    reply,
                    protocol::ProtocolResult::failed(format!(
                        "transport error detected in reply: {}",
                        marker
                    )),
                    Some(marker.clone()),
                );
            }
            ParseOutcome::NoJson => {
                return self.terminal_record(
                    sample,
                    reply,
                    protocol::ProtocolResult::failed("no JSON object found in reply".to_string()),
                    None,
                );
            }
        };

        let protocol_result = ProtocolResult::summarize(&outcome);

        let mut pack = EvidencePack::new();
        {
            let ctx = VerifyContext {
                task: sample.task,
                required_fields: &SCHEMA_FIELDS,
                previous: self.previous.get(&reply.model_name),
                gold: sample.gold.as_ref(),
            };
            self.graph.execute(&fields, &ctx, &mut pack);
        }

        let decision = gate(&pack, &protocol_result);
        let conditional_error = sample
            .gold
            .as_ref()
            .and_then(|gold| scoring::conditional_error(&fields, gold));
        let scores = adjudicator::rule_scores(&pack, &protocol_result, conditional_error);
        let agent_output =
            adjudicator::build_agent_output(&pack, &decision, "rule", BTreeMap::new());

        self.commit_previous(&reply.model_name, &fields);

        Record {
            sample_id: sample.sample_id.clone(),
            model_name: reply.model_name.clone(),
            task_id: sample.task,
            protocol_result,
            evidence: pack,
            agent_output,
            scores,
            trace: self.trace_template.clone(),
        }
    }

    /// Fixed-shape record for transport and parse failures: verifiers do
    /// not run, the verdict is ineligible, every dimension is D. Transport
    /// failures carry a single synthetic atom describing the cause.
    fn terminal_record(
        &self,
        sample: &Sample,
        reply: &ModelReply,
        protocol_result: ProtocolResult,
        transport_marker: Option<String>,
    ) -> Record {
        let mut pack = EvidencePack::new();
        if let Some(marker) = transport_marker {
            pack.push(
                AtomDraft::fail(
                    EvidenceType::NumericValidity,
                    Severity::Critical,
                    format!("reply is a transport-layer failure: {}", marker),
                )
                .scope(AtomScope::Sample)
                .meta("checker", "pipeline")
                .meta("rule", "transport_error"),
            );
        }

        let decision = gate(&pack, &protocol_result);
        let agent_output =
            adjudicator::build_agent_output(&pack, &decision, "rule", BTreeMap::new());

        Record {
            sample_id: sample.sample_id.clone(),
            model_name: reply.model_name.clone(),
            task_id: sample.task,
            protocol_result,
            evidence: pack,
            agent_output,
            scores: adjudicator::lowest_scores(None),
            trace: self.trace_template.clone(),
        }
    }

    /// Commit this sample's predictions as the model's new priors. Reads
    /// during the sample saw the previously committed values.
    fn commit_previous(&mut self, model_name: &str, fields: &FieldMap) {
        let slot = self.previous.entry(model_name.to_string()).or_default();
        for field in SCHEMA_FIELDS {
            if let Some(value) = fields.get(field) {
                slot.insert(field.to_string(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(task: TaskId) -> Sample {
        Sample {
            sample_id: format!("{}_000", task),
            task,
            context: SampleContext::default(),
            gold: None,
        }
    }

    fn reply(model: &str, response: &str) -> ModelReply {
        ModelReply {
            model_name: model.to_string(),
            sample_id: "S1_000".to_string(),
            task: TaskId::S1,
            response: response.to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn full_state_json() -> String {
        let mut map = serde_json::Map::new();
        for field in SCHEMA_FIELDS {
            map.insert(field.to_string(), json!(1.0));
        }
        // Keep the state internally consistent enough to pass verification.
        map.insert("GPS Altitude (WGS84 ft)".to_string(), json!(1000.0));
        map.insert("Baro Altitude (ft)".to_string(), json!(1050.0));
        map.insert("Pressure Altitude (ft)".to_string(), json!(1040.0));
        map.insert("GPS Ground Speed (kt)".to_string(), json!(100.0));
        map.insert("GPS Velocity E (m/s)".to_string(), json!(36.0));
        map.insert("GPS Velocity N (m/s)".to_string(), json!(36.0));
        map.insert("GPS Ground Track (deg true)".to_string(), json!(45.0));
        map.insert("Magnetic Heading (deg)".to_string(), json!(45.0));
        map.insert("Indicated Airspeed (kt)".to_string(), json!(100.0));
        map.insert("Vertical Speed (fpm)".to_string(), json!(100.0));
        serde_json::Value::Object(map).to_string()
    }

    #[test]
    fn transport_failure_is_terminal_with_synthetic_atom() {
        let mut pipeline = Pipeline::new(EvalConfig::default());
        let record = pipeline.evaluate(&sample(TaskId::S1), &reply("m", "API Error: 502"));

        assert!(!record.protocol_result.parsing.success);
        assert_eq!(record.evidence.len(), 1);
        assert!(record.evidence.atoms()[0].is_critical_failure());
        assert_eq!(record.agent_output.verdict, Verdict::Ineligible);
        assert_eq!(record.scores.overall_grade, Grade::D);
    }

    #[test]
    fn parse_failure_is_terminal_with_empty_evidence() {
        let mut pipeline = Pipeline::new(EvalConfig::default());
        let record = pipeline.evaluate(&sample(TaskId::S1), &reply("m", "cloudy, maybe"));

        assert!(!record.protocol_result.parsing.success);
        assert!(record.evidence.is_empty());
        assert_eq!(record.agent_output.verdict, Verdict::Ineligible);
    }

    #[test]
    fn clean_sample_is_eligible_and_resolves_citations() {
        let mut pipeline = Pipeline::new(EvalConfig::default());
        let record = pipeline.evaluate(&sample(TaskId::S1), &reply("m", &full_state_json()));

        assert!(record.protocol_result.parsing.success);
        assert_eq!(record.agent_output.verdict, Verdict::Eligible);
        assert!(record.citations_resolve());
        assert!(record
            .evidence
            .atoms()
            .iter()
            .all(|a| a.severity_consistent()));
    }

    #[test]
    fn previous_predictions_commit_at_end_of_sample() {
        let mut pipeline = Pipeline::new(EvalConfig::default());

        // First sample: no prior, so no jump atoms.
        let first = pipeline.evaluate(&sample(TaskId::S1), &reply("m", &full_state_json()));
        assert_eq!(first.evidence.by_type(EvidenceType::JumpDynamics).count(), 0);

        // Second sample: priors exist, jump atoms appear.
        let second = pipeline.evaluate(&sample(TaskId::S1), &reply("m", &full_state_json()));
        assert!(second.evidence.by_type(EvidenceType::JumpDynamics).count() > 0);

        // A different model still has no history.
        let other = pipeline.evaluate(&sample(TaskId::S1), &reply("m2", &full_state_json()));
        assert_eq!(other.evidence.by_type(EvidenceType::JumpDynamics).count(), 0);
    }

    #[test]
    fn transport_failures_do_not_commit_history() {
        let mut pipeline = Pipeline::new(EvalConfig::default());
        pipeline.evaluate(&sample(TaskId::S1), &reply("m", "API Error: 502"));
        let next = pipeline.evaluate(&sample(TaskId::S1), &reply("m", &full_state_json()));
        assert_eq!(next.evidence.by_type(EvidenceType::JumpDynamics).count(), 0);
    }
}
