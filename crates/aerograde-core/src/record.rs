//! Sample-level input and output types.
//!
//! A [`Record`] is the pipeline's unit deliverable: one is always emitted
//! per input sample, whatever went wrong along the way.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evidence::{EvidencePack, EvidenceType, Severity};
use crate::protocol::ProtocolResult;
use crate::rubric::Grade;
use crate::schema::{FieldMap, TaskId};
use crate::scoring::ConditionalError;
use crate::trace::Trace;

/// Eligibility verdict from gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Eligible,
    Ineligible,
}

/// Bookkeeping context a sample arrives with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleContext {
    /// The original question text put to the model.
    pub question: String,
    /// Current flight state extracted from the question, when recoverable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<Value>,
    /// Zero-based index into the reference-data stream.
    pub record_idx: usize,
}

/// One evaluation input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub sample_id: String,
    pub task: TaskId,
    pub context: SampleContext,
    /// Reference next-state; `None` models unavailable gold.
    pub gold: Option<FieldMap>,
}

/// A raw model reply to one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    pub model_name: String,
    pub sample_id: String,
    pub task: TaskId,
    pub response: String,
    pub timestamp: String,
}

/// One top-K attribution entry. The failure-mode bucket is the evidence
/// type of the cited atoms, so downstream histograms never parse the
/// free-form reason text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub rank: usize,
    pub reason: String,
    pub evidence_ids: Vec<String>,
    pub severity: Severity,
    pub evidence_type: EvidenceType,
    /// Number of grouped violations behind this entry.
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecklistStatus {
    Pass,
    Fail,
    Unknown,
}

/// One verification item, bound to the evidence that settled it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item_id: String,
    pub constraint_id: String,
    pub evidence_ids: Vec<String>,
    pub status: ChecklistStatus,
}

/// Adjudication verdict, attribution, and checklist for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutput {
    pub verdict: Verdict,
    /// Ordered human-readable gating reasons, citing evidence IDs.
    pub gating_reasons: Vec<String>,
    pub attribution: Vec<Attribution>,
    pub checklist: Vec<ChecklistItem>,
    /// Which adjudicator produced the grades: `rule`, `llm`, or
    /// `llm_fallback` when the LLM path degraded.
    pub adjudicator: String,
    /// Adjudicator metadata: judge model, prompt hash, failure reasons.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub adjudicator_meta: BTreeMap<String, Value>,
}

/// Per-dimension grades and scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionalScores {
    /// Dimension wire name → grade. The predictive-quality entry is `None`
    /// under the rule adjudicator, which scores that dimension directly.
    pub grade_vector: BTreeMap<String, Option<Grade>>,
    /// Dimension wire name → score in [0, 1].
    pub dimension_scores: BTreeMap<String, f64>,
    /// Arithmetic mean of dimension scores, scaled to [0, 100].
    pub overall_score: f64,
    pub overall_grade: Grade,
    /// Error statistics when gold was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditional_error: Option<ConditionalError>,
}

/// The per-sample deliverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub sample_id: String,
    pub model_name: String,
    pub task_id: TaskId,
    pub protocol_result: ProtocolResult,
    pub evidence: EvidencePack,
    pub agent_output: AgentOutput,
    pub scores: OptionalScores,
    pub trace: Trace,
}

impl Record {
    /// Every attribution and checklist citation must resolve to an atom in
    /// this record's evidence pack.
    pub fn citations_resolve(&self) -> bool {
        let attribution_ok = self
            .agent_output
            .attribution
            .iter()
            .all(|a| !a.evidence_ids.is_empty() && a.evidence_ids.iter().all(|id| self.evidence.contains_id(id)));
        let checklist_ok = self
            .agent_output
            .checklist
            .iter()
            .all(|c| c.evidence_ids.iter().all(|id| self.evidence.contains_id(id)));
        attribution_ok && checklist_ok
    }
}
