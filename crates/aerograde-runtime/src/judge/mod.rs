//! The LLM adjudicator.
//!
//! Delegates rubric grading to an external judge model bound by hard
//! constraints: evidence-only input, JSON-only output, citation checks, and
//! monotonicity rules. Any violation, transport failure, or malformed reply
//! collapses to the deterministic all-D fallback, so the pipeline never
//! stalls on the judge.
//!
//! Outputs are cached keyed on a hash of the evidence summary plus task
//! spec; for the same key the cached output is returned verbatim, which
//! keeps reruns bit-identical even with an LLM in the loop.

mod prompt;
mod summary;

pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use summary::{AtomSummary, EvidenceSummary, TypeSummary};

use std::collections::BTreeMap;
use std::sync::Arc;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use aerograde_core::protocol::ProtocolResult;
use aerograde_core::record::{Attribution, ChecklistItem, ChecklistStatus};
use aerograde_core::scoring::ConditionalError;
use aerograde_core::trace::sha256_hex;
use aerograde_core::{Dimension, EvidencePack, EvidenceType, Grade, Record, Severity};

use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};

/// Both curve scores under this mark "extremely poor" prediction error; an
/// A on predictive quality is then overconfident and rejected.
const EXTREME_ERROR_SCORE: f64 = 30.0;

/// Bounded retries against the provider before falling back.
const DEFAULT_MAX_RETRIES: usize = 3;

/// Attribution and findings are bounded to the five worst entries.
const TOP_K_FINDINGS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalFinding {
    pub reason: String,
    pub evidence_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeChecklistItem {
    pub item_id: String,
    pub constraint_id: String,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A validated judge verdict (or its deterministic fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeOutput {
    pub grade_vector: BTreeMap<String, Grade>,
    pub overall_grade: Grade,
    pub critical_findings: Vec<CriticalFinding>,
    pub checklist: Vec<JudgeChecklistItem>,
    pub reasoning: BTreeMap<String, String>,
    pub judge_metadata: BTreeMap<String, Value>,
    /// True when this output came from the fallback path.
    pub fallback: bool,
}

/// Judge configuration.
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub completion: CompletionConfig,
    pub max_retries: usize,
    pub cache_capacity: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            cache_capacity: 10_000,
        }
    }
}

pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    config: JudgeConfig,
    cache: Cache<String, JudgeOutput>,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LlmProvider>, config: JudgeConfig) -> Self {
        let cache = Cache::builder().max_capacity(config.cache_capacity).build();
        Self {
            provider,
            config,
            cache,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.completion.model
    }

    /// Adjudicate one sample. Total: always returns an output, falling back
    /// to all-D on any failure.
    pub async fn judge(
        &self,
        evidence: &EvidencePack,
        protocol: &ProtocolResult,
        task_spec: &Value,
        conditional_error: Option<&ConditionalError>,
    ) -> JudgeOutput {
        let evidence_summary = EvidenceSummary::build(evidence, protocol, conditional_error);
        let summary_json = evidence_summary.canonical_json();
        let task_spec_json = task_spec.to_string();
        let cache_key = sha256_hex(format!("{}{}", summary_json, task_spec_json).as_bytes());

        if let Some(cached) = self.cache.get(&cache_key).await {
            return cached;
        }

        let prompt = build_prompt(task_spec, &evidence_summary);
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(prompt.clone()),
        ];

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_retries {
            match self
                .provider
                .complete(messages.clone(), &self.config.completion)
                .await
            {
                Ok(response) => {
                    return match self.accept(
                        &response.content,
                        evidence,
                        protocol,
                        conditional_error,
                        &prompt,
                        &cache_key,
                    ) {
                        Ok(output) => {
                            self.cache.insert(cache_key, output.clone()).await;
                            output
                        }
                        // Parse/validation failures are deterministic for a
                        // given reply, so retrying buys nothing.
                        Err(reason) => {
                            tracing::warn!(reason = %reason, "judge output rejected");
                            self.fallback(evidence, protocol, reason, attempt)
                        }
                    };
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        max = self.config.max_retries,
                        error = %err,
                        "judge request failed"
                    );
                    last_error = err.to_string();
                }
            }
        }

        self.fallback(
            evidence,
            protocol,
            format!("max retries exhausted: {}", last_error),
            self.config.max_retries,
        )
    }

    /// Parse and validate a judge reply into an accepted output.
    fn accept(
        &self,
        content: &str,
        evidence: &EvidencePack,
        protocol: &ProtocolResult,
        conditional_error: Option<&ConditionalError>,
        prompt: &str,
        cache_key: &str,
    ) -> Result<JudgeOutput, String> {
        let mut output = parse_output(content)?;
        validate_citations(&output, evidence)?;
        validate_monotonicity(&output, evidence, protocol, conditional_error)?;

        let mut prompt_hash = sha256_hex(prompt.as_bytes());
        prompt_hash.truncate(16);
        output.judge_metadata.insert(
            "model".to_string(),
            Value::String(self.config.completion.model.clone()),
        );
        output
            .judge_metadata
            .insert("temperature".to_string(), Value::from(0.0));
        output
            .judge_metadata
            .insert("prompt_hash".to_string(), Value::String(prompt_hash));
        output.judge_metadata.insert(
            "evidence_hash".to_string(),
            Value::String(cache_key.to_string()),
        );
        output.judge_metadata.insert(
            "provider".to_string(),
            Value::String(self.provider.name().to_string()),
        );
        Ok(output)
    }

    /// The deterministic all-D fallback, seeded with the current critical
    /// failing atoms.
    fn fallback(
        &self,
        evidence: &EvidencePack,
        _protocol: &ProtocolResult,
        reason: String,
        attempts: usize,
    ) -> JudgeOutput {
        let grade_vector: BTreeMap<String, Grade> = Dimension::ALL
            .iter()
            .map(|d| (d.as_str().to_string(), Grade::D))
            .collect();

        let critical_findings: Vec<CriticalFinding> = evidence
            .critical_failures()
            .take(TOP_K_FINDINGS)
            .map(|atom| CriticalFinding {
                reason: atom.message.clone(),
                evidence_ids: vec![atom.id.clone()],
                dimension: Some(Dimension::for_evidence(atom.evidence_type).as_str().to_string()),
                severity: "critical".to_string(),
            })
            .collect();

        let reasoning: BTreeMap<String, String> = Dimension::ALL
            .iter()
            .map(|d| {
                (
                    d.as_str().to_string(),
                    "fallback adjudication: judge unavailable or output invalid".to_string(),
                )
            })
            .collect();

        let mut judge_metadata = BTreeMap::new();
        judge_metadata.insert("model".to_string(), Value::String("fallback".to_string()));
        judge_metadata.insert("error".to_string(), Value::String(reason));
        judge_metadata.insert("attempts".to_string(), Value::from(attempts as u64));

        JudgeOutput {
            grade_vector,
            overall_grade: Grade::D,
            critical_findings,
            checklist: Vec::new(),
            reasoning,
            judge_metadata,
            fallback: true,
        }
    }
}

/// Parse the judge's JSON reply and check schema completeness.
fn parse_output(content: &str) -> Result<JudgeOutput, String> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| format!("invalid JSON output: {}", e))?;

    let object = value.as_object().ok_or("output is not a JSON object")?;
    for field in ["grade_vector", "overall_grade", "critical_findings", "checklist", "reasoning"] {
        if !object.contains_key(field) {
            return Err(format!("missing required field: {}", field));
        }
    }

    let mut grade_vector = BTreeMap::new();
    let vector = object
        .get("grade_vector")
        .and_then(Value::as_object)
        .ok_or("grade_vector is not an object")?;
    for dimension in Dimension::ALL {
        let grade_str = vector
            .get(dimension.as_str())
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing dimension in grade_vector: {}", dimension))?;
        let grade = Grade::parse(grade_str)
            .ok_or_else(|| format!("invalid grade for {}: {}", dimension, grade_str))?;
        grade_vector.insert(dimension.as_str().to_string(), grade);
    }

    let overall_str = object
        .get("overall_grade")
        .and_then(Value::as_str)
        .ok_or("overall_grade is not a string")?;
    let overall_grade =
        Grade::parse(overall_str).ok_or_else(|| format!("invalid overall_grade: {}", overall_str))?;

    let critical_findings: Vec<CriticalFinding> =
        serde_json::from_value(object.get("critical_findings").cloned().unwrap_or_default())
            .map_err(|e| format!("malformed critical_findings: {}", e))?;
    let checklist: Vec<JudgeChecklistItem> =
        serde_json::from_value(object.get("checklist").cloned().unwrap_or_default())
            .map_err(|e| format!("malformed checklist: {}", e))?;

    // Reasoning may arrive as one string; spread it over all dimensions.
    let reasoning = match object.get("reasoning") {
        Some(Value::String(s)) => Dimension::ALL
            .iter()
            .map(|d| (d.as_str().to_string(), s.clone()))
            .collect(),
        Some(Value::Object(map)) => {
            let mut reasoning: BTreeMap<String, String> = map
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect();
            for dimension in Dimension::ALL {
                reasoning
                    .entry(dimension.as_str().to_string())
                    .or_insert_with(|| "no specific reasoning provided".to_string());
            }
            reasoning
        }
        _ => return Err("reasoning must be a string or object".to_string()),
    };

    Ok(JudgeOutput {
        grade_vector,
        overall_grade,
        critical_findings,
        checklist,
        reasoning,
        judge_metadata: BTreeMap::new(),
        fallback: false,
    })
}

/// Every cited evidence ID must exist in the sample's evidence pack.
fn validate_citations(output: &JudgeOutput, evidence: &EvidencePack) -> Result<(), String> {
    let cited = output
        .critical_findings
        .iter()
        .flat_map(|f| f.evidence_ids.iter())
        .chain(output.checklist.iter().flat_map(|c| c.evidence_ids.iter()));
    for id in cited {
        if !evidence.contains_id(id) {
            return Err(format!("cited evidence ID not found: {}", id));
        }
    }
    Ok(())
}

/// Hard monotonicity constraints over the grade vector.
fn validate_monotonicity(
    output: &JudgeOutput,
    evidence: &EvidencePack,
    protocol: &ProtocolResult,
    conditional_error: Option<&ConditionalError>,
) -> Result<(), String> {
    let grade = |dimension: Dimension| output.grade_vector.get(dimension.as_str()).copied();

    let protocol_failed = !protocol.parsing.success
        || evidence
            .by_type(EvidenceType::NumericValidity)
            .any(|a| a.is_critical_failure());
    if protocol_failed {
        if let Some(g) = grade(Dimension::ProtocolSchema) {
            if g < Grade::C {
                return Err(format!(
                    "monotonicity violation: protocol failed but protocol dimension graded {}",
                    g
                ));
            }
        }
    }

    let safety_critical = evidence
        .by_type(EvidenceType::SafetyConstraint)
        .any(|a| a.is_critical_failure());
    if safety_critical {
        if let Some(g) = grade(Dimension::SafetyConstraint) {
            if g < Grade::C {
                return Err(format!(
                    "monotonicity violation: critical safety atom but safety dimension graded {}",
                    g
                ));
            }
        }
    }

    if let Some(error) = conditional_error {
        let extremely_poor =
            error.mae_score < EXTREME_ERROR_SCORE && error.rmse_score < EXTREME_ERROR_SCORE;
        if extremely_poor && grade(Dimension::PredictiveQuality) == Some(Grade::A) {
            return Err(
                "monotonicity violation: extremely poor error graded A on predictive quality"
                    .to_string(),
            );
        }
    }

    Ok(())
}

/// Fold an accepted judge output into the record: grades, attribution,
/// checklist, and adjudicator metadata.
pub fn apply_to_record(record: &mut Record, output: &JudgeOutput) {
    let mut dimension_scores = BTreeMap::new();
    let mut grade_vector = BTreeMap::new();
    for (dimension, grade) in &output.grade_vector {
        grade_vector.insert(dimension.clone(), Some(*grade));
        dimension_scores.insert(dimension.clone(), grade.score());
    }
    let mean = dimension_scores.values().sum::<f64>() / dimension_scores.len() as f64;

    record.scores.grade_vector = grade_vector;
    record.scores.dimension_scores = dimension_scores;
    record.scores.overall_score = mean * 100.0;
    record.scores.overall_grade = Grade::from_mean_score(mean);

    if !output.critical_findings.is_empty() {
        record.agent_output.attribution = output
            .critical_findings
            .iter()
            .take(TOP_K_FINDINGS)
            .enumerate()
            .map(|(i, finding)| {
                let evidence_type = finding
                    .evidence_ids
                    .first()
                    .and_then(|id| {
                        record
                            .evidence
                            .atoms()
                            .iter()
                            .find(|a| a.id == *id)
                            .map(|a| a.evidence_type)
                    })
                    .unwrap_or(EvidenceType::NumericValidity);
                Attribution {
                    rank: i + 1,
                    reason: finding.reason.clone(),
                    evidence_ids: finding.evidence_ids.clone(),
                    severity: if finding.severity == "warning" {
                        Severity::Warning
                    } else {
                        Severity::Critical
                    },
                    evidence_type,
                    count: finding.evidence_ids.len(),
                }
            })
            .collect();
    }

    if !output.checklist.is_empty() {
        record.agent_output.checklist = output
            .checklist
            .iter()
            .map(|item| ChecklistItem {
                item_id: item.item_id.clone(),
                constraint_id: item.constraint_id.clone(),
                evidence_ids: item.evidence_ids.clone(),
                status: match item.status.as_str() {
                    "pass" => ChecklistStatus::Pass,
                    "fail" => ChecklistStatus::Fail,
                    _ => ChecklistStatus::Unknown,
                },
            })
            .collect();
    }

    record.agent_output.adjudicator = if output.fallback {
        "llm_fallback".to_string()
    } else {
        "llm".to_string()
    };
    record.agent_output.adjudicator_meta = output.judge_metadata.clone();
    record.agent_output.adjudicator_meta.insert(
        "reasoning".to_string(),
        serde_json::to_value(&output.reasoning).unwrap_or_default(),
    );
    record.agent_output.adjudicator_meta.insert(
        "claimed_overall_grade".to_string(),
        Value::String(output.overall_grade.as_str().to_string()),
    );
}
