//! Prompt construction for the LLM judge.
//!
//! The prompt states the rubric, the task specification, the evidence
//! summary, and the required JSON response schema. The judge is framed as a
//! constraint enforcer bound to the evidence, not a free-form grader.

use serde_json::{json, Value};

use aerograde_core::rubric::{rubric_text, Dimension};

use super::summary::EvidenceSummary;

/// System prompt shared by every judge request.
pub const SYSTEM_PROMPT: &str = "You are an evaluator agent for flight prediction models. \
You grade model outputs strictly from the evidence atoms collected by automated verifiers. \
You must only use the provided evidence - do not invent findings, and cite evidence IDs for \
every claim. You must output valid JSON only.";

/// The response schema embedded in the prompt, kept in one place so tests
/// and validation agree on the field names.
pub fn response_schema() -> Value {
    json!({
        "grade_vector": {
            "protocol_schema_compliance": "A|B|C|D",
            "field_validity_local_dynamics": "A|B|C|D",
            "physics_cross_field_consistency": "A|B|C|D",
            "safety_constraint_satisfaction": "A|B|C|D",
            "predictive_quality_reliability": "A|B|C|D"
        },
        "overall_grade": "A|B|C|D",
        "critical_findings": [
            {
                "reason": "description of the violation",
                "evidence_ids": ["EVID_0001"],
                "dimension": "one of the five dimension names",
                "severity": "critical"
            }
        ],
        "checklist": [
            {
                "item_id": "CHECK_001",
                "constraint_id": "NUMERIC_VALIDITY",
                "evidence_ids": ["EVID_0001"],
                "status": "pass|fail",
                "description": "brief description"
            }
        ],
        "reasoning": {
            "protocol_schema_compliance": "brief explanation citing evidence IDs",
            "field_validity_local_dynamics": "...",
            "physics_cross_field_consistency": "...",
            "safety_constraint_satisfaction": "...",
            "predictive_quality_reliability": "..."
        }
    })
}

/// Build the user prompt for one sample.
pub fn build_prompt(task_spec: &Value, summary: &EvidenceSummary) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push("## Evaluation Rubric".to_string());
    parts.push(rubric_text());

    parts.push("## Task Specification".to_string());
    parts.push(serde_json::to_string_pretty(task_spec).unwrap_or_default());
    parts.push(String::new());

    parts.push("## Evidence Summary".to_string());
    parts.push("The following evidence was collected by automated verifiers:".to_string());
    parts.push(serde_json::to_string_pretty(summary).unwrap_or_default());
    parts.push(String::new());

    parts.push("## Required Output Format".to_string());
    parts.push("Output a single JSON object with exactly this structure:".to_string());
    parts.push(serde_json::to_string_pretty(&response_schema()).unwrap_or_default());
    parts.push(String::new());

    parts.push("## Constraints".to_string());
    parts.push(
        "1. Cite evidence IDs for every finding; claims without evidence are invalid.".to_string(),
    );
    parts.push("2. Monotonicity rules are hard limits:".to_string());
    parts.push(
        "   - If parsing failed or any critical numeric-validity atom exists, \
         protocol_schema_compliance cannot be A or B."
            .to_string(),
    );
    parts.push(
        "   - If any critical safety atom exists, safety_constraint_satisfaction cannot be A or B."
            .to_string(),
    );
    parts.push(
        "   - If the error scores are extremely poor, predictive_quality_reliability cannot be A."
            .to_string(),
    );
    parts.push(
        "3. overall_grade is the arithmetic mean of the dimension grades, rounded to the \
         nearest letter."
            .to_string(),
    );
    parts.push(String::new());
    parts.push("Evaluate the evidence and output your judgment now.".to_string());

    parts.join("\n")
}
