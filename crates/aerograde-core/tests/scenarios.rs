//! End-to-end pipeline scenarios over the deterministic adjudicator.

use serde_json::{json, Map, Value};

use aerograde_core::{
    Dimension, EvalConfig, EvidenceType, Grade, ModelReply, Pipeline, Sample, SampleContext,
    Severity, TaskId, Verdict, SCHEMA_FIELDS,
};

/// A fully populated, internally consistent flight state.
fn valid_state() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("Latitude (WGS84 deg)".to_string(), json!(37.62));
    map.insert("Longitude (WGS84 deg)".to_string(), json!(-122.38));
    map.insert("GPS Altitude (WGS84 ft)".to_string(), json!(1000.0));
    map.insert("GPS Ground Track (deg true)".to_string(), json!(45.0));
    map.insert("Magnetic Heading (deg)".to_string(), json!(45.0));
    map.insert("GPS Velocity E (m/s)".to_string(), json!(36.0));
    map.insert("GPS Velocity N (m/s)".to_string(), json!(36.0));
    map.insert("GPS Velocity U (m/s)".to_string(), json!(0.5));
    map.insert("GPS Ground Speed (kt)".to_string(), json!(100.0));
    map.insert("Roll (deg)".to_string(), json!(2.0));
    map.insert("Pitch (deg)".to_string(), json!(3.0));
    map.insert("Turn Rate (deg/sec)".to_string(), json!(0.5));
    map.insert("Slip/Skid".to_string(), json!(0.1));
    map.insert("Normal Acceleration (G)".to_string(), json!(1.0));
    map.insert("Lateral Acceleration (G)".to_string(), json!(0.0));
    map.insert("Vertical Speed (fpm)".to_string(), json!(100.0));
    map.insert("Indicated Airspeed (kt)".to_string(), json!(100.0));
    map.insert("Baro Altitude (ft)".to_string(), json!(1050.0));
    map.insert("Pressure Altitude (ft)".to_string(), json!(1040.0));
    map
}

fn sample(task: TaskId, gold: Option<Map<String, Value>>) -> Sample {
    Sample {
        sample_id: format!("{}_000", task),
        task,
        context: SampleContext::default(),
        gold: gold.map(aerograde_core::FieldMap::from),
    }
}

fn reply(task: TaskId, model: &str, state: &Map<String, Value>) -> ModelReply {
    ModelReply {
        model_name: model.to_string(),
        sample_id: format!("{}_000", task),
        task,
        response: Value::Object(state.clone()).to_string(),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn grade_of(record: &aerograde_core::Record, dimension: Dimension) -> Option<Grade> {
    record.scores.grade_vector[dimension.as_str()]
}

#[test]
fn valid_scalar_sample_grades_a_everywhere() {
    let state = valid_state();
    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(
        &sample(TaskId::S1, Some(state.clone())),
        &reply(TaskId::S1, "model", &state),
    );

    assert_eq!(record.agent_output.verdict, Verdict::Eligible);
    assert!(record.evidence.atoms().iter().all(|a| a.pass));
    for dimension in [
        Dimension::ProtocolSchema,
        Dimension::FieldValidity,
        Dimension::PhysicsConsistency,
        Dimension::SafetyConstraint,
    ] {
        assert_eq!(grade_of(&record, dimension), Some(Grade::A), "{}", dimension);
    }
    // Gold equals the prediction, so both error curves score 100.
    let error = record.scores.conditional_error.as_ref().unwrap();
    assert!((error.combined_score - 100.0).abs() < 1e-9);
    assert!((record.scores.overall_score - 100.0).abs() < 1e-9);
    assert_eq!(record.scores.overall_grade, Grade::A);
}

#[test]
fn nan_latitude_is_one_critical_atom_and_gates() {
    let mut state = valid_state();
    state.insert("Latitude (WGS84 deg)".to_string(), json!("NaN"));

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

    let failures: Vec<_> = record.evidence.atoms().iter().filter(|a| !a.pass).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].evidence_type, EvidenceType::NumericValidity);
    assert_eq!(failures[0].field.as_deref(), Some("Latitude (WGS84 deg)"));
    assert_eq!(failures[0].severity, Severity::Critical);

    // No range-sanity atom for the junk field: the dependency gates it.
    assert!(record
        .evidence
        .by_type(EvidenceType::RangeSanity)
        .all(|a| a.field.as_deref() != Some("Latitude (WGS84 deg)")));

    // Monotonicity: a critical numeric-validity atom caps protocol at C.
    let protocol = grade_of(&record, Dimension::ProtocolSchema).unwrap();
    assert!(protocol >= Grade::C, "protocol graded {}", protocol);

    assert_eq!(record.agent_output.verdict, Verdict::Ineligible);
    let cited = &record.agent_output.attribution[0].evidence_ids;
    assert!(cited.contains(&failures[0].id));
    assert!(record.citations_resolve());
}

#[test]
fn altitude_disagreement_fails_physics_dimension() {
    let mut state = valid_state();
    state.insert("GPS Altitude (WGS84 ft)".to_string(), json!(5000.0));
    state.insert("Baro Altitude (ft)".to_string(), json!(8200.0));

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

    let cross_failures: Vec<_> = record
        .evidence
        .by_type(EvidenceType::CrossFieldConsistency)
        .filter(|a| !a.pass)
        .collect();
    assert_eq!(cross_failures.len(), 1);
    assert_eq!(cross_failures[0].severity, Severity::Critical);

    assert_eq!(
        grade_of(&record, Dimension::PhysicsConsistency),
        Some(Grade::D)
    );
    assert_eq!(grade_of(&record, Dimension::ProtocolSchema), Some(Grade::A));
    assert_eq!(grade_of(&record, Dimension::FieldValidity), Some(Grade::A));
    assert_eq!(
        grade_of(&record, Dimension::SafetyConstraint),
        Some(Grade::A)
    );

    // Mean of {1, 1, 0, 1, 0} is 0.6: overall C by the midpoint synthesis.
    assert!((record.scores.overall_score - 60.0).abs() < 1e-9);
    assert_eq!(record.scores.overall_grade, Grade::C);
}

#[test]
fn rapid_descent_is_critical_and_ineligible() {
    let mut state = valid_state();
    state.insert("Vertical Speed (fpm)".to_string(), json!(-3500.0));
    state.insert("GPS Altitude (WGS84 ft)".to_string(), json!(5000.0));

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

    let safety_failures: Vec<_> = record
        .evidence
        .by_type(EvidenceType::SafetyConstraint)
        .filter(|a| !a.pass)
        .collect();
    assert_eq!(safety_failures.len(), 1);
    assert_eq!(safety_failures[0].severity, Severity::Critical);
    assert_eq!(safety_failures[0].field.as_deref(), Some("Rapid_Descent"));

    assert_eq!(
        grade_of(&record, Dimension::SafetyConstraint),
        Some(Grade::D)
    );
    assert_eq!(record.agent_output.verdict, Verdict::Ineligible);
}

#[test]
fn m3_continuity_violation_fails_field_validity_and_physics() {
    let mut state = Map::new();
    state.insert(
        "GPS Altitude (WGS84 ft)".to_string(),
        json!([1000.0, 1010.0, 5000.0, 5010.0]),
    );

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(&sample(TaskId::M3, None), &reply(TaskId::M3, "model", &state));

    let jump: Vec<_> = record
        .evidence
        .by_type(EvidenceType::JumpDynamics)
        .collect();
    assert_eq!(jump.len(), 1);
    assert!(!jump[0].pass);
    let max_change = jump[0].meta.get("max_change").unwrap().as_f64().unwrap();
    assert!((max_change - 3990.0).abs() < 1e-9);

    let continuity: Vec<_> = record
        .evidence
        .by_type(EvidenceType::PhysicsConstraint)
        .filter(|a| !a.pass)
        .collect();
    assert_eq!(continuity.len(), 1);
    assert_eq!(
        continuity[0].meta.get("rule").unwrap(),
        "m3_array_continuity"
    );

    assert_eq!(grade_of(&record, Dimension::FieldValidity), Some(Grade::D));
    assert_eq!(
        grade_of(&record, Dimension::PhysicsConsistency),
        Some(Grade::D)
    );
}

#[test]
fn prompt_injection_string_is_contained() {
    let mut state = valid_state();
    state.insert("Latitude (WGS84 deg)".to_string(), json!("'; DROP TABLE--"));

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

    let numeric_failures: Vec<_> = record
        .evidence
        .by_type(EvidenceType::NumericValidity)
        .filter(|a| !a.pass)
        .collect();
    assert_eq!(numeric_failures.len(), 1);
    assert_eq!(
        numeric_failures[0].field.as_deref(),
        Some("Latitude (WGS84 deg)")
    );
    assert!(record
        .evidence
        .by_type(EvidenceType::RangeSanity)
        .all(|a| a.field.as_deref() != Some("Latitude (WGS84 deg)")));
}

#[test]
fn pipeline_is_idempotent_modulo_timestamp() {
    let state = valid_state();
    let run = || {
        let mut pipeline = Pipeline::new(EvalConfig::default());
        // Two samples so the second exercises jump dynamics against history.
        let first = pipeline.evaluate(
            &sample(TaskId::S1, Some(state.clone())),
            &reply(TaskId::S1, "model", &state),
        );
        let second = pipeline.evaluate(
            &sample(TaskId::S1, Some(state.clone())),
            &reply(TaskId::S1, "model", &state),
        );
        (first, second)
    };

    let (a1, a2) = run();
    let (b1, b2) = run();

    let strip = |record: &aerograde_core::Record| {
        let mut value = serde_json::to_value(record).unwrap();
        value["trace"]["timestamp"] = Value::Null;
        value
    };
    assert_eq!(strip(&a1), strip(&b1));
    assert_eq!(strip(&a2), strip(&b2));
}

#[test]
fn evidence_invariants_hold_across_scenarios() {
    let scenarios: Vec<Map<String, Value>> = vec![
        valid_state(),
        {
            let mut s = valid_state();
            s.insert("Latitude (WGS84 deg)".to_string(), json!("NaN"));
            s
        },
        {
            let mut s = valid_state();
            s.insert("Vertical Speed (fpm)".to_string(), json!(-3500.0));
            s
        },
    ];

    for state in scenarios {
        let mut pipeline = Pipeline::new(EvalConfig::default());
        let record =
            pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

        // pass => info, fail => warning|critical.
        assert!(record
            .evidence
            .atoms()
            .iter()
            .all(|a| a.severity_consistent()));

        // IDs unique within the sample.
        let mut ids: Vec<&str> = record.evidence.atoms().iter().map(|a| a.id.as_str()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);

        // Every citation resolves.
        assert!(record.citations_resolve());
    }
}

#[test]
fn jump_dynamics_is_history_sensitive() {
    let state = valid_state();

    // With history: jump atoms appear on the second sample.
    let mut pipeline = Pipeline::new(EvalConfig::default());
    pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));
    let with_history =
        pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));
    assert!(
        with_history
            .evidence
            .by_type(EvidenceType::JumpDynamics)
            .count()
            > 0
    );

    // A fresh pipeline has no committed prior, so no jump atoms at all.
    let mut fresh = Pipeline::new(EvalConfig::default());
    let without_history =
        fresh.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));
    assert_eq!(
        without_history
            .evidence
            .by_type(EvidenceType::JumpDynamics)
            .count(),
        0
    );
}

#[test]
fn severity_downgrade_never_lowers_protocol_or_safety_grade() {
    // The grade ladders count failures, not severities: downgrading a
    // critical to a warning changes gating, never the ladder outcome.
    let mut state = valid_state();
    state.insert("Vertical Speed (fpm)".to_string(), json!(-3500.0));

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let critical_record =
        pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

    let mut softer = valid_state();
    softer.insert("Vertical Speed (fpm)".to_string(), json!(-2500.0));
    let mut pipeline = Pipeline::new(EvalConfig::default());
    let warning_record =
        pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &softer));

    let critical_grade = grade_of(&critical_record, Dimension::SafetyConstraint).unwrap();
    let warning_grade = grade_of(&warning_record, Dimension::SafetyConstraint).unwrap();
    // Ordering: A < B < C < D, so "not lower" means warning_grade <= critical_grade.
    assert!(warning_grade <= critical_grade);
}

#[test]
fn all_nineteen_fields_are_required() {
    // Drop one field: completeness 18/19 ~ 94.7% clears the 80% gate bar,
    // but the missing field itself is a critical atom, which gates.
    let mut state = valid_state();
    state.remove("Pressure Altitude (ft)");

    let mut pipeline = Pipeline::new(EvalConfig::default());
    let record = pipeline.evaluate(&sample(TaskId::S1, None), &reply(TaskId::S1, "model", &state));

    assert_eq!(
        record.protocol_result.field_completeness.missing_fields,
        vec!["Pressure Altitude (ft)".to_string()]
    );
    assert_eq!(record.agent_output.verdict, Verdict::Ineligible);
    assert_eq!(SCHEMA_FIELDS.len(), 19);
}
