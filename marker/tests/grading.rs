use marker::{GradeOutput, Grader, Rubric, RuleRegistry, Submission};
use script_runner::ScriptRunner;
use serde_json::json;
use serial_test::serial;

fn rubric(rules: serde_json::Value) -> Rubric {
    serde_json::from_value(json!({ "name": "Midterm", "rules": rules })).unwrap()
}

fn grade(rubric: &Rubric, submissions: &[Submission]) -> GradeOutput {
    Grader::new().grade(rubric, submissions, None).unwrap()
}

fn exact(question_id: &str, answer: &str, max_points: f64) -> serde_json::Value {
    json!({
        "type": "EXACT_MATCH",
        "question_id": question_id,
        "correct_answer": answer,
        "max_points": max_points
    })
}

#[test]
fn test_totals_and_metadata() {
    let rubric = rubric(json!([exact("q1", "Paris", 2.0), exact("q2", "4", 3.0)]));
    let submissions = vec![
        Submission::new("alice", [("q1", "paris"), ("q2", "4")]),
        Submission::new("bob", [("q1", "Lyon")]),
    ];
    let output = grade(&rubric, &submissions);

    assert_eq!(output.results.len(), 2);
    assert_eq!(output.results[0].student_id, "alice");
    assert_eq!(output.results[0].total_points, 5.0);
    assert_eq!(output.results[0].percentage, 100.0);
    assert_eq!(output.results[1].total_points, 0.0);
    assert_eq!(output.results[1].max_points, 5.0);
    assert_eq!(output.metadata["rubric_name"], "Midterm");
    assert_eq!(output.metadata["total_submissions"], 2);
}

#[test]
fn test_composite_sum_and_extremes() {
    let sub_rules = json!([
        exact("q1", "Paris", 5.0),
        {"type": "KEYWORD", "question_id": "q1", "max_points": 5, "keywords": ["paris"]}
    ]);
    let submission = Submission::new("s1", [("q1", "Paris")]);

    for (mode, points, max) in [("sum", 10.0, 10.0), ("max", 5.0, 5.0), ("min", 5.0, 5.0)] {
        let rubric = rubric(json!([
            {"type": "COMPOSITE", "question_id": "q1", "mode": mode, "rules": sub_rules}
        ]));
        let result = &grade(&rubric, std::slice::from_ref(&submission)).results[0];
        assert_eq!(result.total_points, points, "{mode}");
        assert_eq!(result.max_points, max, "{mode}");
    }

    let rubric = rubric(json!([
        {"type": "COMPOSITE", "question_id": "q1", "mode": "min", "rules": [
            exact("q1", "Paris", 2.0),
            exact("q1", "Rome", 7.0)
        ]}
    ]));
    let result = &grade(&rubric, &[submission]).results[0];
    assert_eq!(result.total_points, 0.0);
    assert_eq!(result.max_points, 7.0);
}

#[test]
fn test_failed_guard_contributes_nothing() {
    let rubric = rubric(json!([
        exact("q1", "yes", 1.0),
        {
            "type": "CONDITIONAL",
            "if_rules": [exact("q1", "yes", 1.0)],
            "if_aggregation": "AND",
            "then_rules": [exact("q2", "42", 5.0)]
        }
    ]));
    let output = grade(
        &rubric,
        &[
            Submission::new("no", [("q1", "no"), ("q2", "42")]),
            Submission::new("yes", [("q1", "yes"), ("q2", "42")]),
        ],
    );

    let skipped = &output.results[0];
    assert_eq!(skipped.grade_details.len(), 1);
    assert_eq!(skipped.total_points, 0.0);
    assert_eq!(skipped.max_points, 1.0);

    let graded = &output.results[1];
    assert_eq!(graded.grade_details.len(), 2);
    assert_eq!(graded.total_points, 6.0);
}

#[test]
fn test_assumption_set_modes() {
    let assumptions = json!([
        {"name": "strict", "rules": [exact("q1", "4", 4.0)]},
        {"name": "lenient", "rules": [exact("q1", "four", 4.0)]}
    ]);
    let submission = Submission::new("s1", [("q1", "4")]);

    for (mode, expected) in [("best", 4.0), ("worst", 0.0), ("average", 2.0)] {
        let rubric = rubric(json!([
            {"type": "ASSUMPTION_SET", "mode": mode, "assumptions": assumptions}
        ]));
        let result = &grade(&rubric, std::slice::from_ref(&submission)).results[0];
        assert_eq!(result.total_points, expected, "{mode}");
        assert_eq!(result.max_points, 4.0, "{mode}");
    }
}

#[test]
fn test_unknown_rule_type_becomes_zero_detail() {
    let mut registry = RuleRegistry::standard(ScriptRunner::default());
    assert!(registry.unregister("REGEX"));
    let grader = Grader::with_registry(registry);
    let rubric = rubric(json!([
        {"type": "REGEX", "question_id": "q1", "pattern": "a+", "max_points": 2},
        exact("q2", "b", 1.0)
    ]));
    let output = grader
        .grade(&rubric, &[Submission::new("s1", [("q1", "aaa"), ("q2", "b")])], None)
        .unwrap();

    let result = &output.results[0];
    assert_eq!(result.grade_details.len(), 2);
    let failed = &result.grade_details[0];
    assert_eq!(failed.points_awarded, 0.0);
    assert_eq!(failed.max_points, 2.0);
    assert!(!failed.is_correct);
    assert!(failed
        .feedback
        .as_deref()
        .unwrap()
        .starts_with("✗ Error: Unknown rule type"));
    assert_eq!(result.total_points, 1.0);
    assert_eq!(grader.registry().tags().len(), 10);
}

#[test]
fn test_invalid_rule_reported_per_student() {
    let rubric = rubric(json!([
        {"type": "NUMERIC_RANGE", "question_id": "q1", "min_value": 5, "max_value": 1},
        exact("q2", "b", 1.0)
    ]));
    let output = grade(&rubric, &[Submission::new("s1", [("q1", "3"), ("q2", "b")])]);
    let detail = &output.results[0].grade_details[0];
    assert!(detail
        .feedback
        .as_deref()
        .unwrap()
        .starts_with("✗ Validation error:"));
    assert_eq!(output.results[0].total_points, 1.0);
}

#[test]
fn test_progress_callback_failures_are_ignored() {
    let rubric = rubric(json!([exact("q1", "a", 1.0)]));
    let submissions: Vec<Submission> = (0..3)
        .map(|i| Submission::new(format!("s{i}"), [("q1", "a")]))
        .collect();

    let mut calls = Vec::new();
    let mut callback = |done: usize, total: usize| -> Result<(), String> {
        calls.push((done, total));
        Err("display closed".to_string())
    };
    let output = Grader::new()
        .grade(&rubric, &submissions, Some(&mut callback))
        .unwrap();
    assert_eq!(output.results.len(), 3);
    assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);

    let mut panicking = |_: usize, _: usize| -> Result<(), String> { panic!("boom") };
    let output = Grader::new()
        .grade(&rubric, &submissions, Some(&mut panicking))
        .unwrap();
    assert_eq!(output.results.len(), 3);
}

#[test]
fn test_grading_is_deterministic() {
    let rubric = rubric(json!([
        {"type": "SIMILARITY", "question_id": "q1", "max_points": 3,
         "reference_answers": ["photosynthesis"], "threshold": 0.7},
        {"type": "COMPOSITE", "question_id": "q2", "mode": "average", "rules": [
            exact("q2", "x", 1.0),
            {"type": "LENGTH", "question_id": "q2", "min_length": 1, "max_length": 3}
        ]}
    ]));
    let submissions = vec![
        Submission::new("a", [("q1", "photosinthesis"), ("q2", "x")]),
        Submission::new("b", [("q1", "respiration"), ("q2", "longer")]),
    ];
    let first = serde_json::to_string(&grade(&rubric, &submissions)).unwrap();
    let second = serde_json::to_string(&grade(&rubric, &submissions)).unwrap();
    assert_eq!(first, second);
}

#[test]
#[serial]
fn test_programmable_rule_clamps_and_times_out() {
    let rubric = rubric(json!([
        {"type": "PROGRAMMABLE", "question_id": "q1", "max_points": 3,
         "script": "points_awarded = len(answer) * 10\nfeedback = 'scored'"},
        {"type": "PROGRAMMABLE", "question_id": "q2", "max_points": 2, "timeout_ms": 50,
         "script": "n = 0\nwhile true { n += 1 }"}
    ]));
    let output = grade(&rubric, &[Submission::new("s1", [("q1", "abc"), ("q2", "")])]);
    let details = &output.results[0].grade_details;

    assert_eq!(details[0].points_awarded, 3.0);
    assert!(details[0].is_correct);
    assert_eq!(details[0].feedback.as_deref(), Some("scored"));

    assert_eq!(details[1].points_awarded, 0.0);
    assert!(details[1]
        .feedback
        .as_deref()
        .unwrap()
        .contains("timed out after 50ms"));
    assert_eq!(output.results[0].total_points, 3.0);
}
