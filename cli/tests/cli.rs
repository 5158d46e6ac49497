use std::fs;
use std::path::Path;

use common::AppConfig;
use gradeflow::{Args, grade_files, write_output};
use marker::GradeOutput;
use tempfile::TempDir;

const RUBRIC: &str = r#"{
    "name": "Geography",
    "rules": [
        {"type": "EXACT_MATCH", "question_id": "capital", "correct_answer": "Paris", "max_points": 2},
        {"type": "NUMERIC_RANGE", "question_id": "rivers", "min_value": 3, "max_value": 5, "max_points": 1}
    ]
}"#;

const SUBMISSIONS: &str = r#"[
    {"student_id": "alice", "answers": {"capital": "paris", "rivers": "4"}},
    {"student_id": "bob", "answers": {"capital": "Lyon"}}
]"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn args(dir: &TempDir, schema: Option<&str>) -> Args {
    Args {
        rubric: write(dir, "rubric.json", RUBRIC),
        submissions: write(dir, "submissions.json", SUBMISSIONS),
        output: Some(dir.path().join("out/results.json")),
        schema: schema.map(|s| write(dir, "schema.json", s)),
        pretty: true,
    }
}

#[test]
fn test_grades_files_and_writes_results() {
    let dir = TempDir::new().unwrap();
    let args = args(&dir, None);

    let output = grade_files(&args, &AppConfig::default()).unwrap();
    write_output(&output, &args).unwrap();

    let written: GradeOutput =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/results.json")).unwrap())
            .unwrap();
    assert_eq!(written, output);
    assert_eq!(written.results[0].total_points, 3.0);
    assert_eq!(written.results[1].total_points, 0.0);
    assert_eq!(written.metadata["total_submissions"], 2);
}

#[test]
fn test_schema_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let schema = r#"{"name": "Geo", "questions": {
        "capital": {"type": "TEXT"},
        "rivers": {"type": "TEXT"}
    }}"#;
    let err = grade_files(&args(&dir, Some(schema)), &AppConfig::default()).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("does not fit schema 'Geo'"), "{message}");
    assert!(message.contains("NumericRangeRule is only compatible with NUMERIC questions"));
}

#[test]
fn test_missing_file_names_path() {
    let dir = TempDir::new().unwrap();
    let mut args = args(&dir, None);
    args.submissions = Path::new("/nonexistent/submissions.json").to_path_buf();
    let err = grade_files(&args, &AppConfig::default()).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/submissions.json"));
}
