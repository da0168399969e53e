mod common;

use std::fs;

use common::{StubArtifact, black_png, pipeline, white_png};
use realeyez::evaluate::{EvaluationError, evaluate_directory};
use realeyez::inference::InferenceError;
use tempfile::TempDir;

fn dataset() -> TempDir {
    let dir = TempDir::new().unwrap();
    let real = dir.path().join("Real");
    let fake = dir.path().join("Fake");
    fs::create_dir_all(&real).unwrap();
    fs::create_dir_all(&fake).unwrap();
    for i in 0..3 {
        fs::write(real.join(format!("real_{i}.png")), white_png()).unwrap();
    }
    for i in 0..2 {
        fs::write(fake.join(format!("fake_{i}.png")), black_png()).unwrap();
    }
    dir
}

#[test]
fn test_perfect_model_scores_full_marks() {
    let dir = dataset();
    let (pipeline, stub) = pipeline(StubArtifact::brightness());

    let report = evaluate_directory(&pipeline, dir.path()).unwrap();
    assert_eq!(report.matrix.true_real, 3);
    assert_eq!(report.matrix.true_ai, 2);
    assert_eq!(report.accuracy, 1.0);
    assert_eq!(report.real.support, 3);
    assert_eq!(report.ai_generated.f1, 1.0);
    assert!(report.skipped.is_empty());
    assert_eq!(stub.calls(), 5);
}

#[test]
fn test_constant_model_confuses_one_class() {
    let dir = dataset();
    let (pipeline, _stub) = pipeline(StubArtifact::constant(0.9));

    let report = evaluate_directory(&pipeline, dir.path()).unwrap();
    assert_eq!(report.matrix.false_real, 2);
    assert_eq!(report.matrix.true_real, 3);
    assert!((report.accuracy - 0.6).abs() < 1e-12);
    assert_eq!(report.ai_generated.recall, 0.0);
    assert_eq!(report.real.recall, 1.0);
}

#[test]
fn test_unreadable_files_are_skipped() {
    let dir = dataset();
    fs::write(dir.path().join("Fake").join("notes.txt"), b"not an image").unwrap();
    fs::write(dir.path().join("README.md"), b"ignored").unwrap();
    let (pipeline, _stub) = pipeline(StubArtifact::brightness());

    let report = evaluate_directory(&pipeline, dir.path()).unwrap();
    assert_eq!(report.matrix.total(), 5);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].ends_with("notes.txt"));
}

#[test]
fn test_nested_class_folders_are_walked() {
    let dir = dataset();
    let batch = dir.path().join("Real").join("batch1").join("day2");
    fs::create_dir_all(&batch).unwrap();
    fs::write(batch.join("nested.png"), white_png()).unwrap();
    fs::write(batch.join("broken.jpg"), b"truncated").unwrap();
    let (pipeline, stub) = pipeline(StubArtifact::brightness());

    let report = evaluate_directory(&pipeline, dir.path()).unwrap();
    assert_eq!(report.matrix.true_real, 4);
    assert_eq!(report.real.support, 4);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].ends_with("batch1/day2/broken.jpg"));
    assert_eq!(stub.calls(), 6);
}

#[test]
fn test_model_failure_aborts_with_its_error() {
    let dir = dataset();
    let (pipeline, _stub) = pipeline(StubArtifact::constant(1.5));

    let err = evaluate_directory(&pipeline, dir.path()).unwrap_err();
    match err {
        EvaluationError::Inference { path, source } => {
            assert!(path.starts_with(dir.path()));
            assert!(matches!(source, InferenceError::ScoreOutOfRange(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_missing_class_directories() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("misc")).unwrap();
    let (pipeline, _stub) = pipeline(StubArtifact::brightness());

    let err = evaluate_directory(&pipeline, dir.path()).unwrap_err();
    assert!(matches!(err, EvaluationError::MissingClasses(_)));

    let err = evaluate_directory(&pipeline, &dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, EvaluationError::Io { .. }));
}

#[test]
fn test_empty_class_directories() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("Real")).unwrap();
    fs::create_dir_all(dir.path().join("AI-Generated")).unwrap();
    let (pipeline, _stub) = pipeline(StubArtifact::brightness());

    let err = evaluate_directory(&pipeline, dir.path()).unwrap_err();
    assert!(matches!(err, EvaluationError::Empty(_)));
}
