//! Offline accuracy check of the loaded model against a labelled image folder.
//!
//! The folder holds one subdirectory per class: `Real/` and `Fake/` (also
//! accepted for the generated class: `AI/`, `AI-Generated/`). "Real" is the
//! positive class.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;
use shared::Label;
use walkdir::WalkDir;

use crate::inference::{InferenceError, InferencePipeline};

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No `Real` or `Fake` class directory under {}", .0.display())]
    MissingClasses(PathBuf),
    #[error("No classifiable images under {}", .0.display())]
    Empty(PathBuf),
    #[error("Inference failed for {}: {source}", .path.display())]
    Inference {
        path: PathBuf,
        #[source]
        source: InferenceError,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    /// Real predicted as Real.
    pub true_real: usize,
    /// Real predicted as AI-Generated.
    pub false_ai: usize,
    /// AI-Generated predicted as Real.
    pub false_real: usize,
    /// AI-Generated predicted as AI-Generated.
    pub true_ai: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, truth: Label, predicted: Label) {
        match (truth, predicted) {
            (Label::Real, Label::Real) => self.true_real += 1,
            (Label::Real, Label::AiGenerated) => self.false_ai += 1,
            (Label::AiGenerated, Label::Real) => self.false_real += 1,
            (Label::AiGenerated, Label::AiGenerated) => self.true_ai += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_real + self.false_ai + self.false_real + self.true_ai
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_real + self.true_ai, self.total())
    }

    pub fn metrics(&self, label: Label) -> ClassMetrics {
        let (hits, predicted, support) = match label {
            Label::Real => (
                self.true_real,
                self.true_real + self.false_real,
                self.true_real + self.false_ai,
            ),
            Label::AiGenerated => (
                self.true_ai,
                self.true_ai + self.false_ai,
                self.true_ai + self.false_real,
            ),
        };
        let precision = ratio(hits, predicted);
        let recall = ratio(hits, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            precision,
            recall,
            f1,
            support,
        }
    }
}

// Undefined ratios report as zero.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub matrix: ConfusionMatrix,
    pub accuracy: f64,
    pub real: ClassMetrics,
    pub ai_generated: ClassMetrics,
    pub skipped: Vec<PathBuf>,
}

impl EvaluationReport {
    pub fn from_matrix(matrix: ConfusionMatrix, skipped: Vec<PathBuf>) -> Self {
        Self {
            matrix,
            accuracy: matrix.accuracy(),
            real: matrix.metrics(Label::Real),
            ai_generated: matrix.metrics(Label::AiGenerated),
            skipped,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>14} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        for (label, metrics) in [(Label::Real, &self.real), (Label::AiGenerated, &self.ai_generated)] {
            writeln!(
                f,
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label.to_string(),
                metrics.precision,
                metrics.recall,
                metrics.f1,
                metrics.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.matrix.total()
        )?;
        writeln!(f)?;
        writeln!(f, "Confusion matrix (rows: truth, columns: prediction)")?;
        writeln!(f, "{:>14} {:>14} {:>14}", "", "Real", "AI-Generated")?;
        writeln!(
            f,
            "{:>14} {:>14} {:>14}",
            "Real", self.matrix.true_real, self.matrix.false_ai
        )?;
        writeln!(
            f,
            "{:>14} {:>14} {:>14}",
            "AI-Generated", self.matrix.false_real, self.matrix.true_ai
        )?;
        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped {} unreadable file(s)", self.skipped.len())?;
        }
        Ok(())
    }
}

pub fn class_for_dir_name(name: &str) -> Option<Label> {
    match name.to_ascii_lowercase().as_str() {
        "real" => Some(Label::Real),
        "fake" | "ai" | "ai-generated" | "ai_generated" => Some(Label::AiGenerated),
        _ => None,
    }
}

/// Classifies every file under the class directories of `root`, including
/// nested subdirectories. Files that fail to decode are skipped; any other
/// inference failure aborts the run.
pub fn evaluate_directory(
    pipeline: &InferencePipeline,
    root: &Path,
) -> Result<EvaluationReport, EvaluationError> {
    let mut class_dirs = Vec::new();
    for entry in walk_sorted(root, Some(1))? {
        if !entry.is_dir() {
            continue;
        }
        let label = entry
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(class_for_dir_name);
        if let Some(label) = label {
            class_dirs.push((label, entry));
        }
    }
    if class_dirs.is_empty() {
        return Err(EvaluationError::MissingClasses(root.to_path_buf()));
    }

    let mut matrix = ConfusionMatrix::default();
    let mut skipped = Vec::new();
    for (truth, dir) in class_dirs {
        for path in walk_sorted(&dir, None)? {
            if !path.is_file() {
                continue;
            }
            let bytes = fs::read(&path).map_err(|source| EvaluationError::Io {
                path: path.clone(),
                source,
            })?;
            match pipeline.classify(&bytes) {
                Ok(classification) => {
                    debug!(
                        "{}: {} (score {})",
                        path.display(),
                        classification.result,
                        classification.score
                    );
                    matrix.record(truth, classification.result.label);
                }
                Err(e @ InferenceError::Decode(_)) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    skipped.push(path);
                }
                Err(source) => return Err(EvaluationError::Inference { path, source }),
            }
        }
    }

    if matrix.total() == 0 {
        return Err(EvaluationError::Empty(root.to_path_buf()));
    }
    Ok(EvaluationReport::from_matrix(matrix, skipped))
}

/// Entries below `dir` in path order, without following symlinks.
fn walk_sorted(dir: &Path, max_depth: Option<usize>) -> Result<Vec<PathBuf>, EvaluationError> {
    let mut walker = WalkDir::new(dir).follow_links(false).min_depth(1);
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            EvaluationError::Io { path, source }
        })?;
        paths.push(entry.into_path());
    }
    paths.sort();
    Ok(paths)
}
