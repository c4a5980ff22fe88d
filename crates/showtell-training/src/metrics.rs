//! Language-quality metrics (BLEU, METEOR, ROUGE_L, CIDEr, ...).
//!
//! Metric computation lives outside this crate. `CommandLanguageEvaluator`
//! hands predictions to an external scorer, e.g. a wrapper around the
//! coco-caption toolkit.

use crate::error::{TrainingError, TrainingResult};
use crate::eval::Prediction;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Metric name to value.
pub type LangStats = BTreeMap<String, f64>;

pub trait LanguageEvaluator {
    fn evaluate(&mut self, dataset: &str, predictions: &[Prediction]) -> TrainingResult<LangStats>;
}

/// Runs `<program> [args...] <dataset> <predictions.json>` and reads a JSON
/// object of metric values from its stdout.
#[derive(Debug, Clone)]
pub struct CommandLanguageEvaluator {
    program: String,
    args: Vec<String>,
    predictions_path: PathBuf,
}

impl CommandLanguageEvaluator {
    /// `command` is split on whitespace; the first word is the program.
    pub fn new(command: &str, cache_dir: &Path, run_id: &str) -> TrainingResult<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| TrainingError::InvalidConfig("language_eval_cmd is empty".to_string()))?;
        let file = if run_id.is_empty() { "val_preds.json".to_string() } else { format!("val_preds_{run_id}.json") };
        Ok(Self { program, args: words.collect(), predictions_path: cache_dir.join(file) })
    }

    #[must_use]
    pub fn predictions_path(&self) -> &Path {
        &self.predictions_path
    }
}

impl LanguageEvaluator for CommandLanguageEvaluator {
    fn evaluate(&mut self, dataset: &str, predictions: &[Prediction]) -> TrainingResult<LangStats> {
        if let Some(parent) = self.predictions_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.predictions_path, serde_json::to_vec(predictions)?)?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(dataset)
            .arg(&self.predictions_path)
            .output()
            .map_err(|e| TrainingError::Evaluation(format!("failed to run '{}': {e}", self.program)))?;

        if !output.status.success() {
            return Err(TrainingError::Evaluation(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stats: LangStats = serde_json::from_slice(&output.stdout).map_err(|e| {
            TrainingError::Evaluation(format!("'{}' did not print a JSON metric map: {e}", self.program))
        })?;
        tracing::info!(metrics = ?stats, "Language evaluation finished");
        Ok(stats)
    }
}
