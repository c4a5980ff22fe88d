//! Training configuration.
//!
//! `TrainingConfig` is the immutable snapshot of every option a run was started
//! with. It is validated once at startup, stored inside every checkpoint record,
//! and compared against the current run on resume.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Recurrent unit used by the language decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RnnType {
    Rnn,
    Gru,
    Lstm,
}

impl fmt::Display for RnnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rnn => "rnn",
            Self::Gru => "gru",
            Self::Lstm => "lstm",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RnnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rnn" => Ok(Self::Rnn),
            "gru" => Ok(Self::Gru),
            "lstm" => Ok(Self::Lstm),
            other => Err(format!("unknown rnn_type '{other}' (expected rnn, gru or lstm)")),
        }
    }
}

/// How many epochs to train for. Serialized as `-1` for unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum EpochLimit {
    Unbounded,
    Epochs(u64),
}

impl EpochLimit {
    #[must_use]
    pub fn is_reached(self, epoch: u64) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Epochs(max) => epoch >= max,
        }
    }
}

impl TryFrom<i64> for EpochLimit {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unbounded),
            n if n >= 0 => Ok(Self::Epochs(n as u64)),
            n => Err(format!("max_epochs must be -1 (unbounded) or >= 0, got {n}")),
        }
    }
}

impl From<EpochLimit> for i64 {
    fn from(value: EpochLimit) -> Self {
        match value {
            EpochLimit::Unbounded => -1,
            EpochLimit::Epochs(n) => n as i64,
        }
    }
}

/// When the image encoder starts receiving gradient updates.
///
/// Serialized as `-1` (never), `0` (from the first iteration) or the iteration
/// at which fine-tuning begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FinetuneSchedule {
    Never,
    Always,
    After(u64),
}

impl FinetuneSchedule {
    #[must_use]
    pub fn is_active(self, iteration: u64) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::After(start) => iteration >= start,
        }
    }
}

impl TryFrom<i64> for FinetuneSchedule {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Never),
            0 => Ok(Self::Always),
            n if n > 0 => Ok(Self::After(n as u64)),
            n => Err(format!("finetune_cnn_after must be -1 (never), 0 (always) or > 0, got {n}")),
        }
    }
}

impl From<FinetuneSchedule> for i64 {
    fn from(value: FinetuneSchedule) -> Self {
        match value {
            FinetuneSchedule::Never => -1,
            FinetuneSchedule::Always => 0,
            FinetuneSchedule::After(n) => n as i64,
        }
    }
}

/// How many images a validation pass may consume. Serialized as `-1` for the whole split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ImageBudget {
    All,
    Limit(usize),
}

impl ImageBudget {
    #[must_use]
    pub fn is_exhausted(self, processed: usize) -> bool {
        match self {
            Self::All => false,
            Self::Limit(max) => processed >= max,
        }
    }

    /// Upper bound used for progress reporting.
    #[must_use]
    pub fn cap(self, split_size: usize) -> usize {
        match self {
            Self::All => split_size,
            Self::Limit(max) => max.min(split_size),
        }
    }
}

impl TryFrom<i64> for ImageBudget {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::All),
            n if n > 0 => Ok(Self::Limit(n as usize)),
            n => Err(format!("val_images_use must be -1 (all) or > 0, got {n}")),
        }
    }
}

impl From<ImageBudget> for i64 {
    fn from(value: ImageBudget) -> Self {
        match value {
            ImageBudget::All => -1,
            ImageBudget::Limit(n) => n as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Data input
    /// Preprocessed dataset description: vocabulary and per-image info.
    pub input_json: PathBuf,
    /// Caption token sequences for every image.
    pub input_labels: PathBuf,
    /// Checkpoint directory to resume from.
    pub start_from: Option<PathBuf>,

    // Model
    pub rnn_size: usize,
    pub num_layers: usize,
    pub rnn_type: RnnType,
    pub input_encoding_size: usize,
    pub drop_prob_lm: f64,

    // Optimization: general
    pub max_epochs: EpochLimit,
    pub batch_size: usize,
    pub grad_clip: f64,
    pub finetune_cnn_after: FinetuneSchedule,
    pub seq_length: usize,
    pub seq_per_img: usize,
    pub beam_size: usize,

    // Optimization: language model
    pub learning_rate: f64,
    pub decay_rate: f64,

    // Optimization: CNN
    pub cnn_learning_rate: f64,

    // Evaluation / checkpointing
    /// Identifies this run; appended to progress and checkpoint file names.
    pub id: String,
    pub val_images_use: ImageBudget,
    pub save_checkpoint_every: u64,
    pub checkpoint_path: PathBuf,
    pub language_eval: bool,
    /// 0 disables loss snapshots.
    pub losses_log_every: u64,
    pub load_best_score: bool,
    pub max_checkpoints_to_keep: usize,
    /// Metric used as the validation score when `language_eval` is on.
    pub score_metric: String,
    /// Command that computes language metrics for a predictions file.
    pub language_eval_cmd: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            input_json: PathBuf::from("data/coco.json"),
            input_labels: PathBuf::from("data/coco_labels.json"),
            start_from: None,
            rnn_size: 512,
            num_layers: 1,
            rnn_type: RnnType::Lstm,
            input_encoding_size: 512,
            drop_prob_lm: 0.5,
            max_epochs: EpochLimit::Unbounded,
            batch_size: 16,
            grad_clip: 0.1,
            finetune_cnn_after: FinetuneSchedule::Never,
            seq_length: 16,
            seq_per_img: 5,
            beam_size: 1,
            learning_rate: 4e-4,
            decay_rate: 1.0,
            cnn_learning_rate: 1e-5,
            id: String::new(),
            val_images_use: ImageBudget::Limit(3200),
            save_checkpoint_every: 2500,
            checkpoint_path: PathBuf::from("save"),
            language_eval: false,
            losses_log_every: 25,
            load_best_score: true,
            max_checkpoints_to_keep: 10,
            score_metric: "CIDEr".to_string(),
            language_eval_cmd: None,
        }
    }
}

fn ensure_positive(name: &str, value: f64) -> TrainingResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TrainingError::InvalidConfig(format!("{name} must be > 0, got {value}")));
    }
    Ok(())
}

fn ensure_nonzero(name: &str, value: usize) -> TrainingResult<()> {
    if value == 0 {
        return Err(TrainingError::InvalidConfig(format!("{name} must be >= 1")));
    }
    Ok(())
}

impl TrainingConfig {
    /// Load a configuration from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrainingError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        ensure_nonzero("rnn_size", self.rnn_size)?;
        ensure_nonzero("num_layers", self.num_layers)?;
        ensure_nonzero("input_encoding_size", self.input_encoding_size)?;
        ensure_nonzero("batch_size", self.batch_size)?;
        ensure_nonzero("seq_length", self.seq_length)?;
        ensure_nonzero("seq_per_img", self.seq_per_img)?;
        ensure_nonzero("beam_size", self.beam_size)?;
        ensure_nonzero("max_checkpoints_to_keep", self.max_checkpoints_to_keep)?;

        if !(0.0..1.0).contains(&self.drop_prob_lm) {
            return Err(TrainingError::InvalidConfig(format!(
                "drop_prob_lm must be in [0, 1), got {}",
                self.drop_prob_lm
            )));
        }
        ensure_positive("grad_clip", self.grad_clip)?;
        ensure_positive("learning_rate", self.learning_rate)?;
        ensure_positive("decay_rate", self.decay_rate)?;
        if !self.cnn_learning_rate.is_finite() || self.cnn_learning_rate < 0.0 {
            return Err(TrainingError::InvalidConfig(format!(
                "cnn_learning_rate must be >= 0, got {}",
                self.cnn_learning_rate
            )));
        }
        if self.save_checkpoint_every == 0 {
            return Err(TrainingError::InvalidConfig("save_checkpoint_every must be >= 1".to_string()));
        }
        if self.language_eval && self.score_metric.trim().is_empty() {
            return Err(TrainingError::InvalidConfig(
                "score_metric is required when language_eval is enabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Check that `stored` (from a checkpoint) describes the same architecture as `self`.
    ///
    /// Fields are compared in a fixed order and the first disagreement is reported.
    pub fn check_compatible(&self, stored: &Self) -> TrainingResult<()> {
        fn mismatch(field: &'static str, stored: impl ToString, current: impl ToString) -> TrainingError {
            TrainingError::ConfigMismatch { field, stored: stored.to_string(), current: current.to_string() }
        }

        if stored.rnn_type != self.rnn_type {
            return Err(mismatch("rnn_type", stored.rnn_type, self.rnn_type));
        }
        if stored.rnn_size != self.rnn_size {
            return Err(mismatch("rnn_size", stored.rnn_size, self.rnn_size));
        }
        if stored.num_layers != self.num_layers {
            return Err(mismatch("num_layers", stored.num_layers, self.num_layers));
        }
        if stored.seq_length != self.seq_length {
            return Err(mismatch("seq_length", stored.seq_length, self.seq_length));
        }
        Ok(())
    }

    /// Language-model learning rate after `epoch` decay steps.
    #[must_use]
    pub fn learning_rate_at(&self, epoch: u64) -> f64 {
        self.learning_rate * self.decay_rate.powf(epoch as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        TrainingConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let cfg = TrainingConfig { batch_size: 0, ..Default::default() };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_validate_rejects_bad_dropout() {
        let cfg = TrainingConfig { drop_prob_lm: 1.0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(EpochLimit::try_from(-1).unwrap(), EpochLimit::Unbounded);
        assert!(!EpochLimit::Unbounded.is_reached(u64::MAX));
        assert!(EpochLimit::Epochs(3).is_reached(3));
        assert!(EpochLimit::try_from(-2).is_err());

        assert_eq!(FinetuneSchedule::try_from(0).unwrap(), FinetuneSchedule::Always);
        assert!(!FinetuneSchedule::Never.is_active(1_000_000));
        assert!(FinetuneSchedule::Always.is_active(0));
        assert!(!FinetuneSchedule::After(10).is_active(9));
        assert!(FinetuneSchedule::After(10).is_active(10));

        assert_eq!(ImageBudget::try_from(-1).unwrap(), ImageBudget::All);
        assert!(ImageBudget::try_from(0).is_err());
        assert!(ImageBudget::Limit(32).is_exhausted(32));
        assert!(!ImageBudget::All.is_exhausted(usize::MAX));
    }

    #[test]
    fn test_check_compatible_names_field() {
        let current = TrainingConfig { rnn_size: 256, ..Default::default() };
        let stored = TrainingConfig { rnn_size: 512, ..Default::default() };

        match current.check_compatible(&stored) {
            Err(TrainingError::ConfigMismatch { field, stored, current }) => {
                assert_eq!(field, "rnn_size");
                assert_eq!(stored, "512");
                assert_eq!(current, "256");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_check_compatible_ignores_training_hyperparams() {
        let current = TrainingConfig { learning_rate: 1e-3, batch_size: 4, ..Default::default() };
        current.check_compatible(&TrainingConfig::default()).unwrap();
    }

    #[test]
    fn test_toml_uses_sentinel_integers() {
        let cfg: TrainingConfig = toml::from_str(
            "max_epochs = 5\nfinetune_cnn_after = -1\nval_images_use = -1\nrnn_type = \"gru\"\n",
        )
        .unwrap();
        assert_eq!(cfg.max_epochs, EpochLimit::Epochs(5));
        assert_eq!(cfg.finetune_cnn_after, FinetuneSchedule::Never);
        assert_eq!(cfg.val_images_use, ImageBudget::All);
        assert_eq!(cfg.rnn_type, RnnType::Gru);
        assert_eq!(cfg.batch_size, 16);
    }

    #[test]
    fn test_learning_rate_decay() {
        let cfg = TrainingConfig { learning_rate: 1.0, decay_rate: 0.5, ..Default::default() };
        assert!((cfg.learning_rate_at(0) - 1.0).abs() < 1e-12);
        assert!((cfg.learning_rate_at(2) - 0.25).abs() < 1e-12);
    }
}
