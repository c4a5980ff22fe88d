//! Training configuration loading and merging.

use crate::commands::types::TrainOverrides;
use anyhow::{Context, Result};
use showtell_training::{EpochLimit, FinetuneSchedule, ImageBudget, RnnType, TrainingConfig};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is not given.
pub const LOCAL_CONFIG_FILE: &str = "showtell.toml";

pub fn default_local_path() -> PathBuf {
    PathBuf::from(LOCAL_CONFIG_FILE)
}

/// Load and merge training configuration.
///
/// Precedence:
/// 1. Command-line flags
/// 2. The file given with `--config`, or `./showtell.toml` if it exists
/// 3. Defaults
pub fn resolve(config_file: Option<&Path>, overrides: &TrainOverrides) -> Result<TrainingConfig> {
    let mut config = match config_file {
        Some(path) => TrainingConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => {
            let local = default_local_path();
            if local.exists() {
                tracing::debug!(path = %local.display(), "Using local config file");
                TrainingConfig::load_from_file(&local)
                    .with_context(|| format!("Failed to load config file: {}", local.display()))?
            } else {
                TrainingConfig::default()
            }
        }
    };
    apply_overrides(&mut config, overrides)?;
    Ok(config)
}

/// Apply every flag that was given on top of `config`.
pub fn apply_overrides(config: &mut TrainingConfig, o: &TrainOverrides) -> Result<()> {
    if let Some(v) = &o.input_json {
        config.input_json.clone_from(v);
    }
    if let Some(v) = &o.input_labels {
        config.input_labels.clone_from(v);
    }
    if let Some(v) = &o.start_from {
        config.start_from = Some(v.clone());
    }
    if let Some(v) = o.rnn_size {
        config.rnn_size = v;
    }
    if let Some(v) = o.num_layers {
        config.num_layers = v;
    }
    if let Some(v) = &o.rnn_type {
        config.rnn_type = v.parse::<RnnType>().map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = o.input_encoding_size {
        config.input_encoding_size = v;
    }
    if let Some(v) = o.drop_prob_lm {
        config.drop_prob_lm = v;
    }
    if let Some(v) = o.max_epochs {
        config.max_epochs = EpochLimit::try_from(v).map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = o.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = o.grad_clip {
        config.grad_clip = v;
    }
    if let Some(v) = o.finetune_cnn_after {
        config.finetune_cnn_after = FinetuneSchedule::try_from(v).map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = o.seq_length {
        config.seq_length = v;
    }
    if let Some(v) = o.seq_per_img {
        config.seq_per_img = v;
    }
    if let Some(v) = o.beam_size {
        config.beam_size = v;
    }
    if let Some(v) = o.learning_rate {
        config.learning_rate = v;
    }
    if let Some(v) = o.decay_rate {
        config.decay_rate = v;
    }
    if let Some(v) = o.cnn_learning_rate {
        config.cnn_learning_rate = v;
    }
    if let Some(v) = &o.id {
        config.id.clone_from(v);
    }
    if let Some(v) = o.val_images_use {
        config.val_images_use = ImageBudget::try_from(v).map_err(anyhow::Error::msg)?;
    }
    if let Some(v) = o.save_checkpoint_every {
        config.save_checkpoint_every = v;
    }
    if let Some(v) = &o.checkpoint_path {
        config.checkpoint_path.clone_from(v);
    }
    if let Some(v) = o.language_eval {
        config.language_eval = v;
    }
    if let Some(v) = o.losses_log_every {
        config.losses_log_every = v;
    }
    if let Some(v) = o.load_best_score {
        config.load_best_score = v;
    }
    if let Some(v) = o.max_checkpoints_to_keep {
        config.max_checkpoints_to_keep = v;
    }
    if let Some(v) = &o.score_metric {
        config.score_metric.clone_from(v);
    }
    if let Some(v) = &o.language_eval_cmd {
        config.language_eval_cmd = Some(v.clone());
    }
    Ok(())
}
