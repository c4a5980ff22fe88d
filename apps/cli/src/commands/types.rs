//! Command type definitions shared between main.rs and the command modules.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    /// TOML file with training options
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Compute device (auto, cpu, cuda, metal)
    #[arg(long, default_value = "auto")]
    pub device: String,

    /// Print per-iteration progress lines instead of logging them
    #[arg(long)]
    pub progress: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub overrides: TrainOverrides,
}

/// Per-option overrides; every flag left out keeps the configured value.
///
/// Sentinel options take the integer form used in config files: `-1` means
/// unbounded / never / whole split.
#[derive(Args, Debug, Clone, Default)]
pub struct TrainOverrides {
    /// Dataset description (vocabulary and images)
    #[arg(long)]
    pub input_json: Option<PathBuf>,

    /// Caption token arrays per image
    #[arg(long)]
    pub input_labels: Option<PathBuf>,

    /// Resume from the latest checkpoint in this directory
    #[arg(long)]
    pub start_from: Option<PathBuf>,

    #[arg(long)]
    pub rnn_size: Option<usize>,

    #[arg(long)]
    pub num_layers: Option<usize>,

    /// rnn, gru or lstm
    #[arg(long)]
    pub rnn_type: Option<String>,

    #[arg(long)]
    pub input_encoding_size: Option<usize>,

    #[arg(long)]
    pub drop_prob_lm: Option<f64>,

    /// Number of epochs, -1 for no limit
    #[arg(long, allow_negative_numbers = true)]
    pub max_epochs: Option<i64>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub grad_clip: Option<f64>,

    /// Iteration at which to start fine-tuning the image encoder; -1 never, 0 always
    #[arg(long, allow_negative_numbers = true)]
    pub finetune_cnn_after: Option<i64>,

    #[arg(long)]
    pub seq_length: Option<usize>,

    #[arg(long)]
    pub seq_per_img: Option<usize>,

    #[arg(long)]
    pub beam_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Learning rate multiplier applied once per epoch
    #[arg(long)]
    pub decay_rate: Option<f64>,

    #[arg(long)]
    pub cnn_learning_rate: Option<f64>,

    /// Run id, used to name checkpoints and prediction files
    #[arg(long)]
    pub id: Option<String>,

    /// Images per validation pass, -1 for the whole split
    #[arg(long, allow_negative_numbers = true)]
    pub val_images_use: Option<i64>,

    #[arg(long)]
    pub save_checkpoint_every: Option<u64>,

    #[arg(long)]
    pub checkpoint_path: Option<PathBuf>,

    /// Score validation runs with language metrics (requires --language-eval-cmd)
    #[arg(long)]
    pub language_eval: Option<bool>,

    #[arg(long)]
    pub losses_log_every: Option<u64>,

    /// Keep the best score stored in the resumed checkpoint
    #[arg(long)]
    pub load_best_score: Option<bool>,

    #[arg(long)]
    pub max_checkpoints_to_keep: Option<usize>,

    /// Language metric used as the validation score
    #[arg(long)]
    pub score_metric: Option<String>,

    /// External scorer, called as `<cmd> <dataset> <predictions.json>`
    #[arg(long)]
    pub language_eval_cmd: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EvalCommand {
    /// Checkpoint directory to load the latest checkpoint from
    #[arg(long)]
    pub start_from: PathBuf,

    /// Run id the checkpoints were saved under; may be left out if the directory holds one run
    #[arg(long, default_value = "")]
    pub id: String,

    /// Split to evaluate (train, val, test)
    #[arg(long, default_value = "test")]
    pub split: String,

    /// Images to evaluate, -1 for the whole split
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub num_images: i64,

    /// Dataset description; defaults to the one the checkpoint was trained on
    #[arg(long)]
    pub input_json: Option<PathBuf>,

    /// Caption labels; defaults to the ones the checkpoint was trained on
    #[arg(long)]
    pub input_labels: Option<PathBuf>,

    /// Score with the external language evaluator stored in the checkpoint config
    #[arg(long)]
    pub language_eval: bool,

    /// Write the generated captions to this JSON file
    #[arg(long)]
    pub dump_predictions: Option<PathBuf>,

    /// Log every generated caption
    #[arg(short, long)]
    pub verbose: bool,

    /// Compute device (auto, cpu, cuda, metal)
    #[arg(long, default_value = "auto")]
    pub device: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckpointsCommand {
    /// Checkpoint directory
    pub dir: PathBuf,

    /// Run id the checkpoints were saved under
    #[arg(long, default_value = "")]
    pub id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
