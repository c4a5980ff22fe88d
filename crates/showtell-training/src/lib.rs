//! Showtell Training
//!
//! Training-evaluation control loop for an image-captioning model:
//! - Driving minibatch optimization with epoch tracking (`Trainer`)
//! - Periodic validation and best-model selection (`eval_split`)
//! - Atomic, bounded checkpoint persistence (`CheckpointStore`)
//! - Validated resumption of earlier runs (`resume`)
//!
//! The model, the data source and the language-metric scorer are reached
//! through the `CaptionModel`, `DataSource` and `LanguageEvaluator` traits.

pub mod artifacts;
pub mod bigram;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod eval;
pub mod layout;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod progress;
pub mod resume;
pub mod state;
pub mod trainer;

pub use artifacts::{WeightsArtifact, sha256_file};
pub use bigram::BigramCaptioner;
pub use checkpoint::{CheckpointIndex, CheckpointRecord, CheckpointStore, IndexEntry, LoadedCheckpoint};
pub use config::{EpochLimit, FinetuneSchedule, ImageBudget, RnnType, TrainingConfig};
pub use context::{ExecutionContext, TrainingDevice};
pub use data::{Batch, Bounds, DataSource, END_TOKEN, ExampleInfo, Split, SplitCursors};
pub use error::{TrainingError, TrainingResult};
pub use eval::{EvalOptions, EvaluationResult, Prediction, eval_split};
pub use layout::CheckpointLayout;
pub use loader::CaptionDataLoader;
pub use metrics::{CommandLanguageEvaluator, LangStats, LanguageEvaluator};
pub use model::CaptionModel;
pub use progress::{ProgressEvent, ProgressSink, StdoutProgressSink, TracingProgressSink};
pub use resume::{ResumePoint, resume};
pub use state::{TrainingState, ValResult};
pub use trainer::{Trainer, TrainingOutcome};
