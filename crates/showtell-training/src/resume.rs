//! Startup-time restoration of a previous run.

use crate::checkpoint::CheckpointStore;
use crate::config::TrainingConfig;
use crate::data::DataSource;
use crate::error::{TrainingError, TrainingResult};
use crate::model::CaptionModel;
use crate::state::TrainingState;
use std::path::{Path, PathBuf};

/// Where a run starts: fresh, or from a validated checkpoint.
#[derive(Debug, Clone, Default)]
pub struct ResumePoint {
    pub state: TrainingState,
    /// Verified weights of the resumed checkpoint.
    pub weights: Option<PathBuf>,
}

impl ResumePoint {
    /// Load weights into `model` and cursors into `loader`, then hand back the state.
    pub fn restore_into<M, D>(self, model: &mut M, loader: &mut D) -> TrainingResult<TrainingState>
    where
        M: CaptionModel + ?Sized,
        D: DataSource + ?Sized,
    {
        if let Some(weights) = &self.weights {
            model.load_weights(weights)?;
        }
        loader.set_iterators(&self.state.iterators)?;
        Ok(self.state)
    }
}

/// Validate and load the latest checkpoint under `start_from`.
///
/// `None` starts fresh. The index of `current.id` is used when present,
/// otherwise the only index in the directory, so a run may be resumed under
/// a new id. The stored configuration must agree with `current` on
/// every architecture-defining field; the stored best score is dropped unless
/// `current.load_best_score` is set.
pub fn resume(start_from: Option<&Path>, current: &TrainingConfig) -> TrainingResult<ResumePoint> {
    let Some(dir) = start_from else {
        return Ok(ResumePoint::default());
    };

    let store = CheckpointStore::locate(dir, &current.id, current.max_checkpoints_to_keep)?;
    let loaded = store.latest()?.ok_or_else(|| {
        TrainingError::Checkpoint(format!("{} lists no checkpoints", store.layout().index_path().display()))
    })?;

    current.check_compatible(&loaded.record.config)?;
    let weights = loaded.verified_weights_path()?;

    let mut state = loaded.record.state;
    if !current.load_best_score {
        state.best_val_score = None;
    }

    tracing::info!(
        path = %loaded.dir.display(),
        iteration = state.iteration,
        epoch = state.epoch,
        best_val_score = ?state.best_val_score,
        "Resuming from checkpoint"
    );
    Ok(ResumePoint { state, weights: Some(weights) })
}
