//! Durable checkpoint store.
//!
//! A checkpoint becomes visible only through the index file. Weights and the
//! record are first written to a staging directory, which is renamed into
//! place; the index is then replaced through a temp file and a rename. A crash
//! at any point leaves the previous index, and therefore the previous
//! checkpoint, in effect.

use crate::artifacts::{WeightsArtifact, make_artifact, verify_artifact};
use crate::config::TrainingConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::{CheckpointLayout, INFOS_FILE, WEIGHTS_FILE};
use crate::model::CaptionModel;
use crate::state::TrainingState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to resume a run, stored as `infos.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub saved_at: DateTime<Utc>,
    pub state: TrainingState,
    pub config: TrainingConfig,
    pub weights: WeightsArtifact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Directory name under the checkpoint root.
    pub name: String,
    pub iteration: u64,
    pub epoch: u64,
    pub best_val_score: Option<f64>,
    pub saved_at: DateTime<Utc>,
}

/// Retained checkpoints, oldest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointIndex {
    pub checkpoints: Vec<IndexEntry>,
}

/// A checkpoint read back from disk.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub dir: PathBuf,
    pub record: CheckpointRecord,
}

impl LoadedCheckpoint {
    /// Path of the weights file after checking its recorded hash.
    pub fn verified_weights_path(&self) -> TrainingResult<PathBuf> {
        verify_artifact(&self.dir, &self.record.weights)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> TrainingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> TrainingResult<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| TrainingError::Checkpoint(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TrainingError::Checkpoint(format!("cannot parse {}: {e}", path.display())))
}

/// Run ids with an index file directly under `root`, sorted. A missing `root` has none.
pub fn discover_run_ids(root: &Path) -> TrainingResult<Vec<String>> {
    let mut out = Vec::new();

    let dir = match std::fs::read_dir(root) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(CheckpointLayout::run_id_of_index) {
            out.push(id);
        }
    }
    out.sort();
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    layout: CheckpointLayout,
    max_to_keep: usize,
}

impl CheckpointStore {
    #[must_use]
    pub fn new(root: PathBuf, run_id: &str, max_to_keep: usize) -> Self {
        Self { layout: CheckpointLayout::new(root, run_id), max_to_keep: max_to_keep.max(1) }
    }

    #[must_use]
    pub fn for_config(config: &TrainingConfig) -> Self {
        Self::new(config.checkpoint_path.clone(), &config.id, config.max_checkpoints_to_keep)
    }

    /// The store of `preferred_id` under `root`, or of the only run indexed there.
    ///
    /// Fails if `root` has no index, or several indexes and none for `preferred_id`.
    pub fn locate(root: &Path, preferred_id: &str, max_to_keep: usize) -> TrainingResult<Self> {
        let preferred = Self::new(root.to_path_buf(), preferred_id, max_to_keep);
        if preferred.layout.index_path().is_file() {
            return Ok(preferred);
        }

        match discover_run_ids(root)?.as_slice() {
            [] => Err(TrainingError::Checkpoint(format!(
                "no checkpoint found in {} (expected {})",
                root.display(),
                preferred.layout.index_path().display()
            ))),
            [only] => {
                tracing::info!(
                    path = %root.display(),
                    run_id = %only,
                    requested = %preferred_id,
                    "Using the only checkpoint index in directory"
                );
                Ok(Self::new(root.to_path_buf(), only, max_to_keep))
            }
            several => Err(TrainingError::Checkpoint(format!(
                "{} holds checkpoints of runs [{}] and none for id '{preferred_id}'",
                root.display(),
                several.join(", ")
            ))),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &CheckpointLayout {
        &self.layout
    }

    /// Read the index. A missing index means no checkpoints.
    pub fn index(&self) -> TrainingResult<CheckpointIndex> {
        let path = self.layout.index_path();
        if !path.exists() {
            return Ok(CheckpointIndex::default());
        }
        read_json(&path)
    }

    pub fn list(&self) -> TrainingResult<Vec<IndexEntry>> {
        Ok(self.index()?.checkpoints)
    }

    /// The most recent checkpoint, if any.
    pub fn latest(&self) -> TrainingResult<Option<LoadedCheckpoint>> {
        let Some(entry) = self.index()?.checkpoints.pop() else {
            return Ok(None);
        };
        let dir = self.layout.checkpoint_dir(&entry.name);
        let record: CheckpointRecord = read_json(&dir.join(INFOS_FILE))?;
        Ok(Some(LoadedCheckpoint { dir, record }))
    }

    /// Persist `model` and `state` as one checkpoint and prune old ones.
    pub fn save<M>(&self, model: &M, state: &TrainingState, config: &TrainingConfig) -> TrainingResult<PathBuf>
    where
        M: CaptionModel + ?Sized,
    {
        std::fs::create_dir_all(self.layout.root())?;

        let name = self.layout.checkpoint_name(state.iteration);
        let staging = self.layout.staging_dir(&name);
        let target = self.layout.checkpoint_dir(&name);
        let saved_at = Utc::now();

        let staged = self.stage(model, state, config, &staging, saved_at).and_then(|()| {
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            std::fs::rename(&staging, &target)?;
            Ok(())
        });
        if let Err(e) = staged {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        let mut index = self.index()?;
        index.checkpoints.retain(|e| e.name != name);
        index.checkpoints.push(IndexEntry {
            name,
            iteration: state.iteration,
            epoch: state.epoch,
            best_val_score: state.best_val_score,
            saved_at,
        });

        let excess = index.checkpoints.len().saturating_sub(self.max_to_keep);
        let pruned: Vec<IndexEntry> = index.checkpoints.drain(..excess).collect();
        self.write_index(&index)?;

        for old in pruned {
            let dir = self.layout.checkpoint_dir(&old.name);
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to remove old checkpoint");
            }
        }

        tracing::debug!(path = %target.display(), iteration = state.iteration, "Saved checkpoint");
        Ok(target)
    }

    fn stage<M>(
        &self,
        model: &M,
        state: &TrainingState,
        config: &TrainingConfig,
        staging: &Path,
        saved_at: DateTime<Utc>,
    ) -> TrainingResult<()>
    where
        M: CaptionModel + ?Sized,
    {
        if staging.exists() {
            std::fs::remove_dir_all(staging)?;
        }
        std::fs::create_dir_all(staging)?;

        model.save_weights(&staging.join(WEIGHTS_FILE))?;
        let weights = make_artifact(staging, WEIGHTS_FILE)?;

        let record = CheckpointRecord { saved_at, state: state.clone(), config: config.clone(), weights };
        write_json(&staging.join(INFOS_FILE), &record)
    }

    fn write_index(&self, index: &CheckpointIndex) -> TrainingResult<()> {
        let path = self.layout.index_path();
        let tmp = path.with_extension("json.tmp");
        write_json(&tmp, index)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}
