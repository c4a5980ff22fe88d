use std::path::{Path, PathBuf};

/// Filesystem layout of a checkpoint directory.
///
/// ```text
/// <root>/checkpoint_<id>.json          index of retained checkpoints
/// <root>/model_<id>-<iteration>/       one directory per checkpoint
///     infos.json                       state, configuration, weights reference
///     weights.json                     model weights
/// ```
///
/// With an empty run id the `_<id>` suffix is dropped.
#[derive(Debug, Clone)]
pub struct CheckpointLayout {
    root: PathBuf,
    run_id: String,
}

pub const INFOS_FILE: &str = "infos.json";
pub const WEIGHTS_FILE: &str = "weights.json";

impl CheckpointLayout {
    #[must_use]
    pub fn new(root: PathBuf, run_id: &str) -> Self {
        Self { root, run_id: run_id.to_string() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn suffix(&self) -> String {
        if self.run_id.is_empty() { String::new() } else { format!("_{}", self.run_id) }
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.root.join(format!("checkpoint{}.json", self.suffix()))
    }

    #[must_use]
    pub fn checkpoint_name(&self, iteration: u64) -> String {
        format!("model{}-{iteration}", self.suffix())
    }

    #[must_use]
    pub fn checkpoint_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Run id encoded in an index file name, or `None` if `file_name` is not an index.
    #[must_use]
    pub fn run_id_of_index(file_name: &str) -> Option<String> {
        let rest = file_name.strip_prefix("checkpoint")?.strip_suffix(".json")?;
        if rest.is_empty() {
            return Some(String::new());
        }
        rest.strip_prefix('_').filter(|id| !id.is_empty()).map(str::to_string)
    }

    /// Hidden directory a checkpoint is assembled in before it is renamed into place.
    #[must_use]
    pub fn staging_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!(".staging-{name}"))
    }
}
