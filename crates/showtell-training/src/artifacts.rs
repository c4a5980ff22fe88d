use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// A file stored inside a checkpoint directory, pinned by content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsArtifact {
    /// File name relative to the checkpoint directory.
    pub file: String,
    pub sha256: String,
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash `file` inside `dir` and describe it as an artifact.
pub fn make_artifact(dir: &Path, file: &str) -> TrainingResult<WeightsArtifact> {
    let path = dir.join(file);
    if !path.exists() {
        return Err(TrainingError::Checkpoint(format!(
            "artifact path does not exist: {}",
            path.display()
        )));
    }

    let sha256 = sha256_file(&path)?;
    Ok(WeightsArtifact { file: file.to_string(), sha256 })
}

/// Check that `artifact` inside `dir` still has its recorded hash.
pub fn verify_artifact(dir: &Path, artifact: &WeightsArtifact) -> TrainingResult<std::path::PathBuf> {
    let path = dir.join(&artifact.file);
    let actual = sha256_file(&path)
        .map_err(|e| TrainingError::Checkpoint(format!("cannot read {}: {e}", path.display())))?;
    if actual != artifact.sha256 {
        return Err(TrainingError::Checkpoint(format!(
            "{} is corrupt (sha256 {actual}, expected {})",
            path.display(),
            artifact.sha256
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_verify_detects_modified_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("w.json"), b"[1,2,3]").unwrap();
        let artifact = make_artifact(temp.path(), "w.json").unwrap();
        verify_artifact(temp.path(), &artifact).unwrap();

        std::fs::write(temp.path().join("w.json"), b"[1,2,4]").unwrap();
        assert!(verify_artifact(temp.path(), &artifact).is_err());
    }

    #[test]
    fn test_missing_artifact_is_an_error() {
        let temp = TempDir::new().unwrap();
        assert!(make_artifact(temp.path(), "nope.json").is_err());
    }
}
