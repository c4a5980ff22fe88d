//! Minibatch types and the `DataSource` seam the control loop reads from.

use crate::error::TrainingResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Token id that pads label rows and terminates generated sequences.
pub const END_TOKEN: u32 = 0;

/// A named partition of the dataset with its own iteration cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // COCO's "restval" images are folded into training.
            "train" | "restval" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            other => Err(format!("unknown split '{other}'")),
        }
    }
}

/// Per-split cursor positions, persisted with every checkpoint.
pub type SplitCursors = BTreeMap<Split, usize>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleInfo {
    pub id: u64,
    pub file_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Cursor position after this batch was drawn.
    pub it_pos_now: usize,
    /// Number of images in the split.
    pub it_max: usize,
    /// The cursor ran past the end of the split while drawing this batch.
    pub wrapped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// One feature vector per image.
    pub images: Vec<Vec<f32>>,
    /// `seq_per_img` rows per image: a leading `END_TOKEN`, the caption, then padding.
    pub labels: Vec<Vec<u32>>,
    /// Same shape as `labels`; 1.0 on the start token, every word and the end token.
    pub masks: Vec<Vec<f32>>,
    pub infos: Vec<ExampleInfo>,
    pub bounds: Bounds,
}

impl Batch {
    /// Number of images in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Supplies minibatches per split and tracks where each split's cursor is.
pub trait DataSource {
    fn batch_size(&self) -> usize;

    fn vocab_size(&self) -> usize;

    /// Number of images in `split`.
    fn split_size(&self, split: Split) -> usize;

    /// Draw the next batch from `split`, advancing its cursor.
    fn get_batch(&mut self, split: Split) -> TrainingResult<Batch>;

    /// Rewind `split` to its first image.
    fn reset_iterator(&mut self, split: Split);

    fn iterators(&self) -> SplitCursors;

    /// Restore cursors captured by [`DataSource::iterators`].
    fn set_iterators(&mut self, cursors: &SplitCursors) -> TrainingResult<()>;

    /// Turn generated token ids into captions. Decoding stops at `END_TOKEN`.
    fn decode_sequence(&self, seqs: &[Vec<u32>]) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_parses_restval_as_train() {
        assert_eq!("restval".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("val".parse::<Split>().unwrap(), Split::Val);
        assert!("dev".parse::<Split>().is_err());
    }

    #[test]
    fn test_cursors_serialize_with_split_names() {
        let mut cursors = SplitCursors::new();
        cursors.insert(Split::Train, 12);
        cursors.insert(Split::Val, 0);
        let json = serde_json::to_string(&cursors).unwrap();
        assert_eq!(json, r#"{"train":12,"val":0}"#);
        let back: SplitCursors = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cursors);
    }
}
