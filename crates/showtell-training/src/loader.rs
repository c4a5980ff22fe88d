//! JSON-backed caption dataset.
//!
//! Two files describe a dataset:
//!
//! - `input_json`: `{"ix_to_word": {"1": "a", ...}, "images": [{"id", "split", "file_path", "features"}]}`
//! - `input_labels`: `{"<image id>": [[token, ...], ...]}` with every caption of every image
//!
//! Token ids run from 1 to the vocabulary size; 0 is reserved for `END_TOKEN`.

use crate::config::TrainingConfig;
use crate::context::ExecutionContext;
use crate::data::{Batch, Bounds, DataSource, END_TOKEN, ExampleInfo, Split, SplitCursors};
use crate::error::{TrainingError, TrainingResult};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct DatasetInfo {
    ix_to_word: BTreeMap<u32, String>,
    images: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    id: u64,
    split: String,
    #[serde(default)]
    file_path: String,
    #[serde(default)]
    features: Vec<f32>,
}

#[derive(Debug)]
struct ImageEntry {
    info: ExampleInfo,
    features: Vec<f32>,
    captions: Vec<Vec<u32>>,
}

#[derive(Debug)]
pub struct CaptionDataLoader {
    ctx: ExecutionContext,
    batch_size: usize,
    seq_per_img: usize,
    seq_length: usize,
    ix_to_word: BTreeMap<u32, String>,
    images: Vec<ImageEntry>,
    split_ix: BTreeMap<Split, Vec<usize>>,
    iterators: SplitCursors,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> TrainingResult<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| TrainingError::Dataset(format!("failed to read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TrainingError::Dataset(format!("failed to parse {}: {e}", path.display())))
}

impl CaptionDataLoader {
    /// Open the dataset named by `config.input_json` / `config.input_labels`.
    pub fn open(ctx: &ExecutionContext, config: &TrainingConfig) -> TrainingResult<Self> {
        let info: DatasetInfo = read_json(&config.input_json)?;
        let labels: HashMap<u64, Vec<Vec<u32>>> = read_json(&config.input_labels)?;
        Self::from_parts(ctx, config, info, labels)
    }

    fn from_parts(
        ctx: &ExecutionContext,
        config: &TrainingConfig,
        info: DatasetInfo,
        mut labels: HashMap<u64, Vec<Vec<u32>>>,
    ) -> TrainingResult<Self> {
        if info.ix_to_word.is_empty() {
            return Err(TrainingError::Dataset("vocabulary (ix_to_word) is empty".to_string()));
        }
        if info.ix_to_word.contains_key(&END_TOKEN) {
            return Err(TrainingError::Dataset(format!("token id {END_TOKEN} is reserved")));
        }
        let vocab_size = info.ix_to_word.len() as u32;

        let mut images = Vec::with_capacity(info.images.len());
        let mut split_ix: BTreeMap<Split, Vec<usize>> = BTreeMap::new();

        for (idx, image) in info.images.into_iter().enumerate() {
            let split: Split = image
                .split
                .parse()
                .map_err(|e| TrainingError::Dataset(format!("images[{idx}] (id {}): {e}", image.id)))?;

            let captions = labels.remove(&image.id).unwrap_or_default();
            if captions.is_empty() {
                return Err(TrainingError::Dataset(format!("image {} has no captions", image.id)));
            }
            for caption in &captions {
                if let Some(bad) = caption.iter().find(|&&t| t == END_TOKEN || t > vocab_size) {
                    return Err(TrainingError::Dataset(format!(
                        "image {} has out-of-vocabulary token {bad} (vocab size {vocab_size})",
                        image.id
                    )));
                }
            }

            split_ix.entry(split).or_default().push(images.len());
            images.push(ImageEntry {
                info: ExampleInfo { id: image.id, file_path: image.file_path },
                features: image.features,
                captions,
            });
        }

        let iterators = split_ix.keys().map(|split| (*split, 0)).collect();

        tracing::info!(
            run_id = %ctx.run_id,
            images = images.len(),
            vocab_size,
            train = split_ix.get(&Split::Train).map_or(0, Vec::len),
            val = split_ix.get(&Split::Val).map_or(0, Vec::len),
            test = split_ix.get(&Split::Test).map_or(0, Vec::len),
            "Loaded caption dataset"
        );

        Ok(Self {
            ctx: ctx.clone(),
            batch_size: config.batch_size,
            seq_per_img: config.seq_per_img,
            seq_length: config.seq_length,
            ix_to_word: info.ix_to_word,
            images,
            split_ix,
            iterators,
        })
    }

    /// Label row and mask for one caption: start token, words, end token, padding.
    fn encode_caption(&self, caption: &[u32]) -> (Vec<u32>, Vec<f32>) {
        let width = self.seq_length + 2;
        let words = &caption[..caption.len().min(self.seq_length)];

        let mut row = vec![END_TOKEN; width];
        row[1..=words.len()].copy_from_slice(words);

        let mut mask = vec![0.0; width];
        for m in mask.iter_mut().take(words.len() + 2) {
            *m = 1.0;
        }
        (row, mask)
    }
}

impl DataSource for CaptionDataLoader {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn vocab_size(&self) -> usize {
        self.ix_to_word.len()
    }

    fn split_size(&self, split: Split) -> usize {
        self.split_ix.get(&split).map_or(0, Vec::len)
    }

    fn get_batch(&mut self, split: Split) -> TrainingResult<Batch> {
        let ix = match self.split_ix.get(&split) {
            Some(ix) if !ix.is_empty() => ix,
            _ => return Err(TrainingError::Dataset(format!("split '{split}' has no images"))),
        };
        let max = ix.len();
        let mut cursor = self.iterators.get(&split).copied().unwrap_or(0);
        let mut wrapped = false;

        let mut picked = Vec::with_capacity(self.batch_size);
        for _ in 0..self.batch_size {
            picked.push(ix[cursor]);
            cursor += 1;
            if cursor >= max {
                cursor = 0;
                wrapped = true;
            }
        }
        self.iterators.insert(split, cursor);

        let mut batch = Batch {
            images: Vec::with_capacity(picked.len()),
            labels: Vec::with_capacity(picked.len() * self.seq_per_img),
            masks: Vec::with_capacity(picked.len() * self.seq_per_img),
            infos: Vec::with_capacity(picked.len()),
            bounds: Bounds { it_pos_now: cursor, it_max: max, wrapped },
        };

        for &i in &picked {
            let image = &self.images[i];
            // Images with fewer captions than seq_per_img reuse them in order.
            for q in 0..self.seq_per_img {
                let (row, mask) = self.encode_caption(&image.captions[q % image.captions.len()]);
                batch.labels.push(row);
                batch.masks.push(mask);
            }
            batch.images.push(image.features.clone());
            batch.infos.push(image.info.clone());
        }

        tracing::trace!(run_id = %self.ctx.run_id, %split, it_pos_now = cursor, wrapped, "Drew batch");
        Ok(batch)
    }

    fn reset_iterator(&mut self, split: Split) {
        self.iterators.insert(split, 0);
    }

    fn iterators(&self) -> SplitCursors {
        self.iterators.clone()
    }

    fn set_iterators(&mut self, cursors: &SplitCursors) -> TrainingResult<()> {
        for (split, &pos) in cursors {
            let size = self.split_size(*split);
            if pos > 0 && pos >= size {
                return Err(TrainingError::Dataset(format!(
                    "saved cursor {pos} for split '{split}' is out of range (split has {size} images)"
                )));
            }
        }
        for (split, &pos) in cursors {
            self.iterators.insert(*split, pos);
        }
        Ok(())
    }

    fn decode_sequence(&self, seqs: &[Vec<u32>]) -> Vec<String> {
        seqs.iter()
            .map(|seq| {
                seq.iter()
                    .take_while(|&&t| t != END_TOKEN)
                    .map(|t| self.ix_to_word.get(t).map_or("UNK", String::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_dataset(dir: &Path, train: usize, val: usize) -> TrainingConfig {
        let mut images = Vec::new();
        let mut labels = serde_json::Map::new();
        for i in 0..train + val {
            let split = if i < train { "train" } else { "val" };
            images.push(serde_json::json!({
                "id": i,
                "split": split,
                "file_path": format!("img_{i}.jpg"),
                "features": [i as f32],
            }));
            labels.insert(i.to_string(), serde_json::json!([[1, 2], [3, 1, 2]]));
        }
        let info = serde_json::json!({
            "ix_to_word": {"1": "a", "2": "cat", "3": "sleeping"},
            "images": images,
        });

        let input_json = dir.join("data.json");
        let input_labels = dir.join("labels.json");
        std::fs::write(&input_json, info.to_string()).unwrap();
        std::fs::write(&input_labels, serde_json::Value::Object(labels).to_string()).unwrap();

        TrainingConfig {
            input_json,
            input_labels,
            batch_size: 2,
            seq_per_img: 3,
            seq_length: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_batches_wrap_once_per_pass() {
        let temp = TempDir::new().unwrap();
        let cfg = write_dataset(temp.path(), 5, 2);
        let mut loader = CaptionDataLoader::open(&ExecutionContext::cpu(), &cfg).unwrap();

        let wraps: Vec<bool> =
            (0..5).map(|_| loader.get_batch(Split::Train).unwrap().bounds.wrapped).collect();
        // 5 images, batch of 2: the third batch crosses the end of the split.
        assert_eq!(wraps, vec![false, false, true, false, true]);
        assert_eq!(loader.iterators()[&Split::Train], 0);
    }

    #[test]
    fn test_labels_and_masks_layout() {
        let temp = TempDir::new().unwrap();
        let cfg = write_dataset(temp.path(), 2, 0);
        let mut loader = CaptionDataLoader::open(&ExecutionContext::cpu(), &cfg).unwrap();

        let batch = loader.get_batch(Split::Train).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.labels.len(), 6);
        assert_eq!(batch.labels[0], vec![0, 1, 2, 0, 0, 0]);
        assert_eq!(batch.masks[0], vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        // Third caption cycles back to the first.
        assert_eq!(batch.labels[2], batch.labels[0]);
        assert_eq!(batch.labels[1], vec![0, 3, 1, 2, 0, 0]);
    }

    #[test]
    fn test_reset_and_restore_iterators() {
        let temp = TempDir::new().unwrap();
        let cfg = write_dataset(temp.path(), 5, 2);
        let mut loader = CaptionDataLoader::open(&ExecutionContext::cpu(), &cfg).unwrap();

        loader.get_batch(Split::Train).unwrap();
        let saved = loader.iterators();
        assert_eq!(saved[&Split::Train], 2);

        loader.reset_iterator(Split::Train);
        assert_eq!(loader.iterators()[&Split::Train], 0);

        loader.set_iterators(&saved).unwrap();
        assert_eq!(loader.iterators(), saved);

        let mut bad = saved;
        bad.insert(Split::Val, 7);
        assert!(loader.set_iterators(&bad).is_err());
    }

    #[test]
    fn test_decode_stops_at_end_token() {
        let temp = TempDir::new().unwrap();
        let cfg = write_dataset(temp.path(), 1, 0);
        let loader = CaptionDataLoader::open(&ExecutionContext::cpu(), &cfg).unwrap();

        let captions = loader.decode_sequence(&[vec![1, 2, 0, 3], vec![3, 9]]);
        assert_eq!(captions, vec!["a cat".to_string(), "sleeping UNK".to_string()]);
    }

    #[test]
    fn test_empty_split_is_an_error() {
        let temp = TempDir::new().unwrap();
        let cfg = write_dataset(temp.path(), 2, 0);
        let mut loader = CaptionDataLoader::open(&ExecutionContext::cpu(), &cfg).unwrap();
        assert!(loader.get_batch(Split::Val).is_err());
    }

    #[test]
    fn test_rejects_out_of_vocabulary_tokens() {
        let temp = TempDir::new().unwrap();
        let cfg = write_dataset(temp.path(), 1, 0);
        std::fs::write(&cfg.input_labels, r#"{"0": [[1, 42]]}"#).unwrap();
        let err = CaptionDataLoader::open(&ExecutionContext::cpu(), &cfg).unwrap_err();
        assert!(err.to_string().contains("out-of-vocabulary"));
    }
}
