//! Count-based baseline captioner.
//!
//! A smoothed word-bigram language model with an image-side unigram prior. It
//! has no numerical backend requirements, which lets the binary train and
//! evaluate end-to-end on any machine. The prior is only touched by the
//! fine-tune step, mirroring an image encoder that stays frozen until
//! fine-tuning starts.

use crate::config::TrainingConfig;
use crate::context::{ExecutionContext, TrainingDevice};
use crate::data::{Batch, END_TOKEN};
use crate::error::{TrainingError, TrainingResult};
use crate::model::CaptionModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pseudo-counts added per observed token at a learning rate of 1.0.
/// The default learning rate of 4e-4 adds one count.
const UPDATE_SCALE: f64 = 2500.0;

/// Weight of the image prior relative to the bigram term when generating.
const PRIOR_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BigramWeights {
    vocab_size: usize,
    /// `transitions[prev][next]`, indexed by token id with `END_TOKEN` at 0.
    transitions: Vec<Vec<f64>>,
    image_prior: Vec<f64>,
}

impl BigramWeights {
    fn new(vocab_size: usize) -> Self {
        let n = vocab_size + 1;
        // Laplace smoothing
        Self { vocab_size, transitions: vec![vec![1.0; n]; n], image_prior: vec![1.0; n] }
    }

    fn width(&self) -> usize {
        self.vocab_size + 1
    }

    fn row_log_probs(&self, prev: usize) -> Vec<f64> {
        let row = &self.transitions[prev];
        let total: f64 = row.iter().sum();
        row.iter().map(|c| (c / total).ln()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct BigramCaptioner {
    weights: BigramWeights,
    seq_length: usize,
    lr: f64,
    cnn_lr: f64,
}

impl BigramCaptioner {
    pub fn new(ctx: &ExecutionContext, vocab_size: usize, config: &TrainingConfig) -> TrainingResult<Self> {
        if matches!(ctx.device, TrainingDevice::Cuda | TrainingDevice::Metal) {
            return Err(TrainingError::Model(format!(
                "BigramCaptioner runs on the CPU only (requested {:?})",
                ctx.device
            )));
        }
        if vocab_size == 0 {
            return Err(TrainingError::Model("vocab_size must be >= 1".to_string()));
        }
        if config.beam_size != 1 {
            return Err(TrainingError::Model(format!(
                "BigramCaptioner decodes greedily; beam_size {} is not supported",
                config.beam_size
            )));
        }

        tracing::debug!(run_id = %ctx.run_id, vocab_size, "Initialized bigram captioner");
        Ok(Self {
            weights: BigramWeights::new(vocab_size),
            seq_length: config.seq_length,
            lr: config.learning_rate,
            cnn_lr: config.cnn_learning_rate,
        })
    }

    /// Iterate the `(prev, next)` token pairs that the masks mark as targets.
    fn target_pairs(batch: &Batch) -> TrainingResult<Vec<(usize, usize)>> {
        if batch.labels.len() != batch.masks.len() {
            return Err(TrainingError::Model(format!(
                "labels/masks row count mismatch ({} vs {})",
                batch.labels.len(),
                batch.masks.len()
            )));
        }

        let mut pairs = Vec::new();
        for (row, mask) in batch.labels.iter().zip(&batch.masks) {
            for t in 1..row.len().min(mask.len()) {
                if mask[t] > 0.0 {
                    pairs.push((row[t - 1] as usize, row[t] as usize));
                }
            }
        }
        Ok(pairs)
    }

    fn check_token(&self, token: usize) -> TrainingResult<()> {
        if token >= self.weights.width() {
            return Err(TrainingError::Model(format!(
                "token {token} outside vocabulary of size {}",
                self.weights.vocab_size
            )));
        }
        Ok(())
    }

    fn batch_loss(&self, pairs: &[(usize, usize)]) -> TrainingResult<f64> {
        if pairs.is_empty() {
            return Err(TrainingError::Model("batch has no unmasked target tokens".to_string()));
        }

        let mut total = 0.0;
        for &(prev, next) in pairs {
            self.check_token(prev)?;
            self.check_token(next)?;
            let row = &self.weights.transitions[prev];
            let sum: f64 = row.iter().sum();
            total -= (row[next] / sum).ln();
        }
        Ok(total / pairs.len() as f64)
    }

    fn step(&mut self, batch: &Batch, finetune: bool) -> TrainingResult<f64> {
        let pairs = Self::target_pairs(batch)?;
        let loss = self.batch_loss(&pairs)?;

        let increment = self.lr * UPDATE_SCALE;
        for &(prev, next) in &pairs {
            self.weights.transitions[prev][next] += increment;
        }
        if finetune {
            let increment = self.cnn_lr * UPDATE_SCALE;
            for &(_, next) in &pairs {
                self.weights.image_prior[next] += increment;
            }
        }
        Ok(loss)
    }
}

impl CaptionModel for BigramCaptioner {
    fn compute_loss_and_step(&mut self, batch: &Batch) -> TrainingResult<f64> {
        self.step(batch, false)
    }

    fn compute_loss_and_step_with_finetune(&mut self, batch: &Batch) -> TrainingResult<f64> {
        self.step(batch, true)
    }

    fn compute_loss(&mut self, batch: &Batch) -> TrainingResult<f64> {
        let pairs = Self::target_pairs(batch)?;
        self.batch_loss(&pairs)
    }

    fn generate(&mut self, batch: &Batch) -> TrainingResult<Vec<Vec<u32>>> {
        let prior_total: f64 = self.weights.image_prior.iter().sum();
        let prior: Vec<f64> =
            self.weights.image_prior.iter().map(|c| PRIOR_WEIGHT * (c / prior_total).ln()).collect();

        let mut seq = Vec::with_capacity(self.seq_length);
        let mut prev = END_TOKEN as usize;
        for _ in 0..self.seq_length {
            let scores = self.weights.row_log_probs(prev);
            let best = scores
                .iter()
                .zip(&prior)
                .map(|(s, p)| s + p)
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(END_TOKEN as usize, |(ix, _)| ix);
            if best == END_TOKEN as usize {
                break;
            }
            seq.push(best as u32);
            prev = best;
        }

        Ok(vec![seq; batch.len()])
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.lr = lr;
    }

    fn set_cnn_learning_rate(&mut self, lr: f64) {
        self.cnn_lr = lr;
    }

    fn save_weights(&self, path: &Path) -> TrainingResult<()> {
        let json = serde_json::to_string(&self.weights)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn load_weights(&mut self, path: &Path) -> TrainingResult<()> {
        let bytes = std::fs::read(path)?;
        let weights: BigramWeights = serde_json::from_slice(&bytes)?;
        let n = weights.width();
        if weights.vocab_size != self.weights.vocab_size {
            return Err(TrainingError::Model(format!(
                "weights at {} have vocab size {}, dataset has {}",
                path.display(),
                weights.vocab_size,
                self.weights.vocab_size
            )));
        }
        if weights.transitions.len() != n
            || weights.transitions.iter().any(|row| row.len() != n)
            || weights.image_prior.len() != n
        {
            return Err(TrainingError::Model(format!("weights at {} are malformed", path.display())));
        }
        self.weights = weights;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Bounds, ExampleInfo};
    use tempfile::TempDir;

    fn batch(captions: &[&[u32]]) -> Batch {
        let width = 6;
        let mut labels = Vec::new();
        let mut masks = Vec::new();
        for caption in captions {
            let mut row = vec![0; width];
            row[1..=caption.len()].copy_from_slice(caption);
            let mut mask = vec![0.0; width];
            mask[..caption.len() + 2].fill(1.0);
            labels.push(row);
            masks.push(mask);
        }
        Batch {
            images: vec![vec![]],
            labels,
            masks,
            infos: vec![ExampleInfo { id: 7, file_path: String::new() }],
            bounds: Bounds { it_pos_now: 1, it_max: 1, wrapped: false },
        }
    }

    fn model() -> BigramCaptioner {
        let cfg = TrainingConfig { seq_length: 4, learning_rate: 4e-3, ..Default::default() };
        BigramCaptioner::new(&ExecutionContext::cpu(), 3, &cfg).unwrap()
    }

    #[test]
    fn test_loss_drops_with_training() {
        let mut m = model();
        let b = batch(&[&[1, 2, 3]]);
        let first = m.compute_loss_and_step(&b).unwrap();
        for _ in 0..5 {
            m.compute_loss_and_step(&b).unwrap();
        }
        assert!(m.compute_loss(&b).unwrap() < first);
    }

    #[test]
    fn test_compute_loss_does_not_update() {
        let mut m = model();
        let b = batch(&[&[1, 2]]);
        let a = m.compute_loss(&b).unwrap();
        let c = m.compute_loss(&b).unwrap();
        assert!((a - c).abs() < 1e-12);
    }

    #[test]
    fn test_generate_follows_learned_caption() {
        let mut m = model();
        let b = batch(&[&[2, 1, 3]]);
        for _ in 0..10 {
            m.compute_loss_and_step(&b).unwrap();
        }
        assert_eq!(m.generate(&b).unwrap(), vec![vec![2, 1, 3]]);
    }

    #[test]
    fn test_finetune_updates_prior_only_when_requested() {
        let mut m = model();
        let b = batch(&[&[1]]);
        m.compute_loss_and_step(&b).unwrap();
        assert!(m.weights.image_prior.iter().all(|&c| (c - 1.0).abs() < 1e-12));
        m.compute_loss_and_step_with_finetune(&b).unwrap();
        assert!(m.weights.image_prior[1] > 1.0);
    }

    #[test]
    fn test_weights_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("weights.json");
        let mut m = model();
        let b = batch(&[&[3, 3]]);
        m.compute_loss_and_step(&b).unwrap();
        m.save_weights(&path).unwrap();

        let mut restored = model();
        restored.load_weights(&path).unwrap();
        assert!((restored.compute_loss(&b).unwrap() - m.compute_loss(&b).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_gpu_devices() {
        let ctx = ExecutionContext::new(TrainingDevice::Cuda, "run");
        assert!(BigramCaptioner::new(&ctx, 3, &TrainingConfig::default()).is_err());
    }
}
