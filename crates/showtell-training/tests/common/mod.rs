//! Scripted collaborators for exercising the control loop without a model.

// Each test binary compiles this module and uses a different subset of it.

use showtell_training::{
    Batch, Bounds, CaptionModel, DataSource, ExampleInfo, LangStats, LanguageEvaluator, Prediction, Split,
    SplitCursors, TrainingError, TrainingResult,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

/// In-memory data source with fixed split sizes.
pub struct ScriptedSource {
    pub batch_size: usize,
    pub sizes: BTreeMap<Split, usize>,
    pub cursors: SplitCursors,
    pub fetches: BTreeMap<Split, usize>,
}

impl ScriptedSource {
    pub fn new(batch_size: usize, train: usize, val: usize) -> Self {
        let mut sizes = BTreeMap::new();
        sizes.insert(Split::Train, train);
        sizes.insert(Split::Val, val);
        Self { batch_size, sizes, cursors: SplitCursors::new(), fetches: BTreeMap::new() }
    }

    pub fn fetched(&self, split: Split) -> usize {
        self.fetches.get(&split).copied().unwrap_or(0)
    }

    #[allow(dead_code)]
    pub fn total_fetches(&self) -> usize {
        self.fetches.values().sum()
    }
}

impl DataSource for ScriptedSource {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn vocab_size(&self) -> usize {
        3
    }

    fn split_size(&self, split: Split) -> usize {
        self.sizes.get(&split).copied().unwrap_or(0)
    }

    fn get_batch(&mut self, split: Split) -> TrainingResult<Batch> {
        *self.fetches.entry(split).or_default() += 1;
        let max = self.split_size(split);
        if max == 0 {
            return Err(TrainingError::Dataset(format!("split '{split}' has no images")));
        }

        let mut cursor = self.cursors.get(&split).copied().unwrap_or(0);
        let mut wrapped = false;
        let mut infos = Vec::new();
        for _ in 0..self.batch_size {
            infos.push(ExampleInfo { id: cursor as u64, file_path: String::new() });
            cursor += 1;
            if cursor >= max {
                cursor = 0;
                wrapped = true;
            }
        }
        self.cursors.insert(split, cursor);

        Ok(Batch {
            images: vec![Vec::new(); infos.len()],
            labels: vec![vec![0, 1, 0]; infos.len()],
            masks: vec![vec![1.0, 1.0, 1.0]; infos.len()],
            infos,
            bounds: Bounds { it_pos_now: cursor, it_max: max, wrapped },
        })
    }

    fn reset_iterator(&mut self, split: Split) {
        self.cursors.insert(split, 0);
    }

    fn iterators(&self) -> SplitCursors {
        self.cursors.clone()
    }

    fn set_iterators(&mut self, cursors: &SplitCursors) -> TrainingResult<()> {
        self.cursors = cursors.clone();
        Ok(())
    }

    fn decode_sequence(&self, seqs: &[Vec<u32>]) -> Vec<String> {
        seqs.iter().map(|s| format!("caption of {} tokens", s.len())).collect()
    }
}

/// Model whose validation losses follow a script.
///
/// Every `compute_loss` call pops the next scripted loss; the last one repeats.
/// Training steps report `train_loss`, or 2.0 when unset.
#[derive(Default)]
pub struct ScriptedModel {
    pub eval_losses: VecDeque<f64>,
    pub last_eval_loss: f64,
    pub train_loss: Option<f64>,
    pub steps: u64,
    pub finetune_steps: u64,
    pub fail_at_step: Option<u64>,
    pub lr: f64,
    #[allow(dead_code)]
    pub cnn_lr: f64,
    #[allow(dead_code)]
    pub loaded_from: Option<String>,
}

impl ScriptedModel {
    pub fn with_eval_losses(losses: &[f64]) -> Self {
        Self { eval_losses: losses.iter().copied().collect(), last_eval_loss: 1.0, ..Default::default() }
    }

    fn step(&mut self) -> TrainingResult<f64> {
        if self.fail_at_step == Some(self.steps + self.finetune_steps) {
            return Err(TrainingError::Model("NaN in gradients".to_string()));
        }
        Ok(self.train_loss.unwrap_or(2.0))
    }
}

impl CaptionModel for ScriptedModel {
    fn compute_loss_and_step(&mut self, _batch: &Batch) -> TrainingResult<f64> {
        let loss = self.step()?;
        self.steps += 1;
        Ok(loss)
    }

    fn compute_loss_and_step_with_finetune(&mut self, _batch: &Batch) -> TrainingResult<f64> {
        let loss = self.step()?;
        self.finetune_steps += 1;
        Ok(loss)
    }

    fn compute_loss(&mut self, _batch: &Batch) -> TrainingResult<f64> {
        if let Some(loss) = self.eval_losses.pop_front() {
            self.last_eval_loss = loss;
        }
        Ok(self.last_eval_loss)
    }

    fn generate(&mut self, batch: &Batch) -> TrainingResult<Vec<Vec<u32>>> {
        Ok(vec![vec![1, 2]; batch.len()])
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
        std::fs::write(path, format!("steps={}", self.steps + self.finetune_steps))?;
        Ok(())
    }

    fn load_weights(&mut self, path: &Path) -> TrainingResult<()> {
        self.loaded_from = Some(std::fs::read_to_string(path)?);
        Ok(())
    }
}

/// Language evaluator returning scripted CIDEr values.
#[allow(dead_code)]
pub struct ScriptedEvaluator {
    pub cider: VecDeque<f64>,
}

impl LanguageEvaluator for ScriptedEvaluator {
    fn evaluate(&mut self, _dataset: &str, predictions: &[Prediction]) -> TrainingResult<LangStats> {
        let cider = self
            .cider
            .pop_front()
            .ok_or_else(|| TrainingError::Evaluation("script exhausted".to_string()))?;
        let mut stats = LangStats::new();
        stats.insert("CIDEr".to_string(), cider);
        stats.insert("count".to_string(), predictions.len() as f64);
        Ok(stats)
    }
}
