use crate::data::Batch;
use crate::error::TrainingResult;
use std::path::Path;

/// The captioning model as seen by the control loop.
///
/// Backends own all tensor work; the loop only asks for losses, updates and
/// generated token ids.
pub trait CaptionModel {
    /// Forward/backward pass and one optimizer update of the language model.
    /// Returns the loss computed before the update.
    fn compute_loss_and_step(&mut self, batch: &Batch) -> TrainingResult<f64>;

    /// Like [`CaptionModel::compute_loss_and_step`], plus an update of the image encoder.
    fn compute_loss_and_step_with_finetune(&mut self, batch: &Batch) -> TrainingResult<f64>;

    /// Inference-only loss; must not change weights.
    fn compute_loss(&mut self, batch: &Batch) -> TrainingResult<f64>;

    /// One token sequence per image in the batch.
    fn generate(&mut self, batch: &Batch) -> TrainingResult<Vec<Vec<u32>>>;

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    fn set_cnn_learning_rate(&mut self, lr: f64);

    fn save_weights(&self, path: &Path) -> TrainingResult<()>;

    fn load_weights(&mut self, path: &Path) -> TrainingResult<()>;
}
