//! Validation pass over one split.

use crate::config::{ImageBudget, TrainingConfig};
use crate::data::{DataSource, Split};
use crate::error::{TrainingError, TrainingResult};
use crate::metrics::{LangStats, LanguageEvaluator};
use crate::model::CaptionModel;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub image_id: u64,
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Sum of batch losses divided by the number of batches.
    pub mean_loss: f64,
    pub predictions: Vec<Prediction>,
    pub lang_stats: Option<LangStats>,
}

impl EvaluationResult {
    /// Higher-is-better score: the named language metric when one is given,
    /// otherwise the negated mean loss.
    pub fn score(&self, metric: Option<&str>) -> TrainingResult<f64> {
        let Some(metric) = metric else {
            return Ok(-self.mean_loss);
        };
        self.lang_stats
            .as_ref()
            .and_then(|stats| stats.get(metric).copied())
            .ok_or_else(|| TrainingError::Evaluation(format!("language metrics have no '{metric}' entry")))
    }
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub split: Split,
    pub max_images: ImageBudget,
    pub language_eval: bool,
    /// Passed to the language evaluator to select reference captions.
    pub dataset: String,
    pub verbose: bool,
}

impl EvalOptions {
    /// Options for the periodic validation run during training.
    #[must_use]
    pub fn validation(config: &TrainingConfig) -> Self {
        Self {
            split: Split::Val,
            max_images: config.val_images_use,
            language_eval: config.language_eval,
            dataset: config.input_json.display().to_string(),
            verbose: false,
        }
    }
}

/// Run the model over `options.split` from its first image.
///
/// Stops after the batch that wraps the split or once `max_images` examples
/// were processed, whichever happens first.
pub fn eval_split<M, D>(
    model: &mut M,
    loader: &mut D,
    evaluator: Option<&mut (dyn LanguageEvaluator + '_)>,
    options: &EvalOptions,
) -> TrainingResult<EvaluationResult>
where
    M: CaptionModel + ?Sized,
    D: DataSource + ?Sized,
{
    loader.reset_iterator(options.split);

    let mut n = 0usize;
    let mut loss_sum = 0.0;
    let mut loss_evals = 0usize;
    let mut predictions = Vec::new();

    loop {
        let batch = loader.get_batch(options.split)?;
        n += batch.len();

        let loss = model.compute_loss(&batch)?;
        loss_sum += loss;
        loss_evals += 1;

        let seq = model.generate(&batch)?;
        let sents = loader.decode_sequence(&seq);
        for (info, caption) in batch.infos.iter().zip(sents) {
            if options.verbose {
                tracing::info!(image_id = info.id, caption = %caption, "Generated caption");
            }
            predictions.push(Prediction { image_id: info.id, caption });
        }

        let ix1 = options.max_images.cap(batch.bounds.it_max);
        tracing::debug!(
            split = %options.split,
            processed = n,
            total = ix1,
            loss,
            "Evaluating validation performance"
        );

        if batch.bounds.wrapped {
            break;
        }
        if options.max_images.is_exhausted(n) {
            break;
        }
    }

    let lang_stats = if options.language_eval {
        let evaluator = evaluator.ok_or_else(|| {
            TrainingError::Evaluation("language evaluation enabled but no evaluator configured".to_string())
        })?;
        Some(evaluator.evaluate(&options.dataset, &predictions)?)
    } else {
        None
    };

    Ok(EvaluationResult { mean_loss: loss_sum / loss_evals as f64, predictions, lang_stats })
}
