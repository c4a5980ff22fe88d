//! The training loop.

use crate::checkpoint::CheckpointStore;
use crate::config::TrainingConfig;
use crate::data::{DataSource, Split};
use crate::error::{TrainingError, TrainingResult};
use crate::eval::{EvalOptions, eval_split};
use crate::metrics::LanguageEvaluator;
use crate::model::CaptionModel;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::state::{TrainingState, ValResult};
use std::time::Instant;

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub state: TrainingState,
    /// Validation runs started, including ones that failed.
    pub evaluations: u64,
    pub checkpoints_written: u64,
}

pub struct Trainer<'a, M: ?Sized, D: ?Sized> {
    config: &'a TrainingConfig,
    model: &'a mut M,
    loader: &'a mut D,
    evaluator: Option<Box<dyn LanguageEvaluator>>,
    store: CheckpointStore,
    progress: &'a dyn ProgressSink,
}

impl<'a, M, D> Trainer<'a, M, D>
where
    M: CaptionModel + ?Sized,
    D: DataSource + ?Sized,
{
    pub fn new(
        config: &'a TrainingConfig,
        model: &'a mut M,
        loader: &'a mut D,
        store: CheckpointStore,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self { config, model, loader, evaluator: None, store, progress }
    }

    /// Language metrics collaborator, consulted when `language_eval` is on.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn LanguageEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Train from `state` until the epoch limit is reached.
    ///
    /// Data and model failures, including a non-finite training loss, abort
    /// the run. Validation and checkpoint failures are logged and training
    /// continues.
    pub fn run(&mut self, mut state: TrainingState) -> TrainingResult<TrainingOutcome> {
        let cfg = self.config;
        let run_id = cfg.id.clone();
        let mut outcome_evals = 0;
        let mut outcome_ckpts = 0;

        self.model.set_learning_rate(cfg.learning_rate_at(state.epoch));
        self.model.set_cnn_learning_rate(cfg.cnn_learning_rate);
        self.progress.on_event(ProgressEvent::Started {
            run_id: run_id.clone(),
            iteration: state.iteration,
            epoch: state.epoch,
        });

        while !cfg.max_epochs.is_reached(state.epoch) {
            let start = Instant::now();
            let batch = self.loader.get_batch(Split::Train)?;
            let data_secs = start.elapsed().as_secs_f64();

            let start = Instant::now();
            let train_loss = if cfg.finetune_cnn_after.is_active(state.iteration) {
                self.model.compute_loss_and_step_with_finetune(&batch)?
            } else {
                self.model.compute_loss_and_step(&batch)?
            };
            let step_secs = start.elapsed().as_secs_f64();
            if !train_loss.is_finite() {
                return Err(TrainingError::Model(format!(
                    "training loss is {train_loss} at iteration {}",
                    state.iteration + 1
                )));
            }

            state.iteration += 1;
            if batch.bounds.wrapped {
                state.epoch += 1;
                self.model.set_learning_rate(cfg.learning_rate_at(state.epoch));
            }

            self.progress.on_event(ProgressEvent::Step {
                run_id: run_id.clone(),
                iteration: state.iteration,
                epoch: state.epoch,
                train_loss,
                data_secs,
                step_secs,
            });

            if cfg.losses_log_every > 0 && state.iteration % cfg.losses_log_every == 0 {
                let learning_rate = self.model.learning_rate();
                state.record_loss(train_loss, learning_rate);
                self.progress.on_event(ProgressEvent::LossSnapshot {
                    run_id: run_id.clone(),
                    iteration: state.iteration,
                    train_loss,
                    learning_rate,
                });
            }

            if state.iteration % cfg.save_checkpoint_every == 0 {
                outcome_evals += 1;
                if self.evaluate_and_checkpoint(&mut state) {
                    outcome_ckpts += 1;
                }
            }
        }

        state.iterators = self.loader.iterators();
        self.progress.on_event(ProgressEvent::Finished {
            run_id,
            iteration: state.iteration,
            epoch: state.epoch,
        });

        Ok(TrainingOutcome { state, evaluations: outcome_evals, checkpoints_written: outcome_ckpts })
    }

    /// Validate, and persist a checkpoint if the score improved. Returns true
    /// if a checkpoint was written.
    fn evaluate_and_checkpoint(&mut self, state: &mut TrainingState) -> bool {
        let cfg = self.config;
        let options = EvalOptions::validation(cfg);

        let result = match eval_split(&mut *self.model, &mut *self.loader, self.evaluator.as_deref_mut(), &options) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(iteration = state.iteration, error = %e, "Validation failed; continuing training");
                return false;
            }
        };

        let metric = cfg.language_eval.then_some(cfg.score_metric.as_str());
        let score = match result.score(metric) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(iteration = state.iteration, error = %e, "Cannot score validation run");
                return false;
            }
        };

        if !score.is_finite() {
            tracing::warn!(
                iteration = state.iteration,
                score,
                val_loss = result.mean_loss,
                "Non-finite validation score; skipping checkpoint decision"
            );
            return false;
        }

        state.record_validation(ValResult { loss: result.mean_loss, score, lang_stats: result.lang_stats.clone() });
        self.progress.on_event(ProgressEvent::Evaluation {
            run_id: cfg.id.clone(),
            iteration: state.iteration,
            val_loss: result.mean_loss,
            score,
            lang_stats: result.lang_stats,
        });

        if !state.is_improvement(score) {
            tracing::info!(
                iteration = state.iteration,
                score,
                best_val_score = ?state.best_val_score,
                "No improvement; checkpoint not saved"
            );
            return false;
        }

        let previous = state.best_val_score.replace(score);
        state.iterators = self.loader.iterators();

        match self.store.save(&*self.model, state, cfg) {
            Ok(path) => {
                self.progress.on_event(ProgressEvent::CheckpointSaved {
                    run_id: cfg.id.clone(),
                    iteration: state.iteration,
                    path,
                    best_val_score: score,
                });
                true
            }
            Err(e) => {
                state.best_val_score = previous;
                tracing::warn!(
                    iteration = state.iteration,
                    score,
                    error = %e,
                    "Checkpoint write failed; improvement not persisted"
                );
                false
            }
        }
    }
}
