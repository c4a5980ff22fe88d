use crate::metrics::LangStats;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { run_id: String, iteration: u64, epoch: u64 },
    Step { run_id: String, iteration: u64, epoch: u64, train_loss: f64, data_secs: f64, step_secs: f64 },
    LossSnapshot { run_id: String, iteration: u64, train_loss: f64, learning_rate: f64 },
    Evaluation { run_id: String, iteration: u64, val_loss: f64, score: f64, lang_stats: Option<LangStats> },
    CheckpointSaved { run_id: String, iteration: u64, path: PathBuf, best_val_score: f64 },
    Finished { run_id: String, iteration: u64, epoch: u64 },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { run_id, iteration, epoch } => {
                println!("[train:{run_id}] started at iter {iteration} (epoch {epoch})");
            }
            ProgressEvent::Step { run_id, iteration, epoch, train_loss, data_secs, step_secs } => println!(
                "[train:{run_id}] iter {iteration} (epoch {epoch}), train_loss = {train_loss:.3}, read data = {data_secs:.3}s, time/batch = {step_secs:.3}s"
            ),
            ProgressEvent::LossSnapshot { .. } => {}
            ProgressEvent::Evaluation { run_id, iteration, val_loss, score, lang_stats } => {
                println!("[train:{run_id}] iter {iteration} validation loss = {val_loss:.3}, score = {score:.4}");
                if let Some(stats) = lang_stats {
                    for (k, v) in stats {
                        println!("[train:{run_id}]   {k}: {v:.4}");
                    }
                }
            }
            ProgressEvent::CheckpointSaved { run_id, path, .. } => {
                println!("[train:{run_id}] model saved to {}", path.display());
            }
            ProgressEvent::Finished { run_id, iteration, epoch } => {
                println!("[train:{run_id}] finished at iter {iteration} (epoch {epoch})");
            }
        }
    }
}

/// Forwards progress to `tracing`. Per-step events go to `debug`.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { run_id, iteration, epoch } => {
                tracing::info!(%run_id, iteration, epoch, "Training started");
            }
            ProgressEvent::Step { run_id, iteration, epoch, train_loss, data_secs, step_secs } => {
                tracing::debug!(%run_id, iteration, epoch, train_loss, data_secs, step_secs, "Step");
            }
            ProgressEvent::LossSnapshot { run_id, iteration, train_loss, learning_rate } => {
                tracing::info!(%run_id, iteration, train_loss, learning_rate, "Loss snapshot");
            }
            ProgressEvent::Evaluation { run_id, iteration, val_loss, score, lang_stats } => {
                tracing::info!(%run_id, iteration, val_loss, score, lang_stats = ?lang_stats, "Validation");
            }
            ProgressEvent::CheckpointSaved { run_id, iteration, path, best_val_score } => {
                tracing::info!(%run_id, iteration, path = %path.display(), best_val_score, "Model saved");
            }
            ProgressEvent::Finished { run_id, iteration, epoch } => {
                tracing::info!(%run_id, iteration, epoch, "Training finished");
            }
        }
    }
}
