//! Training command implementation.

use crate::commands::types::TrainCommand;
use crate::config;
use anyhow::{Context, Result};
use colored::Colorize;
use showtell_training::{
    BigramCaptioner, CaptionDataLoader, CheckpointStore, CommandLanguageEvaluator, DataSource, ExecutionContext,
    ProgressSink, StdoutProgressSink, Trainer, TrainingConfig, TrainingDevice, TracingProgressSink, resume,
};
use serde_json::json;

pub fn execute(command: TrainCommand) -> Result<()> {
    let config = config::resolve(command.config.as_deref(), &command.overrides)?;
    config.validate().context("Invalid training configuration")?;

    let device: TrainingDevice = command.device.parse().map_err(anyhow::Error::msg)?;
    let ctx = ExecutionContext::new(device, config.id.clone());

    // Checked before the dataset is opened so an incompatible checkpoint fails fast.
    let resume_point = resume(config.start_from.as_deref(), &config).with_context(|| {
        format!(
            "Cannot resume from {}",
            config.start_from.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
        )
    })?;

    let mut loader = CaptionDataLoader::open(&ctx, &config).context("Failed to open dataset")?;
    let mut model = BigramCaptioner::new(&ctx, loader.vocab_size(), &config)?;
    let state = resume_point.restore_into(&mut model, &mut loader).context("Failed to restore checkpoint")?;

    let progress: Box<dyn ProgressSink> =
        if command.progress { Box::new(StdoutProgressSink) } else { Box::new(TracingProgressSink) };

    let mut trainer =
        Trainer::new(&config, &mut model, &mut loader, CheckpointStore::for_config(&config), progress.as_ref());
    if config.language_eval {
        trainer = trainer.with_evaluator(Box::new(language_evaluator(&config)?));
    }

    let outcome = trainer.run(state).context("Training failed")?;

    if command.json {
        let out = json!({
            "id": config.id,
            "iteration": outcome.state.iteration,
            "epoch": outcome.state.epoch,
            "best_val_score": outcome.state.best_val_score,
            "evaluations": outcome.evaluations,
            "checkpoints_written": outcome.checkpoints_written,
            "checkpoint_path": config.checkpoint_path,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training complete".bold().green());
    println!("  Iterations: {}", outcome.state.iteration.to_string().cyan());
    println!("  Epochs: {}", outcome.state.epoch.to_string().cyan());
    match outcome.state.best_val_score {
        Some(score) => println!("  Best validation score: {}", format!("{score:.4}").cyan()),
        None => println!("  Best validation score: {}", "none".dimmed()),
    }
    println!(
        "  Checkpoints: {} written to {}",
        outcome.checkpoints_written,
        config.checkpoint_path.display().to_string().dimmed()
    );
    println!();
    Ok(())
}

pub fn language_evaluator(config: &TrainingConfig) -> Result<CommandLanguageEvaluator> {
    let cmd = config
        .language_eval_cmd
        .as_deref()
        .context("language_eval is enabled but no language_eval_cmd is configured")?;
    Ok(CommandLanguageEvaluator::new(cmd, &config.checkpoint_path, &config.id)?)
}
