//! Evaluation command implementation.

use crate::commands::train::language_evaluator;
use crate::commands::types::EvalCommand;
use anyhow::{Context, Result};
use colored::Colorize;
use showtell_training::{
    BigramCaptioner, CaptionDataLoader, CaptionModel, CheckpointStore, DataSource, EvalOptions, ExecutionContext,
    ImageBudget, LanguageEvaluator, Split, TrainingDevice, eval_split,
};
use serde_json::json;

pub fn execute(command: EvalCommand) -> Result<()> {
    let split: Split = command.split.parse().map_err(anyhow::Error::msg)?;
    let max_images = ImageBudget::try_from(command.num_images).map_err(anyhow::Error::msg)?;
    let device: TrainingDevice = command.device.parse().map_err(anyhow::Error::msg)?;

    let store = CheckpointStore::locate(&command.start_from, &command.id, 1)?;
    let loaded = store
        .latest()
        .context("Failed to read checkpoint index")?
        .with_context(|| format!("No checkpoint found in {}", command.start_from.display()))?;

    let mut config = loaded.record.config.clone();
    if let Some(path) = &command.input_json {
        config.input_json.clone_from(path);
    }
    if let Some(path) = &command.input_labels {
        config.input_labels.clone_from(path);
    }

    let ctx = ExecutionContext::new(device, config.id.clone());
    let weights = loaded.verified_weights_path()?;
    let mut loader = CaptionDataLoader::open(&ctx, &config).context("Failed to open dataset")?;
    let mut model = BigramCaptioner::new(&ctx, loader.vocab_size(), &config)?;
    model.load_weights(&weights).with_context(|| format!("Failed to load {}", weights.display()))?;

    let mut evaluator = if command.language_eval { Some(language_evaluator(&config)?) } else { None };
    let options = EvalOptions {
        split,
        max_images,
        language_eval: command.language_eval,
        dataset: config.input_json.display().to_string(),
        verbose: command.verbose,
    };

    tracing::info!(
        checkpoint = %loaded.dir.display(),
        iteration = loaded.record.state.iteration,
        %split,
        "Evaluating checkpoint"
    );
    let result = eval_split(
        &mut model,
        &mut loader,
        evaluator.as_mut().map(|e| e as &mut dyn LanguageEvaluator),
        &options,
    )
    .context("Evaluation failed")?;

    if let Some(path) = &command.dump_predictions {
        std::fs::write(path, serde_json::to_string_pretty(&result.predictions)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if command.json {
        let out = json!({
            "checkpoint": loaded.dir,
            "iteration": loaded.record.state.iteration,
            "split": split.to_string(),
            "images": result.predictions.len(),
            "loss": result.mean_loss,
            "lang_stats": result.lang_stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Evaluation of {}", loaded.dir.display()).bold().cyan());
    println!("  Split: {} ({} images)", split.to_string().cyan(), result.predictions.len());
    println!("  Loss: {}", format!("{:.4}", result.mean_loss).cyan());
    if let Some(stats) = &result.lang_stats {
        for (metric, value) in stats {
            println!("  {metric}: {}", format!("{value:.4}").cyan());
        }
    }
    println!();
    Ok(())
}
