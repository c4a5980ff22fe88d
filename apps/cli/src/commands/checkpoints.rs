//! Checkpoint listing.

use crate::commands::types::CheckpointsCommand;
use anyhow::{Context, Result};
use colored::Colorize;
use showtell_training::CheckpointStore;

pub fn execute(command: &CheckpointsCommand) -> Result<()> {
    let store = CheckpointStore::new(command.dir.clone(), &command.id, 1);
    let entries = store
        .list()
        .with_context(|| format!("Failed to read checkpoint index in {}", command.dir.display()))?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Checkpoints ({})", entries.len()).bold().cyan());
    println!();

    if entries.is_empty() {
        println!("  {}", format!("No index at {}", store.layout().index_path().display()).dimmed());
        return Ok(());
    }

    println!("{:<28} {:>10} {:>6} {:>12}  {}", "Name", "Iteration", "Epoch", "Best score", "Saved at");
    println!("{}", "─".repeat(90));
    for entry in entries {
        let best = entry.best_val_score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
        println!(
            "{:<28} {:>10} {:>6} {:>12}  {}",
            entry.name.cyan(),
            entry.iteration,
            entry.epoch,
            best,
            entry.saved_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
    Ok(())
}
