//! Showtell CLI - train and evaluate image-captioning models
//!
//! Provides the `showtell` command: `train` runs the training loop with
//! periodic validation and checkpointing, `eval` scores a saved checkpoint on
//! one split, and `checkpoints` lists what a checkpoint directory retains.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::types::{CheckpointsCommand, EvalCommand, TrainCommand};
use commands::{checkpoints, eval, train};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Showtell - Show-and-Tell caption model training
#[derive(Parser, Debug)]
#[command(
    name = "showtell",
    author,
    version,
    about = "Showtell - train and evaluate image-captioning models",
    long_about = "Showtell drives a caption model through minibatch training with periodic validation,\nkeeps the best-scoring checkpoints on disk and resumes interrupted runs."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a caption model
    ///
    /// Options come from built-in defaults, then the TOML file given with
    /// --config (or ./showtell.toml), then the flags below.
    Train(TrainCommand),

    /// Evaluate the latest checkpoint in a directory
    Eval(EvalCommand),

    /// List the checkpoints retained in a directory
    Checkpoints(CheckpointsCommand),
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let level = parse_level(&args.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    // Logs go to stderr so --json output on stdout stays machine-readable.
    let builder = FmtSubscriber::builder().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    match args.command {
        Command::Train(command) => train::execute(command),
        Command::Eval(command) => eval::execute(command),
        Command::Checkpoints(command) => checkpoints::execute(&command),
    }
}
