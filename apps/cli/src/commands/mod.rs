//! Command implementations for the Showtell CLI.

pub mod checkpoints;
pub mod eval;
pub mod train;
pub mod types;
