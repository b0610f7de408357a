// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// Two commands are supported:
//   1. `train`    — fits the emotion recognizer to a dataset
//   2. `generate` — loads a checkpoint and emits predictions
//      over held-out samples for the downstream motion stage
//
// All business logic is delegated to Layer 2 (application).

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, GenerateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "emo-ser",
    version = "0.1.0",
    about = "Train an attentive conv-RNN speech emotion recognizer, then generate predictions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// The CLI layer only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => Self::run_train(args),
            Commands::Generate(args) => Self::run_generate(args),
        }
    }

    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Starting training on dataset in: {}", args.data_dir);

        // Convert CLI args → application config (the application layer
        // never sees clap types)
        let use_case = TrainUseCase::new(args.into());
        use_case.execute()?;

        println!("Training complete. Checkpoint saved.");
        Ok(())
    }

    fn run_generate(args: GenerateArgs) -> Result<()> {
        use crate::application::generate_use_case::GenerateUseCase;

        let use_case = GenerateUseCase::new(
            args.checkpoint_dir,
            args.data_dir,
            args.output.clone(),
        );
        let written = use_case.execute(args.samples, args.randomized)?;
        println!("\nWrote {written} predictions to {}", args.output);
        Ok(())
    }
}
