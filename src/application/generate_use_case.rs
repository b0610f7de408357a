// ============================================================
// Layer 2 — GenerateUseCase
// ============================================================
// Loads the trained recognizer from its checkpoint, runs the
// held-out test split through it and writes one CSV row per
// sample for the downstream motion-generation consumer.

use anyhow::{Context, Result};
use std::{fs, io::Write};

use crate::data::loader::DatasetLoader;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::generator::Generator;

pub struct GenerateUseCase {
    checkpoint_dir: String,
    data_dir: String,
    output: String,
}

impl GenerateUseCase {
    pub fn new(checkpoint_dir: String, data_dir: String, output: String) -> Self {
        Self { checkpoint_dir, data_dir, output }
    }

    /// Generate predictions for `count` test samples (0 = the
    /// whole split), optionally in shuffled order. Returns the
    /// number of rows written.
    pub fn execute(&self, count: usize, randomized: bool) -> Result<usize> {
        let ckpt_manager = CheckpointManager::new(&self.checkpoint_dir);

        // the saved run config names the dataset the checkpoint
        // was trained on
        let cfg = ckpt_manager.load_config()?;
        let bundle = DatasetLoader::new(&self.data_dir, &cfg.dataset).load()?;

        let generator = Generator::from_checkpoint(&ckpt_manager, bundle.shape, bundle.label_space)?;
        let predictions = generator.generate(&bundle.test, count, randomized)?;
        tracing::info!("Generated {} predictions", predictions.len());

        let mut f = fs::File::create(&self.output)
            .with_context(|| format!("Cannot create output file '{}'", self.output))?;

        let header: Vec<String> = (0..bundle.label_space.num_cats)
            .map(|i| format!("cat_{i}"))
            .chain((0..bundle.label_space.num_dims).map(|i| format!("dim_{i}")))
            .collect();
        writeln!(f, "sample,{}", header.join(","))?;

        for (i, p) in predictions.iter().enumerate() {
            let row: Vec<String> = p
                .cat_scores
                .iter()
                .chain(p.dim_scores.iter())
                .map(|v| format!("{v:.6}"))
                .collect();
            writeln!(f, "{i},{}", row.join(","))?;
        }

        Ok(predictions.len())
    }
}
