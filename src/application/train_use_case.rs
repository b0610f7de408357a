// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load the pre-split tensor bundles   (Layer 4 - data)
//   Step 2: Save the run configuration          (Layer 6 - infra)
//   Step 3: Open the metrics log                (Layer 6 - infra)
//   Step 4: Run the training loop               (Layer 5 - ml)
//
// The config is one immutable value passed into every component
// constructor — no ambient state.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::data::loader::DatasetLoader;
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::trainer::run_training;

/// Optimizer selected for the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OptimizerChoice {
    Adam,
    Sgd,
}

impl FromStr for OptimizerChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            other => Err(format!("unknown optimizer '{other}' (expected adam or sgd)")),
        }
    }
}

impl fmt::Display for OptimizerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adam => write!(f, "adam"),
            Self::Sgd => write!(f, "sgd"),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Serializable so it can
// be saved next to the checkpoints and reloaded for generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset: String,
    pub data_dir: String,
    pub checkpoint_dir: String,
    pub batch_size: usize,
    pub num_workers: usize,
    pub start_epoch: usize,
    pub num_epoch: usize,
    pub optimizer: OptimizerChoice,
    pub base_lr: f64,
    pub lr_decay: f64,
    pub base_tr: f64,
    pub tf_decay: f64,
    /// Fractions of num_epoch at which one decay step applies
    pub step_fractions: Vec<f64>,
    pub gradient_clip: f32,
    pub momentum: f64,
    pub nesterov: bool,
    pub weight_decay: f64,
    pub upper_body_weight: f64,
    pub affs_reg: f64,
    pub quat_norm_reg: f64,
    pub quat_reg: f64,
    pub recons_reg: f64,
    pub eval_interval: usize,
    pub log_interval: usize,
    pub save_interval: usize,
    pub device_count: usize,
    pub resume: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset: "iemocap".to_string(),
            data_dir: "data".to_string(),
            checkpoint_dir: "models/ser".to_string(),
            batch_size: 128,
            num_workers: 4,
            start_epoch: 0,
            num_epoch: 500,
            optimizer: OptimizerChoice::Adam,
            base_lr: 1e-3,
            lr_decay: 0.9999,
            base_tr: 1.0,
            tf_decay: 0.995,
            step_fractions: (0..20).map(|i| 0.05 * i as f64).collect(),
            gradient_clip: 0.1,
            momentum: 0.9,
            nesterov: true,
            weight_decay: 5e-4,
            upper_body_weight: 1.0,
            affs_reg: 0.8,
            quat_norm_reg: 0.1,
            quat_reg: 1.2,
            recons_reg: 1.2,
            eval_interval: 1,
            log_interval: 100,
            save_interval: 10,
            device_count: 1,
            resume: false,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Load the dataset splits ───────────────────────────────────
        // Fixed-shape, already-standardized tensors; shapes and
        // label widths come from the bundle's manifest.
        let loader = DatasetLoader::new(&cfg.data_dir, &cfg.dataset);
        let bundle = loader.load()?;
        tracing::debug!(
            "Normalization stats cover {} features",
            bundle.stats.means.len()
        );

        // ── Step 2: Save config for generation ────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.save_config(cfg)?;

        // ── Step 3: Metrics CSV ────────────────────────────────────────────────
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 4: Run training loop (Layer 5) ────────────────────────────────
        run_training(cfg, bundle, ckpt_manager, metrics)?;

        Ok(())
    }
}
