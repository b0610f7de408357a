// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `generate`
// and all their configurable flags.

use clap::{Args, Subcommand};

use crate::application::train_use_case::{OptimizerChoice, TrainConfig};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the speech emotion recognizer on a prepared dataset
    Train(TrainArgs),

    /// Generate emotion predictions over the test split
    /// using a trained checkpoint
    Generate(GenerateArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset identifier (e.g. iemocap); selects the subdirectory
    /// under --data-dir holding the pre-split tensor bundles
    #[arg(long, default_value = "iemocap")]
    pub dataset: String,

    /// Directory containing the prepared dataset splits
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Directory to save model checkpoints and metrics
    #[arg(long, default_value = "models/ser")]
    pub checkpoint_dir: String,

    /// Number of samples processed together in one forward pass
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Number of data-loading workers feeding the training loop
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Epoch to start counting from (nonzero only makes sense
    /// together with --resume)
    #[arg(long, default_value_t = 0)]
    pub start_epoch: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 500)]
    pub num_epoch: usize,

    /// Optimizer used for parameter updates (adam or sgd)
    #[arg(long, default_value_t = OptimizerChoice::Adam)]
    pub optimizer: OptimizerChoice,

    /// Base learning rate before schedule decay
    #[arg(long, default_value_t = 1e-3)]
    pub base_lr: f64,

    /// Multiplicative learning-rate decay applied at each
    /// scheduled fractional-epoch boundary
    #[arg(long, default_value_t = 0.9999)]
    pub lr_decay: f64,

    /// Base teacher-forcing ratio before schedule decay
    #[arg(long, default_value_t = 1.0)]
    pub base_tr: f64,

    /// Multiplicative teacher-forcing decay per schedule boundary
    #[arg(long, default_value_t = 0.995)]
    pub tf_decay: f64,

    /// Spacing between fractional-epoch decay boundaries
    #[arg(long, default_value_t = 0.05)]
    pub decay_step: f64,

    /// Number of decay boundaries in the schedule
    #[arg(long, default_value_t = 20)]
    pub decay_points: usize,

    /// Global-norm gradient clipping threshold
    #[arg(long, default_value_t = 0.1)]
    pub gradient_clip: f32,

    /// SGD momentum (ignored for Adam)
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f64,

    /// Use Nesterov momentum with SGD
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    pub nesterov: bool,

    /// L2 weight-decay penalty
    #[arg(long, default_value_t = 5e-4)]
    pub weight_decay: f64,

    /// Loss weight on the categorical emotion term
    #[arg(long, default_value_t = 1.0)]
    pub upper_body_weight: f64,

    /// Regularization weight for the affective-feature (dimensional) loss
    #[arg(long, default_value_t = 0.8)]
    pub affs_reg: f64,

    /// Regularization weight for the unit-norm constraint
    #[arg(long, default_value_t = 0.1)]
    pub quat_norm_reg: f64,

    /// Regularization weight for the L1 dimensional term
    #[arg(long, default_value_t = 1.2)]
    pub quat_reg: f64,

    /// Regularization weight for the full-vector reconstruction loss
    #[arg(long, default_value_t = 1.2)]
    pub recons_reg: f64,

    /// Interval (in epochs) after which the model is evaluated
    #[arg(long, default_value_t = 1)]
    pub eval_interval: usize,

    /// Interval (in steps) after which aggregate losses are logged
    #[arg(long, default_value_t = 100)]
    pub log_interval: usize,

    /// Interval (in epochs) after which a checkpoint is saved
    #[arg(long, default_value_t = 10)]
    pub save_interval: usize,

    /// Shard each batch across this many devices when > 1
    #[arg(long, default_value_t = 1)]
    pub device_count: usize,

    /// Resume from the most recent checkpoint instead of
    /// initializing fresh parameters
    #[arg(long, default_value_t = false)]
    pub resume: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let step_fractions = (0..a.decay_points)
            .map(|i| a.decay_step * i as f64)
            .collect();
        TrainConfig {
            dataset: a.dataset,
            data_dir: a.data_dir,
            checkpoint_dir: a.checkpoint_dir,
            batch_size: a.batch_size,
            num_workers: a.num_workers,
            start_epoch: a.start_epoch,
            num_epoch: a.num_epoch,
            optimizer: a.optimizer,
            base_lr: a.base_lr,
            lr_decay: a.lr_decay,
            base_tr: a.base_tr,
            tf_decay: a.tf_decay,
            step_fractions,
            gradient_clip: a.gradient_clip,
            momentum: a.momentum,
            nesterov: a.nesterov,
            weight_decay: a.weight_decay,
            upper_body_weight: a.upper_body_weight,
            affs_reg: a.affs_reg,
            quat_norm_reg: a.quat_norm_reg,
            quat_reg: a.quat_reg,
            recons_reg: a.recons_reg,
            eval_interval: a.eval_interval,
            log_interval: a.log_interval,
            save_interval: a.save_interval,
            device_count: a.device_count,
            resume: a.resume,
        }
    }
}

/// All arguments for the `generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "models/ser")]
    pub checkpoint_dir: String,

    /// Directory containing the prepared dataset splits
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Number of test samples to run through the model
    /// (0 = the whole test split)
    #[arg(long, default_value_t = 0)]
    pub samples: usize,

    /// Shuffle the test samples before taking --samples of them
    #[arg(long, default_value_t = false)]
    pub randomized: bool,

    /// Output CSV consumed by the downstream motion generator
    #[arg(long, default_value = "predictions.csv")]
    pub output: String,
}
