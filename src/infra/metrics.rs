// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch:
// loss aggregates, eval accuracy, and the scheduled learning
// rate / teacher-forcing ratio actually applied. Observability
// plumbing only — nothing here feeds back into training.
//
// Output file: {checkpoint_dir}/metrics.csv

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,

    /// Average composite loss over all training batches
    pub train_loss: f64,

    /// Average categorical cross-entropy term
    pub train_cat: f64,

    /// Average dimensional regression term
    pub train_dim: f64,

    /// Average composite loss on the eval split (NaN when the
    /// epoch skipped evaluation)
    pub eval_loss: f64,

    /// Fraction of eval samples whose categorical argmax matches
    pub eval_acc: f64,

    /// Learning rate applied this epoch
    pub lr: f64,

    /// Teacher-forcing ratio this epoch
    pub tf: f64,
}

impl EpochMetrics {
    /// Returns true if this epoch improved over the previous best
    /// eval loss; drives the best-model checkpoint. A NaN
    /// eval_loss (skipped epoch) is never an improvement.
    pub fn is_improvement(&self, best_eval_loss: f64) -> bool {
        self.eval_loss < best_eval_loss
    }
}

/// Appends epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet, so
    /// resumed runs append to the same log.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,train_loss,train_cat,train_dim,eval_loss,eval_acc,lr,tf")?;
        }
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.8},{:.6}",
            m.epoch, m.train_loss, m.train_cat, m.train_dim, m.eval_loss, m.eval_acc, m.lr, m.tf,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics {
            epoch: 2,
            train_loss: 2.5,
            train_cat: 1.0,
            train_dim: 0.5,
            eval_loss: 2.3,
            eval_acc: 0.4,
            lr: 1e-3,
            tf: 1.0,
        };
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_skipped_eval_is_never_an_improvement() {
        let m = EpochMetrics {
            epoch: 3,
            train_loss: 2.5,
            train_cat: 1.0,
            train_dim: 0.5,
            eval_loss: f64::NAN,
            eval_acc: f64::NAN,
            lr: 1e-3,
            tf: 1.0,
        };
        assert!(!m.is_improvement(f64::INFINITY));
    }
}
