// ============================================================
// Layer 3 — Emotion Label Space
// ============================================================
// Every sample carries two kinds of ground truth:
//   - a categorical label (one-hot or soft vector over emotion
//     classes, e.g. angry / happy / sad / neutral)
//   - a dimensional label (continuous valence / arousal /
//     dominance scores, bounded to [-3, 3] by the model head)
//
// The model predicts one fused vector covering both families;
// LabelSpace records where the split between them lies.

use serde::{Deserialize, Serialize};

/// Widths of the two label families and the fused output vector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelSpace {
    /// Number of categorical emotion classes
    pub num_cats: usize,

    /// Number of continuous emotion dimensions
    pub num_dims: usize,
}

impl LabelSpace {
    pub fn new(num_cats: usize, num_dims: usize) -> Self {
        Self { num_cats, num_dims }
    }

    /// Width D of the fused model output: categorical scores
    /// followed by dimensional scores.
    pub fn total(&self) -> usize {
        self.num_cats + self.num_dims
    }
}

/// Per-feature normalization statistics computed by the dataset
/// preparation step. Standardization is already applied to the
/// tensors on disk; the stats ride along so downstream consumers
/// can undo it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormStats {
    pub means: Vec<f32>,
    pub stds: Vec<f32>,
}
