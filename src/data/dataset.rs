use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One standardized audio-feature tensor with its two labels,
/// stored flat in row-major (C, H, W) order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSample {
    pub features: Vec<f32>,
    pub label_cat: Vec<f32>,
    pub label_dim: Vec<f32>,
}

impl EmotionSample {
    /// Index of the strongest categorical class in the label.
    pub fn cat_argmax(&self) -> usize {
        self.label_cat
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

pub struct EmotionDataset {
    samples: Vec<EmotionSample>,
}

impl EmotionDataset {
    pub fn new(samples: Vec<EmotionSample>) -> Self {
        Self { samples }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl Dataset<EmotionSample> for EmotionDataset {
    fn get(&self, index: usize) -> Option<EmotionSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
