// ============================================================
// Layer 4 — Emotion Batcher
// ============================================================
// Implements Burn's Batcher trait to stack individual
// EmotionSamples into device-ready tensors.
//
//   Input:  Vec of N samples, each a flat (C*H*W) feature
//           vector plus categorical / dimensional labels
//   Output: EmotionBatch with
//             features [N, C, H, W]
//             cats     [N, num_cats]
//             dims     [N, num_dims]
//
// All samples in a bundle share one fixed shape, so stacking
// is a flatten + reshape with no padding.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::EmotionSample;
use crate::data::loader::FeatureShape;
use crate::domain::labels::LabelSpace;

/// A batch of emotion samples ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct EmotionBatch<B: Backend> {
    /// Spectrogram-like inputs — shape: [batch, channels, height, width]
    pub features: Tensor<B, 4>,

    /// Categorical targets (one-hot or soft) — shape: [batch, num_cats]
    pub cats: Tensor<B, 2>,

    /// Dimensional targets — shape: [batch, num_dims]
    pub dims: Tensor<B, 2>,
}

impl<B: Backend> EmotionBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.features.dims()[0]
    }

    /// Slice out rows [start, end) and move them to `device`.
    /// Used by the data-parallel executor to shard a batch.
    pub fn narrow_to_device(&self, start: usize, end: usize, device: &B::Device) -> Self {
        let [_, c, h, w] = self.features.dims();
        let cats_w = self.cats.dims()[1];
        let dims_w = self.dims.dims()[1];
        Self {
            features: self
                .features
                .clone()
                .slice([start..end, 0..c, 0..h, 0..w])
                .to_device(device),
            cats: self.cats.clone().slice([start..end, 0..cats_w]).to_device(device),
            dims: self.dims.clone().slice([start..end, 0..dims_w]).to_device(device),
        }
    }
}

/// Holds the fixed tensor geometry so the reshape is validated
/// once, not per field. The target device arrives with each
/// `batch` call.
#[derive(Clone, Debug)]
pub struct EmotionBatcher {
    pub shape: FeatureShape,
    pub labels: LabelSpace,
}

impl EmotionBatcher {
    pub fn new(shape: FeatureShape, labels: LabelSpace) -> Self {
        Self { shape, labels }
    }
}

impl<B: Backend> Batcher<B, EmotionSample, EmotionBatch<B>> for EmotionBatcher {
    fn batch(&self, items: Vec<EmotionSample>, device: &B::Device) -> EmotionBatch<B> {
        let batch_size = items.len();

        let feat_flat: Vec<f32> = items.iter().flat_map(|s| s.features.iter().copied()).collect();
        let cats_flat: Vec<f32> = items.iter().flat_map(|s| s.label_cat.iter().copied()).collect();
        let dims_flat: Vec<f32> = items.iter().flat_map(|s| s.label_dim.iter().copied()).collect();

        let features = Tensor::<B, 1>::from_floats(feat_flat.as_slice(), device).reshape([
            batch_size,
            self.shape.channels,
            self.shape.height,
            self.shape.width,
        ]);
        let cats = Tensor::<B, 1>::from_floats(cats_flat.as_slice(), device)
            .reshape([batch_size, self.labels.num_cats]);
        let dims = Tensor::<B, 1>::from_floats(dims_flat.as_slice(), device)
            .reshape([batch_size, self.labels.num_dims]);

        EmotionBatch { features, cats, dims }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn sample(fill: f32) -> EmotionSample {
        EmotionSample {
            features: vec![fill; 2 * 4 * 8],
            label_cat: vec![0.0, 1.0, 0.0, 0.0],
            label_dim: vec![fill; 3],
        }
    }

    #[test]
    fn test_batch_shapes() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let batcher = EmotionBatcher::new(
            FeatureShape { channels: 2, height: 4, width: 8 },
            LabelSpace::new(4, 3),
        );
        let batch: EmotionBatch<TestBackend> =
            batcher.batch(vec![sample(0.1), sample(0.2), sample(0.3)], &device);
        assert_eq!(batch.features.dims(), [3, 2, 4, 8]);
        assert_eq!(batch.cats.dims(), [3, 4]);
        assert_eq!(batch.dims.dims(), [3, 3]);
    }

    #[test]
    fn test_narrow_keeps_geometry() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let batcher = EmotionBatcher::new(
            FeatureShape { channels: 2, height: 4, width: 8 },
            LabelSpace::new(4, 3),
        );
        let batch: EmotionBatch<TestBackend> = batcher
            .batch(vec![sample(0.1), sample(0.2), sample(0.3), sample(0.4)], &device);
        let shard = batch.narrow_to_device(1, 3, &device);
        assert_eq!(shard.features.dims(), [2, 2, 4, 8]);
        assert_eq!(shard.batch_size(), 2);
    }
}
