// ============================================================
// Layer 5 — Generator (inference surface)
// ============================================================
// Consumer-facing entry point for the downstream motion
// generator: load a trained checkpoint, run N held-out samples
// through the model, hand back the fused emotion predictions.
// Runs on the plain (non-autodiff) backend, so gradients are
// structurally disabled and parameters cannot be mutated.

use anyhow::{anyhow, Result};
use burn::data::dataloader::batcher::Batcher;
use rand::seq::SliceRandom;

use crate::data::{
    batcher::{EmotionBatch, EmotionBatcher},
    dataset::EmotionSample,
    loader::FeatureShape,
};
use crate::domain::labels::LabelSpace;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{AttConvRnn, AttConvRnnConfig};

type InferBackend = burn::backend::Wgpu;

const GENERATE_BATCH: usize = 64;

/// One fused model output, split back into its label families.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub cat_scores: Vec<f32>,
    pub dim_scores: Vec<f32>,
}

pub struct Generator {
    model: AttConvRnn<InferBackend>,
    batcher: EmotionBatcher,
    device: burn::backend::wgpu::WgpuDevice,
    labels: LabelSpace,
}

impl Generator {
    /// Rebuild the architecture from the dataset geometry and
    /// restore the latest trained parameters into it.
    pub fn from_checkpoint(
        ckpt: &CheckpointManager,
        shape: FeatureShape,
        labels: LabelSpace,
    ) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let model = AttConvRnnConfig::new(shape.channels, shape.height, shape.width, labels.total())
            .init::<InferBackend>(&device)?;
        let model = ckpt.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self {
            model,
            batcher: EmotionBatcher::new(shape, labels),
            device,
            labels,
        })
    }

    /// Produce predictions for `count` samples (0 = all),
    /// optionally shuffling sample order first.
    pub fn generate(
        &self,
        samples: &[EmotionSample],
        count: usize,
        randomized: bool,
    ) -> Result<Vec<Prediction>> {
        let mut indices: Vec<usize> = (0..samples.len()).collect();
        if randomized {
            indices.shuffle(&mut rand::thread_rng());
        }
        let take = if count == 0 {
            samples.len()
        } else {
            count.min(samples.len())
        };
        indices.truncate(take);

        let mut predictions = Vec::with_capacity(take);
        for chunk in indices.chunks(GENERATE_BATCH) {
            let items: Vec<EmotionSample> = chunk.iter().map(|&i| samples[i].clone()).collect();
            let batch: EmotionBatch<InferBackend> = self.batcher.batch(items, &self.device);
            let (pred, _alphas) = self.model.forward(batch.features);

            let flat: Vec<f32> = pred
                .into_data()
                .to_vec()
                .map_err(|e| anyhow!("cannot read predictions back from the device: {e:?}"))?;
            predictions.extend(split_rows(&flat, self.labels));
        }
        Ok(predictions)
    }
}

/// Split flat fused output rows back into their label families.
fn split_rows(flat: &[f32], labels: LabelSpace) -> Vec<Prediction> {
    flat.chunks(labels.total())
        .map(|row| Prediction {
            cat_scores: row[..labels.num_cats].to_vec(),
            dim_scores: row[labels.num_cats..].to_vec(),
        })
        .collect()
}
