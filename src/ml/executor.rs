// ============================================================
// Layer 5 — Device Execution Strategy
// ============================================================
// One forward/backward pass either runs on a single device or
// is sharded across replicas. The variant is selected once at
// startup; the training loop calls grad_step without caring
// which one it got.
//
// Data-parallel step:
//   1. slice the batch into one shard per device
//   2. fork a model replica onto each device
//   3. per-shard forward + composite loss, weighted by the
//      shard's share of the batch
//   4. per-shard backward, gradients moved to the primary device
//      and merged in a GradientsAccumulator
// The merged gradients feed exactly one optimizer step, so the
// parameters never see concurrent writers.

use burn::{
    optim::{GradientsAccumulator, GradientsParams},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::EmotionBatch;
use crate::ml::loss::CompositeLoss;
use crate::ml::model::AttConvRnn;

/// Gradients plus detached loss scalars for logging and the
/// NaN/Inf guard.
pub struct StepOutput {
    pub grads: GradientsParams,
    pub total: f64,
    pub categorical: f64,
    pub dimensional: f64,
}

pub enum DeviceStrategy<B: Backend> {
    Single { device: B::Device },
    DataParallel { devices: Vec<B::Device> },
}

impl<B: Backend> DeviceStrategy<B> {
    /// Pick the strategy once at startup. Asking for multiple
    /// devices when fewer are present degrades to single-device
    /// execution with a warning, not a hard failure.
    pub fn select(requested: usize, devices: Vec<B::Device>) -> Self {
        if requested > 1 && devices.len() > 1 {
            tracing::info!("Sharding batches across {} devices", devices.len());
            return Self::DataParallel { devices };
        }
        if requested > 1 {
            tracing::warn!(
                "{requested} devices requested but only {} available; falling back to single-device execution",
                devices.len(),
            );
        }
        let device = devices.into_iter().next().unwrap_or_default();
        Self::Single { device }
    }

    /// The device parameters live on; batches are staged here.
    pub fn primary(&self) -> &B::Device {
        match self {
            Self::Single { device } => device,
            Self::DataParallel { devices } => &devices[0],
        }
    }
}

impl<B: AutodiffBackend> DeviceStrategy<B> {
    /// One forward/backward pass over `batch`, producing merged
    /// gradients ready for a single optimizer step.
    pub fn grad_step(
        &self,
        model: &AttConvRnn<B>,
        batch: &EmotionBatch<B>,
        loss: &CompositeLoss,
    ) -> StepOutput {
        match self {
            Self::Single { .. } => {
                let (pred, _alphas) = model.forward(batch.features.clone());
                let breakdown = loss.forward(pred, batch.cats.clone(), batch.dims.clone());
                let total = scalar(&breakdown.total);
                let categorical = scalar(&breakdown.categorical);
                let dimensional = scalar(&breakdown.dimensional);
                let grads = GradientsParams::from_grads(breakdown.total.backward(), model);
                StepOutput { grads, total, categorical, dimensional }
            }
            Self::DataParallel { devices } => {
                let batch_size = batch.batch_size();
                let shard_len = batch_size.div_ceil(devices.len());
                let shards: Vec<(usize, usize)> = (0..devices.len())
                    .map(|i| (i * shard_len, ((i + 1) * shard_len).min(batch_size)))
                    .filter(|(start, end)| end > start)
                    .collect();

                let primary = self.primary().clone();
                let mut accumulator = GradientsAccumulator::new();
                let mut total = 0.0;
                let mut categorical = 0.0;
                let mut dimensional = 0.0;

                for ((start, end), device) in shards.iter().copied().zip(devices.iter()) {
                    let shard = batch.narrow_to_device(start, end, device);
                    let replica = model.clone().fork(device);

                    let (pred, _alphas) = replica.forward(shard.features);
                    let breakdown = loss.forward(pred, shard.cats, shard.dims);
                    // weight each shard mean by its share of the
                    // batch so the merged gradients match the
                    // whole-batch mean even on an uneven split
                    let share = (end - start) as f64 / batch_size as f64;
                    let scaled = breakdown.total.mul_scalar(share);

                    total += scalar(&scaled);
                    categorical += scalar(&breakdown.categorical) * share;
                    dimensional += scalar(&breakdown.dimensional) * share;

                    let grads = GradientsParams::from_grads(scaled.backward(), &replica)
                        .to_device(&primary, &replica);
                    accumulator.accumulate(&replica, grads);
                }

                StepOutput {
                    grads: accumulator.grads(),
                    total,
                    categorical,
                    dimensional,
                }
            }
        }
    }
}

fn scalar<B: Backend>(t: &Tensor<B, 1>) -> f64 {
    t.clone().into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{EmotionBatch, EmotionBatcher};
    use crate::data::dataset::EmotionSample;
    use crate::data::loader::FeatureShape;
    use crate::domain::labels::LabelSpace;
    use crate::ml::loss::LossWeights;
    use crate::ml::model::AttConvRnnConfig;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;
    type TestDevice = <TestBackend as Backend>::Device;

    fn fixture() -> (AttConvRnn<TestBackend>, EmotionBatch<TestBackend>, CompositeLoss) {
        let device = TestDevice::default();
        let model = AttConvRnnConfig::new(1, 8, 8, 5)
            .with_l1_channels(2)
            .with_l2_channels(3)
            .with_gru_cell_units(4)
            .with_num_linear(16)
            .with_f1_units(8)
            .init::<TestBackend>(&device)
            .unwrap();

        let labels = LabelSpace::new(3, 2);
        let batcher =
            EmotionBatcher::new(FeatureShape { channels: 1, height: 8, width: 8 }, labels);
        let samples: Vec<EmotionSample> = (0..4)
            .map(|i| EmotionSample {
                features: (0..64).map(|j| ((i * 17 + j) % 13) as f32 / 13.0).collect(),
                label_cat: vec![1.0, 0.0, 0.0],
                label_dim: vec![0.3, -0.4],
            })
            .collect();
        let batch: EmotionBatch<TestBackend> = batcher.batch(samples, &device);

        let loss = CompositeLoss::new(
            LossWeights {
                upper_body_weight: 1.0,
                affs_reg: 0.8,
                quat_reg: 1.2,
                quat_norm_reg: 0.1,
                recons_reg: 1.2,
            },
            labels,
        );
        (model, batch, loss)
    }

    #[test]
    fn test_requesting_many_devices_with_one_degrades() {
        let strategy =
            DeviceStrategy::<TestBackend>::select(4, vec![TestDevice::default()]);
        assert!(matches!(strategy, DeviceStrategy::Single { .. }));
    }

    #[test]
    fn test_single_and_sharded_losses_agree() {
        let (model, batch, loss) = fixture();
        let device = TestDevice::default();

        let single = DeviceStrategy::<TestBackend>::select(1, vec![device.clone()]);
        let sharded = DeviceStrategy::<TestBackend>::DataParallel {
            devices: vec![device.clone(), device],
        };

        let a = single.grad_step(&model, &batch, &loss);
        let b = sharded.grad_step(&model, &batch, &loss);
        assert!(a.total.is_finite());
        assert!((a.total - b.total).abs() < 1e-4);
        assert!((a.categorical - b.categorical).abs() < 1e-4);
    }

    #[test]
    fn test_uneven_shards_match_whole_batch_loss() {
        let (model, _, loss) = fixture();
        let device = TestDevice::default();
        let batcher = EmotionBatcher::new(
            FeatureShape { channels: 1, height: 8, width: 8 },
            LabelSpace::new(3, 2),
        );

        // three samples over two devices shard as 2 + 1; the lone
        // third sample is an outlier so a weighting mistake shows
        let mut samples: Vec<EmotionSample> = (0..2)
            .map(|i| EmotionSample {
                features: (0..64).map(|j| ((i * 17 + j) % 13) as f32 / 13.0).collect(),
                label_cat: vec![1.0, 0.0, 0.0],
                label_dim: vec![0.3, -0.4],
            })
            .collect();
        samples.push(EmotionSample {
            features: vec![2.5; 64],
            label_cat: vec![0.0, 0.0, 1.0],
            label_dim: vec![-2.0, 2.0],
        });
        let batch: EmotionBatch<TestBackend> = batcher.batch(samples, &device);

        let single = DeviceStrategy::<TestBackend>::select(1, vec![device.clone()]);
        let sharded = DeviceStrategy::<TestBackend>::DataParallel {
            devices: vec![device.clone(), device],
        };

        let a = single.grad_step(&model, &batch, &loss);
        let b = sharded.grad_step(&model, &batch, &loss);
        assert!((a.total - b.total).abs() < 1e-4);
        assert!((a.categorical - b.categorical).abs() < 1e-4);
        assert!((a.dimensional - b.dimensional).abs() < 1e-4);
    }
}
