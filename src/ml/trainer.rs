// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Drives the state machine
//   Init → {TrainEpoch → EvalEpoch (every eval-interval)
//         → Checkpoint (every save-interval)}* → Done
//
// Per step: forward → composite loss → NaN/Inf guard → backward
// → one optimizer step at the scheduled learning rate. Gradient
// explosion is handled proactively by global-norm clipping
// configured on the optimizer; a non-finite loss skips the
// update with a warning instead of aborting hours of training.
//
// The teacher-forcing ratio follows the same decay grid as the
// learning rate. The recognizer itself has no sequential
// decoder, so the ratio is tracked and logged for the
// downstream motion-generation stage that consumes it.

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, momentum::MomentumConfig, AdamConfig, Optimizer, SgdConfig},
    prelude::*,
    record::Record,
    tensor::backend::AutodiffBackend,
};
use std::sync::Arc;

use crate::application::train_use_case::{OptimizerChoice, TrainConfig};
use crate::data::{
    batcher::{EmotionBatch, EmotionBatcher},
    dataset::EmotionDataset,
    loader::DataBundle,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    executor::DeviceStrategy,
    loss::{CompositeLoss, LossWeights},
    model::{AttConvRnn, AttConvRnnConfig},
    schedule::DecaySchedule,
};

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

pub fn run_training(
    cfg: &TrainConfig,
    bundle: DataBundle,
    ckpt: CheckpointManager,
    metrics: MetricsLogger,
) -> Result<()> {
    // probe what the adapter actually exposes before fabricating
    // device handles; select() warns when the request was clamped
    let usable = if cfg.device_count > 1 {
        clamped_device_count(cfg.device_count, available_discrete_gpus())
    } else {
        1
    };
    let devices: Vec<burn::backend::wgpu::WgpuDevice> = if usable > 1 {
        (0..usable)
            .map(burn::backend::wgpu::WgpuDevice::DiscreteGpu)
            .collect()
    } else {
        vec![burn::backend::wgpu::WgpuDevice::default()]
    };
    let strategy = DeviceStrategy::<TrainBackend>::select(cfg.device_count, devices);
    tracing::info!("Primary WGPU device: {:?}", strategy.primary());

    // the optimizer owns weight decay and global-norm clipping;
    // the loop only supplies the scheduled learning rate
    match cfg.optimizer {
        OptimizerChoice::Adam => {
            let optim = AdamConfig::new()
                .with_epsilon(1e-8)
                .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
                .with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.gradient_clip)))
                .init();
            train_loop(cfg, bundle, ckpt, metrics, strategy, optim)
        }
        OptimizerChoice::Sgd => {
            let optim = SgdConfig::new()
                .with_momentum(Some(
                    MomentumConfig::new()
                        .with_momentum(cfg.momentum)
                        .with_nesterov(cfg.nesterov),
                ))
                .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
                .with_gradient_clipping(Some(GradientClippingConfig::Norm(cfg.gradient_clip)))
                .init();
            train_loop(cfg, bundle, ckpt, metrics, strategy, optim)
        }
    }
}

fn train_loop<B, O>(
    cfg: &TrainConfig,
    bundle: DataBundle,
    ckpt: CheckpointManager,
    metrics: MetricsLogger,
    strategy: DeviceStrategy<B>,
    mut optim: O,
) -> Result<()>
where
    B: AutodiffBackend,
    O: Optimizer<AttConvRnn<B>, B>,
    O::Record: Record<B>,
{
    let device = strategy.primary().clone();

    // ── Build and initialize the model ────────────────────────────────────────
    let model_cfg = AttConvRnnConfig::new(
        bundle.shape.channels,
        bundle.shape.height,
        bundle.shape.width,
        bundle.label_space.total(),
    );
    let mut model: AttConvRnn<B> = model_cfg.init(&device)?;
    tracing::info!(
        "Model ready: input ({}, {}, {}), output width {}",
        bundle.shape.channels,
        bundle.shape.height,
        bundle.shape.width,
        bundle.label_space.total(),
    );

    // ── Resume ────────────────────────────────────────────────────────────────
    // Either everything is restored — parameters, optimizer
    // state, epoch index — or the run aborts. Partial state is
    // never accepted.
    let mut start_epoch = cfg.start_epoch;
    if cfg.resume {
        model = ckpt.load_model(model, &device)?;
        optim = optim.load_record(ckpt.load_optimizer(&device)?);
        start_epoch = ckpt.latest_epoch()? + 1;
        tracing::info!("Resumed training at epoch {}", start_epoch);
    }

    let loss = CompositeLoss::new(
        LossWeights {
            upper_body_weight: cfg.upper_body_weight,
            affs_reg: cfg.affs_reg,
            quat_reg: cfg.quat_reg,
            quat_norm_reg: cfg.quat_norm_reg,
            recons_reg: cfg.recons_reg,
        },
        bundle.label_space,
    );
    let lr_schedule = DecaySchedule::new(cfg.base_lr, cfg.lr_decay, &cfg.step_fractions, cfg.num_epoch);
    let tf_schedule = DecaySchedule::new(cfg.base_tr, cfg.tf_decay, &cfg.step_fractions, cfg.num_epoch);

    // ── Data loaders ──────────────────────────────────────────────────────────
    // num_workers parallel fetchers feed a bounded queue; the
    // loop blocks only when the queue is empty.
    let train_batcher = EmotionBatcher::new(bundle.shape, bundle.label_space);
    let train_loader: Arc<dyn DataLoader<B, EmotionBatch<B>>> =
        DataLoaderBuilder::new(train_batcher)
            .batch_size(cfg.batch_size)
            .shuffle(42)
            .num_workers(cfg.num_workers)
            .set_device(device.clone())
            .build(EmotionDataset::new(bundle.train));

    // eval runs on the inner backend — no autodiff overhead, no
    // way to mutate parameters
    let eval_batcher = EmotionBatcher::new(bundle.shape, bundle.label_space);
    let eval_loader: Arc<dyn DataLoader<B::InnerBackend, EmotionBatch<B::InnerBackend>>> =
        DataLoaderBuilder::new(eval_batcher)
            .batch_size(cfg.batch_size)
            .num_workers(cfg.num_workers)
            .set_device(device.clone())
            .build(EmotionDataset::new(bundle.eval));

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut best_eval = f64::INFINITY;
    for epoch in start_epoch..cfg.num_epoch {
        let lr = lr_schedule.value_at(epoch);
        let tf = tf_schedule.value_at(epoch);

        let mut loss_sum = 0.0;
        let mut cat_sum = 0.0;
        let mut dim_sum = 0.0;
        let mut batches = 0usize;

        for (step, batch) in train_loader.iter().enumerate() {
            let out = strategy.grad_step(&model, &batch, &loss);

            // a single malformed batch must not abort the run
            if !out.total.is_finite() {
                tracing::warn!(
                    "Non-finite loss at epoch {epoch} step {step}; skipping optimizer update"
                );
                continue;
            }

            loss_sum += out.total;
            cat_sum += out.categorical;
            dim_sum += out.dimensional;
            batches += 1;

            model = optim.step(lr, model, out.grads);

            if step % cfg.log_interval == 0 {
                tracing::info!(
                    "epoch {epoch} step {step}: loss={:.4} (cat={:.4}, dim={:.4}) lr={:.6} tf={:.4}",
                    out.total,
                    out.categorical,
                    out.dimensional,
                    lr,
                    tf,
                );
            }
        }

        let denom = batches.max(1) as f64;
        let train_loss = loss_sum / denom;

        let (eval_loss, eval_acc) = if epoch % cfg.eval_interval.max(1) == 0 {
            let (l, a) = eval_epoch::<B>(&model.valid(), &eval_loader, &loss);
            tracing::info!("epoch {epoch}: eval_loss={l:.4} eval_acc={:.1}%", a * 100.0);
            (l, a)
        } else {
            (f64::NAN, f64::NAN)
        };

        let row = EpochMetrics {
            epoch,
            train_loss,
            train_cat: cat_sum / denom,
            train_dim: dim_sum / denom,
            eval_loss,
            eval_acc,
            lr,
            tf,
        };
        // NaN eval_loss (skipped epoch) never counts as a best
        if row.is_improvement(best_eval) {
            best_eval = row.eval_loss;
            ckpt.save_best(&model)?;
            tracing::info!("New best eval loss {best_eval:.4}; best parameters saved");
        }
        metrics.log(&row)?;

        if (epoch + 1) % cfg.save_interval.max(1) == 0 {
            ckpt.save(&model, optim.to_record(), epoch)?;
            tracing::info!("Checkpoint saved for epoch {epoch}");
        }
    }

    // final checkpoint so `generate` always has state to load
    ckpt.save(&model, optim.to_record(), cfg.num_epoch.saturating_sub(1))?;
    tracing::info!("Training complete!");
    Ok(())
}

/// Number of discrete GPUs the WGPU instance can actually see.
fn available_discrete_gpus() -> usize {
    wgpu::Instance::default()
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .filter(|a| a.get_info().device_type == wgpu::DeviceType::DiscreteGpu)
        .count()
}

/// A multi-device request never exceeds what the adapter probe
/// found and never drops below one device.
fn clamped_device_count(requested: usize, available: usize) -> usize {
    requested.min(available).max(1)
}

/// One pass over the eval split with gradients disabled.
/// Returns (average composite loss, categorical accuracy).
fn eval_epoch<B: AutodiffBackend>(
    model: &AttConvRnn<B::InnerBackend>,
    loader: &Arc<dyn DataLoader<B::InnerBackend, EmotionBatch<B::InnerBackend>>>,
    loss: &CompositeLoss,
) -> (f64, f64) {
    let mut loss_sum = 0.0;
    let mut batches = 0usize;
    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in loader.iter() {
        let (pred, _alphas) = model.forward(batch.features.clone());
        let breakdown = loss.forward(pred.clone(), batch.cats.clone(), batch.dims.clone());
        loss_sum += breakdown.total.into_scalar().elem::<f64>();
        batches += 1;

        let batch_size = batch.batch_size();
        let num_cats = batch.cats.dims()[1];

        // argmax returns [batch, 1] — flatten before comparing
        let pred_idx = pred
            .slice([0..batch_size, 0..num_cats])
            .argmax(1)
            .flatten::<1>(0, 1);
        let target_idx = batch.cats.clone().argmax(1).flatten::<1>(0, 1);
        let matches: i64 = pred_idx
            .equal(target_idx)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();

        correct += matches as usize;
        total += batch_size;
    }

    (
        loss_sum / batches.max(1) as f64,
        correct as f64 / total.max(1) as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::EmotionBatcher, dataset::EmotionSample, loader::FeatureShape};
    use crate::domain::labels::LabelSpace;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;
    type TestDevice = <TestBackend as Backend>::Device;

    fn fixture() -> (
        AttConvRnn<TestBackend>,
        EmotionBatch<TestBackend>,
        CompositeLoss,
        DeviceStrategy<TestBackend>,
    ) {
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
                features: (0..64).map(|j| ((i * 7 + j) % 11) as f32 / 11.0).collect(),
                label_cat: vec![0.0, 1.0, 0.0],
                label_dim: vec![0.5, -0.5],
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
        let strategy = DeviceStrategy::<TestBackend>::select(1, vec![device]);
        (model, batch, loss, strategy)
    }

    #[test]
    fn test_one_train_step_changes_parameters() {
        let (model, batch, loss, strategy) = fixture();
        let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

        // re-initialized parameters must keep gradient tracking:
        // the conv stack and the head both have to move
        let conv_before: Vec<f32> = model.conv1.weight.val().into_data().to_vec().unwrap();
        let head_before: Vec<f32> = model.linear3.weight.val().into_data().to_vec().unwrap();

        let out = strategy.grad_step(&model, &batch, &loss);
        let model = optim.step(1e-3, model, out.grads);

        let conv_after: Vec<f32> = model.conv1.weight.val().into_data().to_vec().unwrap();
        let head_after: Vec<f32> = model.linear3.weight.val().into_data().to_vec().unwrap();

        assert_ne!(conv_before, conv_after);
        assert_ne!(head_before, head_after);
    }

    #[test]
    fn test_device_count_is_clamped_to_probe_results() {
        assert_eq!(clamped_device_count(4, 1), 1);
        assert_eq!(clamped_device_count(4, 2), 2);
        assert_eq!(clamped_device_count(2, 8), 2);
        assert_eq!(clamped_device_count(3, 0), 1);
    }

    #[test]
    fn test_eval_is_deterministic() {
        let (model, batch, _, _) = fixture();
        let model = model.valid();
        let features = batch.features.inner();

        let (a, _) = model.forward(features.clone());
        let (b, _) = model.forward(features);
        let a: Vec<f32> = a.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
