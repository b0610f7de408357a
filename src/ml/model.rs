// ============================================================
// Layer 5 — Attentive Conv-RNN Emotion Recognizer
// ============================================================
// Forward graph:
//
//   [B, C, H, W] spectrogram
//     → conv1 (C→L1, 5x3, pad 2x1) + leaky-ReLU
//     → max-pool (pool_stride_height x pool_stride_width)
//     → conv2..conv6 (→L2, 5x3, pad 2x1) + leaky-ReLU each
//     → transpose so time leads, flatten (channel, freq) per step
//     → linear projection (→ num_linear) + leaky-ReLU
//     → bidirectional GRU (gru_cell_units per direction)
//     → attention pooling → context vector
//     → linear (→ F1) + leaky-ReLU → linear (→ D), clamp ±3
//
// Pooling strides only reduce the frequency axis aggressively
// (default 2x4): temporal resolution is kept cheap while the
// spectral dimension shrinks before the recurrent stage.
//
// The output vector fuses categorical scores and dimensional
// (valence/arousal/dominance) scores; the clamp caps the dynamic
// range of the regression block.

use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        gru::{Gru, GruConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        LeakyRelu, LeakyReluConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
};

use crate::ml::attention::{AttentionPool, AttentionPoolConfig};
use crate::ml::init;

/// Elementwise bound on the fused output vector.
pub const OUTPUT_CLAMP: f64 = 3.0;

#[derive(Config, Debug)]
pub struct AttConvRnnConfig {
    /// Input channels C
    pub channels: usize,
    /// Input height H (the time axis)
    pub height: usize,
    /// Input width W (the frequency axis)
    pub width: usize,
    /// Fused output width D (categorical + dimensional)
    pub output_size: usize,
    #[config(default = 5)]
    pub l1_channels: usize,
    #[config(default = 7)]
    pub l2_channels: usize,
    #[config(default = 128)]
    pub gru_cell_units: usize,
    #[config(default = 1)]
    pub attention_size: usize,
    #[config(default = 768)]
    pub num_linear: usize,
    #[config(default = 2)]
    pub pool_stride_height: usize,
    #[config(default = 4)]
    pub pool_stride_width: usize,
    #[config(default = 64)]
    pub f1_units: usize,
    #[config(default = true)]
    pub bidirectional: bool,
    #[config(default = 0.1)]
    pub init_std: f64,
    #[config(default = 0.1)]
    pub init_const: f64,
}

impl AttConvRnnConfig {
    /// Build and initialize the recognizer.
    ///
    /// The encoder's input width is derived analytically from the
    /// configured geometry, so the input contract is checked here
    /// once instead of surfacing as a dimension mismatch deep in
    /// the first forward pass.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AttConvRnn<B>> {
        if self.width % self.pool_stride_width != 0 {
            bail!(
                "input width {} is not divisible by pool_stride_width {}",
                self.width,
                self.pool_stride_width,
            );
        }
        if self.height % self.pool_stride_height != 0 {
            bail!(
                "input height {} is not divisible by pool_stride_height {}",
                self.height,
                self.pool_stride_height,
            );
        }

        let conv = |cin: usize, cout: usize| {
            init::init_conv2d(
                Conv2dConfig::new([cin, cout], [5, 3])
                    .with_padding(PaddingConfig2d::Explicit(2, 1))
                    .init(device),
                self.init_std,
                self.init_const,
            )
        };

        let seq_width = self.l2_channels * self.width / self.pool_stride_width;
        let linear1 = init::init_linear_truncated(
            LinearConfig::new(seq_width, self.num_linear).init(device),
            self.init_std,
            self.init_const,
        );

        let gru_fwd = init::init_gru(
            GruConfig::new(self.num_linear, self.gru_cell_units, true).init(device),
        );
        let gru_bwd = self.bidirectional.then(|| {
            init::init_gru(GruConfig::new(self.num_linear, self.gru_cell_units, true).init(device))
        });

        let attention = AttentionPoolConfig::new(self.gru_cell_units)
            .with_attention_size(self.attention_size)
            .with_bidirectional(self.bidirectional)
            .with_init_std(self.init_std)
            .with_init_const(self.init_const)
            .init(device);

        let context_width = if self.bidirectional {
            self.gru_cell_units * 2
        } else {
            self.gru_cell_units
        };
        let linear2 = init::init_linear_truncated(
            LinearConfig::new(context_width, self.f1_units).init(device),
            self.init_std,
            self.init_const,
        );
        let linear3 = init::init_linear_truncated(
            LinearConfig::new(self.f1_units, self.output_size).init(device),
            self.init_std,
            self.init_const,
        );

        Ok(AttConvRnn {
            conv1: conv(self.channels, self.l1_channels),
            conv2: conv(self.l1_channels, self.l2_channels),
            conv3: conv(self.l2_channels, self.l2_channels),
            conv4: conv(self.l2_channels, self.l2_channels),
            conv5: conv(self.l2_channels, self.l2_channels),
            conv6: conv(self.l2_channels, self.l2_channels),
            max_pool: MaxPool2dConfig::new([self.pool_stride_height, self.pool_stride_width])
                .with_strides([self.pool_stride_height, self.pool_stride_width])
                .init(),
            linear1,
            gru_fwd,
            gru_bwd,
            attention,
            linear2,
            linear3,
            leaky_relu: LeakyReluConfig::new().with_negative_slope(1e-2).init(),
        })
    }
}

#[derive(Module, Debug)]
pub struct AttConvRnn<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub conv4: Conv2d<B>,
    pub conv5: Conv2d<B>,
    pub conv6: Conv2d<B>,
    pub max_pool: MaxPool2d,
    pub linear1: Linear<B>,
    pub gru_fwd: Gru<B>,
    pub gru_bwd: Option<Gru<B>>,
    pub attention: AttentionPool<B>,
    pub linear2: Linear<B>,
    pub linear3: Linear<B>,
    pub leaky_relu: LeakyRelu,
}

impl<B: Backend> AttConvRnn<B> {
    /// Six-stage conv stack. [B, C, H, W] →
    /// [B, L2, H / pool_stride_height, W / pool_stride_width]:
    /// one pooling step after conv1, no further pooling.
    pub fn conv_features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.leaky_relu.forward(self.conv1.forward(x));
        let x = self.max_pool.forward(x);
        let x = self.leaky_relu.forward(self.conv2.forward(x));
        let x = self.leaky_relu.forward(self.conv3.forward(x));
        let x = self.leaky_relu.forward(self.conv4.forward(x));
        let x = self.leaky_relu.forward(self.conv5.forward(x));
        self.leaky_relu.forward(self.conv6.forward(x))
    }

    /// Bidirectional recurrent encoding: the backward direction
    /// consumes the time-reversed sequence, its output is flipped
    /// back and concatenated with the forward states.
    fn encode(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let states_fwd = self.gru_fwd.forward(x.clone(), None);
        match &self.gru_bwd {
            Some(gru_bwd) => {
                let states_bwd = gru_bwd.forward(x.flip([1]), None).flip([1]);
                Tensor::cat(vec![states_fwd, states_bwd], 2)
            }
            None => states_fwd,
        }
    }

    /// Full forward pass. Returns the clamped fused prediction
    /// [batch, D] and the attention weights [batch, time, 1].
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 2>, Tensor<B, 3>) {
        let x = self.conv_features(x);

        // time leads the sequence; (channel, freq) flatten per step
        let [batch, chans, time, width] = x.dims();
        let x = x.swap_dims(1, 2).reshape([batch, time, chans * width]);

        let x = self.leaky_relu.forward(self.linear1.forward(x));
        let states = self.encode(x);
        let (context, alphas) = self.attention.forward(states);

        let x = self.leaky_relu.forward(self.linear2.forward(context));
        let out = self.linear3.forward(x).clamp(-OUTPUT_CLAMP, OUTPUT_CLAMP);
        (out, alphas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TestBackend = burn::backend::NdArray;

    fn tiny_config() -> AttConvRnnConfig {
        AttConvRnnConfig::new(1, 8, 8, 7)
            .with_l1_channels(2)
            .with_l2_channels(3)
            .with_gru_cell_units(4)
            .with_num_linear(16)
            .with_f1_units(8)
    }

    #[test]
    fn test_conv_stack_shape_formula() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::<TestBackend, 4>::random([2, 1, 8, 8], Distribution::Default, &device);

        // default strides 2x4: H/2 on the time axis, W/4 on frequency
        let features = model.conv_features(x);
        assert_eq!(features.dims(), [2, 3, 4, 2]);
    }

    #[test]
    fn test_pooling_can_preserve_full_temporal_resolution() {
        let device = Default::default();
        let model = tiny_config()
            .with_pool_stride_height(1)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::random([2, 1, 8, 8], Distribution::Default, &device);

        // stride 1 on the time axis: output time dimension equals H
        let features = model.conv_features(x);
        assert_eq!(features.dims(), [2, 3, 8, 2]);
    }

    #[test]
    fn test_forward_output_shape_and_clamp() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device).unwrap();
        // large activations so the clamp actually has something to cap
        let x = Tensor::<TestBackend, 4>::random(
            [4, 1, 8, 8],
            Distribution::Normal(0.0, 50.0),
            &device,
        );

        let (out, alphas) = model.forward(x);
        assert_eq!(out.dims(), [4, 7]);
        assert_eq!(alphas.dims(), [4, 4, 1]);

        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| (-3.0..=3.0).contains(v)));
    }

    #[test]
    fn test_indivisible_width_fails_fast() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let result = AttConvRnnConfig::new(1, 8, 10, 7).init::<TestBackend>(&device);
        assert!(result.is_err());
    }

    #[test]
    fn test_unidirectional_encoder() {
        let device = Default::default();
        let model = tiny_config()
            .with_bidirectional(false)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::random([2, 1, 8, 8], Distribution::Default, &device);
        let (out, _) = model.forward(x);
        assert_eq!(out.dims(), [2, 7]);
    }
}
