// ============================================================
// Layer 5 — Parameter Initialization Policy
// ============================================================
// Two-phase construction: Burn configs allocate the modules,
// then these pure functions replace their parameters with the
// recognizer's init policy and return the module. Construction
// and initialization stay independently testable.
//
// Policy:
//   - weights: N(0, init_std), init_std = 0.1 by default
//   - biases:  constant init_const (0.1 by default)
//   - convs, the feature projection and both head linears
//     additionally truncate: any |w| >= 2*init_std is zeroed
//     once, at construction
//   - GRU gate biases get a segment override (see init_gru)

use burn::{
    nn::{conv::Conv2d, gru::Gru, Linear},
    prelude::*,
    tensor::Distribution,
};

/// Redraw `weight`-shaped values from N(0, std), then zero every
/// draw whose magnitude reaches 2x the standard deviation.
fn truncated_normal<B: Backend, const D: usize>(weight: Tensor<B, D>, std: f64) -> Tensor<B, D> {
    let drawn = weight.random_like(Distribution::Normal(0.0, std));
    let outliers = drawn.clone().abs().greater_equal_elem(2.0 * std);
    // the replacement tensor is a fresh autodiff root; re-mark it
    // or the parameter silently stops receiving gradients
    drawn.mask_fill(outliers, 0.0).require_grad()
}

/// Fill `bias`-shaped values with a constant.
fn constant_like<B: Backend, const D: usize>(bias: Tensor<B, D>, value: f64) -> Tensor<B, D> {
    bias.ones_like().mul_scalar(value).require_grad()
}

/// Truncated-normal weights, constant bias.
pub fn init_conv2d<B: Backend>(mut conv: Conv2d<B>, std: f64, bias_const: f64) -> Conv2d<B> {
    conv.weight = conv.weight.map(|w| truncated_normal(w, std));
    conv.bias = conv.bias.map(|b| b.map(|t| constant_like(t, bias_const)));
    conv
}

/// Truncated-normal weights, constant bias (feature projection
/// and head linears).
pub fn init_linear_truncated<B: Backend>(
    mut linear: Linear<B>,
    std: f64,
    bias_const: f64,
) -> Linear<B> {
    linear.weight = linear.weight.map(|w| truncated_normal(w, std));
    linear.bias = linear.bias.map(|b| b.map(|t| constant_like(t, bias_const)));
    linear
}

/// Plain normal weights, constant bias — the attention scorer
/// keeps its outliers.
pub fn init_linear<B: Backend>(mut linear: Linear<B>, std: f64, bias_const: f64) -> Linear<B> {
    linear.weight = linear
        .weight
        .map(|w| w.random_like(Distribution::Normal(0.0, std)).require_grad());
    linear.bias = linear.bias.map(|b| b.map(|t| constant_like(t, bias_const)));
    linear
}

/// Gate-bias override for one GRU direction.
///
/// The recognizer inherits a bias trick expressed against a fused
/// [reset | update | new] bias of length 3H: the segment
/// [3H/4, 3H/2) is set to 1.0. In per-gate terms that is the last
/// quarter of the reset-gate bias and the first half of the
/// update-gate bias, applied to both the input and hidden
/// transforms.
pub fn init_gru<B: Backend>(mut gru: Gru<B>) -> Gru<B> {
    gru.reset_gate.input_transform.bias = gru
        .reset_gate
        .input_transform
        .bias
        .map(|b| b.map(|t| set_segment_tail_quarter(t)));
    gru.reset_gate.hidden_transform.bias = gru
        .reset_gate
        .hidden_transform
        .bias
        .map(|b| b.map(|t| set_segment_tail_quarter(t)));
    gru.update_gate.input_transform.bias = gru
        .update_gate
        .input_transform
        .bias
        .map(|b| b.map(|t| set_segment_head_half(t)));
    gru.update_gate.hidden_transform.bias = gru
        .update_gate
        .hidden_transform
        .bias
        .map(|b| b.map(|t| set_segment_head_half(t)));
    gru
}

fn set_segment_tail_quarter<B: Backend>(bias: Tensor<B, 1>) -> Tensor<B, 1> {
    let h = bias.dims()[0];
    let start = 3 * h / 4;
    let device = bias.device();
    let ones = Tensor::ones([h - start], &device);
    // slice_assign output is non-leaf; rebuild as a fresh leaf so
    // require_grad is accepted by the autodiff backend
    let assigned = bias.slice_assign([start..h], ones);
    Tensor::from_data(assigned.into_data(), &device).require_grad()
}

fn set_segment_head_half<B: Backend>(bias: Tensor<B, 1>) -> Tensor<B, 1> {
    let h = bias.dims()[0];
    let device = bias.device();
    let ones = Tensor::ones([h / 2], &device);
    let assigned = bias.slice_assign([0..h / 2], ones);
    Tensor::from_data(assigned.into_data(), &device).require_grad()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::nn::{
        conv::Conv2dConfig,
        gru::GruConfig,
        LinearConfig, PaddingConfig2d,
    };

    type TestBackend = burn::backend::NdArray;

    const STD: f64 = 0.1;
    const BIAS: f64 = 0.1;

    #[test]
    fn test_conv_truncation_invariant() {
        let device = Default::default();
        let conv = Conv2dConfig::new([2, 5], [5, 3])
            .with_padding(PaddingConfig2d::Explicit(2, 1))
            .init::<TestBackend>(&device);
        let conv = init_conv2d(conv, STD, BIAS);

        let weights: Vec<f32> = conv.weight.val().into_data().to_vec().unwrap();
        assert!(weights.iter().all(|w| w.abs() < (2.0 * STD) as f32));

        let biases: Vec<f32> = conv.bias.unwrap().val().into_data().to_vec().unwrap();
        assert!(biases.iter().all(|b| (b - BIAS as f32).abs() < 1e-6));
    }

    #[test]
    fn test_linear_truncation_invariant() {
        let device = Default::default();
        let linear = LinearConfig::new(32, 16).init::<TestBackend>(&device);
        let linear = init_linear_truncated(linear, STD, BIAS);

        let weights: Vec<f32> = linear.weight.val().into_data().to_vec().unwrap();
        assert!(weights.iter().all(|w| w.abs() < (2.0 * STD) as f32));
    }

    #[test]
    fn test_initialized_parameters_keep_gradient_tracking() {
        type AdBackend = burn::backend::Autodiff<burn::backend::NdArray>;

        let device = Default::default();
        let linear = LinearConfig::new(8, 4).init::<AdBackend>(&device);
        let linear = init_linear_truncated(linear, STD, BIAS);
        assert!(linear.weight.val().is_require_grad());
        assert!(linear.bias.as_ref().unwrap().val().is_require_grad());

        let conv = Conv2dConfig::new([2, 5], [5, 3]).init::<AdBackend>(&device);
        let conv = init_conv2d(conv, STD, BIAS);
        assert!(conv.weight.val().is_require_grad());

        let gru = GruConfig::new(16, 8, true).init::<AdBackend>(&device);
        let gru = init_gru(gru);
        assert!(gru
            .reset_gate
            .input_transform
            .bias
            .as_ref()
            .unwrap()
            .val()
            .is_require_grad());
    }

    #[test]
    fn test_gru_gate_bias_segments() {
        let device = Default::default();
        let gru = GruConfig::new(16, 8, true).init::<TestBackend>(&device);
        let gru = init_gru(gru);

        let reset: Vec<f32> = gru
            .reset_gate
            .input_transform
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .to_vec()
            .unwrap();
        // last quarter of the reset bias is pinned to 1.0
        assert!(reset[6..].iter().all(|b| (b - 1.0).abs() < 1e-6));

        let update: Vec<f32> = gru
            .update_gate
            .hidden_transform
            .bias
            .as_ref()
            .unwrap()
            .val()
            .into_data()
            .to_vec()
            .unwrap();
        // first half of the update bias is pinned to 1.0
        assert!(update[..4].iter().all(|b| (b - 1.0).abs() < 1e-6));
    }
}
