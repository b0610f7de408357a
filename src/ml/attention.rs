// ============================================================
// Layer 5 — Attention Pooling
// ============================================================
// Collapses a variable-length hidden-state sequence into one
// context vector via learned softmax weights:
//
//   v      = sigmoid(Linear1(x))          [batch, time, attn]
//   alphas = softmax(Linear2(v), time)    [batch, time, 1]
//   ctx    = sum_t alphas_t * x_t         [batch, hidden]
//
// The alphas are returned for inspection — they let the network
// attend to emotionally salient frames instead of averaging
// uniformly. Purely per-example: no recurrence, no memory.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

use crate::ml::init;

#[derive(Config, Debug)]
pub struct AttentionPoolConfig {
    /// Hidden size of one encoder direction
    pub hidden_size: usize,
    #[config(default = 1)]
    pub attention_size: usize,
    #[config(default = true)]
    pub bidirectional: bool,
    #[config(default = 0.1)]
    pub init_std: f64,
    #[config(default = 0.1)]
    pub init_const: f64,
}

impl AttentionPoolConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionPool<B> {
        let hidden = if self.bidirectional {
            self.hidden_size * 2
        } else {
            self.hidden_size
        };
        let linear1 = init::init_linear(
            LinearConfig::new(hidden, self.attention_size).init(device),
            self.init_std,
            self.init_const,
        );
        let linear2 = init::init_linear(
            LinearConfig::new(self.attention_size, 1).init(device),
            self.init_std,
            self.init_const,
        );
        AttentionPool { linear1, linear2 }
    }
}

#[derive(Module, Debug)]
pub struct AttentionPool<B: Backend> {
    linear1: Linear<B>,
    linear2: Linear<B>,
}

impl<B: Backend> AttentionPool<B> {
    /// x: [batch, time, hidden] → (context [batch, hidden],
    /// alphas [batch, time, 1]).
    pub fn forward(&self, x: Tensor<B, 3>) -> (Tensor<B, 2>, Tensor<B, 3>) {
        let [batch, _, hidden] = x.dims();
        let v = sigmoid(self.linear1.forward(x.clone()));
        let alphas = softmax(self.linear2.forward(v), 1);
        let context = (x * alphas.clone()).sum_dim(1).reshape([batch, hidden]);
        (context, alphas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn test_alphas_form_a_distribution() {
        let device = Default::default();
        let pool = AttentionPoolConfig::new(4).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([3, 10, 8], Distribution::Normal(0.0, 1.0), &device);

        let (context, alphas) = pool.forward(x);
        assert_eq!(context.dims(), [3, 8]);
        assert_eq!(alphas.dims(), [3, 10, 1]);

        let flat: Vec<f32> = alphas.clone().into_data().to_vec().unwrap();
        assert!(flat.iter().all(|a| *a >= 0.0));

        // weights sum to 1 along the time axis, per example
        let sums: Vec<f32> = alphas.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_unidirectional_hidden_size() {
        let device = Default::default();
        let pool = AttentionPoolConfig::new(4)
            .with_bidirectional(false)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([2, 5, 4], Distribution::Default, &device);
        let (context, _) = pool.forward(x);
        assert_eq!(context.dims(), [2, 4]);
    }
}
