// ============================================================
// Layer 5 — Composite Training Loss
// ============================================================
// The fused prediction vector is split into its categorical and
// dimensional blocks and scored with a weighted sum:
//
//   upper_body_weight * soft cross-entropy   (categorical)
//   affs_reg          * MSE                  (dimensional)
//   quat_reg          * L1                   (dimensional)
//   quat_norm_reg     * unit-norm penalty    (dimensional)
//   recons_reg        * MSE on the full fused vector
//
// The regularization weights are shared with the downstream
// motion-generation stage, which is why their names reference
// quaternions and reconstruction.

use burn::{
    nn::loss::{MseLoss, Reduction},
    prelude::*,
    tensor::activation::log_softmax,
};
use serde::{Deserialize, Serialize};

use crate::domain::labels::LabelSpace;

/// Per-term weights, taken verbatim from the training config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LossWeights {
    pub upper_body_weight: f64,
    pub affs_reg: f64,
    pub quat_reg: f64,
    pub quat_norm_reg: f64,
    pub recons_reg: f64,
}

/// The loss terms of one forward pass. `total` stays attached to
/// the autodiff graph; the per-term tensors are for logging.
pub struct LossBreakdown<B: Backend> {
    pub total: Tensor<B, 1>,
    pub categorical: Tensor<B, 1>,
    pub dimensional: Tensor<B, 1>,
}

#[derive(Debug, Clone)]
pub struct CompositeLoss {
    weights: LossWeights,
    labels: LabelSpace,
}

impl CompositeLoss {
    pub fn new(weights: LossWeights, labels: LabelSpace) -> Self {
        Self { weights, labels }
    }

    /// pred: [batch, D]; cats: [batch, num_cats]; dims: [batch, num_dims].
    pub fn forward<B: Backend>(
        &self,
        pred: Tensor<B, 2>,
        cats: Tensor<B, 2>,
        dims: Tensor<B, 2>,
    ) -> LossBreakdown<B> {
        let [batch, _] = pred.dims();
        let nc = self.labels.num_cats;
        let nd = self.labels.num_dims;

        let pred_cat = pred.clone().slice([0..batch, 0..nc]);
        let pred_dim = pred.clone().slice([0..batch, nc..nc + nd]);

        // soft cross-entropy: works for one-hot and soft targets alike
        let log_probs = log_softmax(pred_cat, 1);
        let categorical = (cats.clone() * log_probs).sum_dim(1).mean().neg();

        let mse = MseLoss::new();
        let dimensional = mse.forward(pred_dim.clone(), dims.clone(), Reduction::Mean);
        let l1 = (pred_dim.clone() - dims.clone()).abs().mean();

        // mean squared magnitude per example pulled towards 1
        let unit_norm = pred_dim
            .powf_scalar(2.0)
            .mean_dim(1)
            .sub_scalar(1.0)
            .powf_scalar(2.0)
            .mean();

        let target_full = Tensor::cat(vec![cats, dims], 1);
        let recons = mse.forward(pred, target_full, Reduction::Mean);

        let total = categorical.clone().mul_scalar(self.weights.upper_body_weight)
            + dimensional.clone().mul_scalar(self.weights.affs_reg)
            + l1.mul_scalar(self.weights.quat_reg)
            + unit_norm.mul_scalar(self.weights.quat_norm_reg)
            + recons.mul_scalar(self.weights.recons_reg);

        LossBreakdown { total, categorical, dimensional }
    }
}
