// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Loads the pre-split tensor bundles produced by the dataset
// preparation step. The core treats this as a black box: it
// only promises fixed-shape, already-standardized tensors.
//
// On-disk layout under {data_dir}/{dataset}/:
//   manifest.json        — shapes, label widths, split sizes,
//                          normalization means/stds
//   train_features.f32   — raw little-endian f32, row-major
//   train_cats.f32         (same for eval_* and test_*)
//   train_dims.f32

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use crate::data::dataset::EmotionSample;
use crate::domain::labels::{LabelSpace, NormStats};

/// Shape of one input tensor (the batch axis excluded).
/// Height is the time axis, width the frequency axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeatureShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl FeatureShape {
    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    channels: usize,
    height: usize,
    width: usize,
    num_cats: usize,
    num_dims: usize,
    means: Vec<f32>,
    stds: Vec<f32>,
    train_count: usize,
    eval_count: usize,
    test_count: usize,
}

/// The three splits plus everything needed to size the model.
pub struct DataBundle {
    pub shape: FeatureShape,
    pub label_space: LabelSpace,
    pub stats: NormStats,
    pub train: Vec<EmotionSample>,
    pub eval: Vec<EmotionSample>,
    pub test: Vec<EmotionSample>,
}

pub struct DatasetLoader {
    dir: PathBuf,
}

impl DatasetLoader {
    pub fn new(data_dir: impl Into<String>, dataset: &str) -> Self {
        let dir = PathBuf::from(data_dir.into()).join(dataset);
        Self { dir }
    }

    /// Read the manifest and all three splits into memory.
    pub fn load(&self) -> Result<DataBundle> {
        let manifest_path = self.dir.join("manifest.json");
        let json = fs::read_to_string(&manifest_path).with_context(|| {
            format!("Cannot read dataset manifest '{}'", manifest_path.display())
        })?;
        let manifest: Manifest = serde_json::from_str(&json)
            .with_context(|| "Malformed manifest.json")?;

        let shape = FeatureShape {
            channels: manifest.channels,
            height: manifest.height,
            width: manifest.width,
        };
        let label_space = LabelSpace::new(manifest.num_cats, manifest.num_dims);

        let train = self.load_split("train", manifest.train_count, shape, label_space)?;
        let eval = self.load_split("eval", manifest.eval_count, shape, label_space)?;
        let test = self.load_split("test", manifest.test_count, shape, label_space)?;
        tracing::info!(
            "Loaded dataset: {} train, {} eval, {} test samples of shape ({}, {}, {})",
            train.len(),
            eval.len(),
            test.len(),
            shape.channels,
            shape.height,
            shape.width,
        );

        Ok(DataBundle {
            shape,
            label_space,
            stats: NormStats { means: manifest.means, stds: manifest.stds },
            train,
            eval,
            test,
        })
    }

    fn load_split(
        &self,
        split: &str,
        count: usize,
        shape: FeatureShape,
        labels: LabelSpace,
    ) -> Result<Vec<EmotionSample>> {
        let features = self.read_f32(&format!("{split}_features.f32"), count * shape.numel())?;
        let cats = self.read_f32(&format!("{split}_cats.f32"), count * labels.num_cats)?;
        let dims = self.read_f32(&format!("{split}_dims.f32"), count * labels.num_dims)?;

        let samples = (0..count)
            .map(|i| EmotionSample {
                features: features[i * shape.numel()..(i + 1) * shape.numel()].to_vec(),
                label_cat: cats[i * labels.num_cats..(i + 1) * labels.num_cats].to_vec(),
                label_dim: dims[i * labels.num_dims..(i + 1) * labels.num_dims].to_vec(),
            })
            .collect();
        Ok(samples)
    }

    /// Read a raw little-endian f32 file and check its length
    /// against the manifest — a mismatch means the bundle is
    /// corrupt and training must not start.
    fn read_f32(&self, name: &str, expected: usize) -> Result<Vec<f32>> {
        let path = self.dir.join(name);
        let bytes = fs::read(&path)
            .with_context(|| format!("Cannot read tensor file '{}'", path.display()))?;
        if bytes.len() != expected * 4 {
            bail!(
                "Tensor file '{}' holds {} f32 values, manifest expects {}",
                path.display(),
                bytes.len() / 4,
                expected,
            );
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}
