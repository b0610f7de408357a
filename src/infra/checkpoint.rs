// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists and restores training state with Burn's
// CompactRecorder (named MessagePack, type-safe on load).
//
// What gets saved per checkpoint interval:
//   model_epoch_{n}.mpk — all learned parameters
//   optim_epoch_{n}.mpk — optimizer momentum/velocity state
//   model_best.mpk      — parameters at the best eval loss so far
//   latest_epoch.json   — "most recent" pointer for resume
//   train_config.json   — written once before training
//
// Every write goes to a temp file first and is renamed into
// place, so a kill mid-write never corrupts the last good
// checkpoint. Resume either restores parameters, optimizer
// state and epoch index exactly, or fails loudly — partially
// loaded state is never silently accepted.

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Record, Recorder},
};
use std::{fs, path::PathBuf};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::AttConvRnn;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if
    /// it doesn't already exist.
    pub fn new(dir: impl Into<String>) -> Self {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    /// Save model parameters, optimizer state and the epoch
    /// pointer for one checkpoint interval.
    pub fn save<B: Backend, R: Record<B>>(
        &self,
        model: &AttConvRnn<B>,
        optim_record: R,
        epoch: usize,
    ) -> Result<()> {
        self.record_atomic(model.clone().into_record(), &format!("model_epoch_{epoch}"))?;
        self.record_atomic(optim_record, &format!("optim_epoch_{epoch}"))?;

        // pointer goes last: a crash before this line leaves the
        // previous checkpoint as the resume target
        let tmp = self.dir.join("latest_epoch.json.tmp");
        fs::write(&tmp, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;
        fs::rename(&tmp, self.dir.join("latest_epoch.json"))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Keep a separate copy of the parameters that achieved the
    /// best eval loss so far. Overwritten on each improvement.
    pub fn save_best<B: Backend>(&self, model: &AttConvRnn<B>) -> Result<()> {
        self.record_atomic(model.clone().into_record(), "model_best")
    }

    /// Restore model parameters from the most recent checkpoint.
    pub fn load_model<B: Backend>(
        &self,
        model: AttConvRnn<B>,
        device: &B::Device,
    ) -> Result<AttConvRnn<B>> {
        let epoch = self.latest_epoch()?;
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading model checkpoint from epoch {}", epoch);
        let record = CompactRecorder::new().load(path.clone(), device).with_context(|| {
            format!(
                "Cannot load checkpoint '{}'. Disable --resume to start from fresh parameters.",
                path.display()
            )
        })?;
        Ok(model.load_record(record))
    }

    /// Restore the optimizer record from the most recent
    /// checkpoint.
    pub fn load_optimizer<B: Backend, R: Record<B>>(&self, device: &B::Device) -> Result<R> {
        let epoch = self.latest_epoch()?;
        let path = self.dir.join(format!("optim_epoch_{epoch}"));
        CompactRecorder::new().load(path.clone(), device).with_context(|| {
            format!("Cannot load optimizer state '{}'", path.display())
        })
    }

    /// Save the training configuration so generation can rebuild
    /// the exact architecture later.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'generate'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Read latest_epoch.json and return the epoch number.
    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");
        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' first?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    /// Record to a temp name, then rename into place. The
    /// recorder appends its own .mpk extension.
    fn record_atomic<B: Backend, R: Record<B>>(&self, record: R, stem: &str) -> Result<()> {
        let tmp = self.dir.join(format!("{stem}_tmp"));
        CompactRecorder::new()
            .record(record, tmp.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", tmp.display()))?;
        fs::rename(
            self.dir.join(format!("{stem}_tmp.mpk")),
            self.dir.join(format!("{stem}.mpk")),
        )
        .with_context(|| "Failed to move checkpoint into place")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::AttConvRnnConfig;

    type TestBackend = burn::backend::NdArray;

    fn temp_dir(tag: &str) -> String {
        let dir = std::env::temp_dir().join(format!("emo_ser_{tag}_{}", std::process::id()));
        dir.to_string_lossy().into_owned()
    }

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> AttConvRnn<TestBackend> {
        AttConvRnnConfig::new(1, 8, 8, 5)
            .with_l1_channels(2)
            .with_l2_channels(3)
            .with_gru_cell_units(4)
            .with_num_linear(16)
            .with_f1_units(8)
            .init::<TestBackend>(device)
            .unwrap()
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let device = Default::default();
        let dir = temp_dir("roundtrip");
        let manager = CheckpointManager::new(dir.clone());

        let model = tiny_model(&device);
        // any record works as the stand-in optimizer state here
        manager.save(&model, model.clone().into_record(), 3).unwrap();
        assert_eq!(manager.latest_epoch().unwrap(), 3);

        // the temp names were renamed to the recorder's real
        // extension, nothing half-written remains
        let base = std::path::PathBuf::from(&dir);
        assert!(base.join("model_epoch_3.mpk").exists());
        assert!(base.join("optim_epoch_3.mpk").exists());
        assert!(!base.join("model_epoch_3_tmp.mpk").exists());

        // restoring into a freshly initialized model reproduces
        // the saved parameters
        let restored = manager.load_model(tiny_model(&device), &device).unwrap();
        let a: Vec<f32> = model.linear3.weight.val().into_data().to_vec().unwrap();
        let b: Vec<f32> = restored.linear3.weight.val().into_data().to_vec().unwrap();
        assert_eq!(a, b);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_best_model_file_is_written() {
        let device = Default::default();
        let dir = temp_dir("best");
        let manager = CheckpointManager::new(dir.clone());

        manager.save_best(&tiny_model(&device)).unwrap();
        assert!(std::path::PathBuf::from(&dir).join("model_best.mpk").exists());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let dir = temp_dir("missing");
        let manager = CheckpointManager::new(dir.clone());
        assert!(manager.load_model(tiny_model(&device), &device).is_err());
        std::fs::remove_dir_all(dir).ok();
    }
}
