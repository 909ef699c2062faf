// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the best model of a run using Burn's
// CompactRecorder (MessagePack, gzip, half precision).
//
// Layout:
//   <save_dir>/checkpoint/
//     model.mpk.gz            ← QA encoder + span head
//     discriminator.mpk.gz    ← domain discriminator
//     train_config.json       ← architecture + run flags
//     tokenizer.json          ← vocabulary the ids refer to
//
// Every save overwrites the previous one: only the best
// checkpoint (by validation F1) is kept.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{anyhow, Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::discriminator::DomainDiscriminator;
use crate::ml::model::TransformerQaModel;

const MODEL_FILE:         &str = "model";
const DISCRIMINATOR_FILE: &str = "discriminator";
const CONFIG_FILE:        &str = "train_config.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Checkpoint of the run stored in `save_dir`.
    pub fn new(save_dir: impl AsRef<Path>) -> Self {
        Self { dir: save_dir.as_ref().join("checkpoint") }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tokenizer stored alongside the weights
    pub fn tokenizer_store(&self) -> TokenizerStore {
        TokenizerStore::new(self.dir.clone())
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))
    }

    pub fn save_model<B: Backend>(&self, model: &TransformerQaModel<B>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .map_err(|e| anyhow!("Failed to save model to '{}': {e:?}", path.display()))?;
        tracing::debug!("Saved model to '{}'", path.display());
        Ok(())
    }

    pub fn save_discriminator<B: Backend>(&self, discriminator: &DomainDiscriminator<B>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(DISCRIMINATOR_FILE);
        CompactRecorder::new()
            .record(discriminator.clone().into_record(), path.clone())
            .map_err(|e| anyhow!("Failed to save discriminator to '{}': {e:?}", path.display()))?;
        Ok(())
    }

    /// Restore weights into `model`, which must have the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  TransformerQaModel<B>,
        device: &B::Device,
    ) -> Result<TransformerQaModel<B>> {
        let path = self.dir.join(MODEL_FILE);
        tracing::info!("Loading model from '{}'", path.display());
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .map_err(|e| anyhow!(
                "Cannot load model '{}'. Have you trained the model first? ({e:?})",
                path.display()
            ))?;
        Ok(model.load_record(record))
    }

    pub fn has_discriminator(&self) -> bool {
        self.dir.join(format!("{DISCRIMINATOR_FILE}.mpk.gz")).exists()
    }

    pub fn load_discriminator<B: Backend>(
        &self,
        discriminator: DomainDiscriminator<B>,
        device:        &B::Device,
    ) -> Result<DomainDiscriminator<B>> {
        let path = self.dir.join(DISCRIMINATOR_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .map_err(|e| anyhow!("Cannot load discriminator '{}': {e:?}", path.display()))?;
        Ok(discriminator.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Run with --do-train first or point --save-dir at a trained run",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::ml::discriminator::DomainDiscriminatorConfig;
    use crate::ml::model::TransformerQaConfig;

    type TB = NdArray;

    fn weights(t: Tensor<TB, 2>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path());
        let mut cfg = TrainConfig::default();
        cfg.adv = true;
        cfg.length_k = 12;

        ckpt.save_config(&cfg).unwrap();
        let back = ckpt.load_config().unwrap();
        assert!(back.adv);
        assert_eq!(back.length_k, 12);
        assert_eq!(ckpt.dir(), dir.path().join("checkpoint"));
    }

    #[test]
    fn test_model_weights_survive_save_and_load() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path());
        let device = Default::default();
        let config = TransformerQaConfig::new(40, 8, 8, 2, 1, 16, 0.0);

        let saved: TransformerQaModel<TB> = config.init(&device);
        ckpt.save_model(&saved).unwrap();

        let fresh: TransformerQaModel<TB> = config.init(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();

        let a = weights(saved.qa_head.weight.val());
        let b = weights(loaded.qa_head.weight.val());
        for (x, y) in a.iter().zip(&b) {
            // stored at half precision
            approx::assert_abs_diff_eq!(x, y, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_discriminator_presence() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path());
        let device = Default::default();
        let disc: DomainDiscriminator<TB> = DomainDiscriminatorConfig::new(4, 4).init(&device);

        assert!(!ckpt.has_discriminator());
        ckpt.save_discriminator(&disc).unwrap();
        assert!(ckpt.has_discriminator());
        let fresh: DomainDiscriminator<TB> = DomainDiscriminatorConfig::new(4, 4).init(&device);
        assert!(ckpt.load_discriminator(fresh, &device).is_ok());
    }
}
