// ============================================================
// Layer 2 — EvalUseCase
// ============================================================
// Scores a trained run on a held-out directory and writes the
// leaderboard file:
//
//   Step 1: Split name from --eval-dir ("test" or "validation")
//   Step 2: Redirect logs to <save_dir>/log_<split>.txt
//   Step 3: Rebuild model + discriminator from the checkpoint
//   Step 4: Encode the evaluation datasets (cached)
//   Step 5: Predict, score, write <save_dir>/<split>_<sub_file>

use anyhow::Result;
use burn::prelude::*;
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    cache::{FeatureCache, Split},
    loader::load_datasets,
    preprocessor::FeatureBuilder,
};
use crate::infra::{checkpoint::CheckpointManager, logging::LogSink, submission::write_submission};
use crate::ml::inferencer::{evaluate, EvalScores, EvalSplit};

pub struct EvalUseCase {
    config: TrainConfig,
}

impl EvalUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: Backend>(&self, device: B::Device, logs: &LogSink) -> Result<EvalScores> {
        let cfg      = &self.config;
        let split    = EvalSplit::from_eval_dir(&cfg.eval_dir);
        let save_dir = PathBuf::from(&cfg.save_dir);
        logs.redirect(save_dir.join(format!("log_{}.txt", split.name())))?;

        let checkpoint = CheckpointManager::new(&save_dir);
        let arch       = cfg.clone().with_architecture_of(&checkpoint.load_config()?);
        let tokenizer  = checkpoint.tokenizer_store().load()?;

        let (model, discriminator) = arch.init_networks::<B>(&device);
        let model = checkpoint.load_model(model, &device)?;
        let discriminator = if checkpoint.has_discriminator() {
            checkpoint.load_discriminator(discriminator, &device)?
        } else {
            tracing::warn!("No discriminator in checkpoint, discriminator_precision uses a fresh one");
            discriminator
        };

        let (examples, name) = load_datasets(&cfg.eval_dir, &cfg.eval_datasets, 1)?;
        tracing::info!("Evaluating {} examples from '{}' ({})", examples.len(), cfg.eval_dir, split.name());
        let builder  = FeatureBuilder::new(tokenizer, arch.max_seq_len, arch.doc_stride)?;
        let features = FeatureCache::new(&cfg.eval_dir, &name, Split::Eval, cfg.recompute_features)
            .read_and_process(&builder.cache_key(), || builder.prepare_eval(&examples))?;

        let (predictions, scores) = evaluate(
            &model, &discriminator, &examples, &features,
            cfg.batch_size, arch.full_adv, split, &device,
        )?;
        tracing::info!("Eval {}", scores.summary());

        let sub_path = save_dir.join(format!("{}_{}", split.name(), cfg.sub_file));
        tracing::info!("Writing submission file to {}...", sub_path.display());
        write_submission(&sub_path, &predictions)?;
        Ok(scores)
    }
}
