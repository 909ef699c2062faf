// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Pick the run directory        (Layer 6 - infra)
//   Step 2: Redirect logs, dump the config (Layer 6 - infra)
//   Step 3: Load train + validation data   (Layer 4 - data)
//   Step 4: Build / load tokenizer         (Layer 6 - infra)
//   Step 5: Encode features (cached)       (Layer 4 - data)
//   Step 6: Build or resume the networks   (Layer 5 - ml)
//   Step 7: Run the training loop          (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::PathBuf};

use crate::data::{
    cache::{FeatureCache, Split},
    dataset::QaDataset,
    loader::load_datasets,
    preprocessor::{FeatureBuilder, DOC_STRIDE},
};
use crate::domain::example::QaExample;
use crate::infra::{
    checkpoint::CheckpointManager,
    logging::LogSink,
    metrics::ScalarWriter,
    run_dir::get_save_dir,
    tokenizer_store::id_space,
};
use crate::ml::{
    discriminator::{DomainDiscriminator, DomainDiscriminatorConfig},
    model::{TransformerQaConfig, TransformerQaModel},
    trainer::{Trainer, ValidationSet},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every flag of a run. Saved to the checkpoint so evaluation can
// rebuild the exact architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    // optimisation
    pub batch_size:  usize,
    pub num_epochs:  usize,
    pub lr:          f64,
    pub seed:        u64,
    pub eval_every:  usize,

    // locations
    pub save_dir:       String,
    pub run_name:       String,
    pub train_dir:      String,
    pub val_dir:        String,
    pub eval_dir:       String,
    pub train_datasets: String,
    pub eval_datasets:  String,
    pub sub_file:       String,
    pub tokenizer:      Option<String>,

    // data handling
    pub num_visuals:           usize,
    pub visualize_predictions: bool,
    pub recompute_features:    bool,
    pub resume_training:       bool,
    pub outdomain_data_repeat: usize,

    // adversarial training
    pub adv:        bool,
    pub adv_lr:     f64,
    pub adv_lambda: f64,
    pub adv_steps:  usize,
    pub full_adv:   bool,

    // span length regularisation
    pub enable_length_loss:       bool,
    pub length_k:                 usize,
    pub length_lambda:            f64,
    pub enable_length_bp_penalty: bool,

    // architecture
    pub max_seq_len: usize,
    pub doc_stride:  usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    pub vocab_size:  usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size:  16,
            num_epochs:  3,
            lr:          3e-5,
            seed:        42,
            eval_every:  5000,

            save_dir:       "save/".to_string(),
            run_name:       "multitask_distilbert".to_string(),
            train_dir:      "datasets/indomain_train".to_string(),
            val_dir:        "datasets/indomain_val".to_string(),
            eval_dir:       "datasets/oodomain_test".to_string(),
            train_datasets: "squad,nat_questions,newsqa".to_string(),
            eval_datasets:  "race,relation_extraction,duorc".to_string(),
            sub_file:       String::new(),
            tokenizer:      None,

            num_visuals:           10,
            visualize_predictions: false,
            recompute_features:    false,
            resume_training:       false,
            outdomain_data_repeat: 1,

            adv:        false,
            adv_lr:     3e-5,
            adv_lambda: 0.01,
            adv_steps:  1,
            full_adv:   false,

            enable_length_loss:       false,
            length_k:                 30,
            length_lambda:            1.0,
            enable_length_bp_penalty: false,

            max_seq_len: 384,
            doc_stride:  DOC_STRIDE,
            d_model:     768,
            num_heads:   12,
            num_layers:  6,
            d_ff:        3072,
            dropout:     0.1,
            vocab_size:  30522,
        }
    }
}

impl TrainConfig {
    pub fn model_config(&self, vocab_size: usize) -> TransformerQaConfig {
        TransformerQaConfig::new(
            vocab_size, self.max_seq_len, self.d_model,
            self.num_heads, self.num_layers, self.d_ff, self.dropout,
        )
    }

    pub fn discriminator_config(&self) -> DomainDiscriminatorConfig {
        DomainDiscriminatorConfig::for_encoder(self.d_model, self.max_seq_len, self.full_adv)
    }

    /// Keep this run's flags but take every shape-defining field
    /// from a saved configuration.
    pub fn with_architecture_of(mut self, saved: &TrainConfig) -> Self {
        self.max_seq_len = saved.max_seq_len;
        self.doc_stride  = saved.doc_stride;
        self.d_model     = saved.d_model;
        self.num_heads   = saved.num_heads;
        self.num_layers  = saved.num_layers;
        self.d_ff        = saved.d_ff;
        self.dropout     = saved.dropout;
        self.vocab_size  = saved.vocab_size;
        self.full_adv    = saved.full_adv;
        self
    }

    /// Fresh networks for this architecture
    pub fn init_networks<B: burn::prelude::Backend>(
        &self,
        device: &B::Device,
    ) -> (TransformerQaModel<B>, DomainDiscriminator<B>) {
        (
            self.model_config(self.vocab_size).init(device),
            self.discriminator_config().init(device),
        )
    }
}

/// Unique contexts followed by every question, for vocabulary building.
fn corpus(examples: &[QaExample]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut texts: Vec<String> = examples
        .iter()
        .filter(|ex| seen.insert(ex.context.as_str()))
        .map(|ex| ex.context.clone())
        .collect();
    texts.extend(examples.iter().map(|ex| ex.question.clone()));
    texts
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run training end to end; returns the run directory used.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device, logs: &LogSink) -> Result<PathBuf> {
        let cfg = &self.config;

        // ── Step 1: Run directory ─────────────────────────────────────────────
        // Resuming continues in the given directory, otherwise a new
        // numbered one is created under it
        let save_dir = if cfg.resume_training {
            let dir = PathBuf::from(&cfg.save_dir);
            fs::create_dir_all(&dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
            dir
        } else {
            get_save_dir(&cfg.save_dir, &cfg.run_name)?
        };

        // ── Step 2: Logs ──────────────────────────────────────────────────────
        logs.redirect(save_dir.join("log_train.txt"))?;
        tracing::info!("Args: {}", serde_json::to_string_pretty(cfg)?);

        let checkpoint = CheckpointManager::new(&save_dir);

        // ── Step 3: Raw examples ──────────────────────────────────────────────
        tracing::info!("Preparing Training Data...");
        let (train_examples, train_name) =
            load_datasets(&cfg.train_dir, &cfg.train_datasets, cfg.outdomain_data_repeat)?;
        tracing::info!("Loaded {} training examples", train_examples.len());

        tracing::info!("Preparing Validation Data...");
        let (val_examples, val_name) = load_datasets(&cfg.val_dir, &cfg.eval_datasets, 1)?;
        tracing::info!("Loaded {} validation examples", val_examples.len());

        // ── Step 4: Tokenizer and architecture ────────────────────────────────
        // A resumed run must keep the vocabulary and shapes its weights were
        // trained with
        let store = checkpoint.tokenizer_store();
        let (tokenizer, arch) = if cfg.resume_training {
            let saved = checkpoint.load_config()?;
            (store.load()?, cfg.clone().with_architecture_of(&saved))
        } else {
            let tokenizer = store.load_or_build(
                cfg.tokenizer.as_deref(),
                &corpus(&train_examples),
                cfg.vocab_size,
            )?;
            let mut arch = cfg.clone();
            arch.vocab_size = id_space(&tokenizer);
            (tokenizer, arch)
        };
        store.save(&tokenizer)?;
        let mut saved = arch.clone();
        saved.save_dir = save_dir.to_string_lossy().into_owned();
        checkpoint.save_config(&saved)?;
        tracing::info!("Embedding rows: {}", arch.vocab_size);

        // ── Step 5: Features ──────────────────────────────────────────────────
        let builder = FeatureBuilder::new(tokenizer, arch.max_seq_len, arch.doc_stride)?;
        let train_features = FeatureCache::new(&cfg.train_dir, &train_name, Split::Train, cfg.recompute_features)
            .read_and_process(&builder.cache_key(), || builder.prepare_train(&train_examples))?;
        let val_features = FeatureCache::new(&cfg.val_dir, &val_name, Split::Eval, cfg.recompute_features)
            .read_and_process(&builder.cache_key(), || builder.prepare_eval(&val_examples))?;
        tracing::info!(
            "Features: {} train, {} validation",
            train_features.len(),
            val_features.len()
        );

        // ── Step 6: Networks ──────────────────────────────────────────────────
        let (mut model, mut discriminator) = arch.init_networks::<B>(&device);
        if cfg.resume_training {
            model = checkpoint.load_model(model, &device)?;
            if checkpoint.has_discriminator() {
                discriminator = checkpoint.load_discriminator(discriminator, &device)?;
            }
        }
        tracing::info!(
            "Model ready: {} layers, d_model={}, max_seq_len={}",
            arch.num_layers, arch.d_model, arch.max_seq_len
        );

        // ── Step 7: Train ─────────────────────────────────────────────────────
        let scalars = ScalarWriter::new(&save_dir)?;
        let trainer = Trainer::<B>::new(&arch, device, &checkpoint, &scalars);
        let val = ValidationSet { examples: &val_examples, features: &val_features };
        let best = trainer.train(model, discriminator, QaDataset::new(train_features), &val)?;

        tracing::info!("Best validation {}", best.summary());
        tracing::info!(
            "Scalars in '{}', visuals in '{}'",
            scalars.csv_path().display(),
            scalars.visuals_path().display()
        );
        Ok(save_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Answer;

    #[test]
    fn test_defaults_match_command_line() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.eval_every, 5000);
        assert_eq!(cfg.doc_stride, 128);
        assert!(cfg.tokenizer.is_none());
        assert!(!cfg.adv && !cfg.full_adv);
    }

    #[test]
    fn test_architecture_copied_from_saved_run() {
        let saved = TrainConfig { d_model: 64, full_adv: true, vocab_size: 500, ..TrainConfig::default() };
        let run = TrainConfig { lr: 1.0, ..TrainConfig::default() }.with_architecture_of(&saved);
        assert_eq!(run.d_model, 64);
        assert_eq!(run.vocab_size, 500);
        assert!(run.full_adv);
        assert_eq!(run.lr, 1.0);
        assert_eq!(run.discriminator_config().hidden_size, 48);
    }

    #[test]
    fn test_corpus_dedupes_contexts() {
        let ex = |id: &str, q: &str| QaExample {
            id:          id.to_string(),
            question:    q.to_string(),
            context:     "shared context".to_string(),
            answers:     vec![Answer::new("shared", 0)],
            data_set_id: 0,
        };
        let texts = corpus(&[ex("1", "first"), ex("2", "second")]);
        assert_eq!(texts, vec!["shared context", "first", "second"]);
    }
}
