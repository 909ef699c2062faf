// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// One flat command line, as in the usual run scripts:
//
//   robustqa --do-train --run-name baseline --adv --full-adv true
//   robustqa --do-eval --sub-file mtl_submission.csv \
//            --save-dir save/baseline-01
//
// --do-train and --do-eval may be combined: evaluation then
// runs on the directory training just created.
//
// All business logic is delegated to Layer 2 (application).
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod args;

use anyhow::{bail, Result};
use clap::Parser;

use crate::application::{
    eval_use_case::EvalUseCase,
    train_use_case::{TrainConfig, TrainUseCase},
};
use crate::infra::logging::LogSink;
use crate::ml::{InferBackend, TrainBackend};
use args::{AdversarialArgs, DataArgs, LengthArgs, ModelArgs, RunArgs};

#[derive(Parser, Debug)]
#[command(
    name = "robustqa",
    version,
    about = "Multi-task extractive QA training with adversarial and span-length regularisation"
)]
pub struct Cli {
    /// Train a new run (or resume one with --resume-training)
    #[arg(long)]
    pub do_train: bool,

    /// Evaluate the run in --save-dir and write a submission file
    #[arg(long)]
    pub do_eval: bool,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub adversarial: AdversarialArgs,

    #[command(flatten)]
    pub length: LengthArgs,

    #[command(flatten)]
    pub model: ModelArgs,
}

impl Cli {
    fn validate(&self) -> Result<()> {
        if !self.do_train && !self.do_eval {
            bail!("Nothing to do: pass --do-train and/or --do-eval");
        }
        if self.do_eval && self.run.sub_file.is_empty() {
            bail!("--sub-file must be given with --do-eval");
        }
        Ok(())
    }

    pub fn run(self, logs: &LogSink) -> Result<()> {
        self.validate()?;
        let mut cfg = TrainConfig::from(&self);

        if self.do_train {
            let device  = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            let run_dir = TrainUseCase::new(cfg.clone()).execute::<TrainBackend>(device, logs)?;
            println!("Training complete. Run saved to '{}'.", run_dir.display());
            cfg.save_dir = run_dir.to_string_lossy().into_owned();
        }

        if self.do_eval {
            let device = burn::backend::wgpu::WgpuDevice::default();
            let scores = EvalUseCase::new(cfg).execute::<InferBackend>(device, logs)?;
            println!("Eval {}", scores.summary());
        }
        Ok(())
    }
}

/// Boundary between Layer 1 and Layer 2: the application
/// layer never sees clap types.
impl From<&Cli> for TrainConfig {
    fn from(c: &Cli) -> Self {
        TrainConfig {
            batch_size:  c.run.batch_size,
            num_epochs:  c.run.num_epochs,
            lr:          c.run.lr,
            seed:        c.run.seed,
            eval_every:  c.run.eval_every,

            save_dir:       c.run.save_dir.clone(),
            run_name:       c.run.run_name.clone(),
            train_dir:      c.data.train_dir.clone(),
            val_dir:        c.data.val_dir.clone(),
            eval_dir:       c.data.eval_dir.clone(),
            train_datasets: c.data.train_datasets.clone(),
            eval_datasets:  c.data.eval_datasets.clone(),
            sub_file:       c.run.sub_file.clone(),
            tokenizer:      c.data.tokenizer.clone(),

            num_visuals:           c.data.num_visuals,
            visualize_predictions: c.data.visualize_predictions,
            recompute_features:    c.data.recompute_features,
            resume_training:       c.run.resume_training,
            outdomain_data_repeat: c.data.outdomain_data_repeat,

            adv:        c.adversarial.adv,
            adv_lr:     c.adversarial.adv_lr,
            adv_lambda: c.adversarial.adv_lambda,
            adv_steps:  c.adversarial.adv_steps,
            full_adv:   c.adversarial.full_adv,

            enable_length_loss:       c.length.enable_length_loss,
            length_k:                 c.length.length_k,
            length_lambda:            c.length.length_lambda,
            enable_length_bp_penalty: c.length.enable_length_bp_penalty,

            max_seq_len: c.model.max_seq_len,
            doc_stride:  c.model.doc_stride,
            d_model:     c.model.d_model,
            num_heads:   c.model.num_heads,
            num_layers:  c.model.num_layers,
            d_ff:        c.model.d_ff,
            dropout:     c.model.dropout,
            vocab_size:  c.model.vocab_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("robustqa").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let cfg = TrainConfig::from(&parse(&["--do-train"]));
        let def = TrainConfig::default();
        assert_eq!(
            serde_json::to_value(&cfg).unwrap(),
            serde_json::to_value(&def).unwrap()
        );
    }

    #[test]
    fn test_valued_switches() {
        let cli = parse(&[
            "--do-train", "--adv", "--full-adv", "true",
            "--enable-length-loss", "true", "--enable-length-bp-penalty", "false",
            "--length-k", "10", "--outdomain-data-repeat", "3",
        ]);
        let cfg = TrainConfig::from(&cli);
        assert!(cfg.adv && cfg.full_adv && cfg.enable_length_loss);
        assert!(!cfg.enable_length_bp_penalty);
        assert_eq!(cfg.length_k, 10);
        assert_eq!(cfg.outdomain_data_repeat, 3);
    }

    #[test]
    fn test_nothing_to_do_is_an_error() {
        let err = parse(&[]).run(&LogSink::default()).unwrap_err();
        assert!(err.to_string().contains("--do-train"));
    }

    #[test]
    fn test_eval_needs_submission_name() {
        let err = parse(&["--do-eval"]).run(&LogSink::default()).unwrap_err();
        assert!(err.to_string().contains("--sub-file"));
    }

    #[test]
    fn test_zero_counts_are_rejected() {
        for flag in ["--eval-every", "--batch-size", "--num-epochs"] {
            let parsed = Cli::try_parse_from(["robustqa", "--do-train", flag, "0"]);
            assert!(parsed.is_err(), "{flag} 0 accepted");
        }
        assert_eq!(TrainConfig::from(&parse(&["--do-train", "--eval-every", "1"])).eval_every, 1);
    }
}
