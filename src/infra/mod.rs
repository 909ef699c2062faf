// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the file system on behalf of a run:
//
//   <save_dir>/<run_name>-NN/         run_dir.rs
//     log_train.txt                   logging.rs
//     log_validation.txt | log_test.txt
//     scalars.csv  visuals.jsonl      metrics.rs
//     validation_<sub_file>           submission.rs
//     checkpoint/                     checkpoint.rs
//       model.mpk.gz  discriminator.mpk.gz
//       train_config.json
//       tokenizer.json                tokenizer_store.rs
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model and discriminator checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Scalar curves and prediction samples
pub mod metrics;

/// Subscriber setup and the per-phase log file
pub mod logging;

/// Numbered run directories
pub mod run_dir;

/// Leaderboard CSV output
pub mod submission;
