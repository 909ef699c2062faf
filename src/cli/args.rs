// ============================================================
// Layer 1 — Argument Groups
// ============================================================
// Flags are grouped by concern and flattened into one flat
// command line (`robustqa --do-train --adv --lr 3e-5 ...`).
//
// Switches that run scripts pass with a value
// (`--full-adv true`, `--enable-length-loss true`) take an
// explicit true|false.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{builder::RangedU64ValueParser, ArgAction, Args};

/// Counts that must be at least one
fn positive() -> RangedU64ValueParser<usize> {
    RangedU64ValueParser::<usize>::new().range(1..)
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Run")]
pub struct RunArgs {
    /// Features per optimisation step and per evaluation batch
    #[arg(long, default_value_t = 16, value_parser = positive())]
    pub batch_size: usize,

    #[arg(long, default_value_t = 3, value_parser = positive())]
    pub num_epochs: usize,

    /// Learning rate of the QA model
    #[arg(long, default_value_t = 3e-5)]
    pub lr: f64,

    /// Seeds weight init and shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Evaluate (and maybe checkpoint) every N steps
    #[arg(long, default_value_t = 5000, value_parser = positive())]
    pub eval_every: usize,

    /// Base directory for runs; with --do-eval alone, the run itself
    #[arg(long, default_value = "save/")]
    pub save_dir: String,

    #[arg(long, default_value = "multitask_distilbert")]
    pub run_name: String,

    /// Submission file name, written as <save_dir>/<split>_<sub_file>
    #[arg(long, default_value = "")]
    pub sub_file: String,

    /// Continue training the checkpoint in --save-dir
    #[arg(long)]
    pub resume_training: bool,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Data")]
pub struct DataArgs {
    #[arg(long, default_value = "datasets/indomain_train")]
    pub train_dir: String,

    #[arg(long, default_value = "datasets/indomain_val")]
    pub val_dir: String,

    /// Split is "test" when this path contains "test", else "validation"
    #[arg(long, default_value = "datasets/oodomain_test")]
    pub eval_dir: String,

    /// Comma-separated dataset files inside --train-dir
    #[arg(long, default_value = "squad,nat_questions,newsqa")]
    pub train_datasets: String,

    /// Comma-separated dataset files inside --val-dir / --eval-dir
    #[arg(long, default_value = "race,relation_extraction,duorc")]
    pub eval_datasets: String,

    /// How often out-of-domain training examples are repeated
    #[arg(long, default_value_t = 1)]
    pub outdomain_data_repeat: usize,

    /// Ignore cached encodings
    #[arg(long)]
    pub recompute_features: bool,

    /// Pretrained tokenizer.json; a word-level vocabulary is built otherwise
    #[arg(long)]
    pub tokenizer: Option<String>,

    #[arg(long, default_value_t = 10)]
    pub num_visuals: usize,

    /// Log sample predictions to visuals.jsonl at each evaluation
    #[arg(long)]
    pub visualize_predictions: bool,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Adversarial training")]
pub struct AdversarialArgs {
    /// Train a domain discriminator against the encoder
    #[arg(long)]
    pub adv: bool,

    #[arg(long, default_value_t = 3e-5)]
    pub adv_lr: f64,

    /// Weight of the domain confusion term in the QA loss
    #[arg(long, default_value_t = 0.01)]
    pub adv_lambda: f64,

    /// Discriminator updates per QA update
    #[arg(long, default_value_t = 1)]
    pub adv_steps: usize,

    /// Feed every hidden state to the discriminator, not only [CLS]
    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub full_adv: bool,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Span length")]
pub struct LengthArgs {
    /// Penalise probability mass on reversed or overlong spans
    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub enable_length_loss: bool,

    /// Longest span (in tokens past the start) not penalised
    #[arg(long, default_value_t = 30)]
    pub length_k: usize,

    #[arg(long, default_value_t = 1.0)]
    pub length_lambda: f64,

    /// Scale span CE when the predicted span is longer than the gold one
    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub enable_length_bp_penalty: bool,
}

#[derive(Args, Debug, Clone)]
#[command(next_help_heading = "Model")]
pub struct ModelArgs {
    /// Tokens per window: [CLS] question [SEP] context [SEP] + padding
    #[arg(long, default_value_t = 384)]
    pub max_seq_len: usize,

    /// Context tokens shared by consecutive windows
    #[arg(long, default_value_t = 128)]
    pub doc_stride: usize,

    #[arg(long, default_value_t = 768)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 12)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 3072)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Upper bound on the vocabulary built from the training corpus
    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,
}
