// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds, trains or runs a network.
//
//   model.rs         — transformer encoder with a span head
//                      • token + positional embeddings
//                      • multi-head self-attention with padding mask
//                      • GELU feed-forward, post-norm residuals
//                      • start / end logits + last hidden states
//
//   discriminator.rs — MLP guessing the source dataset of a feature
//
//   loss.rs          — span CE, length penalty, length loss,
//                      domain confusion (KL) and discriminator NLL
//
//   trainer.rs       — step loop: QA update, discriminator updates,
//                      periodic evaluation and checkpointing
//
//   inferencer.rs    — ordered evaluation, post-processing, scores
//
// Training and evaluation code is generic over the backend; the
// binary picks WGPU, the tests run on NdArray.
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            Devlin et al. (2019) BERT

use burn::backend::{Autodiff, Wgpu};

/// Backend used for training (gradients on top of WGPU)
pub type TrainBackend = Autodiff<Wgpu>;

/// Backend used for evaluation only
pub type InferBackend = Wgpu;

/// Transformer encoder Q&A model architecture
pub mod model;

/// Domain discriminator for adversarial training
pub mod discriminator;

/// Training objectives
pub mod loss;

/// Step loop with evaluation and checkpointing
pub mod trainer;

/// Evaluation over a feature set
pub mod inferencer;
