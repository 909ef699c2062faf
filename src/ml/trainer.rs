// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One optimisation step per batch:
//
//   1. forward the QA model, keep the last hidden states
//   2. loss = span CE               (length-penalised with
//                                    --enable-length-bp-penalty)
//           + λ_len · length_loss   (--enable-length-loss)
//           + λ_adv · KL(uniform ‖ D(h))   (--adv, in-domain rows)
//   3. backward, AdamW step on the QA model only
//   4. --adv: adv_steps AdamW steps on the discriminator, using
//      NLL of the true dataset id on the *detached* hidden states
//
// Every eval_every steps (never at step 0) the validation set is
// evaluated; the checkpoint is overwritten when F1 ≥ best F1.
//
// Key Burn insight:
//   - Training uses an AutodiffBackend for gradients
//   - model.valid() drops to B::InnerBackend for evaluation
//   - GradientsParams::from_module pulls only one module's
//     gradients out of a shared backward pass
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::QaBatcher, dataset::{QaDataset, QaFeature}};
use crate::domain::example::QaExample;
use crate::infra::{checkpoint::CheckpointManager, metrics::ScalarWriter};
use crate::ml::{
    discriminator::{discriminator_input, DomainDiscriminator},
    inferencer::{evaluate, EvalScores, EvalSplit},
    loss::{
        discriminator_nll, domain_confusion_loss, length_loss, length_mask,
        length_penalty, qa_loss, weighted_qa_loss,
    },
    model::TransformerQaModel,
};

/// transformers' AdamW defaults
const ADAM_EPSILON: f32 = 1e-6;
const WEIGHT_DECAY: f32 = 0.0;

/// Steps between progress lines at info level
const PROGRESS_EVERY: usize = 100;

fn reports_progress(step: usize) -> bool {
    step % PROGRESS_EVERY == 0
}

/// Validation data kept in feature order for post-processing.
pub struct ValidationSet<'a> {
    pub examples: &'a [QaExample],
    pub features: &'a [QaFeature],
}

/// Per-step scalars, also written to scalars.csv
#[derive(Debug, Default, Clone, Copy)]
struct StepLosses {
    nll:         f64,
    dis_loss:    f64,
    dis_on_qa:   f64,
    length_loss: f64,
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

pub struct Trainer<'a, B: AutodiffBackend> {
    cfg:        &'a TrainConfig,
    device:     B::Device,
    checkpoint: &'a CheckpointManager,
    scalars:    &'a ScalarWriter,
}

impl<'a, B: AutodiffBackend> Trainer<'a, B> {
    pub fn new(
        cfg:        &'a TrainConfig,
        device:     B::Device,
        checkpoint: &'a CheckpointManager,
        scalars:    &'a ScalarWriter,
    ) -> Self {
        Self { cfg, device, checkpoint, scalars }
    }

    /// Train for `num_epochs` and return the best validation scores.
    pub fn train(
        &self,
        mut model:         TransformerQaModel<B>,
        mut discriminator: DomainDiscriminator<B>,
        train_set:         QaDataset,
        val:               &ValidationSet<'_>,
    ) -> Result<EvalScores> {
        let cfg = self.cfg;
        B::seed(cfg.seed);

        let mut qa_optim = AdamWConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .with_weight_decay(WEIGHT_DECAY)
            .init();
        let mut dis_optim = AdamWConfig::new()
            .with_epsilon(ADAM_EPSILON)
            .with_weight_decay(WEIGHT_DECAY)
            .init();

        let loader = DataLoaderBuilder::new(QaBatcher::<B>::new(self.device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(1)
            .build(train_set);

        let mask = cfg
            .enable_length_loss
            .then(|| length_mask::<B>(cfg.max_seq_len, cfg.length_k, &self.device));

        let mut best        = EvalScores::unscored();
        let mut evaluated   = false;
        let mut global_step = 0usize;

        for epoch in 0..cfg.num_epochs {
            tracing::info!("Epoch: {epoch}");

            for batch in loader.iter() {
                let output = model.forward(batch.input_ids, batch.attention_mask);
                let start_logits = output.start_logits;
                let end_logits   = output.end_logits;
                // the discriminator never trains through the encoder
                let detached = discriminator_input(output.hidden_states.clone(), cfg.full_adv).detach();

                let mut losses = StepLosses::default();

                let mut loss = if cfg.enable_length_bp_penalty {
                    let weights = length_penalty(
                        start_logits.clone(), end_logits.clone(),
                        batch.start_positions.clone(), batch.end_positions.clone(),
                    )?;
                    weighted_qa_loss(
                        start_logits.clone(), end_logits.clone(),
                        batch.start_positions, batch.end_positions, weights,
                    )
                } else {
                    qa_loss(
                        start_logits.clone(), end_logits.clone(),
                        batch.start_positions, batch.end_positions,
                    )
                };

                if let Some(mask) = &mask {
                    let term = length_loss(start_logits, end_logits, mask.clone())
                        .mul_scalar(cfg.length_lambda);
                    losses.length_loss = scalar(term.clone());
                    loss = loss + term;
                }

                if cfg.adv {
                    let log_prob = discriminator
                        .forward(discriminator_input(output.hidden_states, cfg.full_adv));
                    if let Some(kl) = domain_confusion_loss(log_prob, &batch.domains) {
                        let term = kl.mul_scalar(cfg.adv_lambda);
                        losses.dis_on_qa = scalar(term.clone());
                        loss = loss + term;
                    }
                }

                losses.nll = scalar(loss.clone());
                let mut grads = loss.backward();
                let grads = GradientsParams::from_module(&mut grads, &model);
                model = qa_optim.step(cfg.lr, model, grads);

                if cfg.adv {
                    for _ in 0..cfg.adv_steps {
                        let log_prob = discriminator.forward(detached.clone());
                        let d_loss   = discriminator_nll(log_prob, batch.data_set_ids.clone());
                        losses.dis_loss = scalar(d_loss.clone());
                        let grads = GradientsParams::from_grads(d_loss.backward(), &discriminator);
                        discriminator = dis_optim.step(cfg.adv_lr, discriminator, grads);
                    }
                }

                self.log_step(epoch, global_step, losses)?;

                if global_step > 0 && global_step % cfg.eval_every == 0 {
                    tracing::info!("Evaluating at step {global_step}...");
                    best = self.evaluate_and_save(&model, &discriminator, val, global_step, best)?;
                    evaluated = true;
                }
                global_step += 1;
            }
        }

        if !evaluated {
            tracing::info!("No evaluation during training, evaluating at step {global_step}...");
            best = self.evaluate_and_save(&model, &discriminator, val, global_step, best)?;
        }
        Ok(best)
    }

    fn log_step(&self, epoch: usize, step: usize, l: StepLosses) -> Result<()> {
        if reports_progress(step) {
            tracing::info!(
                "epoch={epoch} step={step} NLL={:.4} dis_loss={:.4} dis_loss_on_qa={:.4} length_loss={:.4}",
                l.nll, l.dis_loss, l.dis_on_qa, l.length_loss,
            );
        } else {
            tracing::debug!(
                "epoch={epoch} step={step} NLL={:.4} dis_loss={:.4} dis_loss_on_qa={:.4} length_loss={:.4}",
                l.nll, l.dis_loss, l.dis_on_qa, l.length_loss,
            );
        }
        self.scalars.add_scalar("train/NLL", l.nll, step)?;
        self.scalars.add_scalar("train/dis_loss", l.dis_loss, step)?;
        self.scalars.add_scalar("train/dis_loss_on_qa", l.dis_on_qa, step)?;
        self.scalars.add_scalar("train/length_loss", l.length_loss, step)?;
        Ok(())
    }

    /// Evaluate on validation data and overwrite the checkpoint if F1 did not drop.
    fn evaluate_and_save(
        &self,
        model:         &TransformerQaModel<B>,
        discriminator: &DomainDiscriminator<B>,
        val:           &ValidationSet<'_>,
        step:          usize,
        best:          EvalScores,
    ) -> Result<EvalScores> {
        let cfg = self.cfg;
        let (predictions, scores) = evaluate(
            &model.valid(),
            &discriminator.valid(),
            val.examples,
            val.features,
            cfg.batch_size,
            cfg.full_adv,
            EvalSplit::Validation,
            &self.device,
        )?;

        for (tag, value) in scores.tagged() {
            self.scalars.add_scalar(&format!("val/{tag}"), value, step)?;
        }
        tracing::info!("Eval {}", scores.summary());

        if cfg.visualize_predictions {
            self.scalars
                .visualize(&predictions, val.examples, step, "val", cfg.num_visuals)?;
        }

        if scores.f1 >= best.f1 {
            self.checkpoint.save_model(model)?;
            self.checkpoint.save_discriminator(discriminator)?;
            tracing::info!("Saved checkpoint to '{}'", self.checkpoint.dir().display());
            return Ok(scores);
        }
        Ok(best)
    }
}
