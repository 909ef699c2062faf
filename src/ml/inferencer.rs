// ============================================================
// Layer 5 — Evaluation
// ============================================================
// Runs the model and the discriminator over a feature set in
// its stored order, then turns logits into answers:
//
//   features ─► QaBatcher ─► model ─► start/end logits ─┐
//                              │                        ▼
//                              └► discriminator   postprocess ─► predictions
//                                   │                               │
//                                   ▼                               ▼
//                         discriminator_precision            F1 / EM vs gold
//
// Features are batched by hand (not through a shuffling
// DataLoader) so row i of the logits is always feature i.
//
// Test splits carry no gold answers: every score is -1.

use anyhow::{anyhow, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use std::collections::BTreeMap;

use crate::data::{
    batcher::QaBatcher,
    dataset::QaFeature,
    postprocess::{postprocess_predictions, MAX_ANSWER_LENGTH, N_BEST_SIZE},
};
use crate::domain::{
    example::QaExample,
    scoring::{discriminator_precision, eval_predictions},
};
use crate::ml::{
    discriminator::{discriminator_input, DomainDiscriminator},
    loss::argmax_rows,
    model::TransformerQaModel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalSplit {
    Validation,
    Test,
}

impl EvalSplit {
    /// `test` when the evaluation directory name mentions it.
    pub fn from_eval_dir(eval_dir: &str) -> Self {
        if eval_dir.contains("test") { Self::Test } else { Self::Validation }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Test       => "test",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalScores {
    pub f1:                      f64,
    pub em:                      f64,
    pub discriminator_precision: f64,
}

impl EvalScores {
    pub fn unscored() -> Self {
        Self { f1: -1.0, em: -1.0, discriminator_precision: -1.0 }
    }

    /// `F1: 48.21, EM: 40.00, discriminator_precision: 00.35`
    pub fn summary(&self) -> String {
        format!(
            "F1: {:05.2}, EM: {:05.2}, discriminator_precision: {:05.2}",
            self.f1, self.em, self.discriminator_precision
        )
    }

    pub fn tagged(&self) -> [(&'static str, f64); 3] {
        [
            ("F1", self.f1),
            ("EM", self.em),
            ("discriminator_precision", self.discriminator_precision),
        ]
    }
}

fn rows<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, seq_len] = logits.dims();
    let flat = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Cannot read logits: {e:?}"))?;
    Ok(flat.chunks(seq_len.max(1)).map(<[f32]>::to_vec).collect())
}

/// Predict an answer for every example and score the predictions.
#[allow(clippy::too_many_arguments)]
pub fn evaluate<B: Backend>(
    model:         &TransformerQaModel<B>,
    discriminator: &DomainDiscriminator<B>,
    examples:      &[QaExample],
    features:      &[QaFeature],
    batch_size:    usize,
    full_adv:      bool,
    split:         EvalSplit,
    device:        &B::Device,
) -> Result<(BTreeMap<String, String>, EvalScores)> {
    let batcher = QaBatcher::<B>::new(device.clone());

    let mut start_logits = Vec::with_capacity(features.len());
    let mut end_logits   = Vec::with_capacity(features.len());
    let mut gold_domains = Vec::with_capacity(features.len());
    let mut pred_domains = Vec::with_capacity(features.len());

    for chunk in features.chunks(batch_size.max(1)) {
        let batch  = batcher.batch(chunk.to_vec());
        let output = model.forward(batch.input_ids, batch.attention_mask);

        let log_prob = discriminator.forward(discriminator_input(output.hidden_states, full_adv));
        pred_domains.extend(argmax_rows(log_prob)?.into_iter().map(|d| d as usize));
        gold_domains.extend(batch.domains);

        start_logits.extend(rows(output.start_logits)?);
        end_logits.extend(rows(output.end_logits)?);
    }
    tracing::debug!("Ran {} features through the model", start_logits.len());

    let predictions = postprocess_predictions(
        examples, features, &start_logits, &end_logits,
        N_BEST_SIZE, MAX_ANSWER_LENGTH,
    );

    let scores = match split {
        EvalSplit::Test => EvalScores::unscored(),
        EvalSplit::Validation => {
            let (f1, em) = eval_predictions(examples, &predictions);
            EvalScores {
                f1,
                em,
                discriminator_precision: discriminator_precision(&gold_domains, &pred_domains),
            }
        }
    };
    Ok((predictions, scores))
}
