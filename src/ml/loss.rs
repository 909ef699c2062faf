// ============================================================
// Layer 5 — Loss Functions
// ============================================================
// All training objectives as free functions over tensors.
//
//   qa_loss               (CE_start + CE_end) / 2, batch mean
//   weighted_qa_loss      same, each feature scaled by a
//                         length-penalty weight
//   length_loss           probability mass the model puts on
//                         impossible spans (end < start) or
//                         spans longer than k tokens
//   domain_confusion_loss KL(uniform ‖ discriminator) over the
//                         in-domain rows: pushes the encoder
//                         towards dataset-agnostic features
//   discriminator_nll     the discriminator's own objective
//
// Length-penalty weight per feature (brevity-penalty style):
//
//   pred_len = pred_end - pred_start + 1
//   gold_len = gold_end - gold_start + 1
//   w = exp(1 - max(gold_len,1) / max(pred_len,1))   if pred_len > gold_len
//   w = 1                                            otherwise
//   w = 2                                            if pred_len <= 0
//
// Reference: Papineni et al. (2002) BLEU brevity penalty
//            Lee et al. (2019) adversarial domain-agnostic QA

use anyhow::{anyhow, Result};
use burn::{
    prelude::*,
    tensor::activation::{log_softmax, softmax},
};

use crate::domain::example::is_in_domain_id;

/// Per-sample cross entropy: logits [batch, classes], targets [batch] → [batch]
pub fn span_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch, _] = logits.dims();
    log_softmax(logits, 1)
        .gather(1, targets.reshape([batch, 1]))
        .reshape([batch])
        .neg()
}

pub fn qa_loss<B: Backend>(
    start_logits:    Tensor<B, 2>,
    end_logits:      Tensor<B, 2>,
    start_positions: Tensor<B, 1, Int>,
    end_positions:   Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let start = span_cross_entropy(start_logits, start_positions);
    let end   = span_cross_entropy(end_logits, end_positions);
    (start + end).div_scalar(2.0).mean()
}

pub fn weighted_qa_loss<B: Backend>(
    start_logits:    Tensor<B, 2>,
    end_logits:      Tensor<B, 2>,
    start_positions: Tensor<B, 1, Int>,
    end_positions:   Tensor<B, 1, Int>,
    weights:         Tensor<B, 1>,
) -> Tensor<B, 1> {
    let [batch, _] = start_logits.dims();
    let start = span_cross_entropy(start_logits, start_positions);
    let end   = span_cross_entropy(end_logits, end_positions);
    ((start + end).div_scalar(2.0 * batch as f32) * weights).sum()
}

pub fn length_penalty_weights(
    pred_start: &[i64],
    pred_end:   &[i64],
    gold_start: &[i64],
    gold_end:   &[i64],
) -> Vec<f32> {
    (0..pred_start.len())
        .map(|i| {
            let pred_len = pred_end[i] - pred_start[i] + 1;
            let gold_len = gold_end[i] - gold_start[i] + 1;
            if pred_len <= 0 {
                2.0
            } else if pred_len > gold_len {
                let maxed_pred = pred_len.max(1) as f32;
                let maxed_gold = gold_len.max(1) as f32;
                (1.0 - maxed_gold / maxed_pred).exp()
            } else {
                1.0
            }
        })
        .collect()
}

/// Integer tensor copied to the host
pub fn int_rows<B: Backend>(values: Tensor<B, 1, Int>) -> Result<Vec<i64>> {
    values
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow!("Cannot read tensor data: {e:?}"))
}

/// Row-wise argmax copied to the host: [batch, n] → batch indices
pub fn argmax_rows<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<i64>> {
    let [batch, _] = logits.dims();
    int_rows(logits.argmax(1).reshape([batch]))
}

/// Length-penalty weights for a batch, on the logits' device.
/// The argmax is not differentiable, so the weights are constants.
pub fn length_penalty<B: Backend>(
    start_logits:    Tensor<B, 2>,
    end_logits:      Tensor<B, 2>,
    start_positions: Tensor<B, 1, Int>,
    end_positions:   Tensor<B, 1, Int>,
) -> Result<Tensor<B, 1>> {
    let device  = start_logits.device();
    let weights = length_penalty_weights(
        &argmax_rows(start_logits)?,
        &argmax_rows(end_logits)?,
        &int_rows(start_positions)?,
        &int_rows(end_positions)?,
    );
    let n = weights.len();
    Ok(Tensor::from_data(TensorData::new(weights, [n]), &device))
}

/// mask[s][e] = 1 where a span (s, e) is invalid: e < s or e > s + k.
pub fn length_mask<B: Backend>(seq_len: usize, k: usize, device: &B::Device) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; seq_len * seq_len];
    for s in 0..seq_len {
        for e in 0..seq_len {
            if e < s || e > s + k {
                values[s * seq_len + e] = 1.0;
            }
        }
    }
    Tensor::from_data(TensorData::new(values, [seq_len, seq_len]), device)
}

/// Σ_{b,s,e} p_start(b,s) · p_end(b,e) · mask(s,e) / batch
pub fn length_loss<B: Backend>(
    start_logits: Tensor<B, 2>,
    end_logits:   Tensor<B, 2>,
    mask:         Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch, seq_len] = start_logits.dims();
    let p_start = softmax(start_logits, 1).reshape([batch, seq_len, 1]);
    let p_end   = softmax(end_logits, 1).reshape([batch, 1, seq_len]);
    let joint   = p_start.matmul(p_end); // [batch, start, end]
    let mask    = mask.unsqueeze::<3>().expand([batch, seq_len, seq_len]);
    (joint * mask).sum().div_scalar(batch as f32)
}

/// KL(uniform ‖ p), averaged over in-domain rows only.
/// None when the batch holds no in-domain feature.
pub fn domain_confusion_loss<B: Backend>(
    log_prob: Tensor<B, 2>,
    domains:  &[usize],
) -> Option<Tensor<B, 1>> {
    let rows: Vec<i64> = domains
        .iter()
        .enumerate()
        .filter(|(_, &d)| is_in_domain_id(d))
        .map(|(i, _)| i as i64)
        .collect();
    if rows.is_empty() {
        return None;
    }
    let n          = rows.len();
    let [_, classes] = log_prob.dims();
    let device     = log_prob.device();
    let index      = Tensor::<B, 1, Int>::from_data(TensorData::new(rows, [n]), &device);
    let selected   = log_prob.select(0, index);

    let target = 1.0 / classes as f32;
    // Σ t · (ln t − log p) / n
    Some(
        selected
            .neg()
            .add_scalar(target.ln())
            .mul_scalar(target)
            .sum()
            .div_scalar(n as f32),
    )
}

/// Mean negative log-likelihood of the true dataset ids
pub fn discriminator_nll<B: Backend>(log_prob: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    let [batch, _] = log_prob.dims();
    log_prob
        .gather(1, targets.reshape([batch, 1]))
        .neg()
        .mean()
}
