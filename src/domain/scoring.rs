// ============================================================
// Layer 3 — SQuAD Scoring
// ============================================================
// The official SQuAD evaluation, as pure functions:
//
//   normalize_answer  lowercase, strip punctuation, drop the
//                     articles a/an/the, collapse whitespace
//   exact_match       1.0 iff normalised strings are equal
//   f1_score          token-overlap F1 of normalised strings
//
// For each example the score is the MAX over its gold answers,
// and the final numbers are averages scaled to 0..100.
//
// Reference: Rajpurkar et al. (2016) SQuAD evaluation script

use std::collections::{BTreeMap, HashMap};

use crate::domain::example::QaExample;

pub fn normalize_answer(s: &str) -> String {
    let lower = s.to_lowercase();
    let no_punct: String = lower
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    no_punct
        .split_whitespace()
        .filter(|w| !matches!(*w, "a" | "an" | "the"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn exact_match(prediction: &str, ground_truth: &str) -> f64 {
    if normalize_answer(prediction) == normalize_answer(ground_truth) { 1.0 } else { 0.0 }
}

pub fn f1_score(prediction: &str, ground_truth: &str) -> f64 {
    let pred_norm = normalize_answer(prediction);
    let gold_norm = normalize_answer(ground_truth);
    let pred_toks: Vec<&str> = pred_norm.split_whitespace().collect();
    let gold_toks: Vec<&str> = gold_norm.split_whitespace().collect();

    // No-answer case: only an empty prediction matches an empty gold
    if pred_toks.is_empty() || gold_toks.is_empty() {
        return if pred_toks == gold_toks { 1.0 } else { 0.0 };
    }

    let mut gold_counts: HashMap<&str, usize> = HashMap::new();
    for t in &gold_toks {
        *gold_counts.entry(t).or_insert(0) += 1;
    }
    let mut num_same = 0usize;
    for t in &pred_toks {
        if let Some(c) = gold_counts.get_mut(t) {
            if *c > 0 {
                *c -= 1;
                num_same += 1;
            }
        }
    }
    if num_same == 0 {
        return 0.0;
    }
    let precision = num_same as f64 / pred_toks.len() as f64;
    let recall    = num_same as f64 / gold_toks.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

pub fn max_over_ground_truths<F>(metric: F, prediction: &str, ground_truths: &[&str]) -> f64
where
    F: Fn(&str, &str) -> f64,
{
    if ground_truths.is_empty() {
        return metric(prediction, "");
    }
    ground_truths
        .iter()
        .map(|gt| metric(prediction, gt))
        .fold(0.0, f64::max)
}

/// Average F1 and EM (0..100) over every predicted example id.
/// Predictions for ids that are not in `examples` are ignored.
pub fn eval_predictions(
    examples:    &[QaExample],
    predictions: &BTreeMap<String, String>,
) -> (f64, f64) {
    let by_id: HashMap<&str, &QaExample> =
        examples.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut f1    = 0.0;
    let mut em    = 0.0;
    let mut total = 0usize;
    for (id, pred) in predictions {
        let Some(ex) = by_id.get(id.as_str()) else { continue };
        let golds = ex.answer_texts();
        f1 += max_over_ground_truths(f1_score, pred, &golds);
        em += max_over_ground_truths(exact_match, pred, &golds);
        total += 1;
    }
    if total == 0 {
        return (0.0, 0.0);
    }
    (100.0 * f1 / total as f64, 100.0 * em / total as f64)
}

/// Fraction of features whose predicted dataset id matches the gold one
pub fn discriminator_precision(gold: &[usize], predicted: &[usize]) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    let hits = gold.iter().zip(predicted).filter(|(g, p)| g == p).count();
    hits as f64 / gold.len() as f64
}
