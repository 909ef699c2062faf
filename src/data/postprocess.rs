// ============================================================
// Layer 4 — Prediction Post-processing
// ============================================================
// Converts per-window start/end logits back into answer text.
//
// One example may have several windows. For every window:
//   1. take the n_best highest start and end logits
//   2. try every (start, end) pair, skipping spans that
//        - touch a non-context token (offset is None)
//        - end before they start
//        - are longer than max_answer_length tokens
//   3. score = start_logit + end_logit
// The best span over ALL windows of the example wins and its
// character offsets are cut out of the context.
//
// If nothing valid remains the answer is the literal "empty".
//
// Reference: HuggingFace run_qa.py postprocess_qa_predictions

use std::collections::{BTreeMap, HashMap};

use crate::data::dataset::QaFeature;
use crate::data::preprocessor::char_slice;
use crate::domain::example::QaExample;

pub const N_BEST_SIZE:       usize = 20;
pub const MAX_ANSWER_LENGTH: usize = 30;
pub const EMPTY_ANSWER:      &str  = "empty";

/// Indices of the `n` largest values, largest first.
fn top_n_indices(values: &[f32], n: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    idx.truncate(n);
    idx
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    score:      f32,
    char_start: usize,
    char_end:   usize,
}

/// Map logits (one row per feature, in feature order) to an answer per example.
pub fn postprocess_predictions(
    examples:          &[QaExample],
    features:          &[QaFeature],
    start_logits:      &[Vec<f32>],
    end_logits:        &[Vec<f32>],
    n_best_size:       usize,
    max_answer_length: usize,
) -> BTreeMap<String, String> {
    let mut features_per_example: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, f) in features.iter().enumerate() {
        features_per_example.entry(f.example_id.as_str()).or_default().push(i);
    }

    let mut predictions = BTreeMap::new();
    for ex in examples {
        let mut best: Option<Candidate> = None;

        for &fi in features_per_example.get(ex.id.as_str()).map(Vec::as_slice).unwrap_or(&[]) {
            let offsets = &features[fi].offsets;
            let starts  = &start_logits[fi];
            let ends    = &end_logits[fi];

            for s in top_n_indices(starts, n_best_size) {
                for e in top_n_indices(ends, n_best_size) {
                    if s >= offsets.len() || e >= offsets.len() {
                        continue;
                    }
                    let (Some(so), Some(eo)) = (offsets[s], offsets[e]) else { continue };
                    if e < s || e - s + 1 > max_answer_length {
                        continue;
                    }
                    let score = starts[s] + ends[e];
                    if best.map_or(true, |b| score > b.score) {
                        best = Some(Candidate { score, char_start: so.0, char_end: eo.1 });
                    }
                }
            }
        }

        let text = match best {
            Some(c) => char_slice(&ex.context, c.char_start, c.char_end),
            None    => String::new(),
        };
        let text = if text.is_empty() { EMPTY_ANSWER.to_string() } else { text };
        predictions.insert(ex.id.clone(), text);
    }
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEXT: &str = "the cat sat down";

    fn example(id: &str) -> QaExample {
        QaExample {
            id:          id.to_string(),
            question:    "who sat".to_string(),
            context:     CONTEXT.to_string(),
            answers:     vec![],
            data_set_id: 0,
        }
    }

    /// [CLS] q [SEP] the cat sat down [SEP]
    fn feature(id: &str) -> QaFeature {
        QaFeature {
            example_id:     id.to_string(),
            data_set_id:    0,
            input_ids:      vec![101, 5, 102, 10, 11, 12, 13, 102],
            attention_mask: vec![1; 8],
            offsets: vec![
                None, None, None,
                Some((0, 3)), Some((4, 7)), Some((8, 11)), Some((12, 16)),
                None,
            ],
            start_position: 0,
            end_position:   0,
        }
    }

    fn logits(peak: usize, value: f32) -> Vec<f32> {
        let mut v = vec![0.0; 8];
        v[peak] = value;
        v
    }

    #[test]
    fn test_picks_highest_scoring_valid_span() {
        let preds = postprocess_predictions(
            &[example("a")], &[feature("a")],
            &[logits(4, 5.0)], &[logits(5, 5.0)],
            N_BEST_SIZE, MAX_ANSWER_LENGTH,
        );
        assert_eq!(preds["a"], "cat sat");
    }

    #[test]
    fn test_cls_peak_is_not_a_valid_span() {
        // The highest logits sit on [CLS]; the best context span must be used instead
        let mut s = logits(0, 9.0);
        s[6] = 2.0;
        let mut e = logits(0, 9.0);
        e[6] = 2.0;
        let preds = postprocess_predictions(
            &[example("a")], &[feature("a")], &[s], &[e],
            N_BEST_SIZE, MAX_ANSWER_LENGTH,
        );
        assert_eq!(preds["a"], "down");
    }

    #[test]
    fn test_reversed_and_too_long_spans_are_skipped() {
        // (6, 3) is reversed and (3, 6) is four tokens long, so with a
        // max length of 1 only single tokens survive: 6 scores 5.0, 3 scores 4.0
        let preds = postprocess_predictions(
            &[example("a")], &[feature("a")],
            &[logits(6, 5.0)], &[logits(3, 4.0)],
            N_BEST_SIZE, 1,
        );
        assert_eq!(preds["a"], "down");
    }

    #[test]
    fn test_best_window_wins_across_features() {
        let feats = vec![feature("a"), feature("a")];
        let preds = postprocess_predictions(
            &[example("a")], &feats,
            &[logits(3, 1.0), logits(6, 8.0)],
            &[logits(3, 1.0), logits(6, 8.0)],
            N_BEST_SIZE, MAX_ANSWER_LENGTH,
        );
        assert_eq!(preds["a"], "down");
    }

    #[test]
    fn test_example_without_features_gets_empty() {
        let preds = postprocess_predictions(
            &[example("lonely")], &[], &[], &[],
            N_BEST_SIZE, MAX_ANSWER_LENGTH,
        );
        assert_eq!(preds["lonely"], EMPTY_ANSWER);
    }
}
