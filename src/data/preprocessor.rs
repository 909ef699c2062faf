// ============================================================
// Layer 4 — Feature Builder
// ============================================================
// Turns QaExamples into fixed-length model inputs.
//
// Long contexts do not fit in max_seq_len tokens, so every
// (question, context) pair is encoded as a sequence of
// overlapping windows over the context:
//
//   [CLS] question [SEP] context[0..w]        [SEP]
//   [CLS] question [SEP] context[w-s..2w-s]   [SEP]
//   ...
//
// where s = doc_stride tokens are shared between neighbours,
// so an answer near a window edge appears whole in at least
// one window. The tokenizer does the windowing itself
// (TruncationStrategy::OnlySecond + stride) and pads every
// window to max_seq_len.
//
// Training windows are labelled with token positions:
//   - answer fully inside the window's context → the first
//     and last tokens covering the answer characters
//   - otherwise → both positions point at [CLS]
//
// Evaluation windows keep character offsets for context
// tokens only, so predictions can be mapped back to text.
//
// Reference: Devlin et al. (2019) BERT — SQuAD fine-tuning
//            HuggingFace tokenizers documentation

use anyhow::{anyhow, ensure, Result};
use tokenizers::{
    Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationDirection,
    TruncationParams, TruncationStrategy,
};

use crate::data::{cache::CacheKey, dataset::QaFeature};
use crate::domain::example::QaExample;

/// Tokens shared between neighbouring windows
pub const DOC_STRIDE: usize = 128;

/// [CLS] + [SEP] + [SEP]
const PAIR_SPECIAL_TOKENS: usize = 3;

/// The tokenizer-independent view of one encoded window.
#[derive(Debug, Clone)]
pub struct TokenWindow {
    pub ids:            Vec<u32>,
    pub attention_mask: Vec<u32>,
    /// Character offsets into the sequence each token came from
    pub offsets:        Vec<(usize, usize)>,
    /// Some(0) question, Some(1) context, None special/padding
    pub sequence_ids:   Vec<Option<usize>>,
}

impl TokenWindow {
    fn from_encoding(enc: &Encoding) -> Self {
        Self {
            ids:            enc.get_ids().to_vec(),
            attention_mask: enc.get_attention_mask().to_vec(),
            offsets:        enc.get_offsets().to_vec(),
            sequence_ids:   enc.get_sequence_ids(),
        }
    }

    /// First and last token index belonging to the context
    pub fn context_range(&self) -> Option<(usize, usize)> {
        let first = self.sequence_ids.iter().position(|s| *s == Some(1))?;
        let last  = self.sequence_ids.iter().rposition(|s| *s == Some(1))?;
        Some((first, last))
    }

    /// Offsets with everything outside the context masked out
    pub fn context_offsets(&self) -> Vec<Option<(usize, usize)>> {
        self.offsets
            .iter()
            .zip(&self.sequence_ids)
            .map(|(&o, s)| if *s == Some(1) { Some(o) } else { None })
            .collect()
    }
}

/// Label a training window for an answer spanning characters
/// `[start_char, end_char)` of the context.
///
/// Returns (cls_index, cls_index) when the answer is not fully
/// contained in this window.
pub fn label_window(
    window:     &TokenWindow,
    cls_index:  usize,
    start_char: usize,
    end_char:   usize,
) -> (usize, usize) {
    let Some((first, last)) = window.context_range() else {
        return (cls_index, cls_index);
    };
    let offsets = &window.offsets;

    if !(offsets[first].0 <= start_char && offsets[last].1 >= end_char) {
        return (cls_index, cls_index);
    }

    // Last context token starting at or before the answer,
    // first context token ending at or after it.
    let start = (first..=last)
        .rev()
        .find(|&i| offsets[i].0 <= start_char)
        .unwrap_or(first);
    let end = (first..=last)
        .find(|&i| offsets[i].1 >= end_char)
        .unwrap_or(last);

    (start, end.max(start))
}

/// Substring by character positions `[start, end)`.
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

pub struct FeatureBuilder {
    /// Configured for windowed pair encoding
    tokenizer:   Tokenizer,
    /// Unconfigured copy, used to measure question length
    plain:       Tokenizer,
    max_seq_len: usize,
    doc_stride:  usize,
    cls_id:      u32,
    cache_key:   CacheKey,
}

impl FeatureBuilder {
    pub fn new(tokenizer: Tokenizer, max_seq_len: usize, doc_stride: usize) -> Result<Self> {
        ensure!(
            doc_stride + PAIR_SPECIAL_TOKENS < max_seq_len,
            "doc_stride ({doc_stride}) must leave room for context in max_seq_len ({max_seq_len})"
        );

        let cache_key = CacheKey::new(&tokenizer, max_seq_len, doc_stride)?;

        let mut plain = tokenizer.clone();
        plain
            .with_truncation(None)
            .map_err(|e| anyhow!("Cannot reset truncation: {e}"))?;
        plain.with_padding(None);

        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);
        let cls_id = tokenizer.token_to_id("[CLS]").unwrap_or(101);

        let mut tokenizer = tokenizer;
        tokenizer
            .with_truncation(Some(TruncationParams {
                direction:  TruncationDirection::Right,
                max_length: max_seq_len,
                strategy:   TruncationStrategy::OnlySecond,
                stride:     doc_stride,
            }))
            .map_err(|e| anyhow!("Invalid truncation settings: {e}"))?;
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_seq_len),
            pad_id,
            ..Default::default()
        }));

        Ok(Self { tokenizer, plain, max_seq_len, doc_stride, cls_id, cache_key })
    }

    /// Identifies the encodings this builder produces
    pub fn cache_key(&self) -> CacheKey {
        self.cache_key
    }

    /// All windows for one example, or None if the question leaves
    /// no room for stride-overlapping context windows.
    fn windows(&self, ex: &QaExample) -> Result<Option<Vec<TokenWindow>>> {
        let q_len = self
            .plain
            .encode(ex.question.as_str(), false)
            .map_err(|e| anyhow!("Cannot tokenise question '{}': {e}", ex.id))?
            .len();
        if q_len + PAIR_SPECIAL_TOKENS + self.doc_stride >= self.max_seq_len {
            tracing::warn!(
                "Skipping '{}': question is {} tokens, too long for max_seq_len={}",
                ex.id, q_len, self.max_seq_len
            );
            return Ok(None);
        }

        let mut enc = self
            .tokenizer
            .encode_char_offsets((ex.question.as_str(), ex.context.as_str()), true)
            .map_err(|e| anyhow!("Cannot tokenise example '{}': {e}", ex.id))?;
        let overflow = enc.take_overflowing();

        let mut windows = Vec::with_capacity(1 + overflow.len());
        windows.push(TokenWindow::from_encoding(&enc));
        windows.extend(overflow.iter().map(TokenWindow::from_encoding));
        Ok(Some(windows))
    }

    /// Labelled windows for training. Examples without any answer are skipped.
    pub fn prepare_train(&self, examples: &[QaExample]) -> Result<Vec<QaFeature>> {
        let mut features   = Vec::new();
        let mut inaccurate = 0usize;
        let mut unanswered = 0usize;

        for ex in examples {
            let Some(answer) = ex.first_answer() else {
                unanswered += 1;
                continue;
            };
            let Some(windows) = self.windows(ex)? else { continue };

            let start_char = answer.answer_start;
            let end_char   = answer.answer_end();

            for w in windows {
                let cls_index = w.ids.iter().position(|&t| t == self.cls_id).unwrap_or(0);
                let (start, end) = label_window(&w, cls_index, start_char, end_char);

                if start != cls_index {
                    let recovered = char_slice(&ex.context, w.offsets[start].0, w.offsets[end].1);
                    if recovered != answer.text {
                        inaccurate += 1;
                    }
                }

                features.push(QaFeature {
                    example_id:     ex.id.clone(),
                    data_set_id:    ex.data_set_id,
                    offsets:        w.context_offsets(),
                    input_ids:      w.ids,
                    attention_mask: w.attention_mask,
                    start_position: start,
                    end_position:   end,
                });
            }
        }

        if unanswered > 0 {
            tracing::warn!("{} training examples have no answer and were skipped", unanswered);
        }
        tracing::info!(
            "Preprocessing not completely accurate for {}/{} instances",
            inaccurate,
            features.len()
        );
        Ok(features)
    }

    /// Unlabelled windows for evaluation / prediction.
    pub fn prepare_eval(&self, examples: &[QaExample]) -> Result<Vec<QaFeature>> {
        let mut features = Vec::new();
        for ex in examples {
            let Some(windows) = self.windows(ex)? else { continue };
            for w in windows {
                features.push(QaFeature {
                    example_id:     ex.id.clone(),
                    data_set_id:    ex.data_set_id,
                    offsets:        w.context_offsets(),
                    input_ids:      w.ids,
                    attention_mask: w.attention_mask,
                    start_position: 0,
                    end_position:   0,
                });
            }
        }
        tracing::info!("Built {} evaluation features from {} examples", features.len(), examples.len());
        Ok(features)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::Answer;
    use crate::infra::tokenizer_store::TokenizerStore;

    /// [CLS] q q [SEP] c0 c1 c2 c3 [SEP] [PAD]
    /// context: "the cat sat down" → offsets (0,3) (4,7) (8,11) (12,16)
    fn window() -> TokenWindow {
        TokenWindow {
            ids:            vec![101, 5, 6, 102, 10, 11, 12, 13, 102, 0],
            attention_mask: vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 0],
            offsets: vec![
                (0, 0), (0, 4), (5, 8), (0, 0),
                (0, 3), (4, 7), (8, 11), (12, 16),
                (0, 0), (0, 0),
            ],
            sequence_ids: vec![
                None, Some(0), Some(0), None,
                Some(1), Some(1), Some(1), Some(1),
                None, None,
            ],
        }
    }

    #[test]
    fn test_single_token_answer() {
        // "cat" = chars 4..7
        assert_eq!(label_window(&window(), 0, 4, 7), (5, 5));
    }

    #[test]
    fn test_multi_token_answer() {
        // "cat sat" = chars 4..11
        assert_eq!(label_window(&window(), 0, 4, 11), (5, 6));
    }

    #[test]
    fn test_answer_on_last_context_token() {
        // "down" = chars 12..16, must not run into [SEP]/padding
        assert_eq!(label_window(&window(), 0, 12, 16), (7, 7));
    }

    #[test]
    fn test_answer_outside_window_points_at_cls() {
        // an answer past the end of this window's context
        assert_eq!(label_window(&window(), 0, 20, 25), (0, 0));
    }

    #[test]
    fn test_context_offsets_mask_non_context() {
        let offs = window().context_offsets();
        assert_eq!(offs[0], None);
        assert_eq!(offs[1], None);
        assert_eq!(offs[4], Some((0, 3)));
        assert_eq!(offs[9], None);
    }

    #[test]
    fn test_char_slice_is_unicode_aware() {
        assert_eq!(char_slice("naïve café", 6, 10), "café");
    }

    fn example(id: &str, question: &str, context: &str, answer: &str) -> QaExample {
        let start = context.find(answer).map(|b| context[..b].chars().count()).unwrap();
        QaExample {
            id:          id.to_string(),
            question:    question.to_string(),
            context:     context.to_string(),
            answers:     vec![Answer::new(answer, start)],
            data_set_id: 0,
        }
    }

    fn builder(texts: &[&str], max_seq_len: usize, stride: usize) -> (tempfile::TempDir, FeatureBuilder) {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().to_str().unwrap());
        let corpus: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        let tok   = store.build_from_corpus(&corpus, 1000).unwrap();
        (dir, FeatureBuilder::new(tok, max_seq_len, stride).unwrap())
    }

    #[test]
    fn test_train_features_recover_answer_text() {
        let context = "Paris is the capital and largest city of France";
        let ex = example("q1", "what is the capital of france", context, "Paris");
        let (_dir, fb) = builder(&[context, ex.question.as_str()], 32, 4);

        let feats = fb.prepare_train(&[ex]).unwrap();
        assert_eq!(feats.len(), 1);
        let f = &feats[0];
        assert_eq!(f.input_ids.len(), 32);
        let (s, _) = f.offsets[f.start_position].unwrap();
        let (_, e) = f.offsets[f.end_position].unwrap();
        assert_eq!(char_slice(context, s, e), "Paris");
    }

    #[test]
    fn test_long_context_is_split_into_windows() {
        let words: Vec<String> = (0..60).map(|i| format!("w{i}")).collect();
        let context = format!("{} target {}", words[..40].join(" "), words[40..].join(" "));
        let ex = example("q1", "where is target", &context, "target");
        let (_dir, fb) = builder(&[context.as_str(), ex.question.as_str()], 24, 4);

        let feats = fb.prepare_train(&[ex]).unwrap();
        assert!(feats.len() > 1, "expected several windows, got {}", feats.len());
        assert!(feats.iter().all(|f| f.input_ids.len() == 24));
        // Exactly the windows that contain the answer are labelled with it
        let labelled: Vec<&QaFeature> = feats.iter().filter(|f| f.start_position != 0).collect();
        assert!(!labelled.is_empty());
        for f in labelled {
            let (s, _) = f.offsets[f.start_position].unwrap();
            let (_, e) = f.offsets[f.end_position].unwrap();
            assert_eq!(char_slice(&context, s, e), "target");
        }
    }

    #[test]
    fn test_eval_features_have_no_labels() {
        let context = "Berlin is in Germany";
        let mut ex = example("q9", "where is berlin", context, "Germany");
        ex.answers.clear();
        let (_dir, fb) = builder(&[context, ex.question.as_str()], 32, 4);

        let feats = fb.prepare_eval(&[ex]).unwrap();
        assert_eq!(feats.len(), 1);
        assert_eq!(feats[0].start_position, 0);
        assert!(feats[0].offsets.iter().any(|o| o.is_some()));
    }

    #[test]
    fn test_stride_must_fit() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().to_str().unwrap());
        let tok   = store.build_from_corpus(&["a b c".to_string()], 100).unwrap();
        assert!(FeatureBuilder::new(tok, 16, 128).is_err());
    }
}
