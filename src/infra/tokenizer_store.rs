// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Manages tokenizer selection, building, saving and loading.
//
// Three sources, in priority order:
//   1. an explicit tokenizer.json (e.g. a pretrained WordPiece
//      vocabulary such as distilbert-base-uncased)
//   2. <checkpoint>/tokenizer.json from an earlier run
//   3. a word-level vocabulary built from the training corpus
//
// The built tokenizer is written as HuggingFace tokenizer JSON
// and loaded back with Tokenizer::from_file, which avoids the
// trainer/ModelWrapper type juggling of the tokenizers crate.
// It carries a BertProcessing post-processor so pair inputs
// become [CLS] question [SEP] context [SEP] with sequence ids
// and overflow windows handled by the library.
//
// Reference: Sennrich et al. (2016) BPE paper
//            HuggingFace tokenizers JSON format

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::{
    normalizers::bert::BertNormalizer, pre_tokenizers::whitespace::Whitespace, NormalizedString,
    Normalizer, OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer,
};

const PAD_ID:  u32 = 0;
const UNK_ID:  u32 = 1;
const CLS_ID:  u32 = 101;
const SEP_ID:  u32 = 102;
const MASK_ID: u32 = 103;
/// First id handed out to corpus words
const FIRST_WORD_ID: usize = 104;

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Resolve the tokenizer for a training run.
    pub fn load_or_build(
        &self,
        explicit:   Option<&str>,
        texts:      &[String],
        vocab_size: usize,
    ) -> Result<Tokenizer> {
        if let Some(path) = explicit {
            tracing::info!("Loading tokenizer from '{}'", path);
            return load_file(&PathBuf::from(path));
        }
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from disk");
            return self.load();
        }
        tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
        self.build_from_corpus(texts, vocab_size)
    }

    pub fn load(&self) -> Result<Tokenizer> {
        load_file(&self.path())
    }

    /// Write `tokenizer` into this store's directory.
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        tokenizer
            .save(self.path(), true)
            .map_err(|e| anyhow::anyhow!("Cannot save tokenizer to '{}': {e}", self.path().display()))
    }

    /// Build a word-level vocabulary from the most frequent corpus
    /// words and write a valid tokenizer JSON for it.
    pub fn build_from_corpus(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Step 1: Build vocabulary from word frequencies ────────────────────
        // Words are counted exactly as the tokenizer will split them
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in pre_tokenize(text)? {
                *freq.entry(word).or_insert(0) += 1;
            }
        }

        // Most frequent first; ties broken alphabetically so the
        // vocabulary is identical across runs
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(FIRST_WORD_ID));

        // ── Step 2: Build vocab JSON ──────────────────────────────────────────
        // Special tokens get fixed IDs matching BERT convention
        let mut vocab = serde_json::json!({
            "[PAD]":  PAD_ID,
            "[UNK]":  UNK_ID,
            "[CLS]":  CLS_ID,
            "[SEP]":  SEP_ID,
            "[MASK]": MASK_ID,
        });

        let mut next_id = FIRST_WORD_ID;
        for (word, _) in &words {
            if vocab.get(word).is_none() {
                vocab[word] = serde_json::json!(next_id);
                next_id += 1;
            }
        }

        // ── Step 3: Write tokenizer JSON in HuggingFace format ────────────────
        let special = |id: u32, content: &str| serde_json::json!({
            "id": id, "content": content, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        });
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                special(PAD_ID, "[PAD]"),
                special(UNK_ID, "[UNK]"),
                special(CLS_ID, "[CLS]"),
                special(SEP_ID, "[SEP]"),
                special(MASK_ID, "[MASK]"),
            ],
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": true
            },
            "pre_tokenizer": {
                "type": "Whitespace"
            },
            "post_processor": {
                "type": "BertProcessing",
                "sep": ["[SEP]", SEP_ID],
                "cls": ["[CLS]", CLS_ID]
            },
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "[UNK]"
            }
        });

        let tok_path = self.path();
        std::fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON to '{}'", tok_path.display()))?;

        tracing::info!(
            "Tokenizer built with {} words, saved to '{}'",
            next_id - FIRST_WORD_ID,
            tok_path.display()
        );

        load_file(&tok_path)
    }
}

/// Number of embedding rows needed to cover every token id.
/// Word-level vocabularies here have a gap below the word ids,
/// so this is max id + 1 rather than the vocabulary size.
pub fn id_space(tokenizer: &Tokenizer) -> usize {
    tokenizer
        .get_vocab(true)
        .values()
        .copied()
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0)
}

/// Normalise and split `text` the way the built tokenizer does:
/// BertNormalizer (lowercase, accents stripped) then `\w+|[^\w\s]+`.
fn pre_tokenize(text: &str) -> Result<Vec<String>> {
    let mut normalized = NormalizedString::from(text);
    BertNormalizer::new(true, true, None, true)
        .normalize(&mut normalized)
        .map_err(|e| anyhow::anyhow!("Cannot normalise corpus text: {e}"))?;

    let mut pre = PreTokenizedString::from(normalized);
    Whitespace::default()
        .pre_tokenize(&mut pre)
        .map_err(|e| anyhow::anyhow!("Cannot pre-tokenize corpus text: {e}"))?;

    Ok(pre
        .get_splits(OffsetReferential::Normalized, OffsetType::Byte)
        .into_iter()
        .map(|(word, _, _)| word.to_string())
        .collect())
}

fn load_file(path: &PathBuf) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "The cat sat on the mat.".to_string(),
            "The dog sat on the log!".to_string(),
        ]
    }

    #[test]
    fn test_build_encodes_known_words() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().to_str().unwrap());
        let tok   = store.build_from_corpus(&corpus(), 1000).unwrap();

        let enc = tok.encode("the cat", false).unwrap();
        assert_eq!(enc.get_ids().len(), 2);
        assert!(enc.get_ids().iter().all(|&id| id as usize >= FIRST_WORD_ID));
        // "the" is the most frequent word
        assert_eq!(tok.token_to_id("the"), Some(FIRST_WORD_ID as u32));
    }

    #[test]
    fn test_pair_encoding_adds_special_tokens() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().to_str().unwrap());
        let tok   = store.build_from_corpus(&corpus(), 1000).unwrap();

        let enc = tok.encode(("cat", "dog sat"), true).unwrap();
        assert_eq!(enc.get_ids()[0], CLS_ID);
        assert_eq!(enc.get_sequence_ids(), vec![None, Some(0), None, Some(1), Some(1), None]);
    }

    #[test]
    fn test_vocab_size_caps_words() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().to_str().unwrap());
        let tok   = store.build_from_corpus(&corpus(), FIRST_WORD_ID + 2).unwrap();
        assert_eq!(id_space(&tok), FIRST_WORD_ID + 2);
    }

    #[test]
    fn test_load_or_build_reuses_saved_file() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path().to_str().unwrap());
        store.build_from_corpus(&corpus(), 1000).unwrap();

        // An empty corpus would produce no words; the saved file wins
        let tok = store.load_or_build(None, &[], 1000).unwrap();
        assert!(tok.token_to_id("cat").is_some());
    }

    #[test]
    fn test_vocabulary_follows_pre_tokenizer() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let texts = vec!["Don't stop, U.S. troops!".to_string()];
        let tok   = store.build_from_corpus(&texts, 1000).unwrap();

        assert_eq!(pre_tokenize(&texts[0]).unwrap(), ["don", "'", "t", "stop", ",", "u", ".", "s", ".", "troops", "!"]);
        assert!(tok.token_to_id("don't").is_none());
        assert!(tok.token_to_id("u.s").is_none());
        assert!(tok.token_to_id(",").is_some());

        let enc = tok.encode("don't stop, u.s. troops!", false).unwrap();
        assert!(enc.get_ids().iter().all(|&id| id != UNK_ID));
    }
}
