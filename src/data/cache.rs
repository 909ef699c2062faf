// ============================================================
// Layer 4 — Feature Cache
// ============================================================
// Tokenising tens of thousands of long contexts is slow, so
// encoded features are stored next to the raw datasets:
//
//   <data_dir>/<name>_encodings.json        labelled training windows
//   <data_dir>/<name>_eval_encodings.json   unlabelled evaluation windows
//
//   e.g. datasets/indomain_train/_squad_nat_questions_newsqa_encodings.json
//
// Each file starts with the key it was built under: a fingerprint
// of the tokenizer plus max_seq_len and doc_stride. Runs sharing a
// data directory but not a vocabulary never read each other's ids.
//
// The cache is rebuilt when:
//   - it does not exist or cannot be parsed
//   - --recompute-features is given
//   - its key differs from the current one
//
// Reference: serde_json documentation

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::data::dataset::QaFeature;

/// Which labelling the cached features carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Eval,
}

impl Split {
    fn file_suffix(self) -> &'static str {
        match self {
            Split::Train => "_encodings.json",
            Split::Eval  => "_eval_encodings.json",
        }
    }
}

/// Everything the encoded ids depend on besides the raw data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub tokenizer:   u64,
    pub max_seq_len: usize,
    pub doc_stride:  usize,
}

impl CacheKey {
    pub fn new(tokenizer: &Tokenizer, max_seq_len: usize, doc_stride: usize) -> Result<Self> {
        let json = tokenizer
            .to_string(false)
            .map_err(|e| anyhow!("Cannot serialise tokenizer: {e}"))?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        Ok(Self { tokenizer: hasher.finish(), max_seq_len, doc_stride })
    }
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    key:      CacheKey,
    features: &'a [QaFeature],
}

#[derive(Deserialize)]
struct CacheFile {
    key:      CacheKey,
    features: Vec<QaFeature>,
}

pub struct FeatureCache {
    path:      PathBuf,
    recompute: bool,
}

impl FeatureCache {
    pub fn new(data_dir: impl AsRef<Path>, name: &str, split: Split, recompute: bool) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{name}{}", split.file_suffix())),
            recompute,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return cached features if they were built under `key`,
    /// otherwise compute and store them.
    pub fn read_and_process<F>(&self, key: &CacheKey, compute: F) -> Result<Vec<QaFeature>>
    where
        F: FnOnce() -> Result<Vec<QaFeature>>,
    {
        if !self.recompute && self.path.exists() {
            match self.load() {
                Ok(cached) if cached.key == *key => {
                    tracing::info!(
                        "Loaded {} cached features from '{}'",
                        cached.features.len(),
                        self.path.display()
                    );
                    return Ok(cached.features);
                }
                Ok(_) => tracing::warn!(
                    "Cached features in '{}' were built with another tokenizer or window, recomputing",
                    self.path.display()
                ),
                Err(e) => tracing::warn!("Ignoring unreadable feature cache: {e:#}"),
            }
        }

        let features = compute()?;
        self.store(key, &features)?;
        Ok(features)
    }

    fn load(&self) -> Result<CacheFile> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read '{}'", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Cannot parse '{}'", self.path.display()))
    }

    fn store(&self, key: &CacheKey, features: &[QaFeature]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = CacheFileRef { key: *key, features };
        fs::write(&self.path, serde_json::to_string(&file)?)
            .with_context(|| format!("Cannot write feature cache '{}'", self.path.display()))?;
        tracing::debug!("Stored {} features in '{}'", features.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::infra::tokenizer_store::TokenizerStore;

    fn feature(len: usize) -> QaFeature {
        QaFeature {
            example_id:     "x".to_string(),
            data_set_id:    0,
            input_ids:      vec![1; len],
            attention_mask: vec![1; len],
            offsets:        vec![None; len],
            start_position: 0,
            end_position:   0,
        }
    }

    fn key(tokenizer: u64, max_seq_len: usize) -> CacheKey {
        CacheKey { tokenizer, max_seq_len, doc_stride: 4 }
    }

    fn tokenizer(dir: &Path, text: &str) -> Tokenizer {
        TokenizerStore::new(dir).build_from_corpus(&[text.to_string()], 1000).unwrap()
    }

    #[test]
    fn test_second_read_hits_cache() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path(), "_squad", Split::Train, false);
        let calls = Cell::new(0);

        let compute = || { calls.set(calls.get() + 1); Ok(vec![feature(8)]) };
        cache.read_and_process(&key(1, 8), compute).unwrap();
        let again = cache.read_and_process(&key(1, 8), compute).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(again, vec![feature(8)]);
        assert!(dir.path().join("_squad_encodings.json").exists());
    }

    #[test]
    fn test_recompute_flag_bypasses_cache() {
        let dir   = tempfile::tempdir().unwrap();
        FeatureCache::new(dir.path(), "_race", Split::Train, false)
            .read_and_process(&key(1, 8), || Ok(vec![feature(8)]))
            .unwrap();

        let out = FeatureCache::new(dir.path(), "_race", Split::Train, true)
            .read_and_process(&key(1, 8), || Ok(vec![feature(8), feature(8)]))
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_window_change_recomputes() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path(), "_duorc", Split::Train, false);
        cache.read_and_process(&key(1, 8), || Ok(vec![feature(8)])).unwrap();

        let out = cache.read_and_process(&key(1, 16), || Ok(vec![feature(16)])).unwrap();
        assert_eq!(out[0].input_ids.len(), 16);

        let stride = CacheKey { doc_stride: 2, ..key(1, 16) };
        let out = cache.read_and_process(&stride, || Ok(vec![feature(16), feature(16)])).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_other_tokenizer_recomputes() {
        let dir  = tempfile::tempdir().unwrap();
        let tok1 = tokenizer(&dir.path().join("a"), "paris is in france where");
        let tok2 = tokenizer(&dir.path().join("b"), "france france france in in where where is paris zebra");
        let key1 = CacheKey::new(&tok1, 16, 4).unwrap();
        let key2 = CacheKey::new(&tok2, 16, 4).unwrap();
        assert_ne!(key1, key2);
        assert_eq!(key1, CacheKey::new(&tok1.clone(), 16, 4).unwrap());

        let cache = FeatureCache::new(dir.path(), "_race", Split::Eval, false);
        let calls = Cell::new(0);
        let compute = || { calls.set(calls.get() + 1); Ok(vec![feature(16)]) };
        cache.read_and_process(&key1, compute).unwrap();
        cache.read_and_process(&key2, compute).unwrap();
        assert_eq!(calls.get(), 2);

        // the file now belongs to the second tokenizer
        cache.read_and_process(&key2, compute).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_unkeyed_file_is_rebuilt() {
        let dir   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(dir.path(), "_squad", Split::Train, false);
        fs::write(cache.path(), serde_json::to_string(&vec![feature(8)]).unwrap()).unwrap();

        let out = cache.read_and_process(&key(1, 8), || Ok(vec![feature(8), feature(8)])).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_splits_use_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let train = FeatureCache::new(dir.path(), "_squad", Split::Train, false);
        let eval  = FeatureCache::new(dir.path(), "_squad", Split::Eval, false);
        assert_ne!(train.path(), eval.path());
        assert!(eval.path().ends_with("_squad_eval_encodings.json"));
    }
}
