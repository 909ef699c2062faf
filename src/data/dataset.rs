use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One tokenised, padded window over a (question, context) pair.
/// Sequence format: [CLS] question [SEP] context-window [SEP] [PAD]...
///
/// `offsets[i]` is the character span of token i inside the context,
/// or None for question, special and padding tokens.
/// Eval windows carry start/end = 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaFeature {
    pub example_id:     String,
    pub data_set_id:    usize,
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub offsets:        Vec<Option<(usize, usize)>>,
    pub start_position: usize,
    pub end_position:   usize,
}

pub struct QaDataset {
    features: Vec<QaFeature>,
}

impl QaDataset {
    pub fn new(features: Vec<QaFeature>) -> Self { Self { features } }
}

impl Dataset<QaFeature> for QaDataset {
    fn get(&self, index: usize) -> Option<QaFeature> {
        self.features.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.features.len()
    }
}
