// ============================================================
// Layer 4 — Q&A Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<QaFeature>
// into device tensors.
//
// How batching works here:
//   Input:  Vec of N QaFeatures, each with sequences of length S
//   Output: QaBatch with tensors of shape [N, S] and [N]
//
//   All input_ids are flattened into one long Vec, then reshaped:
//   [f1_t1, f1_t2, ..., f1_tS, f2_t1, ..., fN_tS] → [N, S]
//
// Features are already padded to max_seq_len by the tokenizer,
// so no dynamic padding is needed here.
//
// The dataset ids travel twice: as a tensor (discriminator
// targets) and as a host Vec (in-domain row selection for the
// domain-confusion loss, which is decided on the CPU).
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::QaFeature;

// ─── QaBatch ──────────────────────────────────────────────────────────────────
/// A batch of features ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct QaBatch<B: Backend> {
    /// Token ID sequences — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// Attention masks — shape: [batch_size, seq_len]
    /// 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// Gold start token per feature — shape: [batch_size]
    pub start_positions: Tensor<B, 1, Int>,

    /// Gold end token per feature — shape: [batch_size]
    pub end_positions: Tensor<B, 1, Int>,

    /// Dataset id per feature — shape: [batch_size]
    pub data_set_ids: Tensor<B, 1, Int>,

    /// Same dataset ids, kept on the host
    pub domains: Vec<usize>,
}

// ─── QaBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct QaBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> QaBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn int_tensor_1d(&self, values: Vec<i64>) -> Tensor<B, 1, Int> {
        let n = values.len();
        Tensor::<B, 1, Int>::from_data(TensorData::new(values, [n]), &self.device)
    }

    fn int_tensor_2d(&self, values: Vec<i64>, rows: usize, cols: usize) -> Tensor<B, 2, Int> {
        Tensor::<B, 2, Int>::from_data(TensorData::new(values, [rows, cols]), &self.device)
    }
}

impl<B: Backend> Batcher<QaFeature, QaBatch<B>> for QaBatcher<B> {
    fn batch(&self, items: Vec<QaFeature>) -> QaBatch<B> {
        let batch_size = items.len();
        // All sequences have the same length (pre-padded)
        let seq_len    = items.first().map(|f| f.input_ids.len()).unwrap_or(0);

        let input_flat: Vec<i64> = items
            .iter()
            .flat_map(|f| f.input_ids.iter().map(|&x| x as i64))
            .collect();

        let mask_flat: Vec<i64> = items
            .iter()
            .flat_map(|f| f.attention_mask.iter().map(|&x| x as i64))
            .collect();

        let starts:  Vec<i64>   = items.iter().map(|f| f.start_position as i64).collect();
        let ends:    Vec<i64>   = items.iter().map(|f| f.end_position as i64).collect();
        let domains: Vec<usize> = items.iter().map(|f| f.data_set_id).collect();
        let ids:     Vec<i64>   = domains.iter().map(|&d| d as i64).collect();

        QaBatch {
            input_ids:       self.int_tensor_2d(input_flat, batch_size, seq_len),
            attention_mask:  self.int_tensor_2d(mask_flat, batch_size, seq_len),
            start_positions: self.int_tensor_1d(starts),
            end_positions:   self.int_tensor_1d(ends),
            data_set_ids:    self.int_tensor_1d(ids),
            domains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn feature(id: &str, ids: Vec<u32>, start: usize, end: usize, ds: usize) -> QaFeature {
        let n = ids.len();
        QaFeature {
            example_id:     id.to_string(),
            data_set_id:    ds,
            input_ids:      ids,
            attention_mask: vec![1; n],
            offsets:        vec![None; n],
            start_position: start,
            end_position:   end,
        }
    }

    #[test]
    fn test_batch_shapes_and_values() {
        let batcher = QaBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![
            feature("a", vec![101, 7, 102, 0], 1, 1, 0),
            feature("b", vec![101, 8, 9, 102], 1, 2, 4),
        ]);

        assert_eq!(batch.input_ids.dims(), [2, 4]);
        assert_eq!(batch.attention_mask.dims(), [2, 4]);
        assert_eq!(batch.start_positions.dims(), [2]);
        assert_eq!(batch.domains, vec![0, 4]);

        let ends: Vec<i64> = batch
            .end_positions
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(ends, vec![1, 2]);

        let second_row: Vec<i64> = batch
            .input_ids
            .slice([1..2, 0..4])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .unwrap();
        assert_eq!(second_row, vec![101, 8, 9, 102]);
    }
}
