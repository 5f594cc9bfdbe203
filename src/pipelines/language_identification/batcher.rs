use burn::{
    data::dataloader,
    tensor::{backend::Backend, Int, Tensor},
};
use derive_new::new;

use crate::utils::tensors;

use super::{sample::Sample, DataError};

/// A padded training batch for token-level language identification
#[derive(Clone, Debug, new)]
pub struct Batch<B: Backend> {
    /// Token ids, zero-padded: [batch_size, max_seq_length]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 for real tokens and 0 for padding: [batch_size, max_seq_length]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Language ids, padded with the `n_languages` sentinel: [batch_size, max_seq_length]
    pub labels: Tensor<B, 2, Int>,
}

/// Struct for batching language identification samples
#[derive(Clone, Debug, new)]
pub struct Batcher<B: Backend> {
    /// The number of languages, used as the padding label
    pub n_languages: usize,

    /// Device on which to create the batch tensors
    pub device: B::Device,
}

impl<B: Backend> Batcher<B> {
    /// Pad a non-empty list of samples into a batch.
    ///
    /// The batch width is the longest label sequence, and each row copies only as many input ids
    /// as it has labels. Since input ids start with the begin id, this drops the trailing piece
    /// and the end id of every row, and shifts labels one position ahead of their piece.
    pub fn collate(&self, samples: Vec<Sample>) -> Result<Batch<B>, DataError> {
        let max_len = samples
            .iter()
            .map(|sample| sample.labels.len())
            .max()
            .ok_or(DataError::EmptyBatch)?;

        let batch_size = samples.len();

        let mut input_ids = Vec::with_capacity(batch_size);
        let mut attention_mask = Vec::with_capacity(batch_size);
        let mut labels = Vec::with_capacity(batch_size);

        for sample in samples {
            let c_len = sample.labels.len();

            if sample.input_ids.len() < c_len {
                return Err(DataError::InputShorterThanLabels {
                    input: sample.input_ids.len(),
                    labels: c_len,
                });
            }

            input_ids.push(
                sample.input_ids[..c_len]
                    .iter()
                    .map(|id| *id as i64)
                    .collect(),
            );
            attention_mask.push(vec![1; c_len]);
            labels.push(sample.labels.into_iter().map(|label| label as i64).collect());
        }

        Ok(Batch {
            input_ids: tensors::pad_to(0, input_ids, max_len, &self.device),
            attention_mask: tensors::pad_to(0, attention_mask, max_len, &self.device),
            labels: tensors::pad_to(self.n_languages as i64, labels, max_len, &self.device),
        })
    }
}

/// Implement Batcher trait for Batcher struct for training
impl<B: Backend> dataloader::batcher::Batcher<Sample, Batch<B>> for Batcher<B> {
    /// Collects a vector of samples into a training batch. Samples without labels become
    /// all-padding rows, and a batch of only such rows has zero columns.
    fn batch(&self, items: Vec<Sample>) -> Batch<B> {
        self.collate(items).expect(
            "dataloader batches hold at least one sample, and SampleBuilder always emits \
             two more input ids than labels",
        )
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::utils::tensors::int_values;

    type TestBackend = NdArray;

    fn batcher() -> Batcher<TestBackend> {
        Batcher::new(2, Default::default())
    }

    #[test]
    fn pads_with_zero_ids_and_the_language_sentinel() {
        // An English record of three words, the last split in two, and a two-word French record
        let english = Sample::new(vec![101, 10, 11, 12, 13, 102], vec![0, 0, 0, 3]);
        let french = Sample::new(vec![101, 20, 21, 102], vec![1, 1]);

        let batch = batcher().collate(vec![english, french]).unwrap();

        assert_eq!(batch.input_ids.dims(), [2, 4]);
        assert_eq!(
            int_values(batch.input_ids),
            vec![101, 10, 11, 12, 101, 20, 0, 0]
        );
        assert_eq!(
            int_values(batch.attention_mask),
            vec![1, 1, 1, 1, 1, 1, 0, 0]
        );
        assert_eq!(int_values(batch.labels), vec![0, 0, 0, 3, 1, 1, 2, 2]);
    }

    #[test]
    fn masked_positions_always_hold_the_padding_label() {
        let samples = vec![
            Sample::new(vec![101, 1, 102], vec![0]),
            Sample::new(vec![101, 1, 2, 3, 4, 5, 102], vec![1, 3, 0, 1, 0]),
            Sample::new(vec![101, 1, 2, 102], vec![1, 1]),
        ];

        let batch = batcher().collate(samples).unwrap();

        let mask = int_values(batch.attention_mask);
        let labels = int_values(batch.labels);

        for (mask, label) in mask.into_iter().zip(labels) {
            if mask == 0 {
                assert_eq!(label, 2);
            }
        }
    }

    #[test]
    fn single_sample_batch_has_no_padding() {
        let batch = batcher()
            .collate(vec![Sample::new(vec![101, 7, 8, 9, 102], vec![1, 0, 3])])
            .unwrap();

        assert_eq!(batch.labels.dims(), [1, 3]);
        assert_eq!(int_values(batch.attention_mask), vec![1, 1, 1]);
        assert_eq!(int_values(batch.input_ids), vec![101, 7, 8]);
    }

    #[test]
    fn input_shorter_than_labels_is_an_error() {
        let result = batcher().collate(vec![Sample::new(vec![101], vec![0, 1])]);

        assert!(matches!(
            result,
            Err(DataError::InputShorterThanLabels {
                input: 1,
                labels: 2
            })
        ));
    }

    #[test]
    fn dataloader_path_accepts_samples_without_labels() {
        use burn::data::dataloader::batcher::Batcher as _;

        let empty = Sample::new(vec![101, 102], Vec::new());

        let batch: Batch<TestBackend> = batcher().batch(vec![empty.clone()]);
        assert_eq!(batch.labels.dims(), [1, 0]);
        assert_eq!(batch.input_ids.dims(), [1, 0]);

        let batch: Batch<TestBackend> =
            batcher().batch(vec![empty, Sample::new(vec![101, 7, 102], vec![1])]);
        assert_eq!(int_values(batch.labels), vec![2, 1]);
        assert_eq!(int_values(batch.attention_mask), vec![0, 1]);
    }

    #[test]
    fn empty_batch_is_an_error() {
        assert!(matches!(
            batcher().collate(Vec::new()),
            Err(DataError::EmptyBatch)
        ));
    }
}
