use std::sync::atomic::{AtomicU64, Ordering};

use burn::data::dataset;
use derive_new::new;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::{
    datasets::RawRecord,
    languages::Languages,
    tokenizer::WordTokenizer,
};

use super::{
    sample::{Sample, SampleBuilder, TokenizedRecord},
    DataError,
};

/// The raw records of one split, grouped by language in language id order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LanguageCorpus {
    records: Vec<Vec<RawRecord>>,
}

impl LanguageCorpus {
    /// Create a corpus from per-language records, one entry per language id
    pub fn new(records: Vec<Vec<RawRecord>>) -> Self {
        Self { records }
    }

    /// Records grouped by language id
    pub fn by_language(&self) -> &[Vec<RawRecord>] {
        &self.records
    }

    /// The total number of records across all languages
    pub fn len(&self) -> usize {
        self.records.iter().map(Vec::len).sum()
    }

    /// True when no language has any record
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How training samples are joined with other records to simulate code-switched text
#[derive(Clone, Copy, Debug, PartialEq, new)]
pub struct MixingPolicy {
    /// Probability that a sample is extended with other records
    pub probability: f64,

    /// Maximum number of records in one sample, including the indexed one
    pub max_segments: usize,

    /// Base seed; together with the epoch and the index it fixes every mixing draw
    pub seed: u64,
}

impl MixingPolicy {
    fn rng(&self, epoch: u64, index: usize) -> StdRng {
        let index = (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);

        StdRng::seed_from_u64(self.seed ^ index ^ epoch.rotate_left(32))
    }
}

/// Every record of one split across all configured languages, indexable as samples
pub struct LanguageDataset {
    records: Vec<TokenizedRecord>,
    builder: SampleBuilder,
    mixing: Option<MixingPolicy>,
    epoch: AtomicU64,
}

impl LanguageDataset {
    /// Tokenize a split's corpus. Each record is labelled with the language it was loaded for.
    pub fn new(
        corpus: &LanguageCorpus,
        languages: &Languages,
        tokenizer: &dyn WordTokenizer,
        builder: SampleBuilder,
        mixing: Option<MixingPolicy>,
    ) -> Result<Self, DataError> {
        if corpus.by_language().len() != languages.len() {
            return Err(DataError::LanguageCount {
                expected: languages.len(),
                found: corpus.by_language().len(),
            });
        }

        let mut records = Vec::with_capacity(corpus.len());

        for (label, language_records) in corpus.by_language().iter().enumerate() {
            for record in language_records {
                records.push(SampleBuilder::tokenize(tokenizer, record, label)?);
            }
        }

        Ok(Self {
            records,
            builder,
            mixing,
            epoch: AtomicU64::new(0),
        })
    }

    /// Select the epoch whose mixing draws `sample` reproduces
    pub fn set_epoch(&self, epoch: usize) {
        self.epoch.store(epoch as u64, Ordering::Relaxed);
    }

    /// The sample at `index`, failing when the index is past the end
    pub fn sample(&self, index: usize) -> Result<Sample, DataError> {
        let record = self.records.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.records.len(),
        })?;

        let Some(policy) = self.mixing else {
            return Ok(self.builder.build(&[record]));
        };

        let mut rng = policy.rng(self.epoch.load(Ordering::Relaxed), index);

        let mut segments = vec![record];

        if policy.max_segments > 1 && rng.gen_bool(policy.probability) {
            let extra = rng.gen_range(1..policy.max_segments);

            for _ in 0..extra {
                segments.push(&self.records[rng.gen_range(0..self.records.len())]);
            }

            segments.shuffle(&mut rng);
        }

        Ok(self.builder.build(&segments))
    }

    /// The number of records in the split
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the split has no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl dataset::Dataset<Sample> for LanguageDataset {
    /// Returns a specific sample from the dataset
    fn get(&self, index: usize) -> Option<Sample> {
        self.sample(index).ok()
    }

    /// Returns the length of the dataset
    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use burn::data::dataset::Dataset as _;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::testing::FixedTokenizer;

    fn corpus() -> LanguageCorpus {
        LanguageCorpus::new(vec![
            vec![
                RawRecord::new(["the", "cat"]),
                RawRecord::new(["sleeps"]),
            ],
            vec![RawRecord::new(["chat"])],
        ])
    }

    fn build_dataset(mixing: Option<MixingPolicy>) -> LanguageDataset {
        let tokenizer = FixedTokenizer::new(&[
            ("the", &[10]),
            ("cat", &[11]),
            ("sleeps", &[12, 13]),
            ("chat", &[20]),
        ]);
        let languages = Languages::new(["en", "fr"]).unwrap();
        let builder = SampleBuilder::new(&tokenizer, &languages, 512);

        LanguageDataset::new(&corpus(), &languages, &tokenizer, builder, mixing).unwrap()
    }

    #[test]
    fn length_is_the_sum_of_language_record_counts() {
        let dataset = build_dataset(None);

        assert_eq!(dataset.len(), 3);
        assert_eq!(corpus().len(), 3);
    }

    #[test]
    fn indexes_across_languages_in_order() {
        let dataset = build_dataset(None);

        assert_eq!(dataset.sample(0).unwrap().labels, vec![0, 0]);
        assert_eq!(dataset.sample(1).unwrap().labels, vec![0, 3]);
        assert_eq!(dataset.sample(2).unwrap().labels, vec![1]);
        assert_eq!(
            dataset.get(2).unwrap().input_ids,
            vec![FixedTokenizer::BOS, 20, FixedTokenizer::EOS]
        );
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let dataset = build_dataset(None);

        assert!(matches!(
            dataset.sample(3),
            Err(DataError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(dataset.get(3).is_none());
    }

    #[test]
    fn mixed_samples_only_use_real_labels_and_the_continuation_sentinel() {
        let dataset = build_dataset(Some(MixingPolicy::new(1.0, 3, 7)));

        for _ in 0..20 {
            let sample = dataset.sample(2).unwrap();

            assert!(sample.labels.contains(&1));
            assert!(sample.labels.len() >= 2);
            assert!(sample.labels.iter().all(|label| [0, 1, 3].contains(label)));
            assert_eq!(sample.input_ids.len(), sample.labels.len() + 2);
        }
    }

    #[test]
    fn mixing_is_reproducible_for_a_seed_and_epoch() {
        let policy = MixingPolicy::new(0.5, 3, 42);
        let first = build_dataset(Some(policy));
        let second = build_dataset(Some(policy));

        let samples = |dataset: &LanguageDataset| {
            (0..dataset.len())
                .map(|index| dataset.sample(index).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(samples(&first), samples(&second));
        assert_eq!(samples(&first), samples(&first));

        first.set_epoch(1);
        second.set_epoch(1);
        assert_eq!(samples(&first), samples(&second));
    }

    #[test]
    fn rejects_a_corpus_for_a_different_language_count() {
        let tokenizer = FixedTokenizer::new(&[]);
        let languages = Languages::new(["en", "fr", "de"]).unwrap();
        let builder = SampleBuilder::new(&tokenizer, &languages, 512);

        let result = LanguageDataset::new(&corpus(), &languages, &tokenizer, builder, None);

        assert!(matches!(
            result,
            Err(DataError::LanguageCount {
                expected: 3,
                found: 2
            })
        ));
    }
}
