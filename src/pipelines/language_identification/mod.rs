use crate::tokenizer::TokenizerError;

/// Samples and the word-piece label alignment
pub mod sample;

/// Multi-language datasets
pub mod dataset;

/// Batcher
pub mod batcher;

/// Dataset loading and dataloaders
pub mod data;

/// Loss and F1 accumulators
pub mod metrics;

/// Per-step forward, masking, loss and metrics
pub mod classifier;

/// Training
pub mod training;

/// Inference
pub mod inference;

pub use batcher::{Batch, Batcher};
pub use classifier::{Classifier, StepError};
pub use data::LanguageData;
pub use dataset::{LanguageCorpus, LanguageDataset, MixingPolicy};
pub use inference::{Identifier, WordLanguage};
pub use metrics::{EpochMetrics, F1Score};
pub use sample::{Sample, SampleBuilder};
pub use training::train;

/// Data Error
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    /// A sample index past the end of the dataset
    #[error("index {index} is out of range for a dataset of {len} samples")]
    IndexOutOfRange {
        /// The requested index
        index: usize,
        /// The dataset length
        len: usize,
    },

    /// A batch with no samples
    #[error("cannot collate an empty batch")]
    EmptyBatch,

    /// A sample with more labels than input ids
    #[error("sample has {input} input ids but {labels} labels")]
    InputShorterThanLabels {
        /// Number of input ids
        input: usize,
        /// Number of labels
        labels: usize,
    },

    /// A corpus whose language groups do not match the configured languages
    #[error("expected records for {expected} languages, found {found}")]
    LanguageCount {
        /// Number of configured languages
        expected: usize,
        /// Number of language groups in the corpus
        found: usize,
    },

    /// Datasets were requested before they were loaded
    #[error("datasets have not been set up")]
    NotSetUp,

    /// The tokenizer failed on a word
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}
