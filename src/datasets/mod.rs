use std::fmt::Display;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The WikiANN per-language corpus layout
pub mod wikiann;

/// A dataset split
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training split
    Train,

    /// Validation split
    Validation,

    /// Test split
    Test,
}

impl Split {
    /// All splits, in the order they are used
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    /// The name used for this split on disk
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }

    /// The short name used as a metric prefix
    pub fn metric_prefix(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "val",
            Split::Test => "test",
        }
    }
}

impl Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single upstream record: a sequence of words that are all in one language
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// The words of the record
    pub words: Vec<String>,
}

impl RawRecord {
    /// Create a record from words
    pub fn new<S: Into<String>>(words: impl IntoIterator<Item = S>) -> Self {
        Self {
            words: words.into_iter().map(Into::into).collect(),
        }
    }
}

/// An upstream source of per-language records
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Load every record of one language for one split
    async fn load(&self, language: &str, split: Split) -> anyhow::Result<Vec<RawRecord>>;
}
