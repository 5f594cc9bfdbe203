#![allow(dead_code)]

use std::collections::HashMap;

use async_trait::async_trait;
use burn_lang_id::{
    datasets::{CorpusSource, RawRecord, Split},
    tokenizer::{TokenizerError, WordTokenizer},
};

pub const BOS: u32 = 101;
pub const EOS: u32 = 102;

/// Known words map to their listed pieces, anything else becomes one piece per character
pub struct FixedTokenizer {
    words: HashMap<String, Vec<u32>>,
}

impl FixedTokenizer {
    pub fn new(words: &[(&str, &[u32])]) -> Self {
        Self {
            words: words
                .iter()
                .map(|(word, pieces)| (word.to_string(), pieces.to_vec()))
                .collect(),
        }
    }
}

impl WordTokenizer for FixedTokenizer {
    fn bos_id(&self) -> u32 {
        BOS
    }

    fn eos_id(&self) -> u32 {
        EOS
    }

    fn encode_word(&self, word: &str) -> Result<Vec<u32>, TokenizerError> {
        Ok(self
            .words
            .get(word)
            .cloned()
            .unwrap_or_else(|| word.chars().map(|c| 1000 + c as u32 % 1000).collect()))
    }
}

/// A handful of English and French sentences per split
pub struct MemorySource;

const ENGLISH: [&str; 4] = [
    "the cat sleeps on the mat",
    "where is the train station",
    "my brother reads every night",
    "we walked home in the rain",
];

const FRENCH: [&str; 4] = [
    "le chat dort sur le tapis",
    "où est la gare",
    "mon frère lit chaque soir",
    "nous sommes rentrés sous la pluie",
];

#[async_trait]
impl CorpusSource for MemorySource {
    async fn load(&self, language: &str, split: Split) -> anyhow::Result<Vec<RawRecord>> {
        let sentences = match language {
            "en" => ENGLISH,
            "fr" => FRENCH,
            other => anyhow::bail!("no records for {}", other),
        };

        let count = match split {
            Split::Train => 4,
            Split::Validation => 2,
            Split::Test => 1,
        };

        Ok(sentences
            .iter()
            .take(count)
            .map(|sentence| RawRecord::new(sentence.split_whitespace()))
            .collect())
    }
}

/// Adds one record without any word to every language and split of the wrapped source
pub struct WithEmptyRecords<S>(pub S);

#[async_trait]
impl<S: CorpusSource> CorpusSource for WithEmptyRecords<S> {
    async fn load(&self, language: &str, split: Split) -> anyhow::Result<Vec<RawRecord>> {
        let mut records = self.0.load(language, split).await?;
        records.push(RawRecord::new(Vec::<String>::new()));

        Ok(records)
    }
}
