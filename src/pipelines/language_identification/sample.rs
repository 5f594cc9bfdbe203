use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{
    datasets::RawRecord,
    languages::Languages,
    tokenizer::{TokenizerError, WordTokenizer},
};

/// One tokenized, labelled example.
///
/// `input_ids` is wrapped in the begin and end ids, which have no label, so it is always longer
/// than `labels`. Labels are language ids, or the continuation sentinel for the second and later
/// pieces of a word.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct Sample {
    /// Token ids, including the wrapper ids
    pub input_ids: Vec<u32>,

    /// One label per word piece
    pub labels: Vec<usize>,
}

/// A record whose words have been split into sub-token pieces, all sharing one language
#[derive(Clone, Debug, PartialEq, Eq, new)]
pub struct TokenizedRecord {
    /// Sub-token pieces per word, words without pieces are dropped
    pub pieces: Vec<Vec<u32>>,

    /// The language id of every word in the record
    pub label: usize,
}

impl TokenizedRecord {
    /// The number of word pieces in the record
    pub fn len(&self) -> usize {
        self.pieces.iter().map(Vec::len).sum()
    }

    /// True when no word produced any piece
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

/// Turns word sequences into aligned `(input_ids, labels)` samples
#[derive(Clone, Debug)]
pub struct SampleBuilder {
    bos_id: u32,
    eos_id: u32,
    continuation_label: usize,
    max_labels: usize,
}

impl SampleBuilder {
    /// Create a builder emitting at most `max_seq_len` input ids per sample
    pub fn new(tokenizer: &dyn WordTokenizer, languages: &Languages, max_seq_len: usize) -> Self {
        Self {
            bos_id: tokenizer.bos_id(),
            eos_id: tokenizer.eos_id(),
            continuation_label: languages.continuation_label(),
            max_labels: max_seq_len.saturating_sub(2).max(1),
        }
    }

    /// The label given to non-first pieces of a word
    pub fn continuation_label(&self) -> usize {
        self.continuation_label
    }

    /// Split every word of a record into pieces
    pub fn tokenize(
        tokenizer: &dyn WordTokenizer,
        record: &RawRecord,
        label: usize,
    ) -> Result<TokenizedRecord, TokenizerError> {
        let mut pieces = Vec::with_capacity(record.words.len());

        for word in &record.words {
            let word_pieces = tokenizer.encode_word(word)?;

            if !word_pieces.is_empty() {
                pieces.push(word_pieces);
            }
        }

        Ok(TokenizedRecord::new(pieces, label))
    }

    /// Join one or more records into a single sample.
    ///
    /// The first piece of each word carries its record's language, the rest carry the
    /// continuation sentinel. Pieces beyond the length limit are dropped.
    pub fn build(&self, segments: &[&TokenizedRecord]) -> Sample {
        let capacity = segments
            .iter()
            .map(|segment| segment.len())
            .sum::<usize>()
            .min(self.max_labels);

        let mut input_ids = Vec::with_capacity(capacity + 2);
        let mut labels = Vec::with_capacity(capacity);

        input_ids.push(self.bos_id);

        'segments: for segment in segments {
            for word in &segment.pieces {
                for (i, piece) in word.iter().enumerate() {
                    if labels.len() == self.max_labels {
                        break 'segments;
                    }

                    input_ids.push(*piece);
                    labels.push(if i == 0 {
                        segment.label
                    } else {
                        self.continuation_label
                    });
                }
            }
        }

        input_ids.push(self.eos_id);

        Sample { input_ids, labels }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::testing::FixedTokenizer;

    fn tokenizer() -> FixedTokenizer {
        FixedTokenizer::new(&[
            ("the", &[10]),
            ("cat", &[11]),
            ("sleeps", &[12, 13]),
            ("chat", &[20]),
            ("", &[]),
        ])
    }

    #[test]
    fn continuation_pieces_get_the_continuation_label() {
        let tokenizer = tokenizer();
        let languages = Languages::new(["en", "fr"]).unwrap();
        let builder = SampleBuilder::new(&tokenizer, &languages, 512);

        let record = RawRecord::new(["the", "cat", "sleeps"]);
        let tokenized = SampleBuilder::tokenize(&tokenizer, &record, 0).unwrap();
        let sample = builder.build(&[&tokenized]);

        assert_eq!(
            sample.input_ids,
            vec![FixedTokenizer::BOS, 10, 11, 12, 13, FixedTokenizer::EOS]
        );
        assert_eq!(sample.labels, vec![0, 0, 0, 3]);
        assert_eq!(builder.continuation_label(), 3);
        assert!(sample.input_ids.len() >= sample.labels.len());
    }

    #[test]
    fn words_without_pieces_are_dropped() {
        let tokenizer = tokenizer();

        let record = RawRecord::new(["chat", ""]);
        let tokenized = SampleBuilder::tokenize(&tokenizer, &record, 1).unwrap();

        assert_eq!(tokenized, TokenizedRecord::new(vec![vec![20]], 1));
    }

    #[test]
    fn segments_keep_their_own_labels() {
        let tokenizer = tokenizer();
        let languages = Languages::new(["en", "fr"]).unwrap();
        let builder = SampleBuilder::new(&tokenizer, &languages, 512);

        let english = SampleBuilder::tokenize(&tokenizer, &RawRecord::new(["sleeps"]), 0).unwrap();
        let french = SampleBuilder::tokenize(&tokenizer, &RawRecord::new(["chat"]), 1).unwrap();

        let sample = builder.build(&[&french, &english]);

        assert_eq!(sample.labels, vec![1, 0, 3]);
    }

    #[test]
    fn truncates_to_the_sequence_limit() {
        let tokenizer = tokenizer();
        let languages = Languages::new(["en"]).unwrap();
        let builder = SampleBuilder::new(&tokenizer, &languages, 4);

        let record = RawRecord::new(["the", "cat", "sleeps"]);
        let tokenized = SampleBuilder::tokenize(&tokenizer, &record, 0).unwrap();
        let sample = builder.build(&[&tokenized]);

        assert_eq!(
            sample.input_ids,
            vec![FixedTokenizer::BOS, 10, 11, FixedTokenizer::EOS]
        );
        assert_eq!(sample.labels, vec![0, 0]);
    }
}
