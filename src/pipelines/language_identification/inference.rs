use std::{fs, path::Path, sync::Arc};

use burn::{
    config::Config as _,
    module::Module,
    record::{CompactRecorder, Recorder},
    tensor::backend::Backend,
};
use derive_new::new;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    languages::{Languages, NOT_LANGUAGE},
    models::language_classifier::{Config as ModelConfig, LanguageClassifier},
    tokenizer::{PretrainedTokenizer, TokenizerError, WordTokenizer},
    utils::tensors,
};

/// The model config file in an artifact directory
pub static MODEL_CONFIG_FILE: &str = "config.json";

/// The pipeline settings file in an artifact directory
pub static PIPELINE_CONFIG_FILE: &str = "pipeline.json";

/// The model record file in an artifact directory, without the recorder's extension
pub static MODEL_FILE: &str = "model";

/// Everything besides the model needed to run a trained classifier on raw text
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, new)]
pub struct PipelineConfig {
    /// The languages, in class id order
    pub languages: Languages,

    /// The Hugging Face tokenizer the model was trained with
    pub tokenizer_name: String,

    /// Maximum number of input ids per text, including the wrapper ids
    pub max_seq_len: usize,
}

impl PipelineConfig {
    /// Write the settings into an artifact directory
    pub fn save(&self, artifact_dir: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = artifact_dir.as_ref().join(PIPELINE_CONFIG_FILE);

        fs::write(&path, serde_json::to_string_pretty(self)?)
            .map_err(|e| anyhow!("Unable to write {}: {}", path.display(), e))?;

        Ok(())
    }

    /// Read the settings from an artifact directory
    pub fn load(artifact_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = artifact_dir.as_ref().join(PIPELINE_CONFIG_FILE);

        let json = fs::read_to_string(&path)
            .map_err(|e| anyhow!("Unable to read {}: {}", path.display(), e))?;

        Ok(serde_json::from_str(&json)?)
    }
}

/// The language predicted for one word
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct WordLanguage {
    /// The word as it appeared in the text
    pub word: String,

    /// Its language code, or the not-a-language marker when the word was dropped
    pub language: String,
}

/// Predicts the language of every whitespace-separated word of a text
pub struct Identifier<B: Backend> {
    model: LanguageClassifier<B>,
    tokenizer: Arc<dyn WordTokenizer>,
    languages: Languages,
    max_seq_len: usize,
    device: B::Device,
}

impl<B: Backend> Identifier<B> {
    /// Wrap a model and the tokenizer it was trained with
    pub fn new(
        model: LanguageClassifier<B>,
        tokenizer: Arc<dyn WordTokenizer>,
        languages: Languages,
        max_seq_len: usize,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            tokenizer,
            languages,
            max_seq_len,
            device,
        }
    }

    /// Rebuild a trained classifier from an artifact directory
    pub fn load(artifact_dir: &str, device: B::Device) -> anyhow::Result<Self> {
        let pipeline = PipelineConfig::load(artifact_dir)?;

        let config = ModelConfig::load(Path::new(artifact_dir).join(MODEL_CONFIG_FILE))
            .map_err(|e| anyhow!("Unable to load config file: {}", e))?;

        info!("Loading weights from {}", artifact_dir);

        let record = CompactRecorder::new()
            .load(Path::new(artifact_dir).join(MODEL_FILE), &device)
            .map_err(|e| anyhow!("Unable to load trained model weights: {}", e))?;

        let model = config.init::<B>(&device).load_record(record);

        let tokenizer = PretrainedTokenizer::from_pretrained(&pipeline.tokenizer_name)?;

        Ok(Self::new(
            model,
            Arc::new(tokenizer),
            pipeline.languages,
            pipeline.max_seq_len,
            device,
        ))
    }

    /// The languages the model predicts
    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    /// Predict a language for every word of every text.
    ///
    /// A word is labelled by the prediction at the position of its first piece. Words with no
    /// pieces, and words truncated away by the sequence limit, get the not-a-language marker.
    pub fn identify<S: AsRef<str>>(
        &self,
        texts: &[S],
    ) -> Result<Vec<Vec<WordLanguage>>, TokenizerError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let max_pieces = self.max_seq_len.saturating_sub(2);

        let mut words = Vec::with_capacity(texts.len());
        let mut rows = Vec::with_capacity(texts.len());

        for text in texts {
            let mut input_ids = vec![self.tokenizer.bos_id() as i64];
            let mut text_words = Vec::new();

            for word in text.as_ref().split_whitespace() {
                let pieces = self.tokenizer.encode_word(word)?;
                let position = input_ids.len() - 1;

                if pieces.is_empty() || position >= max_pieces {
                    text_words.push((word, None));
                    continue;
                }

                text_words.push((word, Some(position)));

                input_ids.extend(
                    pieces
                        .iter()
                        .take(max_pieces - position)
                        .map(|piece| *piece as i64),
                );
            }

            input_ids.push(self.tokenizer.eos_id() as i64);

            words.push(text_words);
            rows.push(input_ids);
        }

        let seq_length = rows.iter().map(Vec::len).max().unwrap_or_default();
        let masks = rows.iter().map(|row| vec![1; row.len()]).collect();

        let predictions = tensors::int_values(self.model.infer(
            tensors::pad_to(0, rows, seq_length, &self.device),
            tensors::pad_to(0, masks, seq_length, &self.device),
        ));

        Ok(words
            .into_iter()
            .enumerate()
            .map(|(row, text_words)| {
                text_words
                    .into_iter()
                    .map(|(word, position)| {
                        let language = position
                            .map(|position| {
                                self.languages.code(predictions[row * seq_length + position])
                            })
                            .unwrap_or(NOT_LANGUAGE);

                        WordLanguage::new(word.to_string(), language.to_string())
                    })
                    .collect()
            })
            .collect())
    }
}
