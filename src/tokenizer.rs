use std::path::Path;

use log::info;
use tokenizers::Tokenizer;

/// A sub-word tokenizer that splits single words into pieces.
///
/// Samples are wrapped with `bos_id` and `eos_id`, which never carry a label.
pub trait WordTokenizer: Send + Sync {
    /// The begin-of-sequence id
    fn bos_id(&self) -> u32;

    /// The end-of-sequence id
    fn eos_id(&self) -> u32;

    /// Split a single word into sub-token ids. May return no pieces for words the vocabulary
    /// cannot represent at all.
    fn encode_word(&self, word: &str) -> Result<Vec<u32>, TokenizerError>;
}

/// A pretrained HuggingFace tokenizer using BERT-style `[CLS]` and `[SEP]` wrapper tokens
#[derive(Clone)]
pub struct PretrainedTokenizer {
    tokenizer: Tokenizer,
    bos_id: u32,
    eos_id: u32,
}

impl PretrainedTokenizer {
    /// The begin-of-sequence token
    pub const BOS_TOKEN: &'static str = "[CLS]";

    /// The end-of-sequence token
    pub const EOS_TOKEN: &'static str = "[SEP]";

    /// Download (or read from the local cache) a tokenizer from the Hugging Face Hub
    pub fn from_pretrained(name: &str) -> Result<Self, TokenizerError> {
        info!("Downloading and opening '{}' tokenizer", name);

        let tokenizer = Tokenizer::from_pretrained(name, None)
            .map_err(|e| TokenizerError::Load(name.to_string(), e.to_string()))?;

        Self::new(tokenizer)
    }

    /// Read a tokenizer from a local `tokenizer.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerError> {
        let path = path.as_ref();

        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| TokenizerError::Load(path.display().to_string(), e.to_string()))?;

        Self::new(tokenizer)
    }

    /// Wrap a tokenizer, resolving the begin and end ids from its vocabulary
    pub fn new(tokenizer: Tokenizer) -> Result<Self, TokenizerError> {
        let bos_id = tokenizer
            .token_to_id(Self::BOS_TOKEN)
            .ok_or(TokenizerError::MissingToken(Self::BOS_TOKEN))?;

        let eos_id = tokenizer
            .token_to_id(Self::EOS_TOKEN)
            .ok_or(TokenizerError::MissingToken(Self::EOS_TOKEN))?;

        Ok(Self {
            tokenizer,
            bos_id,
            eos_id,
        })
    }
}

impl WordTokenizer for PretrainedTokenizer {
    fn bos_id(&self) -> u32 {
        self.bos_id
    }

    fn eos_id(&self) -> u32 {
        self.eos_id
    }

    fn encode_word(&self, word: &str) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .tokenizer
            .encode(word, false)
            .map_err(|e| TokenizerError::Encode(word.to_string(), e.to_string()))?;

        Ok(encoding.get_ids().to_vec())
    }
}

/// Tokenizer Error
#[derive(thiserror::Error, Debug)]
pub enum TokenizerError {
    /// The tokenizer could not be downloaded or parsed
    #[error("unable to load tokenizer {0}: {1}")]
    Load(String, String),

    /// A required special token is not in the vocabulary
    #[error("tokenizer vocabulary has no {0} token")]
    MissingToken(&'static str),

    /// A word could not be encoded
    #[error("unable to encode {0:?}: {1}")]
    Encode(String, String),
}
