use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::utils::classes::invert_map;

/// The marker reported for any index that does not map to a configured language
pub static NOT_LANGUAGE: &str = "[NOT LANG]";

/// The ordered set of language codes a classifier is trained on.
///
/// The position of a code is its class id. The count of codes doubles as the padding sentinel
/// label, and the count plus one is the continuation sentinel for non-first word pieces. Neither
/// sentinel ever decodes to a language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Languages {
    codes: Vec<String>,

    #[serde(skip)]
    code2id: HashMap<String, usize>,
}

impl Languages {
    /// Create a language set from an ordered list of codes
    pub fn new<S: Into<String>>(codes: impl IntoIterator<Item = S>) -> Result<Self, LanguagesError> {
        let codes: Vec<String> = codes.into_iter().map(Into::into).collect();

        if codes.is_empty() {
            return Err(LanguagesError::Empty);
        }

        let code2id: HashMap<String, usize> = invert_map(codes.iter().cloned().enumerate());

        if code2id.len() != codes.len() {
            let duplicate = codes
                .iter()
                .enumerate()
                .find(|(i, code)| code2id.get(*code) != Some(i))
                .map(|(_, code)| code.clone())
                .unwrap_or_default();

            return Err(LanguagesError::Duplicate(duplicate));
        }

        Ok(Self { codes, code2id })
    }

    /// The number of configured languages, which is also the classifier output width
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Always false, an empty language set cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The label for padding positions
    pub fn padding_label(&self) -> usize {
        self.codes.len()
    }

    /// The label for the second and later pieces of a word split into several sub-tokens
    pub fn continuation_label(&self) -> usize {
        self.codes.len() + 1
    }

    /// The language codes in class id order
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    /// The class id of a language code
    pub fn id(&self, code: &str) -> Option<usize> {
        self.code2id.get(code).copied()
    }

    /// The language code of a class id, or the not-a-language marker
    pub fn code(&self, index: i64) -> &str {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.codes.get(index))
            .map(String::as_str)
            .unwrap_or(NOT_LANGUAGE)
    }

    /// Decode predicted class ids into language codes
    pub fn decode(&self, indices: &[i64]) -> Vec<&str> {
        indices.iter().map(|index| self.code(*index)).collect()
    }
}

impl TryFrom<Vec<String>> for Languages {
    type Error = LanguagesError;

    fn try_from(codes: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(codes)
    }
}

impl From<Languages> for Vec<String> {
    fn from(languages: Languages) -> Self {
        languages.codes
    }
}

/// Language set errors
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum LanguagesError {
    /// No language codes were given
    #[error("at least one language is required")]
    Empty,

    /// A language code appears more than once
    #[error("language {0} is listed more than once")]
    Duplicate(String),
}
