use std::path::PathBuf;

use async_trait::async_trait;
use derive_new::new;
use serde::Deserialize;

use super::{CorpusSource, RawRecord, Split};

/// The name of the WikiANN dataset
pub static DATASET: &str = "wikiann";

/// One CSV row of a WikiANN export
#[derive(Clone, Debug, Deserialize)]
struct Row {
    /// Whitespace-separated words
    tokens: String,
}

/// WikiANN exported as `{root}/{language}/{split}.csv`, one record per row with a `tokens` column
#[derive(Clone, Debug, new)]
pub struct Corpus {
    /// The dataset root directory
    root: PathBuf,
}

impl Corpus {
    /// The corpus under the top-level data directory
    pub fn in_data_dir(data_dir: &str) -> Self {
        Self::new(PathBuf::from(data_dir).join("datasets").join(DATASET))
    }

    /// The CSV file for a language and split
    pub fn path(&self, language: &str, split: Split) -> PathBuf {
        self.root
            .join(language)
            .join(format!("{}.csv", split.as_str()))
    }
}

#[async_trait]
impl CorpusSource for Corpus {
    async fn load(&self, language: &str, split: Split) -> anyhow::Result<Vec<RawRecord>> {
        let path = self.path(language, split);

        let contents = tokio::fs::read(&path)
            .await
            .map_err(|e| anyhow!("Unable to read {}: {}", path.display(), e))?;

        let mut reader = csv::ReaderBuilder::new().from_reader(contents.as_slice());

        let mut records = Vec::new();
        for row in reader.deserialize() {
            let row: Row = row.map_err(|e| anyhow!("Invalid row in {}: {}", path.display(), e))?;

            records.push(RawRecord::new(row.tokens.split_whitespace()));
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn reads_one_record_per_row() {
        let dir = tempdir().unwrap();
        let language_dir = dir.path().join("fr");
        std::fs::create_dir_all(&language_dir).unwrap();
        std::fs::write(
            language_dir.join("validation.csv"),
            "tokens\n\"le chat  noir\"\nbonjour\n",
        )
        .unwrap();

        let corpus = Corpus::new(dir.path().to_path_buf());
        let records = corpus.load("fr", Split::Validation).await.unwrap();

        assert_eq!(
            records,
            vec![
                RawRecord::new(["le", "chat", "noir"]),
                RawRecord::new(["bonjour"]),
            ]
        );
    }

    #[tokio::test]
    async fn surfaces_missing_files() {
        let dir = tempdir().unwrap();

        let corpus = Corpus::new(dir.path().to_path_buf());

        assert!(corpus.load("en", Split::Train).await.is_err());
    }
}
