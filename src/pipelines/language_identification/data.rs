use std::sync::Arc;

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    tensor::backend::Backend,
};
use futures::future::try_join_all;
use log::info;

use crate::{
    config::Config,
    datasets::{CorpusSource, Split},
    languages::Languages,
    tokenizer::WordTokenizer,
};

use super::{
    batcher::{Batch, Batcher},
    dataset::{LanguageCorpus, LanguageDataset, MixingPolicy},
    sample::SampleBuilder,
    DataError,
};

struct Datasets {
    train: Arc<LanguageDataset>,
    validation: Arc<LanguageDataset>,
    test: Arc<LanguageDataset>,
}

/// Loads the per-language corpora and hands out batched dataloaders for each split
pub struct LanguageData {
    languages: Languages,
    tokenizer: Arc<dyn WordTokenizer>,
    batch_size: usize,
    val_batch_size: usize,
    num_workers: usize,
    seed: u64,
    max_seq_len: usize,
    mixing: MixingPolicy,
    datasets: Option<Datasets>,
}

impl LanguageData {
    /// Capture the data settings of a run. Nothing is loaded until `setup`.
    pub fn new(config: &Config, tokenizer: Arc<dyn WordTokenizer>) -> Self {
        Self {
            languages: config.languages.clone(),
            tokenizer,
            batch_size: config.batch_size,
            val_batch_size: config.val_batch_size,
            num_workers: config.num_workers.resolve(),
            seed: config.seed,
            max_seq_len: config.max_seq_len,
            mixing: MixingPolicy::new(config.mix_probability, config.max_segments, config.seed),
            datasets: None,
        }
    }

    /// Load every (language, split) pair from the source and tokenize the three splits. Only
    /// the training split mixes records across languages.
    pub async fn setup(&mut self, source: &dyn CorpusSource) -> anyhow::Result<()> {
        let builder =
            SampleBuilder::new(self.tokenizer.as_ref(), &self.languages, self.max_seq_len);

        let train = self.load(source, Split::Train).await?;
        let validation = self.load(source, Split::Validation).await?;
        let test = self.load(source, Split::Test).await?;

        let dataset = |corpus: &LanguageCorpus, mixing: Option<MixingPolicy>| {
            LanguageDataset::new(
                corpus,
                &self.languages,
                self.tokenizer.as_ref(),
                builder.clone(),
                mixing,
            )
            .map(Arc::new)
        };

        let datasets = Datasets {
            train: dataset(&train, Some(self.mixing))?,
            validation: dataset(&validation, None)?,
            test: dataset(&test, None)?,
        };

        info!(
            "Loaded {} train, {} validation and {} test samples over {} languages",
            datasets.train.len(),
            datasets.validation.len(),
            datasets.test.len(),
            self.languages.len()
        );

        self.datasets = Some(datasets);

        Ok(())
    }

    async fn load(&self, source: &dyn CorpusSource, split: Split) -> anyhow::Result<LanguageCorpus> {
        let records = try_join_all(
            self.languages
                .codes()
                .iter()
                .map(|language| source.load(language, split)),
        )
        .await?;

        for (language, records) in self.languages.codes().iter().zip(&records) {
            info!("{}/{}: {} records", language, split, records.len());
        }

        Ok(LanguageCorpus::new(records))
    }

    /// The dataset of one split
    pub fn dataset(&self, split: Split) -> Result<Arc<LanguageDataset>, DataError> {
        let datasets = self.datasets.as_ref().ok_or(DataError::NotSetUp)?;

        Ok(match split {
            Split::Train => datasets.train.clone(),
            Split::Validation => datasets.validation.clone(),
            Split::Test => datasets.test.clone(),
        })
    }

    /// A dataloader over one split. Training batches are shuffled with the configured seed and
    /// use the training batch size, the other splits keep their order and use the larger
    /// evaluation batch size.
    pub fn dataloader<B: Backend>(
        &self,
        split: Split,
        device: &B::Device,
    ) -> Result<Arc<dyn DataLoader<Batch<B>>>, DataError> {
        let dataset = self.dataset(split)?;
        let batcher = Batcher::<B>::new(self.languages.len(), device.clone());

        let builder = DataLoaderBuilder::new(batcher);

        let builder = match split {
            Split::Train => builder.batch_size(self.batch_size).shuffle(self.seed),
            Split::Validation | Split::Test => builder.batch_size(self.val_batch_size),
        };

        let builder = if self.num_workers > 0 {
            builder.num_workers(self.num_workers)
        } else {
            builder
        };

        Ok(builder.build(dataset))
    }

    /// The configured languages
    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    /// The number of configured languages
    pub fn n_languages(&self) -> usize {
        self.languages.len()
    }

    /// The tokenizer used to build samples
    pub fn tokenizer(&self) -> &Arc<dyn WordTokenizer> {
        &self.tokenizer
    }

    /// Map predicted class ids to language codes. Ids outside the configured languages decode
    /// to the not-a-language marker.
    pub fn decode_languages(&self, indices: &[i64]) -> Vec<&str> {
        self.languages.decode(indices)
    }
}
