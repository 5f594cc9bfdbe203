use burn::tensor::backend::Backend;
use log::info;

use crate::models::embedder::{self, Embedder};

use super::{ClassificationHeadConfig, LanguageClassifier};

/// The Model Configuration, saved next to trained weights
#[derive(burn::config::Config, Debug)]
pub struct Config {
    /// The embedder config
    pub embedder: embedder::Config,

    /// Number of languages to classify
    pub n_languages: usize,
}

impl Config {
    /// Initialize a model with random weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> LanguageClassifier<B> {
        self.init_with(self.embedder.init(device), device)
    }

    /// Initialize a model around an existing, typically pretrained, embedder
    pub fn init_with<B: Backend>(
        &self,
        embedder: Embedder<B>,
        device: &B::Device,
    ) -> LanguageClassifier<B> {
        let head = ClassificationHeadConfig::new(embedder.hidden_size(), self.n_languages)
            .init(device);

        LanguageClassifier {
            embedder,
            head,
            n_languages: self.n_languages,
        }
    }

    /// Build a model from a pretrained embedder, optionally frozen so only the head trains
    pub fn pretrained<B: Backend>(
        models_dir: &str,
        embedder_name: &str,
        n_languages: usize,
        freeze_embedder: bool,
        device: &B::Device,
    ) -> anyhow::Result<(Self, LanguageClassifier<B>)> {
        let (embedder_config, embedder) =
            embedder::Config::load_pretrained(models_dir, embedder_name, device)?;

        let config = Config::new(embedder_config, n_languages);
        let model = config.init_with(embedder, device);

        let model = if freeze_embedder {
            info!("Freezing embedding model: {}", embedder_name);

            model.freeze_embedder()
        } else {
            model
        };

        Ok((config, model))
    }
}
