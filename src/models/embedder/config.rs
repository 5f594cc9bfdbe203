use std::path::Path;

use burn::{
    config::Config as _,
    module::Module,
    nn::{transformer::TransformerEncoderConfig, DropoutConfig, EmbeddingConfig, LayerNormConfig},
    record::{CompactRecorder, Recorder},
    tensor::backend::Backend,
};
use log::info;

use super::Embedder;

/// The file holding a saved embedder config
pub static CONFIG_FILE: &str = "config.json";

/// The record file holding saved embedder weights, without the recorder's extension
pub static WEIGHTS_FILE: &str = "model";

/// The Embedder Configuration
#[derive(burn::config::Config, Debug)]
pub struct Config {
    /// Size of the vocabulary
    pub vocab_size: usize,

    /// Size of the embeddings and hidden states (e.g., 768 for bert-base)
    pub hidden_size: usize,

    /// Number of attention heads
    pub num_attention_heads: usize,

    /// Number of transformer encoder layers
    pub num_hidden_layers: usize,

    /// Size of the position-wise feedforward layer
    pub intermediate_size: usize,

    /// Maximum number of positions, which bounds the sequence length
    #[config(default = 512)]
    pub max_position_embeddings: usize,

    /// Dropout across layers
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,

    /// Layer normalization epsilon
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
}

impl Config {
    /// Initialize an embedder with random weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> Embedder<B> {
        Embedder {
            tokens: EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device),
            positions: EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size)
                .init(device),
            norm: LayerNormConfig::new(self.hidden_size)
                .with_epsilon(self.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(self.hidden_dropout_prob).init(),
            encoder: TransformerEncoderConfig::new(
                self.hidden_size,
                self.intermediate_size,
                self.num_attention_heads,
                self.num_hidden_layers,
            )
            .with_dropout(self.hidden_dropout_prob)
            .with_norm_first(false)
            .init(device),
            hidden_size: self.hidden_size,
        }
    }

    /// Load a pretrained embedder saved under `{models_dir}/{name}`
    pub fn load_pretrained<B: Backend>(
        models_dir: &str,
        name: &str,
        device: &B::Device,
    ) -> anyhow::Result<(Self, Embedder<B>)> {
        let model_dir = Path::new(models_dir).join(name);

        info!("Loading pretrained embedder from {}", model_dir.display());

        let config = Self::load(model_dir.join(CONFIG_FILE))
            .map_err(|e| anyhow!("Unable to load embedder config file: {}", e))?;

        let record = CompactRecorder::new()
            .load(model_dir.join(WEIGHTS_FILE), device)
            .map_err(|e| anyhow!("Unable to load pretrained embedder weights: {}", e))?;

        let embedder = config.init(device).load_record(record);

        Ok((config, embedder))
    }
}
