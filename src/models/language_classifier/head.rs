use burn::{
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{backend::Backend, Tensor},
};

/// Classification head configuration
#[derive(burn::config::Config, Debug)]
pub struct ClassificationHeadConfig {
    /// Size of the incoming token embeddings
    pub hidden_size: usize,

    /// Number of languages to score
    pub n_languages: usize,
}

impl ClassificationHeadConfig {
    /// Initialize the head with random weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassificationHead<B> {
        ClassificationHead {
            output: LinearConfig::new(self.hidden_size, self.n_languages).init(device),
        }
    }
}

/// Projects every token embedding to one logit per language. Masking is left to the caller.
#[derive(Module, Debug)]
pub struct ClassificationHead<B: Backend> {
    /// Linear projection from the hidden size to the language count
    pub output: Linear<B>,
}

impl<B: Backend> ClassificationHead<B> {
    /// `[batch_size, seq_length, hidden_size]` to `[batch_size, seq_length, n_languages]`
    pub fn forward(&self, embeddings: Tensor<B, 3>) -> Tensor<B, 3> {
        self.output.forward(embeddings)
    }
}
