use burn::{
    module::Module,
    tensor::{backend::Backend, Int, Tensor},
};

use crate::models::embedder::Embedder;

use super::ClassificationHead;

/// A transformer embedder with a per-token language classification head
#[derive(Module, Debug)]
pub struct LanguageClassifier<B: Backend> {
    /// The pretrained encoder
    pub embedder: Embedder<B>,

    /// Linear layer for per-token classification
    pub head: ClassificationHead<B>,

    /// Total number of languages
    pub n_languages: usize,
}

impl<B: Backend> LanguageClassifier<B> {
    /// Per-token language logits, `[batch_size, seq_length, n_languages]`
    pub fn forward(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let embeddings = self.embedder.encode(input_ids, attention_mask);

        self.head.forward(embeddings)
    }

    /// Predicted language id for every token, `[batch_size, seq_length]`
    pub fn infer(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2, Int> {
        let [batch_size, seq_length] = input_ids.dims();

        self.forward(input_ids, attention_mask)
            .argmax(2)
            .reshape([batch_size, seq_length])
    }

    /// Stop gradient tracking for every embedder parameter, leaving only the head trainable
    pub fn freeze_embedder(mut self) -> Self {
        self.embedder = self.embedder.no_grad();
        self
    }
}
