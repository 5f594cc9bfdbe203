use burn::{
    module::Module,
    nn::{
        transformer::{TransformerEncoder, TransformerEncoderInput},
        Dropout, Embedding, LayerNorm,
    },
    tensor::{backend::Backend, Int, Tensor},
};

/// A BERT-style transformer encoder mapping token ids to contextual token embeddings
#[derive(Module, Debug)]
pub struct Embedder<B: Backend> {
    /// Token embeddings
    pub tokens: Embedding<B>,

    /// Learned absolute position embeddings
    pub positions: Embedding<B>,

    /// Embedding layer norm
    pub norm: LayerNorm<B>,

    /// Embedding dropout
    pub dropout: Dropout,

    /// The transformer encoder stack
    pub encoder: TransformerEncoder<B>,

    /// Size of the hidden states
    pub hidden_size: usize,
}

impl<B: Backend> Embedder<B> {
    /// Encode a batch of token ids into per-token embeddings.
    ///
    /// `attention_mask` holds 1 for real tokens and 0 for padding, padding is excluded from
    /// attention. Returns `[batch_size, seq_length, hidden_size]`.
    pub fn encode(
        &self,
        input_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_length] = input_ids.dims();
        let device = input_ids.device();

        let positions = Tensor::arange(0..seq_length as i64, &device)
            .reshape([1, seq_length])
            .repeat(0, batch_size);

        let embeddings = self.tokens.forward(input_ids) + self.positions.forward(positions);
        let embeddings = self.dropout.forward(self.norm.forward(embeddings));

        let mask_pad = attention_mask.equal_elem(0);

        self.encoder
            .forward(TransformerEncoderInput::new(embeddings).mask_pad(mask_pad))
    }

    /// Size of the produced embeddings
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}
