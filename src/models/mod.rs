/// Transformer token embedder, the pretrained encoder backbone
pub mod embedder;

/// Embedder plus a per-token language classification head
pub mod language_classifier;
