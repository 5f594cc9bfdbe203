/// Embedder Config
pub mod config;

/// Embedder Model
pub mod model;

pub use config::Config;
pub use model::{Embedder, EmbedderRecord};
