/// Classifier Config
pub mod config;

/// Per-token classification head
pub mod head;

/// Embedder + head model
pub mod model;

pub use config::Config;
pub use head::{ClassificationHead, ClassificationHeadConfig};
pub use model::{LanguageClassifier, LanguageClassifierRecord};
