/// Tensor utilities
pub mod tensors;

/// Utilities for classification tasks
pub mod classes;
