//! # Burn Language Identification
//!
//! Per-token language identification for code-switched text, fine-tuning a transformer encoder
//! with a linear classification head.
#![forbid(unsafe_code)]

/// Run configuration
pub mod config;

/// Datasets
pub mod datasets;

/// The ordered language set and its sentinel labels
pub mod languages;

/// Models
pub mod models;

/// Pipelines
pub mod pipelines;

/// Word-level tokenizers
pub mod tokenizer;

/// Utilities
pub mod utils;

/// Error macros
#[macro_use]
extern crate anyhow;
