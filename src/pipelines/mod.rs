/// Token-level language identification
pub mod language_identification;
