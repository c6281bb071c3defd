use thiserror::Error;

/// Core error type for qdd configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid concurrency '{value}': expected a positive integer")]
    InvalidConcurrency { value: String },

    #[error("Cache-only mode cannot be combined with no-cache mode: nothing would be installed")]
    ConflictingModes,
}
