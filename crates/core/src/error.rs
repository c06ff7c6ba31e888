use thiserror::Error;

/// Errors produced by the pure domain layer.
///
/// Provider and persistence failures have their own error types in the
/// `providers` and `store` crates; only configuration and validation
/// problems originate here.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required credential, selection, or setting is missing. Surfaced
    /// to the user immediately; the job is never submitted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input failed a domain invariant (e.g. empty dialogue).
    #[error("Validation failed: {0}")]
    Validation(String),
}
