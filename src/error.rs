//! Error types for credwatch operations.

use thiserror::Error;

/// Result type alias using [`CredwatchError`].
pub type Result<T> = std::result::Result<T, CredwatchError>;

/// Boxed error produced by a wrapped credential source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while retrieving or observing credentials.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum CredwatchError {
    /// The wrapped credential source failed to produce credentials.
    #[error("credential source {provider}: {source}")]
    Source {
        /// Name of the source that failed
        provider: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// The source had no credentials to provide.
    #[error("credentials not loaded: {0}")]
    NotLoaded(String),

    /// The retrieval context was cancelled.
    #[error("credential retrieval cancelled")]
    Cancelled,

    /// The retrieval context's deadline passed before the source answered.
    #[error("credential retrieval deadline exceeded")]
    DeadlineExceeded,

    /// A TTL sampler is already running for this provider.
    #[error("a ttl sampler is already running for this provider")]
    SamplerRunning,

    /// Configuration value is out of range or unparseable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CredwatchError {
    /// Wraps a source failure with the name of the source that produced it.
    ///
    /// # Example
    ///
    /// ```
    /// use credwatch::CredwatchError;
    ///
    /// let err = CredwatchError::source("sts", "access denied");
    /// assert_eq!(err.to_string(), "credential source sts: access denied");
    /// ```
    pub fn source(provider: impl Into<String>, err: impl Into<BoxError>) -> Self {
        Self::Source {
            provider: provider.into(),
            source: err.into(),
        }
    }

    /// Returns true for [`Cancelled`](Self::Cancelled) and
    /// [`DeadlineExceeded`](Self::DeadlineExceeded).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
