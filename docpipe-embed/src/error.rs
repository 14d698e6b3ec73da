//! Error types for embedding generation

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Configuration errors are raised synchronously and never retried. Service
/// errors cover the external embedding API: transport failures, non-2xx
/// statuses, and malformed or misaligned response bodies. Generation errors
/// wrap a service failure with the context of the text being embedded.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// The embedding configuration is unusable.
    #[error("invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Two vectors could not be compared because their lengths differ.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// The embedding service rejected the request or returned garbage.
    #[error("embedding service error: {message}")]
    Service { message: String },

    /// HTTP transport failure talking to the embedding service.
    #[error("embedding service request failed: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },

    /// Embedding generation failed for a specific input.
    #[error("embedding generation failed: {source}")]
    Generation {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a service error with a custom message.
    pub fn service<S: Into<String>>(message: S) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Wrap an underlying failure as an embedding generation error.
    pub fn generation<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Generation {
            source: Box::new(source),
        }
    }
}
