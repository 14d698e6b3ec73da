//! Configuration for the embedding generator

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default embedding model requested from the service.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Default vector length requested from the service.
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Configuration for embedding generation.
///
/// Passed explicitly into each component's constructor; there is no
/// process-wide client state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Model identifier sent to the embedding service.
    pub model: String,
    /// Vector length requested from the service. Every embedding produced
    /// under this configuration has exactly this length.
    pub dimensions: usize,
    /// Number of texts per batched service call.
    pub batch_size: usize,
    /// Delay between batches, to respect service rate limits.
    #[serde(with = "duration_millis")]
    pub batch_delay: Duration,
    /// Base URL of the embedding service.
    pub api_base: String,
    /// Bearer token for the embedding service, if it requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            batch_size: 20,
            batch_delay: Duration::from_millis(100),
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for the given model with default settings.
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Validate the configuration, failing fast on unusable values.
    pub fn validate(&self) -> Result<()> {
        if self.model.is_empty() {
            return Err(EmbedError::invalid_config("model must not be empty"));
        }
        if self.dimensions == 0 {
            return Err(EmbedError::invalid_config(
                "dimensions must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config(
                "batch_size must be greater than zero",
            ));
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EmbedConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.dimensions, 1536);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.batch_delay, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        assert!(EmbedConfig::new("", 1536).validate().is_err());
        assert!(EmbedConfig::new("m", 0).validate().is_err());
        assert!(
            EmbedConfig::new("m", 8)
                .with_batch_size(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EmbedConfig::new("custom-model", 256)
            .with_batch_size(5)
            .with_batch_delay(Duration::from_millis(250));
        let json = serde_json::to_string(&config).unwrap();
        let back: EmbedConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.model, "custom-model");
        assert_eq!(back.dimensions, 256);
        assert_eq!(back.batch_delay, Duration::from_millis(250));
    }
}
