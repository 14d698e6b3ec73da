//! # docpipe-embed
//!
//! Embedding generation for the docpipe document pipeline. Turns text chunks
//! into fixed-length vectors through a remote embedding API, with batching,
//! rate-limit pacing, and per-chunk failure recovery.
//!
//! ## Features
//!
//! - **Async-First Design**: Full async/await support with tokio integration
//! - **Batched Requests**: Configurable batch size with a pacing delay between batches
//! - **Partial-Failure Recovery**: Failed batches fall back to per-chunk calls;
//!   only the chunks that still fail are dropped
//! - **Similarity Primitives**: Cosine similarity with dimension checking
//! - **Configurable**: Flexible configuration with sensible defaults
//!
//! ## Quick Start
//!
//! ```no_run
//! use docpipe_embed::{EmbedConfig, EmbeddingGenerator, OpenAiProvider};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EmbedConfig::default().with_api_key("sk-...");
//! let provider = Arc::new(OpenAiProvider::new(config.clone())?);
//! let generator = EmbeddingGenerator::new(provider, config)?;
//!
//! let query = generator.embed_query("how do I reset my password?").await?;
//! println!("query embedding has {} dimensions", query.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: Model, batching, and endpoint configuration
//! - [`provider`]: The [`EmbeddingProvider`] trait and its HTTP implementation
//! - [`generator`]: Batched chunk embedding with fallback
//! - [`similarity`]: Vector similarity functions
//! - [`error`]: Error types and result handling

pub mod config;
pub mod error;
pub mod generator;
pub mod provider;
pub mod similarity;

pub use config::{DEFAULT_DIMENSIONS, DEFAULT_MODEL, EmbedConfig};
pub use error::{EmbedError, Result};
pub use generator::{EmbeddedChunk, EmbeddingGenerator};
pub use provider::{EmbeddingProvider, OpenAiProvider};
pub use similarity::cosine_similarity;
