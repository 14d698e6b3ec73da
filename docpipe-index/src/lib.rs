//! docpipe-index: Vector storage and semantic retrieval for documents
//!
//! This crate persists chunked, embedded documents in SQLite and answers
//! similarity queries over them. It sits at the end of the docpipe
//! pipeline: text is split by `docpipe-chunk`, embedded by `docpipe-embed`,
//! and stored and searched here.
//!
//! ## Key Modules
//!
//! - **[`storage`]**: SQLite-backed chunk, document-status, and model registry
//! - **[`retrieval`]**: Vector search, bulk storage, and the ingestion pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docpipe_chunk::{ChunkConfig, DocumentChunker};
//! use docpipe_embed::{EmbedConfig, EmbeddingGenerator, OpenAiProvider};
//! use docpipe_index::retrieval::{DocumentPipeline, SearchOptions, VectorIndex};
//! use docpipe_index::storage::{DocumentIndex, DocumentMetadata};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EmbedConfig::default().with_api_key("sk-...");
//! let provider = Arc::new(OpenAiProvider::new(config.clone())?);
//! let generator = EmbeddingGenerator::new(provider, config)?;
//!
//! let index = DocumentIndex::open(Path::new(".")).await?;
//! let vectors = VectorIndex::new(index, generator).await?;
//! let chunker = DocumentChunker::new(ChunkConfig::default())?;
//! let pipeline = DocumentPipeline::new(chunker, vectors);
//!
//! let report = pipeline
//!     .process_document("doc-1", "Some text...", "markdown", &DocumentMetadata::default())
//!     .await?;
//! println!("stored {} of {} chunks", report.stored, report.chunks);
//!
//! let hits = pipeline
//!     .vectors()
//!     .search("what does the text say?", &SearchOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Text → Chunker → EmbeddingGenerator → VectorIndex → SQLite
//!                                          ↓
//!                                     Search APIs
//! ```

pub mod retrieval;
pub mod storage;

pub use retrieval::{
    DocumentPipeline, IngestReport, SearchOptions, SearchResult, StoreOutcome, VectorIndex,
};
pub use storage::{
    DocumentIndex, DocumentMetadata, DocumentRecord, DocumentStatus, EmbeddingModelInfo, IndexStats,
};
