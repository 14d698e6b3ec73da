//! Retrieval layer: semantic search and the ingestion pipeline.
//!
//! [`VectorIndex`] wraps the storage layer with embedding-aware operations
//! (store embedded chunks, search by query text, re-embed, clean up), and
//! [`DocumentPipeline`] drives the full chunk → embed → store flow for one
//! document while keeping its status row current.

pub mod pipeline;
pub mod vector_index;

pub use pipeline::{DocumentPipeline, IngestReport};
pub use vector_index::{SearchOptions, SearchResult, StoreOutcome, VectorIndex};
