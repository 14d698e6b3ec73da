//! # docpipe-chunk
//!
//! Text segmentation for the docpipe retrieval pipeline.
//!
//! This crate turns one document's raw text into an ordered sequence of
//! [`Chunk`]s sized for an embedding model's context window. Chunks carry
//! best-effort character offsets into the original document, a structural
//! [`ChunkKind`] tag, and a rough token estimate.
//!
//! Two splitting strategies are available, selected by file type:
//!
//! - **Paragraph-aware**: markdown and document content is split on blank
//!   lines and paragraphs are accumulated until the configured chunk size
//!   would be exceeded. Used when the content actually has paragraph
//!   structure; degrades to the sentence pass otherwise.
//! - **Sentence-aware**: plain text (and the fallback path) accumulates
//!   sentences matched by `[^.!?]+[.!?]+`.
//!
//! Consecutive chunks overlap by `chunk_overlap` characters so context is
//! not lost at chunk boundaries; the overlap tail is trimmed forward to a
//! sentence boundary when one exists inside it.
//!
//! ## Quick Start
//!
//! ```
//! use docpipe_chunk::{ChunkConfig, DocumentChunker};
//!
//! let chunker = DocumentChunker::new(ChunkConfig::default()).unwrap();
//! let chunks = chunker.chunk_document("First paragraph.\n\nSecond paragraph.", "markdown");
//! assert!(!chunks.is_empty());
//! ```

pub mod text;

pub use text::{
    Chunk, ChunkConfig, ChunkError, ChunkKind, DocumentChunker, detect_file_type, preprocess,
    validate_document,
};
