//! Document preprocessing and chunking.
//!
//! The splitting algorithm is a single accumulation loop shared by both
//! strategies: walk the units (paragraphs or sentences) in order, append
//! them to a running buffer, and emit the buffer as a [`Chunk`] whenever
//! the next unit would push it past `chunk_size`. The emitted chunk's tail
//! (last `chunk_overlap` characters, trimmed forward to a sentence
//! boundary when one exists) seeds the next buffer so neighbouring chunks
//! share context.
//!
//! Offsets recorded on chunks are running character offsets maintained
//! across iterations. Once overlap splicing shifts content they become
//! approximate; they are for traceability and debugging, not exact byte
//! positioning.
//!
//! A single paragraph or sentence larger than `chunk_size` is emitted as
//! its own oversized chunk rather than split mid-unit. This is a known
//! limitation of the base algorithm.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Maximum accepted document size in bytes (1 MiB).
pub const MAX_DOCUMENT_BYTES: usize = 1_000_000;

/// Errors produced while configuring or running the chunker.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// The chunking configuration is unusable and must be fixed by the caller.
    #[error("invalid chunking configuration: {message}")]
    InvalidConfig { message: String },

    /// The paragraph-aware pass found nothing to split on.
    #[error("no paragraph boundaries in {len} characters of text")]
    NoParagraphBoundaries { len: usize },

    /// The document failed validation before chunking.
    #[error("invalid document: {message}")]
    InvalidDocument { message: String },
}

/// Structural origin of a chunk's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Paragraph,
    Heading,
    List,
    Code,
    Text,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Paragraph => "paragraph",
            ChunkKind::Heading => "heading",
            ChunkKind::List => "list",
            ChunkKind::Code => "code",
            ChunkKind::Text => "text",
        }
    }
}

/// A bounded segment of a document's text, prepared for embedding.
///
/// Chunks are created once by [`DocumentChunker`] in a single pass over the
/// document and are immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// The segment's text. Never empty after trimming.
    pub content: String,
    /// Approximate character offset of this chunk in the original document.
    pub start_index: usize,
    /// `start_index + content.len()`; approximate, like `start_index`.
    pub end_index: usize,
    /// Structural tag describing where the segment came from.
    pub kind: ChunkKind,
    /// Rough token count: `ceil(content.len() / 4)`. Not a tokenizer count.
    pub estimated_tokens: usize,
}

impl Chunk {
    fn new(content: String, start_index: usize, kind: ChunkKind) -> Self {
        let estimated_tokens = content.len().div_ceil(4);
        let end_index = start_index + content.len();
        Self {
            content,
            start_index,
            end_index,
            kind,
            estimated_tokens,
        }
    }
}

/// Chunk sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target maximum characters per chunk. Soft: an emitted chunk can
    /// exceed this by the joiner between its units, or arbitrarily for a
    /// single oversized unit.
    pub chunk_size: usize,
    /// Characters carried from the tail of one chunk into the head of the next.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    /// Create a configuration, failing fast when the overlap is not strictly
    /// smaller than the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidConfig {
                message: "chunk_size must be greater than zero".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkError::InvalidConfig {
                message: format!(
                    "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
                ),
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

fn sentence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^.!?]+[.!?]+").unwrap())
}

fn sentence_boundary_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+").unwrap())
}

fn horizontal_rule_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-{3,}|={3,}|_{3,}|\*{3,})$").unwrap())
}

fn page_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Page \d+$").unwrap())
}

fn list_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([-*+]|\d+\.)\s").unwrap())
}

fn horizontal_space_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").unwrap())
}

/// Clean a document before chunking.
///
/// Collapses runs of horizontal whitespace to a single space, trims each
/// line, strips horizontal-rule-only lines and standalone `Page N` lines,
/// normalizes curly quotes to straight quotes, and limits blank-line runs
/// to a single blank line. Paragraph boundaries (blank lines) survive so
/// the paragraph-aware splitter still has something to split on.
pub fn preprocess(text: &str) -> String {
    let text = text
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");

    let mut lines: Vec<String> = Vec::new();
    for raw_line in text.lines() {
        let line = horizontal_space_regex().replace_all(raw_line, " ");
        let line = line.trim();
        if horizontal_rule_regex().is_match(line) || page_number_regex().is_match(line) {
            continue;
        }
        // Collapse blank-line runs as we go
        if line.is_empty() && lines.last().is_some_and(|prev| prev.is_empty()) {
            continue;
        }
        lines.push(line.to_string());
    }

    lines.join("\n").trim().to_string()
}

/// Detect a coarse file type from a filename extension, falling back to
/// sniffing the content for markdown markers.
pub fn detect_file_type(filename: &str, content: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "md" | "markdown" => "markdown",
        "txt" => "text",
        "pdf" => "pdf",
        "doc" | "docx" => "document",
        "json" => "json",
        "rs" | "ts" | "tsx" | "js" | "jsx" | "py" | "go" | "java" => "code",
        _ => {
            if content.contains("```") || content.contains("# ") {
                "markdown"
            } else {
                "text"
            }
        }
    }
}

/// Validate a document before it enters the pipeline.
///
/// Rejects empty (or whitespace-only) documents and documents larger than
/// [`MAX_DOCUMENT_BYTES`].
pub fn validate_document(content: &str) -> Result<(), ChunkError> {
    if content.trim().is_empty() {
        return Err(ChunkError::InvalidDocument {
            message: "document is empty".to_string(),
        });
    }
    if content.len() > MAX_DOCUMENT_BYTES {
        return Err(ChunkError::InvalidDocument {
            message: format!(
                "document is too large ({} bytes, max {})",
                content.len(),
                MAX_DOCUMENT_BYTES
            ),
        });
    }
    Ok(())
}

/// Splits one document's text into an ordered sequence of [`Chunk`]s.
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    config: ChunkConfig,
}

impl DocumentChunker {
    /// Create a chunker, validating the configuration first.
    pub fn new(config: ChunkConfig) -> Result<Self, ChunkError> {
        // Re-check here so deserialized or hand-built configs fail fast too.
        let config = ChunkConfig::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunk a document, choosing the strategy from the caller-supplied
    /// file type.
    ///
    /// Markdown and document content goes through the paragraph-aware pass
    /// first; if that pass fails for any reason the chunker falls back to
    /// the sentence-aware pass instead of propagating the error. Everything
    /// else goes straight to the sentence-aware pass.
    ///
    /// An empty document yields zero chunks.
    pub fn chunk_document(&self, text: &str, file_type: &str) -> Vec<Chunk> {
        let cleaned = preprocess(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        if matches!(file_type, "markdown" | "document") {
            match self.paragraph_chunks(&cleaned) {
                Ok(chunks) => return chunks,
                Err(error) => {
                    tracing::warn!(%error, "paragraph chunking failed, falling back to sentences");
                }
            }
        }

        self.sentence_chunks(&cleaned)
    }

    /// Paragraph-aware pass: accumulate blank-line-separated paragraphs.
    fn paragraph_chunks(&self, text: &str) -> Result<Vec<Chunk>, ChunkError> {
        let paragraphs: Vec<&str> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        // A long document with no paragraph structure would collapse into a
        // single oversized chunk here; the sentence pass handles it better.
        if paragraphs.len() <= 1 && text.len() > self.config.chunk_size {
            return Err(ChunkError::NoParagraphBoundaries { len: text.len() });
        }

        Ok(self.accumulate(&paragraphs, "\n\n", ChunkKind::Paragraph))
    }

    /// Sentence-aware pass: accumulate regex-split sentences. The whole text
    /// counts as one sentence when no terminator is found.
    fn sentence_chunks(&self, text: &str) -> Vec<Chunk> {
        let sentences: Vec<&str> = {
            let matched: Vec<&str> = sentence_regex()
                .find_iter(text)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty())
                .collect();
            if matched.is_empty() {
                vec![text]
            } else {
                matched
            }
        };

        self.accumulate(&sentences, " ", ChunkKind::Text)
    }

    /// Shared accumulation loop over paragraphs or sentences.
    fn accumulate(&self, units: &[&str], joiner: &str, default_kind: ChunkKind) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current = String::new();
        let mut current_start = 0usize;

        for unit in units {
            // The joiner is not counted, so a buffer can exceed chunk_size
            // by up to joiner.len() after an exact-capacity append.
            let would_overflow = current.len() + unit.len() > self.config.chunk_size;

            if would_overflow && !current.is_empty() {
                let content = current.trim().to_string();
                let emitted_len = content.len();
                chunks.push(Chunk::new(
                    content,
                    current_start,
                    classify(&current, default_kind),
                ));

                // Seed the next buffer with the overlap tail of what we just
                // emitted, then the unit that triggered the overflow.
                let overlap = self.overlap_tail(&current);
                current_start += emitted_len.saturating_sub(overlap.len());
                current = if overlap.is_empty() {
                    unit.to_string()
                } else {
                    format!("{overlap} {unit}")
                };
            } else {
                if !current.is_empty() {
                    current.push_str(joiner);
                }
                current.push_str(unit);
            }
        }

        if !current.trim().is_empty() {
            let content = current.trim().to_string();
            chunks.push(Chunk::new(
                content,
                current_start,
                classify(&current, default_kind),
            ));
        }

        chunks
    }

    /// Last `chunk_overlap` characters of a chunk, trimmed forward to the
    /// nearest sentence boundary found inside the tail (when one exists).
    fn overlap_tail(&self, chunk: &str) -> String {
        let overlap = self.config.chunk_overlap;
        if overlap == 0 {
            return String::new();
        }

        let char_count = chunk.chars().count();
        if char_count <= overlap {
            return chunk.trim().to_string();
        }

        // Char-based so we never slice inside a UTF-8 sequence.
        let tail_start = chunk
            .char_indices()
            .nth(char_count - overlap)
            .map(|(i, _)| i)
            .unwrap_or(0);
        let tail = &chunk[tail_start..];

        match sentence_boundary_regex().find(tail) {
            // Skip the terminator itself; keep the sentence that follows it.
            Some(m) => tail[m.start() + 1..].trim().to_string(),
            None => tail.trim().to_string(),
        }
    }
}

/// Classify the structural origin of an accumulated buffer.
fn classify(content: &str, default_kind: ChunkKind) -> ChunkKind {
    let trimmed = content.trim_start();
    if trimmed.contains("```") {
        ChunkKind::Code
    } else if trimmed.starts_with('#') {
        ChunkKind::Heading
    } else if list_marker_regex().is_match(trimmed) {
        ChunkKind::List
    } else {
        default_kind
    }
}
