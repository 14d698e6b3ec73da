//! Persistent storage layer for documents, chunks, and embeddings.
//!
//! The storage layer is a single SQLite database managed by
//! [`DocumentIndex`]. It tracks three kinds of rows:
//!
//! - **Source documents**: one row per ingested document, carrying its
//!   processing status (`pending` → `processing` → `completed` | `failed`)
//! - **Chunk records**: the searchable units, each holding chunk text, its
//!   position in the source document, metadata, and an optional embedding
//! - **Embedding models**: dimension and provider info for every model that
//!   has written vectors into the index, so vectors from incompatible
//!   models are never compared

pub mod document_index;

pub use document_index::DocumentIndex;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Processing state of a source document.
///
/// Transitions are linear: `Pending` → `Processing` → `Completed` or
/// `Failed`. A failed document can be re-submitted, which restarts the
/// cycle at `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to every chunk record.
///
/// The narrow fields are the ones search filters understand directly;
/// anything else goes into `extra` and is still filterable by exact match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl DocumentMetadata {
    /// Exact-match lookup used by search filters. Narrow fields take
    /// precedence over `extra` when a key appears in both.
    pub fn matches(&self, key: &str, value: &str) -> bool {
        let narrow = match key {
            "title" => self.title.as_deref(),
            "source" => self.source.as_deref(),
            "project_id" => self.project_id.as_deref(),
            "file_type" => self.file_type.as_deref(),
            _ => None,
        };
        match narrow {
            Some(found) => found == value,
            None => self.extra.get(key).map(String::as_str) == Some(value),
        }
    }
}

/// A persisted chunk row.
///
/// `content` is nullable in the database: a row whose content was cleared
/// while its embedding remains is an orphan, and
/// [`DocumentIndex::cleanup_orphans`] removes it.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    /// Database ID (None for new records, Some once persisted)
    pub id: Option<i64>,
    /// ID of the source document this chunk belongs to
    pub source_id: String,
    /// Position of this chunk within its source document
    pub chunk_index: usize,
    /// Byte offset of the chunk start in the preprocessed document
    pub start_index: usize,
    /// Byte offset one past the chunk end
    pub end_index: usize,
    /// Structural kind of the chunk ("paragraph", "heading", ...)
    pub kind: String,
    /// Chunk text; None marks an orphaned row
    pub content: Option<String>,
    /// Embedding vector, if one has been generated
    pub embedding: Option<Vec<f32>>,
    pub metadata: DocumentMetadata,
    /// ID of the model that produced the embedding
    pub model_id: Option<String>,
}

/// Registered embedding model, keyed by `model_id`.
///
/// All vectors stored under one `model_id` share a dimension; registration
/// rejects a model whose dimension disagrees with an earlier registration
/// of the same ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    pub model_id: String,
    pub provider: String,
    pub dimension: usize,
}

impl EmbeddingModelInfo {
    pub fn new(model_id: impl Into<String>, provider: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            provider: provider.into(),
            dimension,
        }
    }
}

/// Counts reported by [`DocumentIndex::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub embedded_chunks: usize,
    pub models: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("unknown"), None);
    }

    #[test]
    fn test_metadata_matches_narrow_and_extra() {
        let mut metadata = DocumentMetadata {
            project_id: Some("proj-1".into()),
            file_type: Some("markdown".into()),
            ..Default::default()
        };
        metadata.extra.insert("team".into(), "platform".into());

        assert!(metadata.matches("project_id", "proj-1"));
        assert!(!metadata.matches("project_id", "proj-2"));
        assert!(metadata.matches("team", "platform"));
        assert!(!metadata.matches("team", "infra"));
        assert!(!metadata.matches("missing", "anything"));
    }

    #[test]
    fn test_metadata_json_skips_empty_fields() {
        let metadata = DocumentMetadata::default();
        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, "{}");
    }
}
