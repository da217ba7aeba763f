//! Core data types and error definitions for the RAG pipeline.

use crate::{llm::LlmError, vectordb::MetadataFilter, vectordb::VectorStoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Default chunk size applied when an ingest request omits it.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap applied when an ingest request omits it.
pub const DEFAULT_OVERLAP_SIZE: usize = 50;
/// Default number of retrieved chunks for a query.
pub const DEFAULT_TOP_K: usize = 5;

/// Structural classification assigned to an element by the document parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Section title or heading; always opens a new chunk.
    Title,
    /// Running paragraph text.
    NarrativeText,
    /// Bullet or numbered list entry.
    ListItem,
    /// Table rendered as text; never split.
    Table,
    /// Image description or caption.
    Image,
    /// Page header.
    Header,
    /// Page footer.
    Footer,
    /// Page separator without text.
    PageBreak,
    /// Text the parser could not classify.
    UncategorizedText,
    /// Any tag not listed above.
    #[serde(other)]
    Other,
}

/// One parsed unit of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentElement {
    /// Element classification.
    #[serde(rename = "type")]
    pub kind: ElementKind,
    /// Raw element text.
    #[serde(default)]
    pub text: String,
    /// Optional table or image payload supplied by the parser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Page the element was found on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
}

impl ContentElement {
    /// Build an element from its kind and text.
    pub fn new(kind: ElementKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            payload: None,
            page_number: None,
        }
    }
}

/// Bounded-size group of elements used as the retrieval unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text; never empty after trimming.
    pub text: String,
    /// Identifier of the originating document.
    pub document_id: String,
    /// Ordinal position within the document.
    pub index: usize,
    /// Length of `text` in characters.
    pub length: usize,
    /// Whether the chunk holds a single table element.
    pub is_table: bool,
}

/// Errors produced while configuring the chunker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Sizes supplied by the caller cannot produce bounded chunks.
    #[error("invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),
}

/// Stable failure classification reported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller supplied impossible chunk sizes.
    InvalidChunkConfig,
    /// Nothing could be indexed.
    ProcessingFailed,
    /// The question could not be embedded.
    EmbeddingFailed,
    /// The generation backend produced no answer.
    GenerationFailed,
    /// The target collection does not exist.
    CollectionNotFound,
    /// A collection was reused with a different distance metric.
    MetricMismatch,
    /// Retrieval found no passages.
    NoResults,
    /// The query request was malformed.
    InvalidQuery,
    /// Any other vector store failure.
    VectorStore,
}

impl ErrorKind {
    /// Machine-readable signal string reported to API consumers.
    pub fn signal(self) -> &'static str {
        match self {
            Self::InvalidChunkConfig => "invalid_chunk_config",
            Self::ProcessingFailed => "processing_failed",
            Self::EmbeddingFailed => "embedding_failed",
            Self::GenerationFailed => "generation_failed",
            Self::CollectionNotFound => "collection_not_found",
            Self::MetricMismatch => "metric_mismatch",
            Self::NoResults => "no_results",
            Self::InvalidQuery => "invalid_query",
            Self::VectorStore => "vector_store_error",
        }
    }
}

/// Failures surfaced by [`crate::processing::RagApi`] operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Chunk sizes were rejected.
    #[error(transparent)]
    InvalidChunkConfig(#[from] ChunkingError),
    /// Chunking, embedding or storage left nothing indexed.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),
    /// The question embedding could not be produced.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(#[source] LlmError),
    /// The generation backend failed or returned nothing.
    #[error("generation failed: {0}")]
    GenerationFailed(#[source] LlmError),
    /// The collection for the requested document does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    /// The collection exists with a different distance metric.
    #[error("{0}")]
    MetricMismatch(#[source] VectorStoreError),
    /// Retrieval returned no passages.
    #[error("no results for collection {0}")]
    NoResults(String),
    /// The query request was rejected before any backend call.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Unclassified vector store failure.
    #[error("vector store failure: {0}")]
    VectorStore(#[source] VectorStoreError),
}

impl RagError {
    /// Stable classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidChunkConfig(_) => ErrorKind::InvalidChunkConfig,
            Self::ProcessingFailed(_) => ErrorKind::ProcessingFailed,
            Self::EmbeddingFailed(_) => ErrorKind::EmbeddingFailed,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::CollectionNotFound(_) => ErrorKind::CollectionNotFound,
            Self::MetricMismatch(_) => ErrorKind::MetricMismatch,
            Self::NoResults(_) => ErrorKind::NoResults,
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::VectorStore(_) => ErrorKind::VectorStore,
        }
    }
}

impl From<VectorStoreError> for RagError {
    fn from(error: VectorStoreError) -> Self {
        match error {
            VectorStoreError::CollectionNotFound(name) => Self::CollectionNotFound(name),
            error @ VectorStoreError::MetricMismatch { .. } => Self::MetricMismatch(error),
            other => Self::VectorStore(other),
        }
    }
}

/// Parameters of an ingest operation.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Owning project.
    pub project_id: String,
    /// Document within the project.
    pub file_id: String,
    /// Parsed elements in document order.
    pub elements: Vec<ContentElement>,
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap carried between consecutive chunks.
    pub overlap_size: usize,
}

impl IngestRequest {
    /// Build a request using the default chunk and overlap sizes.
    pub fn new(
        project_id: impl Into<String>,
        file_id: impl Into<String>,
        elements: Vec<ContentElement>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            file_id: file_id.into(),
            elements,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

/// Summary of a completed ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Records persisted for the document.
    pub chunks_stored: usize,
    /// Collection that now holds the document.
    pub collection: String,
    /// Chunks dropped because their embedding failed.
    pub embedding_failures: usize,
}

/// Parameters of a query operation.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Owning project.
    pub project_id: String,
    /// Document to search.
    pub file_id: String,
    /// Natural-language question.
    pub question: String,
    /// Maximum number of passages to retrieve.
    pub top_k: usize,
    /// Additional metadata equality predicates.
    pub metadata_filter: Option<MetadataFilter>,
}

impl QueryRequest {
    /// Build a request with the default `top_k` and no extra filter.
    pub fn new(
        project_id: impl Into<String>,
        file_id: impl Into<String>,
        question: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            file_id: file_id.into(),
            question: question.into(),
            top_k: DEFAULT_TOP_K,
            metadata_filter: None,
        }
    }
}

/// Retrieved passage cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    /// Passage text.
    pub text: String,
    /// Document the passage came from.
    pub file_id: String,
    /// Ordinal of the passage within its document, when recorded.
    pub chunk_index: Option<usize>,
}

impl Source {
    pub(crate) fn from_metadata(text: String, metadata: &Map<String, Value>, file_id: &str) -> Self {
        Self {
            text,
            file_id: metadata
                .get("file_id")
                .and_then(Value::as_str)
                .unwrap_or(file_id)
                .to_string(),
            chunk_index: metadata
                .get("chunk_index")
                .and_then(Value::as_u64)
                .and_then(|value| usize::try_from(value).ok()),
        }
    }
}

/// Generated answer with its supporting passages, nearest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    /// Generated answer text.
    pub answer: String,
    /// Passages used as context.
    pub sources: Vec<Source>,
}

/// Collection name for a `(project, file)` pair.
pub fn collection_name(project_id: &str, file_id: &str) -> String {
    format!("{project_id}_{file_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectordb::DistanceMetric;
    use serde_json::json;

    #[test]
    fn elements_deserialize_with_unknown_kinds() {
        let elements: Vec<ContentElement> = serde_json::from_value(json!([
            { "type": "Title", "text": "Intro" },
            { "type": "Table", "text": "a | b", "payload": { "rows": 1 }, "page_number": 2 },
            { "type": "FigureCaption", "text": "caption" }
        ]))
        .expect("elements");

        assert_eq!(elements[0].kind, ElementKind::Title);
        assert_eq!(elements[1].page_number, Some(2));
        assert_eq!(elements[2].kind, ElementKind::Other);
    }

    #[test]
    fn store_errors_map_to_distinct_kinds() {
        let missing: RagError = VectorStoreError::CollectionNotFound("p_f".into()).into();
        assert_eq!(missing.kind(), ErrorKind::CollectionNotFound);

        let mismatch: RagError = VectorStoreError::MetricMismatch {
            collection: "p_f".into(),
            existing: DistanceMetric::L2,
            requested: DistanceMetric::Cosine,
        }
        .into();
        assert_eq!(mismatch.kind().signal(), "metric_mismatch");

        let other: RagError = VectorStoreError::NotConnected.into();
        assert_eq!(other.kind(), ErrorKind::VectorStore);
    }

    #[test]
    fn sources_read_provenance_from_metadata() {
        let metadata = json!({ "file_id": "report", "chunk_index": 3 });
        let source = Source::from_metadata(
            "text".into(),
            metadata.as_object().expect("object"),
            "fallback",
        );
        assert_eq!(source.file_id, "report");
        assert_eq!(source.chunk_index, Some(3));
    }

    #[test]
    fn collection_names_are_stable() {
        assert_eq!(collection_name("proj", "file-1"), "proj_file-1");
    }
}
