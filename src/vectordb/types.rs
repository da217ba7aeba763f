//! Shared types used by the vector store abstraction and its backends.

use super::distance::DistanceMetric;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Equality predicates over record metadata, passed through to the backend's native filter.
pub type MetadataFilter = Map<String, Value>;

/// Errors returned while interacting with a vector store backend.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Operation issued before `connect` (or after `disconnect`).
    #[error("Vector store is not connected")]
    NotConnected,
    /// Named collection is absent from the backend catalog.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// Collection already exists with a different distance metric.
    #[error(
        "Collection '{collection}' uses the {existing} metric; {requested} was requested"
    )]
    MetricMismatch {
        /// Collection that was being created.
        collection: String,
        /// Metric fixed when the collection was first created.
        existing: DistanceMetric,
        /// Metric requested by the caller.
        requested: DistanceMetric,
    },
    /// Vector dimensionality does not match the collection.
    #[error("Collection '{collection}' expects {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch {
        /// Collection being written or searched.
        collection: String,
        /// Dimensionality declared at creation.
        expected: usize,
        /// Dimensionality supplied by the caller.
        actual: usize,
    },
    /// Batch size of zero requested for an insert.
    #[error("Insert batch size must be greater than zero")]
    InvalidBatchSize,
    /// An insert window was rejected; earlier windows remain persisted.
    #[error("Insert into '{collection}' aborted after {committed} committed records: {source}")]
    InsertAborted {
        /// Collection being written.
        collection: String,
        /// Records persisted by earlier windows before the failure.
        committed: usize,
        /// Failure raised by the rejected window.
        #[source]
        source: Box<VectorStoreError>,
    },
    /// Persisted catalog data could not be interpreted.
    #[error("Corrupt catalog entry: {0}")]
    Corrupt(String),
    /// Local filesystem preparation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// SQLite backend failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Remote backend responded with an unexpected status code.
    #[error("Unexpected backend response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Backend configuration could not be applied.
    #[error("Invalid vector store configuration: {0}")]
    InvalidConfig(String),
}

/// Unit persisted in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Identifier unique within the collection.
    pub id: String,
    /// Chunk text returned to callers at query time.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Provenance metadata (`project_id`, `file_id`, `chunk_index`, ...).
    pub metadata: Map<String, Value>,
}

/// Catalog description of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Dimensionality of every vector in the collection.
    pub embedding_size: usize,
    /// Metric fixed at creation.
    pub distance: DistanceMetric,
    /// Number of records currently stored.
    pub record_count: usize,
}

/// Single nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    /// Record identifier.
    pub id: String,
    /// Stored chunk text.
    pub text: String,
    /// Stored metadata.
    pub metadata: Map<String, Value>,
    /// Distance to the query vector under the collection metric.
    pub distance: f32,
}

/// Search results ordered nearest-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Hits sorted by ascending distance.
    pub hits: Vec<QueryHit>,
}

impl QueryResult {
    /// Sort hits nearest-first and keep at most `limit`.
    pub(crate) fn from_unsorted(mut hits: Vec<QueryHit>, limit: usize) -> Self {
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Self { hits }
    }

    /// Whether the search produced no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Number of hits.
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    /// Hit texts in nearest-first order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|hit| hit.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, distance: f32) -> QueryHit {
        QueryHit {
            id: id.into(),
            text: format!("text-{id}"),
            metadata: Map::new(),
            distance,
        }
    }

    #[test]
    fn from_unsorted_orders_and_truncates() {
        let result =
            QueryResult::from_unsorted(vec![hit("c", 0.9), hit("a", 0.1), hit("b", 0.5)], 2);
        let ids: Vec<_> = result.hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(result.texts().collect::<Vec<_>>(), vec!["text-a", "text-b"]);
    }

    #[test]
    fn insert_aborted_reports_committed_count() {
        let error = VectorStoreError::InsertAborted {
            collection: "p_f".into(),
            committed: 50,
            source: Box::new(VectorStoreError::DimensionMismatch {
                collection: "p_f".into(),
                expected: 4,
                actual: 3,
            }),
        };
        let message = error.to_string();
        assert!(message.contains("50 committed"));
        assert!(message.contains("expects 4-dimensional"));
    }
}
