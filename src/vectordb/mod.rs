//! Vector store abstraction and its backends.
//!
//! [`VectorStore`] is the only surface the pipeline depends on. Backends are chosen once at
//! startup through [`create_vector_store`]:
//!
//! - [`SqliteVectorStore`]: embedded persistent index in a single SQLite file (default).
//! - [`QdrantVectorStore`]: remote Qdrant instance over its REST API.
//!
//! Collections are isolated namespaces that fix their embedding size and distance metric at
//! creation. Inserts are written in fixed-size windows; a failed window aborts the remaining
//! ones while earlier windows stay persisted, and the error reports how many records made it.

pub mod distance;
pub mod qdrant;
pub mod sqlite;
pub mod types;

pub use distance::DistanceMetric;
pub use qdrant::QdrantVectorStore;
pub use sqlite::SqliteVectorStore;
pub use types::{
    CollectionInfo, MetadataFilter, QueryHit, QueryResult, Record, VectorStoreError,
};

use crate::config::{Config, VectorDbBackend};
use async_trait::async_trait;
use std::sync::Arc;

/// Backend-independent collection lifecycle, record writes, and nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Acquire the backend connection. Calling it while connected is a no-op.
    async fn connect(&self) -> Result<(), VectorStoreError>;

    /// Release the backend connection. Calling it while disconnected is a no-op.
    async fn disconnect(&self) -> Result<(), VectorStoreError>;

    /// Query the backend catalog for the named collection.
    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError>;

    /// Names of every collection in the backend catalog.
    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError>;

    /// Catalog entry and record count for the named collection.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, VectorStoreError>;

    /// Create a collection.
    ///
    /// With `do_reset` an existing collection is deleted first. Without it an existing
    /// collection is left untouched, provided its metric and size agree with the request.
    async fn create_collection(
        &self,
        name: &str,
        embedding_size: usize,
        distance: DistanceMetric,
        do_reset: bool,
    ) -> Result<(), VectorStoreError>;

    /// Delete a collection and all its records; absent collections are ignored.
    async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError>;

    /// Insert records in windows of `batch_size`, returning the number persisted.
    ///
    /// Each window is one atomic backend call. A rejected window yields
    /// [`VectorStoreError::InsertAborted`] carrying the count committed before it.
    async fn insert_many(
        &self,
        name: &str,
        records: Vec<Record>,
        batch_size: usize,
    ) -> Result<usize, VectorStoreError>;

    /// Insert a single record.
    async fn insert_one(&self, name: &str, record: Record) -> Result<(), VectorStoreError> {
        self.insert_many(name, vec![record], 1).await.map(|_| ())
    }

    /// Return at most `limit` records nearest to `vector`, optionally filtered by metadata.
    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<QueryResult, VectorStoreError>;

    /// Number of records stored in the collection.
    async fn count(&self, name: &str) -> Result<usize, VectorStoreError> {
        self.collection_info(name).await.map(|info| info.record_count)
    }
}

/// Build the vector store selected by `VECTOR_DB_BACKEND`. The store is not yet connected.
pub fn create_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.vector_db_backend {
        VectorDbBackend::Sqlite => {
            tracing::info!(path = %config.vector_db_path.display(), "Using SQLite vector store");
            Ok(Arc::new(SqliteVectorStore::new(config.vector_db_path.clone())))
        }
        VectorDbBackend::Qdrant => {
            let url = config.qdrant_url.as_deref().ok_or_else(|| {
                VectorStoreError::InvalidConfig("QDRANT_URL is required for the qdrant backend".into())
            })?;
            tracing::info!(url, "Using Qdrant vector store");
            Ok(Arc::new(QdrantVectorStore::new(
                url,
                config.qdrant_api_key.clone(),
            )?))
        }
    }
}
