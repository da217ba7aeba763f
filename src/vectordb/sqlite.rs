//! Embedded vector store persisted in a single SQLite file.
//!
//! The `collections` table is the authoritative catalog: it records each collection's
//! embedding size and distance metric. Records live in `records`, one row per chunk, with the
//! vector stored as a little-endian `f32` BLOB and metadata as JSON text. Search is exact:
//! every row passing the metadata filter is scored with the collection metric.

use super::distance::{DistanceMetric, blob_to_vec, vec_to_blob};
use super::types::{
    CollectionInfo, MetadataFilter, QueryHit, QueryResult, Record, VectorStoreError,
};
use super::VectorStore;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::RwLock;

const MAX_CONNECTIONS: u32 = 5;

/// SQLite implementation of [`VectorStore`].
pub struct SqliteVectorStore {
    path: PathBuf,
    pool: RwLock<Option<SqlitePool>>,
}

#[derive(Debug, Clone, Copy)]
struct CatalogEntry {
    embedding_size: usize,
    distance: DistanceMetric,
}

impl SqliteVectorStore {
    /// Create a store backed by the database file at `path`; nothing is opened until `connect`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: RwLock::new(None),
        }
    }

    async fn pool(&self) -> Result<SqlitePool, VectorStoreError> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or(VectorStoreError::NotConnected)
    }

    async fn require_collection(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<CatalogEntry, VectorStoreError> {
        catalog_entry(conn, name)
            .await?
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))
    }

    async fn insert_window(
        pool: &SqlitePool,
        name: &str,
        entry: CatalogEntry,
        window: &[Record],
    ) -> Result<(), VectorStoreError> {
        if let Some(record) = window
            .iter()
            .find(|record| record.vector.len() != entry.embedding_size)
        {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: entry.embedding_size,
                actual: record.vector.len(),
            });
        }

        let mut tx = pool.begin().await?;
        for record in window {
            sqlx::query(
                "INSERT INTO records (collection, id, text, embedding, metadata_json) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(&record.id)
            .bind(&record.text)
            .bind(vec_to_blob(&record.vector))
            .bind(Value::Object(record.metadata.clone()).to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn connect(&self) -> Result<(), VectorStoreError> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        run_migrations(&pool).await?;

        tracing::debug!(path = %self.path.display(), "SQLite vector store connected");
        *guard = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VectorStoreError> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            tracing::debug!(path = %self.path.display(), "SQLite vector store disconnected");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;
        Ok(catalog_entry(&mut *conn, name).await?.is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let pool = self.pool().await?;
        let names = sqlx::query_scalar::<_, String>("SELECT name FROM collections ORDER BY name")
            .fetch_all(&pool)
            .await?;
        Ok(names)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, VectorStoreError> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;
        let entry = Self::require_collection(&mut *conn, name).await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        Ok(CollectionInfo {
            name: name.to_string(),
            embedding_size: entry.embedding_size,
            distance: entry.distance,
            record_count: usize::try_from(count).unwrap_or_default(),
        })
    }

    async fn create_collection(
        &self,
        name: &str,
        embedding_size: usize,
        distance: DistanceMetric,
        do_reset: bool,
    ) -> Result<(), VectorStoreError> {
        if embedding_size == 0 {
            return Err(VectorStoreError::InvalidConfig(
                "embedding size must be greater than zero".into(),
            ));
        }

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        match catalog_entry(&mut *tx, name).await? {
            Some(_) if do_reset => {
                delete_rows(&mut *tx, name).await?;
                tracing::debug!(collection = name, "Existing collection reset");
            }
            Some(entry) => {
                if entry.distance != distance {
                    return Err(VectorStoreError::MetricMismatch {
                        collection: name.to_string(),
                        existing: entry.distance,
                        requested: distance,
                    });
                }
                if entry.embedding_size != embedding_size {
                    return Err(VectorStoreError::DimensionMismatch {
                        collection: name.to_string(),
                        expected: entry.embedding_size,
                        actual: embedding_size,
                    });
                }
                return Ok(());
            }
            None => {}
        }

        let created_at = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO collections (name, embedding_size, distance, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(i64::try_from(embedding_size).unwrap_or(i64::MAX))
        .bind(distance.as_str())
        .bind(
            created_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| created_at.unix_timestamp().to_string()),
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(
            collection = name,
            embedding_size,
            distance = %distance,
            "Collection created"
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        delete_rows(&mut *tx, name).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_many(
        &self,
        name: &str,
        records: Vec<Record>,
        batch_size: usize,
    ) -> Result<usize, VectorStoreError> {
        if batch_size == 0 {
            return Err(VectorStoreError::InvalidBatchSize);
        }
        let pool = self.pool().await?;
        let entry = {
            let mut conn = pool.acquire().await?;
            Self::require_collection(&mut *conn, name).await?
        };

        let mut committed = 0;
        for window in records.chunks(batch_size) {
            if let Err(source) = Self::insert_window(&pool, name, entry, window).await {
                tracing::error!(
                    collection = name,
                    committed,
                    window = window.len(),
                    error = %source,
                    "Insert window rejected"
                );
                return Err(VectorStoreError::InsertAborted {
                    collection: name.to_string(),
                    committed,
                    source: Box::new(source),
                });
            }
            committed += window.len();
        }

        tracing::debug!(collection = name, records = committed, "Records inserted");
        Ok(committed)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<QueryResult, VectorStoreError> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;
        let entry = Self::require_collection(&mut *conn, name).await?;

        if vector.len() != entry.embedding_size {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: entry.embedding_size,
                actual: vector.len(),
            });
        }
        if limit == 0 {
            return Ok(QueryResult::default());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, text, embedding, metadata_json FROM records WHERE collection = ",
        );
        builder.push_bind(name);
        if let Some(filter) = filter {
            push_metadata_filter(&mut builder, filter);
        }
        builder.push(" ORDER BY rowid");

        let rows = builder.build().fetch_all(&mut *conn).await?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let embedding: Vec<u8> = row.try_get("embedding")?;
            let metadata_json: String = row.try_get("metadata_json")?;
            let metadata: Map<String, Value> =
                serde_json::from_str(&metadata_json).map_err(|error| {
                    VectorStoreError::Corrupt(format!("record metadata in '{name}': {error}"))
                })?;
            hits.push(QueryHit {
                id: row.try_get("id")?,
                text: row.try_get("text")?,
                distance: entry.distance.distance(vector, &blob_to_vec(&embedding)),
                metadata,
            });
        }

        tracing::trace!(collection = name, candidates = hits.len(), limit, "Scored candidates");
        Ok(QueryResult::from_unsorted(hits, limit))
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), VectorStoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            embedding_size INTEGER NOT NULL,
            distance TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
            id TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn catalog_entry(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<CatalogEntry>, VectorStoreError> {
    let row = sqlx::query("SELECT embedding_size, distance FROM collections WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let size: i64 = row.try_get("embedding_size")?;
    let distance: String = row.try_get("distance")?;
    let distance = distance
        .parse()
        .map_err(|error: String| VectorStoreError::Corrupt(format!("collection '{name}': {error}")))?;
    let embedding_size = usize::try_from(size).map_err(|_| {
        VectorStoreError::Corrupt(format!("collection '{name}': embedding size {size}"))
    })?;

    Ok(Some(CatalogEntry {
        embedding_size,
        distance,
    }))
}

async fn delete_rows(conn: &mut SqliteConnection, name: &str) -> Result<(), VectorStoreError> {
    sqlx::query("DELETE FROM records WHERE collection = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM collections WHERE name = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Append one `json_extract` equality predicate per filter entry.
fn push_metadata_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &MetadataFilter) {
    for (key, value) in filter {
        builder.push(" AND json_extract(metadata_json, ");
        builder.push_bind(json_path(key));
        match value {
            Value::Null => {
                builder.push(") IS NULL");
            }
            Value::Bool(flag) => {
                builder.push(") = ");
                builder.push_bind(i64::from(*flag));
            }
            Value::Number(number) => {
                builder.push(") = ");
                match number.as_i64() {
                    Some(int) => builder.push_bind(int),
                    None => builder.push_bind(number.as_f64().unwrap_or_default()),
                };
            }
            Value::String(text) => {
                builder.push(") = ");
                builder.push_bind(text.clone());
            }
            nested => {
                builder.push(") = json(");
                builder.push_bind(nested.to_string());
                builder.push(")");
            }
        }
    }
}

fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}
