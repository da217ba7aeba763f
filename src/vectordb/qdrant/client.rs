//! HTTP client wrapper implementing the vector store contract on top of Qdrant.

use super::filters::{METADATA_KEY, build_metadata_filter};
use super::types::{
    CollectionInfoResponse, CountResponse, ListCollectionsResponse, QueryResponse,
    QueryResponseResult, metric_from_qdrant, metric_to_qdrant, score_to_distance,
};
use crate::vectordb::{
    CollectionInfo, DistanceMetric, MetadataFilter, QueryHit, QueryResult, Record, VectorStore,
    VectorStoreError,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;

/// Lightweight HTTP client for Qdrant operations.
pub struct QdrantVectorStore {
    base_url: String,
    api_key: Option<String>,
    client: RwLock<Option<Client>>,
}

impl QdrantVectorStore {
    /// Prepare a store for the Qdrant instance at `url`; nothing is contacted until `connect`.
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, VectorStoreError> {
        let base_url = normalize_base_url(url).map_err(VectorStoreError::InvalidConfig)?;
        Ok(Self {
            base_url,
            api_key,
            client: RwLock::new(None),
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, VectorStoreError> {
        let client = self
            .client
            .read()
            .await
            .clone()
            .ok_or(VectorStoreError::NotConnected)?;
        let url = format_endpoint(&self.base_url, path);
        Ok(self.authorize(client.request(method, url)))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_deref() {
            Some(api_key) if !api_key.is_empty() => req.header("api-key", api_key),
            _ => req,
        }
    }

    /// Fetch the collection's vector size and metric, or `None` when it does not exist.
    async fn describe(
        &self,
        name: &str,
    ) -> Result<Option<(usize, DistanceMetric)>, VectorStoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{name}"))
            .await?
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let payload: CollectionInfoResponse = response.json().await?;
                let vectors = payload.result.config.params.vectors;
                let metric = metric_from_qdrant(name, &vectors.distance)?;
                Ok(Some((vectors.size, metric)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorStoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = name, error = %error, "Collection lookup failed");
                Err(error)
            }
        }
    }

    async fn require(&self, name: &str) -> Result<(usize, DistanceMetric), VectorStoreError> {
        self.describe(name)
            .await?
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))
    }

    async fn upsert_window(
        &self,
        name: &str,
        embedding_size: usize,
        window: &[Record],
    ) -> Result<(), VectorStoreError> {
        if let Some(record) = window
            .iter()
            .find(|record| record.vector.len() != embedding_size)
        {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: embedding_size,
                actual: record.vector.len(),
            });
        }

        let points: Vec<Value> = window
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "vector": record.vector,
                    "payload": {
                        "text": record.text,
                        METADATA_KEY: record.metadata,
                    },
                })
            })
            .collect();

        let response = self
            .request(Method::PUT, &format!("collections/{name}/points"))
            .await?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn connect(&self) -> Result<(), VectorStoreError> {
        let mut guard = self.client.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let client = Client::builder().user_agent("docrag/0.1").build()?;
        let check = self
            .authorize(client.get(format_endpoint(&self.base_url, "collections")))
            .send()
            .await?;
        ensure_success(check).await?;

        tracing::debug!(
            url = %self.base_url,
            has_api_key = self.api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Qdrant vector store connected"
        );
        *guard = Some(client);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), VectorStoreError> {
        if self.client.write().await.take().is_some() {
            tracing::debug!(url = %self.base_url, "Qdrant vector store disconnected");
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, VectorStoreError> {
        Ok(self.describe(name).await?.is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let response = self
            .request(Method::GET, "collections")
            .await?
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(unexpected(response).await);
        }
        let payload: ListCollectionsResponse = response.json().await?;
        let mut names: Vec<String> = payload
            .result
            .collections
            .into_iter()
            .map(|collection| collection.name)
            .collect();
        names.sort();
        Ok(names)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, VectorStoreError> {
        let (embedding_size, distance) = self.require(name).await?;
        let response = self
            .request(Method::POST, &format!("collections/{name}/points/count"))
            .await?
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(unexpected(response).await);
        }
        let payload: CountResponse = response.json().await?;
        Ok(CollectionInfo {
            name: name.to_string(),
            embedding_size,
            distance,
            record_count: payload.result.count,
        })
    }

    async fn create_collection(
        &self,
        name: &str,
        embedding_size: usize,
        distance: DistanceMetric,
        do_reset: bool,
    ) -> Result<(), VectorStoreError> {
        match self.describe(name).await? {
            Some(_) if do_reset => self.delete_collection(name).await?,
            Some((existing_size, existing)) => {
                if existing != distance {
                    return Err(VectorStoreError::MetricMismatch {
                        collection: name.to_string(),
                        existing,
                        requested: distance,
                    });
                }
                if existing_size != embedding_size {
                    return Err(VectorStoreError::DimensionMismatch {
                        collection: name.to_string(),
                        expected: existing_size,
                        actual: embedding_size,
                    });
                }
                return Ok(());
            }
            None => {}
        }

        let body = json!({
            "vectors": {
                "size": embedding_size,
                "distance": metric_to_qdrant(distance),
            }
        });
        let response = self
            .request(Method::PUT, &format!("collections/{name}"))
            .await?
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection = name, embedding_size, distance = %distance, "Collection created");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{name}"))
            .await?
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await
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
        let (embedding_size, _) = self.require(name).await?;

        let mut committed = 0;
        for window in records.chunks(batch_size) {
            if let Err(source) = self.upsert_window(name, embedding_size, window).await {
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

        tracing::debug!(collection = name, records = committed, "Points indexed");
        Ok(committed)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<QueryResult, VectorStoreError> {
        let (embedding_size, metric) = self.require(name).await?;
        if vector.len() != embedding_size {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: embedding_size,
                actual: vector.len(),
            });
        }
        if limit == 0 {
            return Ok(QueryResult::default());
        }

        let mut body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter_value) = filter.and_then(build_metadata_filter)
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert("filter".into(), filter_value);
        }

        let response = self
            .request(Method::POST, &format!("collections/{name}/points/query"))
            .await?
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(VectorStoreError::CollectionNotFound(name.to_string()));
        }
        if !response.status().is_success() {
            let error = unexpected(response).await;
            tracing::error!(collection = name, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        let hits = points
            .into_iter()
            .map(|point| {
                let mut payload = point.payload.unwrap_or_default();
                let text = match payload.remove("text") {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                let metadata = match payload.remove(METADATA_KEY) {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                QueryHit {
                    id: stringify_point_id(point.id),
                    text,
                    metadata,
                    distance: score_to_distance(metric, point.score),
                }
            })
            .collect();

        Ok(QueryResult::from_unsorted(hits, limit))
    }
}

async fn unexpected(response: reqwest::Response) -> VectorStoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    VectorStoreError::UnexpectedStatus { status, body }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), VectorStoreError> {
    if response.status().is_success() {
        Ok(())
    } else {
        let error = unexpected(response).await;
        tracing::error!(error = %error, "Qdrant request failed");
        Err(error)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
