//! HTTP surface for docrag.
//!
//! A compact Axum router nested under `/api/v1`:
//!
//! - `GET /api/v1/` – Application name and version.
//! - `GET /api/v1/metrics` – Ingestion and query counters.
//! - `POST /api/v1/data/process/:project_id` – Chunk, embed and index parsed document elements.
//!   Body `{ file_id, elements, chunk_size?, overlap_size? }`; returns
//!   `{ signal, chunks_stored, collection, embedding_failures }`.
//! - `POST /api/v1/data/query/:project_id` – Answer a question from one document.
//!   Body `{ file_id, question, top_k?, metadata_filter? }`; returns `{ answer, sources }`.
//!
//! Failures are reported as `{ signal, message }` with a status and signal per error kind.
//! Bodies that fail to decode keep axum's rejection status and use the `invalid_request` signal.
//! Ingests of the same document are serialized through [`IngestLocks`].

use crate::processing::types::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_SIZE, DEFAULT_TOP_K};
use crate::processing::{
    ContentElement, ErrorKind, IngestRequest, QueryAnswer, QueryRequest, RagApi, RagError,
    collection_name,
};
use crate::vectordb::MetadataFilter;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequest, Path, Request, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Name and version reported by the root endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
}

/// Per-collection async mutexes that keep concurrent re-ingests of one document apart.
#[derive(Clone, Default)]
pub struct IngestLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl IngestLocks {
    /// Wait for exclusive ingest access to `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

struct AppState<S> {
    service: Arc<S>,
    info: AppInfo,
    locks: IngestLocks,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            info: self.info.clone(),
            locks: self.locks.clone(),
        }
    }
}

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>, info: AppInfo) -> Router
where
    S: RagApi + 'static,
{
    let state = AppState {
        service,
        info,
        locks: IngestLocks::default(),
    };
    let api = Router::new()
        .route("/", get(welcome::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/data/process/:project_id", post(process_document::<S>))
        .route("/data/query/:project_id", post(query_document::<S>))
        .with_state(state);
    Router::new().nest("/api/v1", api)
}

async fn welcome<S>(State(state): State<AppState<S>>) -> Json<AppInfo> {
    Json(state.info)
}

async fn get_metrics<S>(
    State(state): State<AppState<S>>,
) -> Json<crate::metrics::MetricsSnapshot>
where
    S: RagApi,
{
    Json(state.service.metrics_snapshot())
}

/// Request body for the process endpoint.
#[derive(Deserialize)]
struct ProcessBody {
    file_id: String,
    #[serde(default)]
    elements: Vec<ContentElement>,
    #[serde(default = "default_chunk_size")]
    chunk_size: usize,
    #[serde(default = "default_overlap_size")]
    overlap_size: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_overlap_size() -> usize {
    DEFAULT_OVERLAP_SIZE
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Serialize)]
struct ProcessResponse {
    signal: &'static str,
    chunks_stored: usize,
    collection: String,
    embedding_failures: usize,
}

/// Chunk, embed and index a document, replacing its previous index.
async fn process_document<S>(
    State(state): State<AppState<S>>,
    Path(project_id): Path<String>,
    ApiJson(body): ApiJson<ProcessBody>,
) -> Result<Json<ProcessResponse>, AppError>
where
    S: RagApi,
{
    let ProcessBody {
        file_id,
        elements,
        chunk_size,
        overlap_size,
    } = body;

    let _guard = state
        .locks
        .acquire(&collection_name(&project_id, &file_id))
        .await;
    let outcome = state
        .service
        .ingest(IngestRequest {
            project_id,
            file_id,
            elements,
            chunk_size,
            overlap_size,
        })
        .await?;

    Ok(Json(ProcessResponse {
        signal: "processing_success",
        chunks_stored: outcome.chunks_stored,
        collection: outcome.collection,
        embedding_failures: outcome.embedding_failures,
    }))
}

/// Request body for the query endpoint.
#[derive(Deserialize)]
struct QueryBody {
    file_id: String,
    #[serde(default)]
    question: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    metadata_filter: Option<MetadataFilter>,
}

/// Answer a question from the passages of one document.
async fn query_document<S>(
    State(state): State<AppState<S>>,
    Path(project_id): Path<String>,
    ApiJson(body): ApiJson<QueryBody>,
) -> Result<Json<QueryAnswer>, AppError>
where
    S: RagApi,
{
    let answer = state
        .service
        .query(QueryRequest {
            project_id,
            file_id: body.file_id,
            question: body.question,
            top_k: body.top_k,
            metadata_filter: body.metadata_filter,
        })
        .await?;
    Ok(Json(answer))
}

/// JSON body extractor whose rejections use the API error shape.
struct ApiJson<T>(T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::warn!(error = %rejection.body_text(), "Request body rejected");
                Err(error_response(
                    rejection.status(),
                    "invalid_request",
                    rejection.body_text(),
                ))
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    signal: &'static str,
    message: String,
}

fn error_response(status: StatusCode, signal: &'static str, message: String) -> Response {
    (status, Json(ErrorBody { signal, message })).into_response()
}

struct AppError(RagError);

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidChunkConfig | ErrorKind::InvalidQuery => StatusCode::BAD_REQUEST,
        ErrorKind::CollectionNotFound | ErrorKind::NoResults => StatusCode::NOT_FOUND,
        ErrorKind::MetricMismatch => StatusCode::CONFLICT,
        ErrorKind::EmbeddingFailed | ErrorKind::GenerationFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::ProcessingFailed | ErrorKind::VectorStore => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(signal = kind.signal(), error = %self.0, "Request failed");
        } else {
            tracing::warn!(signal = kind.signal(), error = %self.0, "Request rejected");
        }
        error_response(status, kind.signal(), self.0.to_string())
    }
}

impl From<RagError> for AppError {
    fn from(inner: RagError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{ElementKind, IngestOutcome, Source};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubRagService {
        ingests: Mutex<Vec<IngestRequest>>,
        queries: Mutex<Vec<QueryRequest>>,
        fail_query_with: std::sync::Mutex<Option<RagError>>,
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, RagError> {
            let outcome = IngestOutcome {
                chunks_stored: request.elements.len(),
                collection: collection_name(&request.project_id, &request.file_id),
                embedding_failures: 0,
            };
            self.ingests.lock().await.push(request);
            Ok(outcome)
        }

        async fn query(&self, request: QueryRequest) -> Result<QueryAnswer, RagError> {
            if let Some(error) = self
                .fail_query_with
                .lock()
                .ok()
                .and_then(|mut slot| slot.take())
            {
                return Err(error);
            }
            let file_id = request.file_id.clone();
            self.queries.lock().await.push(request);
            Ok(QueryAnswer {
                answer: "Cats are mammals.".into(),
                sources: vec![Source {
                    text: "cats are mammals".into(),
                    file_id,
                    chunk_index: Some(0),
                }],
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 3,
                ..MetricsSnapshot::default()
            }
        }
    }

    fn app(service: Arc<StubRagService>) -> Router {
        create_router(
            service,
            AppInfo {
                app_name: "docrag".into(),
                app_version: "0.1.0".into(),
            },
        )
    }

    async fn send(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(payload) => {
                builder = builder.header("content-type", "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn root_reports_app_info() {
        let (status, body) = send(app(Arc::default()), Method::GET, "/api/v1/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["app_name"], "docrag");
        assert_eq!(body["app_version"], "0.1.0");
    }

    #[tokio::test]
    async fn metrics_route_returns_snapshot() {
        let (status, body) = send(app(Arc::default()), Method::GET, "/api/v1/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents_ingested"], 3);
        assert_eq!(body["queries_answered"], 0);
    }

    #[tokio::test]
    async fn process_route_applies_defaults() {
        let service = Arc::new(StubRagService::default());
        let payload = json!({
            "file_id": "report",
            "elements": [
                { "type": "Title", "text": "Intro" },
                { "type": "NarrativeText", "text": "Body" }
            ]
        });
        let (status, body) = send(
            app(service.clone()),
            Method::POST,
            "/api/v1/data/process/proj",
            Some(payload),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["signal"], "processing_success");
        assert_eq!(body["chunks_stored"], 2);
        assert_eq!(body["collection"], "proj_report");

        let ingests = service.ingests.lock().await;
        assert_eq!(ingests.len(), 1);
        assert_eq!(ingests[0].project_id, "proj");
        assert_eq!(ingests[0].chunk_size, 500);
        assert_eq!(ingests[0].overlap_size, 50);
        assert_eq!(ingests[0].elements[0].kind, ElementKind::Title);
    }

    #[tokio::test]
    async fn query_route_forwards_filter_and_top_k() {
        let service = Arc::new(StubRagService::default());
        let payload = json!({
            "file_id": "report",
            "question": "What is a mammal?",
            "top_k": 2,
            "metadata_filter": { "chunk_index": 0 }
        });
        let (status, body) = send(
            app(service.clone()),
            Method::POST,
            "/api/v1/data/query/proj",
            Some(payload),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Cats are mammals.");
        assert_eq!(body["sources"][0]["file_id"], "report");
        assert_eq!(body["sources"][0]["chunk_index"], 0);

        let queries = service.queries.lock().await;
        assert_eq!(queries[0].top_k, 2);
        assert_eq!(
            queries[0].metadata_filter.as_ref().map(|filter| filter["chunk_index"].clone()),
            Some(json!(0))
        );
    }

    #[tokio::test]
    async fn errors_map_to_status_and_signal() {
        let cases = vec![
            (
                RagError::InvalidQuery("question must not be empty".into()),
                StatusCode::BAD_REQUEST,
                "invalid_query",
            ),
            (
                RagError::CollectionNotFound("proj_missing".into()),
                StatusCode::NOT_FOUND,
                "collection_not_found",
            ),
            (
                RagError::NoResults("proj_report".into()),
                StatusCode::NOT_FOUND,
                "no_results",
            ),
            (
                RagError::GenerationFailed(crate::llm::LlmError::EmptyResponse),
                StatusCode::BAD_GATEWAY,
                "generation_failed",
            ),
        ];

        for (error, expected_status, expected_signal) in cases {
            let service = Arc::new(StubRagService::default());
            if let Ok(mut slot) = service.fail_query_with.lock() {
                *slot = Some(error);
            }
            let (status, body) = send(
                app(service),
                Method::POST,
                "/api/v1/data/query/proj",
                Some(json!({ "file_id": "report", "question": "q" })),
            )
            .await;
            assert_eq!(status, expected_status);
            assert_eq!(body["signal"], expected_signal);
            assert!(body["message"].as_str().is_some_and(|message| !message.is_empty()));
        }
    }

    #[tokio::test]
    async fn malformed_bodies_use_error_shape() {
        let service = Arc::new(StubRagService::default());
        let cases = vec![
            (
                "/api/v1/data/process/proj",
                json!({ "elements": [] }),
            ),
            (
                "/api/v1/data/query/proj",
                json!({ "file_id": "report", "question": "q", "top_k": -1 }),
            ),
        ];

        for (uri, payload) in cases {
            let (status, body) = send(app(service.clone()), Method::POST, uri, Some(payload)).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["signal"], "invalid_request");
            assert!(body["message"].as_str().is_some_and(|message| !message.is_empty()));
        }
        assert!(service.ingests.lock().await.is_empty());
        assert!(service.queries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn missing_content_type_is_rejected_as_json() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/data/query/proj")
            .body(Body::from(r#"{"file_id":"report","question":"q"}"#))
            .expect("request");
        let response = app(Arc::default())
            .oneshot(request)
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let body: Value = serde_json::from_slice(&bytes).expect("json error body");
        assert_eq!(body["signal"], "invalid_request");
    }

    #[tokio::test]
    async fn ingest_locks_are_released_and_pruned() {
        let locks = IngestLocks::default();
        {
            let _first = locks.acquire("p_a").await;
            assert_eq!(locks.tracked().await, 1);
        }
        let _second = locks.acquire("p_b").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
