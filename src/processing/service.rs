//! Retrieval-augmented pipeline: chunk, embed and store on ingest; embed, search and generate
//! on query.

use crate::{
    config::Config,
    llm::{EmbeddingClient, GenerationClient, LlmError},
    metrics::{MetricsSnapshot, PipelineMetrics},
    processing::{
        chunking::{Chunker, ChunkingOptions},
        prompt::{PromptTemplate, join_context},
        types::{
            Chunk, IngestOutcome, IngestRequest, QueryAnswer, QueryRequest, RagError, Source,
            collection_name,
        },
    },
    vectordb::{DistanceMetric, MetadataFilter, Record, VectorStore},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// Pipeline knobs that do not vary per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Metric used for newly created collections.
    pub distance: DistanceMetric,
    /// Chunks below this size are merged with a neighbor.
    pub combine_under: usize,
    /// Running chunks are closed past this size.
    pub split_after: usize,
    /// Records per insert window.
    pub insert_batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            distance: DistanceMetric::Cosine,
            combine_under: 100,
            split_after: 1500,
            insert_batch_size: 50,
        }
    }
}

impl PipelineSettings {
    /// Extract pipeline settings from the process configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            distance: config.vector_db_distance_method,
            combine_under: config.chunk_combine_under,
            split_after: config.chunk_split_after,
            insert_batch_size: config.vector_db_insert_batch_size,
        }
    }
}

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Chunk, embed and index a parsed document, replacing any previous index of it.
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, RagError>;

    /// Answer a question from the indexed passages of one document.
    async fn query(&self, request: QueryRequest) -> Result<QueryAnswer, RagError>;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates the chunker, embedding and generation backends, and the vector store.
///
/// Backends are long-lived handles built once at startup and shared through `Arc`s; the
/// service itself holds no mutable state beyond its counters.
pub struct RagService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    settings: PipelineSettings,
    prompt: PromptTemplate,
    metrics: Arc<PipelineMetrics>,
}

/// Result of the embedding pass over a document's chunks.
struct EmbeddedChunks {
    records: Vec<Record>,
    failures: usize,
}

impl RagService {
    /// Assemble the pipeline from its collaborators.
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            settings,
            prompt: PromptTemplate::default(),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Replace the prompt template used for answers.
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Embed every chunk, keeping the ones that succeed and counting the rest.
    async fn embed_chunks(
        &self,
        project_id: &str,
        file_id: &str,
        chunks: Vec<Chunk>,
    ) -> EmbeddedChunks {
        let expected = self.embedder.embedding_size();
        let mut records = Vec::with_capacity(chunks.len());
        let mut failures = 0;

        for chunk in chunks {
            let text = chunk.text.trim();
            if text.is_empty() {
                continue;
            }
            let vector = match self.embedder.embed_text(text).await {
                Ok(vector) if vector.len() == expected => vector,
                Ok(vector) => {
                    failures += 1;
                    tracing::warn!(
                        file_id,
                        chunk_index = chunk.index,
                        expected,
                        actual = vector.len(),
                        "Embedding has unexpected dimension; skipping chunk"
                    );
                    continue;
                }
                Err(error) => {
                    failures += 1;
                    tracing::warn!(
                        file_id,
                        chunk_index = chunk.index,
                        error = %error,
                        "Embedding failed; skipping chunk"
                    );
                    continue;
                }
            };

            records.push(Record {
                id: Uuid::new_v4().to_string(),
                text: text.to_string(),
                vector,
                metadata: chunk_metadata(project_id, file_id, chunk.index),
            });
        }

        EmbeddedChunks { records, failures }
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, RagError> {
        let IngestRequest {
            project_id,
            file_id,
            elements,
            chunk_size,
            overlap_size,
        } = request;

        let chunker = Chunker::new(ChunkingOptions {
            max_characters: chunk_size,
            overlap: overlap_size,
            combine_under: self.settings.combine_under,
            split_after: self.settings.split_after,
        })?;
        let chunks = chunker.chunk(&file_id, &elements);
        if chunks.is_empty() {
            return Err(RagError::ProcessingFailed(format!(
                "document {file_id} produced no chunks"
            )));
        }

        let collection = collection_name(&project_id, &file_id);
        tracing::info!(
            collection = %collection,
            elements = elements.len(),
            chunks = chunks.len(),
            chunk_size,
            overlap_size,
            "Ingesting document"
        );

        self.store
            .create_collection(
                &collection,
                self.embedder.embedding_size(),
                self.settings.distance,
                true,
            )
            .await?;

        let EmbeddedChunks { records, failures } =
            self.embed_chunks(&project_id, &file_id, chunks).await;
        if records.is_empty() {
            tracing::error!(collection = %collection, failures, "No chunk survived embedding");
            return Err(RagError::ProcessingFailed(format!(
                "all {failures} chunks of {file_id} failed to embed"
            )));
        }

        let chunks_stored = self
            .store
            .insert_many(&collection, records, self.settings.insert_batch_size)
            .await
            .map_err(|error| {
                tracing::error!(collection = %collection, error = %error, "Insert failed");
                RagError::ProcessingFailed(format!("failed to store chunks: {error}"))
            })?;

        self.metrics
            .record_ingest(chunks_stored as u64, failures as u64);
        tracing::info!(
            collection = %collection,
            chunks_stored,
            embedding_failures = failures,
            "Document indexed"
        );

        Ok(IngestOutcome {
            chunks_stored,
            collection,
            embedding_failures: failures,
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryAnswer, RagError> {
        let QueryRequest {
            project_id,
            file_id,
            question,
            top_k,
            metadata_filter,
        } = request;

        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question must not be empty".into()));
        }
        if top_k == 0 {
            return Err(RagError::InvalidQuery("top_k must be greater than zero".into()));
        }

        let vector = self
            .embedder
            .embed_text(question)
            .await
            .map_err(RagError::EmbeddingFailed)?;
        let expected = self.embedder.embedding_size();
        if vector.len() != expected {
            return Err(RagError::EmbeddingFailed(LlmError::InvalidResponse(format!(
                "question embedding has {} dimensions, expected {expected}",
                vector.len()
            ))));
        }

        let collection = collection_name(&project_id, &file_id);
        let filter = scoped_filter(metadata_filter, &file_id);
        let result = self
            .store
            .search_by_vector(&collection, &vector, top_k, Some(&filter))
            .await?;
        if result.is_empty() {
            return Err(RagError::NoResults(collection));
        }

        let context = join_context(result.texts());
        let prompt = self.prompt.question_prompt(question, &context);
        tracing::debug!(
            collection = %collection,
            hits = result.len(),
            prompt_chars = prompt.chars().count(),
            "Generating answer"
        );

        let answer = self
            .generator
            .generate_text(&prompt)
            .await
            .map_err(RagError::GenerationFailed)?;
        if answer.trim().is_empty() {
            return Err(RagError::GenerationFailed(LlmError::EmptyResponse));
        }

        let sources = result
            .hits
            .into_iter()
            .map(|hit| Source::from_metadata(hit.text, &hit.metadata, &file_id))
            .collect();

        self.metrics.record_query();
        tracing::info!(collection = %collection, top_k, "Question answered");
        Ok(QueryAnswer { answer, sources })
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn chunk_metadata(project_id: &str, file_id: &str, chunk_index: usize) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("project_id".into(), Value::from(project_id));
    metadata.insert("file_id".into(), Value::from(file_id));
    metadata.insert("chunk_index".into(), Value::from(chunk_index));
    metadata
}

/// Caller filter with `file_id` pinned to the queried document.
fn scoped_filter(filter: Option<MetadataFilter>, file_id: &str) -> MetadataFilter {
    let mut filter = filter.unwrap_or_default();
    filter.insert("file_id".into(), Value::from(file_id));
    filter
}
