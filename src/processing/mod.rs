//! Document pipeline: element chunking, prompt assembly and RAG orchestration.

pub mod chunking;
pub mod prompt;
mod service;
pub mod types;

pub use chunking::{Chunker, ChunkingOptions, chunk_elements};
pub use prompt::PromptTemplate;
pub use service::{PipelineSettings, RagApi, RagService};
pub use types::{
    Chunk, ChunkingError, ContentElement, ElementKind, ErrorKind, IngestOutcome, IngestRequest,
    QueryAnswer, QueryRequest, RagError, Source, collection_name,
};
