//! Qdrant-backed [`super::VectorStore`] implementation.
//!
//! Record text and metadata live in the point payload under `text` and `metadata`. Metadata
//! filters become `must` clauses on `metadata.<key>`. Qdrant reports cosine similarity, which is
//! converted to a distance so results order the same way as every other backend.

pub mod client;
pub mod filters;
pub mod types;

pub use client::QdrantVectorStore;
pub use filters::build_metadata_filter;
