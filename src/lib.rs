#![deny(missing_docs)]

//! Core library for docrag: document chunking, vector indexing and retrieval-augmented
//! question answering.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding and generation backends.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Chunking, prompt assembly and pipeline orchestration.
pub mod processing;
/// Vector store abstraction and backends.
pub mod vectordb;
