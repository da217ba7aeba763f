use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_stored: AtomicU64,
    embedding_failures: AtomicU64,
    queries_answered: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed ingest with its stored chunk count and dropped chunk count.
    pub fn record_ingest(&self, chunks_stored: u64, embedding_failures: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_stored
            .fetch_add(chunks_stored, Ordering::Relaxed);
        self.embedding_failures
            .fetch_add(embedding_failures, Ordering::Relaxed);
    }

    /// Record an answered question.
    pub fn record_query(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            embedding_failures: self.embedding_failures.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents ingested since startup.
    pub documents_ingested: u64,
    /// Total number of chunks persisted across all ingests.
    pub chunks_stored: u64,
    /// Chunks dropped because the embedding backend failed for them.
    pub embedding_failures: u64,
    /// Number of questions answered successfully.
    pub queries_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ingests_and_failures() {
        let metrics = PipelineMetrics::new();
        metrics.record_ingest(4, 1);
        metrics.record_ingest(3, 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_stored, 7);
        assert_eq!(snapshot.embedding_failures, 1);
        assert_eq!(snapshot.queries_answered, 0);
    }

    #[test]
    fn records_queries() {
        let metrics = PipelineMetrics::new();
        metrics.record_query();
        metrics.record_query();
        assert_eq!(metrics.snapshot().queries_answered, 2);
        assert_eq!(metrics.snapshot().documents_ingested, 0);
    }
}
