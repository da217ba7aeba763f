//! Wire types for the Qdrant REST API.

use crate::vectordb::{DistanceMetric, VectorStoreError};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Qdrant name for a distance metric.
pub(crate) fn metric_to_qdrant(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::L2 => "Euclid",
    }
}

/// Parse the metric reported in a collection config.
pub(crate) fn metric_from_qdrant(
    collection: &str,
    value: &str,
) -> Result<DistanceMetric, VectorStoreError> {
    match value {
        "Cosine" => Ok(DistanceMetric::Cosine),
        "Euclid" => Ok(DistanceMetric::L2),
        other => Err(VectorStoreError::Corrupt(format!(
            "collection '{collection}' uses unsupported Qdrant distance '{other}'"
        ))),
    }
}

/// Convert a Qdrant score into a distance (smaller is nearer).
pub(crate) fn score_to_distance(metric: DistanceMetric, score: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - score,
        DistanceMetric::L2 => score,
    }
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResponse {
    pub(crate) result: ListCollectionsResult,
}

#[derive(Deserialize)]
pub(crate) struct ListCollectionsResult {
    pub(crate) collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionDescription {
    pub(crate) name: String,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfoResult,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResult {
    pub(crate) config: CollectionConfig,
}

#[derive(Deserialize)]
pub(crate) struct CollectionConfig {
    pub(crate) params: CollectionParams,
}

#[derive(Deserialize)]
pub(crate) struct CollectionParams {
    pub(crate) vectors: VectorParams,
}

#[derive(Deserialize)]
pub(crate) struct VectorParams {
    pub(crate) size: usize,
    pub(crate) distance: String,
}

#[derive(Deserialize)]
pub(crate) struct CountResponse {
    pub(crate) result: CountResult,
}

#[derive(Deserialize)]
pub(crate) struct CountResult {
    pub(crate) count: usize,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_roundtrip() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::L2] {
            let name = metric_to_qdrant(metric);
            assert_eq!(metric_from_qdrant("c", name).unwrap(), metric);
        }
        assert!(metric_from_qdrant("c", "Dot").is_err());
    }

    #[test]
    fn cosine_scores_become_distances() {
        assert!((score_to_distance(DistanceMetric::Cosine, 0.75) - 0.25).abs() < 1e-6);
        assert_eq!(score_to_distance(DistanceMetric::L2, 3.0), 3.0);
    }
}
