//! Translation of metadata filters into Qdrant filter payloads.

use crate::vectordb::MetadataFilter;
use serde_json::{Value, json};

/// Payload key under which record metadata is stored.
pub(crate) const METADATA_KEY: &str = "metadata";

/// Compose a Qdrant `must` filter with one clause per metadata entry.
///
/// Values are passed through untouched; `null` becomes an `is_null` condition.
pub fn build_metadata_filter(filter: &MetadataFilter) -> Option<Value> {
    let must: Vec<Value> = filter
        .iter()
        .map(|(key, value)| {
            let key = format!("{METADATA_KEY}.{key}");
            match value {
                Value::Null => json!({ "is_null": { "key": key } }),
                other => json!({
                    "key": key,
                    "match": { "value": other }
                }),
            }
        })
        .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_match_clauses_for_each_entry() {
        let mut filter = MetadataFilter::new();
        filter.insert("file_id".into(), json!("report.pdf"));
        filter.insert("chunk_index".into(), json!(3));

        let value = build_metadata_filter(&filter).expect("filter");
        assert_eq!(
            value,
            json!({
                "must": [
                    { "key": "metadata.chunk_index", "match": { "value": 3 } },
                    { "key": "metadata.file_id", "match": { "value": "report.pdf" } }
                ]
            })
        );
    }

    #[test]
    fn null_values_use_is_null() {
        let mut filter = MetadataFilter::new();
        filter.insert("section".into(), Value::Null);
        assert_eq!(
            build_metadata_filter(&filter).expect("filter"),
            json!({ "must": [ { "is_null": { "key": "metadata.section" } } ] })
        );
    }

    #[test]
    fn empty_filter_yields_none() {
        assert!(build_metadata_filter(&MetadataFilter::new()).is_none());
    }
}
