//! Search index abstraction
//!
//! The reconcile engine only needs three things from the index:
//! - an exact count of records holding a value in a column
//! - the most frequent distinct values among records matching a text query
//! - a liveness ping
//!
//! Two backends implement the trait:
//! - Elasticsearch-compatible REST clusters
//! - An in-memory record list (tests, local development)

mod elastic;
mod memory;

pub use elastic::ElasticIndex;
pub use memory::{InMemoryIndex, Record};

use crate::config::IndexConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// A canonical value observed in a column and the number of records holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: u64,
}

impl ValueCount {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Full-text query against the analyzed variant of a column
#[derive(Debug, Clone, PartialEq)]
pub enum TextQuery {
    /// Words appear contiguously, in order
    Phrase { text: String, boost: f32 },
    /// Every word appears, any order
    AllWords { words: Vec<String>, boost: f32 },
    /// Every word appears within edit-distance tolerance
    FuzzyAllWords { words: Vec<String>, boost: f32 },
    /// Any word appears within edit-distance tolerance
    Fuzzy { text: String },
    /// At least one clause matches
    Any(Vec<TextQuery>),
}

impl TextQuery {
    /// Render as Elasticsearch query DSL against `field`
    pub fn to_dsl(&self, field: &str) -> Value {
        match self {
            TextQuery::Phrase { text, boost } => json!({
                "match_phrase": { field: { "query": text, "boost": boost } }
            }),
            TextQuery::AllWords { words, boost } => json!({
                "match": { field: { "query": words.join(" "), "operator": "and", "boost": boost } }
            }),
            TextQuery::FuzzyAllWords { words, boost } => json!({
                "match": { field: {
                    "query": words.join(" "),
                    "operator": "and",
                    "fuzziness": "AUTO",
                    "boost": boost
                } }
            }),
            TextQuery::Fuzzy { text } => json!({
                "match": { field: { "query": text, "fuzziness": "AUTO" } }
            }),
            TextQuery::Any(clauses) => json!({
                "bool": {
                    "should": clauses.iter().map(|c| c.to_dsl(field)).collect::<Vec<_>>(),
                    "minimum_should_match": 1
                }
            }),
        }
    }
}

/// Trait for the search index collaborator
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Number of records whose `column` equals `exact_phrase` (case-insensitive)
    async fn count(&self, column: &str, exact_phrase: &str) -> Result<u64>;

    /// Top `size` distinct values of `column` among records matching `query`,
    /// sorted by count descending
    async fn top_values(&self, column: &str, query: &TextQuery, size: usize)
        -> Result<Vec<ValueCount>>;

    /// Check the index is reachable
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs
    fn backend(&self) -> &str;
}

/// Create a search index client based on configuration
pub fn create_index(config: &IndexConfig) -> Result<Arc<dyn SearchIndex>> {
    match config.backend.as_str() {
        "elasticsearch" | "opensearch" => Ok(Arc::new(ElasticIndex::new(config)?)),
        "memory" => {
            let index = match &config.seed_path {
                Some(path) => InMemoryIndex::from_json_file(path)?,
                None => {
                    tracing::warn!("Memory index backend without seed_path, index is empty");
                    InMemoryIndex::default()
                }
            };
            Ok(Arc::new(index))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown index backend: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_dsl() {
        let query = TextQuery::Phrase {
            text: "Sales Manager".into(),
            boost: 10.0,
        };
        assert_eq!(
            query.to_dsl("job_title"),
            json!({ "match_phrase": { "job_title": { "query": "Sales Manager", "boost": 10.0 } } })
        );
    }

    #[test]
    fn test_any_dsl_wraps_should() {
        let query = TextQuery::Any(vec![
            TextQuery::AllWords {
                words: vec!["car".into(), "wash".into()],
                boost: 5.0,
            },
            TextQuery::Fuzzy { text: "car wash".into() },
        ]);
        let dsl = query.to_dsl("category");

        assert_eq!(dsl["bool"]["minimum_should_match"], 1);
        assert_eq!(dsl["bool"]["should"].as_array().unwrap().len(), 2);
        assert_eq!(dsl["bool"]["should"][0]["match"]["category"]["operator"], "and");
        assert_eq!(dsl["bool"]["should"][1]["match"]["category"]["fuzziness"], "AUTO");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let config = IndexConfig {
            backend: "solr".into(),
            ..IndexConfig::default()
        };
        let err = create_index(&config).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
