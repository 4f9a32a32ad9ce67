//! Elasticsearch-compatible REST client
//!
//! Exact counts and value buckets run against the unanalyzed sub-field
//! (`column` + exact suffix); text queries run against the analyzed field.

use super::{SearchIndex, TextQuery, ValueCount};
use crate::config::IndexConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Search index client speaking the Elasticsearch REST API
pub struct ElasticIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    exact_suffix: String,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct AggregationResponse {
    aggregations: Option<Aggregations>,
}

#[derive(Deserialize)]
struct Aggregations {
    values: TermsAggregation,
}

#[derive(Deserialize)]
struct TermsAggregation {
    buckets: Vec<Bucket>,
}

#[derive(Deserialize)]
struct Bucket {
    key: Value,
    doc_count: u64,
}

impl ElasticIndex {
    /// Create a new client from configuration
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let credentials = config
            .username
            .clone()
            .map(|user| (user, config.password.clone()));

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            exact_suffix: config.exact_suffix.clone(),
            credentials,
        })
    }

    fn exact_field(&self, column: &str) -> String {
        format!("{}{}", column, self.exact_suffix)
    }

    async fn post(&self, op: &'static str, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/{}/{}", self.base_url, self.index, path);
        let start = Instant::now();

        let mut request = self.client.post(&url).json(body);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let result = request.send().await;
        let elapsed = start.elapsed().as_secs_f64();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::record_index_query(op, elapsed, false);
                return Err(AppError::IndexError {
                    message: format!("{} request failed: {}", op, e),
                });
            }
        };

        if !response.status().is_success() {
            metrics::record_index_query(op, elapsed, false);
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IndexError {
                message: format!("{} returned {}: {}", op, status, body),
            });
        }

        metrics::record_index_query(op, elapsed, true);
        tracing::debug!(op, latency_ms = (elapsed * 1000.0) as u64, "Index query completed");
        Ok(response)
    }

    fn count_body(&self, column: &str, exact_phrase: &str) -> Value {
        json!({
            "query": {
                "term": {
                    self.exact_field(column): {
                        "value": exact_phrase,
                        "case_insensitive": true
                    }
                }
            }
        })
    }

    fn aggregation_body(&self, column: &str, query: &TextQuery, size: usize) -> Value {
        json!({
            "size": 0,
            "query": query.to_dsl(column),
            "aggs": {
                "values": {
                    "terms": { "field": self.exact_field(column), "size": size }
                }
            }
        })
    }
}

#[async_trait]
impl SearchIndex for ElasticIndex {
    async fn count(&self, column: &str, exact_phrase: &str) -> Result<u64> {
        let body = self.count_body(column, exact_phrase);
        let response = self.post("count", "_count", &body).await?;

        let parsed: CountResponse = response.json().await.map_err(|e| AppError::IndexError {
            message: format!("Failed to parse count response: {}", e),
        })?;

        Ok(parsed.count)
    }

    async fn top_values(
        &self,
        column: &str,
        query: &TextQuery,
        size: usize,
    ) -> Result<Vec<ValueCount>> {
        let body = self.aggregation_body(column, query, size);
        let response = self.post("aggregate", "_search", &body).await?;

        let parsed: AggregationResponse =
            response.json().await.map_err(|e| AppError::IndexError {
                message: format!("Failed to parse aggregation response: {}", e),
            })?;

        let buckets = parsed
            .aggregations
            .map(|aggs| aggs.values.buckets)
            .unwrap_or_default();

        Ok(buckets
            .into_iter()
            .filter_map(|bucket| {
                let value = match bucket.key {
                    Value::String(s) => s,
                    Value::Null => return None,
                    other => other.to_string(),
                };
                Some(ValueCount::new(value, bucket.doc_count))
            })
            .filter(|v| !v.value.trim().is_empty())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/_cluster/health", self.base_url);

        let mut request = self.client.get(&url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await.map_err(|e| AppError::IndexError {
            message: format!("Ping failed: {}", e),
        })?;

        if !response.status().is_success() {
            return Err(AppError::IndexError {
                message: format!("Ping returned {}", response.status()),
            });
        }

        Ok(())
    }

    fn backend(&self) -> &str {
        "elasticsearch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> ElasticIndex {
        ElasticIndex::new(&IndexConfig {
            url: "http://search:9200/".into(),
            ..IndexConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_base_url_trimmed() {
        assert_eq!(index().base_url, "http://search:9200");
    }

    #[test]
    fn test_count_body_uses_exact_field() {
        let body = index().count_body("job_title", "HR Manager");
        assert_eq!(
            body,
            json!({
                "query": { "term": { "job_title.keyword": {
                    "value": "HR Manager",
                    "case_insensitive": true
                } } }
            })
        );
    }

    #[test]
    fn test_aggregation_body() {
        let query = TextQuery::Fuzzy { text: "manger".into() };
        let body = index().aggregation_body("job_title", &query, 16);

        assert_eq!(body["size"], 0);
        assert_eq!(body["aggs"]["values"]["terms"]["field"], "job_title.keyword");
        assert_eq!(body["aggs"]["values"]["terms"]["size"], 16);
        assert_eq!(body["query"]["match"]["job_title"]["query"], "manger");
    }

    #[test]
    fn test_bucket_parsing() {
        let raw = json!({
            "aggregations": { "values": { "buckets": [
                { "key": "Sales Manager", "doc_count": 42 },
                { "key": 7, "doc_count": 3 }
            ] } }
        });
        let parsed: AggregationResponse = serde_json::from_value(raw).unwrap();
        let buckets = parsed.aggregations.unwrap().values.buckets;
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].doc_count, 42);
    }
}
