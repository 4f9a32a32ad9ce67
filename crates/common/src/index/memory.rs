//! In-memory search index
//!
//! Mirrors the observable behaviour of the REST backend closely enough for
//! tests and local development: analyzed matching works on lowercase
//! alphanumeric tokens, fuzziness follows the `AUTO` edit-distance rule,
//! and buckets are keyed by the raw (unanalyzed) value.

use super::{SearchIndex, TextQuery, ValueCount};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// One indexed record: column name -> raw value
pub type Record = HashMap<String, String>;

/// Search index backed by a record list
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    records: Vec<Record>,
}

impl InMemoryIndex {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Build an index where each `(value, n)` pair yields `n` records with
    /// `column = value`
    pub fn with_column_counts(column: &str, counts: &[(&str, usize)]) -> Self {
        let mut records = Vec::new();
        for (value, n) in counts {
            for _ in 0..*n {
                records.push(Record::from([(column.to_string(), value.to_string())]));
            }
        }
        Self { records }
    }

    /// Load records from a JSON array of flat objects
    pub fn from_json_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let parsed: Value = serde_json::from_str(&raw)?;
        Self::from_json(parsed)
    }

    /// Build records from a JSON array; null fields are treated as absent
    pub fn from_json(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            _ => {
                return Err(AppError::InvalidFormat {
                    message: "Seed data must be a JSON array of objects".to_string(),
                })
            }
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(fields) = item else {
                return Err(AppError::InvalidFormat {
                    message: "Seed records must be JSON objects".to_string(),
                });
            };

            let record = fields
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::Null => None,
                    Value::String(s) => Some((k, s)),
                    other => Some((k, other.to_string())),
                })
                .collect();
            records.push(record);
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Lowercase alphanumeric tokens, the way a standard analyzer splits text
fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Edit distance allowed by `fuzziness: AUTO`
fn auto_fuzziness(term: &str) -> usize {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn fuzzy_hit(word: &str, tokens: &[String]) -> bool {
    let allowed = auto_fuzziness(word);
    tokens
        .iter()
        .any(|t| strsim::levenshtein(word, t) <= allowed)
}

fn words_of(words: &[String]) -> Vec<String> {
    words.iter().flat_map(|w| analyze(w)).collect()
}

impl TextQuery {
    /// Evaluate the query against one analyzed field value
    pub fn matches_text(&self, value: &str) -> bool {
        let tokens = analyze(value);

        match self {
            TextQuery::Phrase { text, .. } => {
                let phrase = analyze(text);
                if phrase.is_empty() {
                    return false;
                }
                tokens.windows(phrase.len()).any(|w| w == phrase.as_slice())
            }
            TextQuery::AllWords { words, .. } => {
                let words = words_of(words);
                !words.is_empty() && words.iter().all(|w| tokens.contains(w))
            }
            TextQuery::FuzzyAllWords { words, .. } => {
                let words = words_of(words);
                !words.is_empty() && words.iter().all(|w| fuzzy_hit(w, &tokens))
            }
            TextQuery::Fuzzy { text } => analyze(text).iter().any(|w| fuzzy_hit(w, &tokens)),
            TextQuery::Any(clauses) => clauses.iter().any(|c| c.matches_text(value)),
        }
    }
}

#[async_trait]
impl SearchIndex for InMemoryIndex {
    async fn count(&self, column: &str, exact_phrase: &str) -> Result<u64> {
        let needle = exact_phrase.to_lowercase();
        let count = self
            .records
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| v.to_lowercase() == needle)
            .count();
        Ok(count as u64)
    }

    async fn top_values(
        &self,
        column: &str,
        query: &TextQuery,
        size: usize,
    ) -> Result<Vec<ValueCount>> {
        let mut buckets: HashMap<&str, u64> = HashMap::new();
        for value in self.records.iter().filter_map(|r| r.get(column)) {
            if !value.trim().is_empty() && query.matches_text(value) {
                *buckets.entry(value.as_str()).or_insert(0) += 1;
            }
        }

        let mut values: Vec<ValueCount> = buckets
            .into_iter()
            .map(|(value, count)| ValueCount::new(value, count))
            .collect();

        // Same ordering as a terms aggregation: count desc, then key asc
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        values.truncate(size);

        Ok(values)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn titles() -> InMemoryIndex {
        InMemoryIndex::with_column_counts(
            "job_title",
            &[
                ("Manager", 500),
                ("Senior Manager", 300),
                ("HR Manager", 120),
                ("Human Resources Manager", 40),
                ("Manager, Human Resources", 25),
            ],
        )
    }

    #[tokio::test]
    async fn test_count_is_case_insensitive_and_exact() {
        let index = titles();
        assert_eq!(index.count("job_title", "manager").await.unwrap(), 500);
        assert_eq!(index.count("job_title", "hr manager").await.unwrap(), 120);
        assert_eq!(index.count("job_title", "HR").await.unwrap(), 0);
        assert_eq!(index.count("industry", "Manager").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_top_values_sorted_by_count() {
        let index = titles();
        let query = TextQuery::AllWords {
            words: vec!["human".into(), "manager".into()],
            boost: 5.0,
        };
        let values = index.top_values("job_title", &query, 10).await.unwrap();

        assert_eq!(
            values,
            vec![
                ValueCount::new("Human Resources Manager", 40),
                ValueCount::new("Manager, Human Resources", 25),
            ]
        );
    }

    #[tokio::test]
    async fn test_top_values_respects_size() {
        let index = titles();
        let query = TextQuery::Fuzzy { text: "manager".into() };
        let values = index.top_values("job_title", &query, 2).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].value, "Manager");
        assert_eq!(values[1].value, "Senior Manager");
    }

    #[test]
    fn test_phrase_requires_order() {
        let query = TextQuery::Phrase {
            text: "human resources".into(),
            boost: 10.0,
        };
        assert!(query.matches_text("Manager, Human Resources"));
        assert!(!query.matches_text("Resources for Humans"));
    }

    #[test]
    fn test_fuzzy_tolerates_typos() {
        let query = TextQuery::Fuzzy { text: "mangaer".into() };
        assert!(query.matches_text("Sales Manager"));

        // Short words get no edit allowance
        let query = TextQuery::Fuzzy { text: "hx".into() };
        assert!(!query.matches_text("HR Manager"));
    }

    #[test]
    fn test_from_json_skips_nulls() {
        let index = InMemoryIndex::from_json(json!([
            { "job_title": "Engineer", "locality": null, "employees": 40 },
            { "job_title": "Designer" }
        ]))
        .unwrap();

        assert_eq!(index.len(), 2);
        assert!(!index.records()[0].contains_key("locality"));
        assert_eq!(index.records()[0]["employees"], "40");
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        let err = InMemoryIndex::from_json(json!({ "job_title": "Engineer" })).unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
    }
}
