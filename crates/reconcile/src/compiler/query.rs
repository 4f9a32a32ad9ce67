//! Compiled boolean query tree
//!
//! The tree is backend-neutral. It renders to Elasticsearch query DSL and
//! can be evaluated directly against an in-memory record.

use audience_common::index::Record;
use serde_json::{json, Map, Value};

/// Maps logical columns onto index fields
#[derive(Debug, Clone)]
pub struct FieldMapping {
    /// Suffix of the unanalyzed sub-field, e.g. `.keyword`
    pub exact_suffix: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            exact_suffix: ".keyword".to_string(),
        }
    }
}

impl FieldMapping {
    pub fn new(exact_suffix: impl Into<String>) -> Self {
        Self {
            exact_suffix: exact_suffix.into(),
        }
    }

    fn exact(&self, column: &str) -> String {
        format!("{}{}", column, self.exact_suffix)
    }
}

/// Boolean query node
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every record
    MatchAll,
    /// must / should / must_not groups
    Bool(BoolQuery),
    /// Field is present
    Exists { field: String },
    /// Case-insensitive exact value
    Term { field: String, value: String },
    /// Case-insensitive substring
    Wildcard { field: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
    pub minimum_should_match: Option<u32>,
}

impl Query {
    /// Disjunction; a single clause is returned as-is
    pub fn any_of(mut clauses: Vec<Query>) -> Query {
        match clauses.len() {
            0 => Query::MatchAll,
            1 => clauses.remove(0),
            _ => Query::Bool(BoolQuery {
                should: clauses,
                minimum_should_match: Some(1),
                ..BoolQuery::default()
            }),
        }
    }

    /// Conjunction; a single clause is returned as-is
    pub fn all_of(mut clauses: Vec<Query>) -> Query {
        match clauses.len() {
            0 => Query::MatchAll,
            1 => clauses.remove(0),
            _ => Query::Bool(BoolQuery {
                must: clauses,
                ..BoolQuery::default()
            }),
        }
    }

    /// Render as Elasticsearch query DSL
    pub fn to_dsl(&self, mapping: &FieldMapping) -> Value {
        match self {
            Query::MatchAll => json!({ "match_all": {} }),
            Query::Bool(b) => {
                let mut body = Map::new();
                for (key, clauses) in [("must", &b.must), ("should", &b.should), ("must_not", &b.must_not)] {
                    if !clauses.is_empty() {
                        let rendered = clauses.iter().map(|c| c.to_dsl(mapping)).collect();
                        body.insert(key.to_string(), Value::Array(rendered));
                    }
                }
                if let Some(n) = b.minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(n));
                }
                json!({ "bool": body })
            }
            Query::Exists { field } => json!({ "exists": { "field": mapping.exact(field) } }),
            Query::Term { field, value } => json!({
                "term": { mapping.exact(field): { "value": value, "case_insensitive": true } }
            }),
            Query::Wildcard { field, value } => json!({
                "wildcard": { mapping.exact(field): {
                    "value": format!("*{}*", escape_wildcard(value)),
                    "case_insensitive": true
                } }
            }),
        }
    }

    /// Evaluate against one record; absent columns are missing fields
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Query::MatchAll => true,
            Query::Bool(b) => {
                if !b.must.iter().all(|q| q.matches(record)) {
                    return false;
                }
                if b.must_not.iter().any(|q| q.matches(record)) {
                    return false;
                }
                if b.should.is_empty() {
                    return true;
                }
                let required = b
                    .minimum_should_match
                    .unwrap_or(if b.must.is_empty() && b.must_not.is_empty() { 1 } else { 0 });
                b.should.iter().filter(|q| q.matches(record)).count() >= required as usize
            }
            Query::Exists { field } => record.contains_key(field),
            Query::Term { field, value } => record
                .get(field)
                .map(|v| v.to_lowercase() == value.to_lowercase())
                .unwrap_or(false),
            Query::Wildcard { field, value } => record
                .get(field)
                .map(|v| v.to_lowercase().contains(&value.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

/// Escape wildcard metacharacters so sub-words match literally
fn escape_wildcard(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
