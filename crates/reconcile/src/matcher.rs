//! Term matcher
//!
//! For one candidate term, asks the index how often the term occurs verbatim
//! in a column and which canonical values of that column resemble it.
//!
//! Index calls are sequential: exact count, ranked search, then the fuzzy
//! fallback only when the ranked search came back thin.

use audience_common::config::ReconcileConfig;
use audience_common::errors::{AppError, Result};
use audience_common::index::{SearchIndex, TextQuery, ValueCount};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Boost for the verbatim phrase clause
pub const PHRASE_BOOST: f32 = 10.0;
/// Boost for the all-words-any-order clause
pub const ALL_WORDS_BOOST: f32 = 5.0;
/// Boost for the fuzzy multi-word clause
pub const FUZZY_PHRASE_BOOST: f32 = 3.0;

/// Matcher tuning
#[derive(Debug, Clone)]
pub struct MatcherSettings {
    /// Distinct values kept from the ranked search
    pub pool_size: usize,
    /// Below this many candidates the fuzzy fallback runs
    pub fallback_threshold: usize,
    /// Deadline for each index call
    pub call_timeout: Duration,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            pool_size: 15,
            fallback_threshold: 5,
            call_timeout: Duration::from_secs(3),
        }
    }
}

impl MatcherSettings {
    pub fn from_config(config: &ReconcileConfig, call_timeout: Duration) -> Self {
        Self {
            pool_size: config.candidate_pool_size,
            fallback_threshold: config.fallback_threshold,
            call_timeout,
        }
    }
}

/// What the index knows about one term
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermMatch {
    /// Records holding the term verbatim (case-insensitive)
    pub exact_count: u64,
    /// Other canonical values, count descending, term itself excluded
    pub candidates: Vec<ValueCount>,
}

/// Finds canonical values for candidate terms
#[derive(Clone)]
pub struct TermMatcher {
    index: Arc<dyn SearchIndex>,
    settings: MatcherSettings,
}

impl TermMatcher {
    pub fn new(index: Arc<dyn SearchIndex>, settings: MatcherSettings) -> Self {
        Self { index, settings }
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    /// Look up `term` in `column`
    pub async fn match_term(&self, term: &str, column: &str) -> Result<TermMatch> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(TermMatch::default());
        }

        let exact_count = self.timed(self.index.count(column, term)).await?;

        // Over-fetch by one: the term itself may occupy a bucket
        let fetch = self.settings.pool_size + 1;
        let ranked = self
            .timed(self.index.top_values(column, &ranked_query(term), fetch))
            .await?;

        let mut seen = HashSet::from([term.to_lowercase()]);
        let mut candidates = Vec::with_capacity(fetch);
        merge_distinct(&mut candidates, &mut seen, ranked, self.settings.pool_size);

        if candidates.len() < self.settings.fallback_threshold {
            let fuzzy = TextQuery::Fuzzy {
                text: term.to_string(),
            };
            match self.timed(self.index.top_values(column, &fuzzy, fetch)).await {
                Ok(extra) => {
                    merge_distinct(&mut candidates, &mut seen, extra, self.settings.pool_size)
                }
                Err(e) => {
                    // Ranked results are still usable on their own
                    tracing::warn!(term, column, error = %e, "Fuzzy fallback query failed");
                }
            }
        }

        candidates.sort_by(|a, b| b.count.cmp(&a.count));

        tracing::debug!(
            term,
            column,
            exact_count,
            candidates = candidates.len(),
            "Term matched"
        );

        Ok(TermMatch {
            exact_count,
            candidates,
        })
    }

    /// Apply the per-call deadline; expiry counts as an index failure
    async fn timed<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.call_timeout, call)
            .await
            .map_err(|_| AppError::IndexTimeout {
                timeout_ms: self.settings.call_timeout.as_millis() as u64,
            })?
    }
}

/// Phrase (10) > all words any order (5) > fuzzy word sequence (3, multi-word only)
pub fn ranked_query(term: &str) -> TextQuery {
    let words: Vec<String> = term.split_whitespace().map(|w| w.to_lowercase()).collect();

    let mut clauses = vec![
        TextQuery::Phrase {
            text: term.to_string(),
            boost: PHRASE_BOOST,
        },
        TextQuery::AllWords {
            words: words.clone(),
            boost: ALL_WORDS_BOOST,
        },
    ];
    if words.len() > 1 {
        clauses.push(TextQuery::FuzzyAllWords {
            words,
            boost: FUZZY_PHRASE_BOOST,
        });
    }

    TextQuery::Any(clauses)
}

fn merge_distinct(
    into: &mut Vec<ValueCount>,
    seen: &mut HashSet<String>,
    values: Vec<ValueCount>,
    limit: usize,
) {
    for value in values {
        if into.len() >= limit {
            break;
        }
        if seen.insert(value.value.to_lowercase()) {
            into.push(value);
        }
    }
}
