//! Allocation engine
//!
//! Runs the term matcher over an ordered term list and gives every term a
//! winner. A canonical value can be won by at most one term per request:
//! the first term (in input order) to claim it keeps it, later terms fall
//! through to weaker candidates. There is no backtracking.

use crate::matcher::{TermMatch, TermMatcher};
use audience_common::errors::AppError;
use audience_common::index::ValueCount;
use audience_common::metrics::record_reconciled_term;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

/// How a term's winner was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// A discovered canonical value beat the term itself
    Canonical,
    /// The term exists verbatim and held its ground
    Control,
    /// Nothing in the index; the term stands in with count 0
    Unmatched,
    /// The term's own value was claimed earlier and nothing else was left
    Exhausted,
    /// The index failed for this term
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Canonical => "canonical",
            Outcome::Control => "control",
            Outcome::Unmatched => "unmatched",
            Outcome::Exhausted => "exhausted",
            Outcome::Failed => "failed",
        }
    }

    /// Whether the winner value is owned by this result
    pub fn claims(&self) -> bool {
        !matches!(self, Outcome::Exhausted)
    }
}

/// The value chosen to represent a term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub value: String,
    pub count: u64,
    /// Winner is the proposed term itself
    pub is_control: bool,
    /// Winner was confirmed in the index with a positive count
    pub matched: bool,
}

impl Winner {
    fn control(term: &str, count: u64, matched: bool) -> Self {
        Self {
            value: term.to_string(),
            count,
            is_control: true,
            matched,
        }
    }

    fn canonical(candidate: ValueCount) -> Self {
        Self {
            value: candidate.value,
            count: candidate.count,
            is_control: false,
            matched: true,
        }
    }
}

/// Reconciliation of one candidate term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub term: String,
    pub winner: Winner,
    /// Runners-up, count descending
    pub alternates: Vec<ValueCount>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request-scoped set of claimed values
#[derive(Debug, Default)]
pub struct ClaimSet {
    used: HashSet<String>,
}

impl ClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, value: &str) -> bool {
        self.used.contains(&value.to_lowercase())
    }

    fn claim(&mut self, value: &str) {
        self.used.insert(value.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

/// Decide one term's winner from what the matcher found
///
/// Pure apart from claiming the winner in `claims`.
pub fn assign(
    term: &str,
    found: TermMatch,
    claims: &mut ClaimSet,
    max_alternates: usize,
) -> ReconciliationResult {
    let control = ValueCount::new(term, found.exact_count);
    let control_taken = claims.is_claimed(term);

    let mut remaining: Vec<ValueCount> = found
        .candidates
        .into_iter()
        .filter(|c| !claims.is_claimed(&c.value))
        .collect();
    remaining.sort_by(|a, b| b.count.cmp(&a.count));

    let (winner, mut alternates, outcome) = if remaining.is_empty() {
        if control_taken {
            // Exact count echoed, never claimed
            (Winner::control(term, control.count, false), Vec::new(), Outcome::Exhausted)
        } else if control.count > 0 {
            (Winner::control(term, control.count, true), Vec::new(), Outcome::Control)
        } else {
            (Winner::control(term, 0, false), Vec::new(), Outcome::Unmatched)
        }
    } else {
        let best = remaining.remove(0);
        if control_taken || control.count == 0 || best.count > control.count {
            let mut alternates = Vec::with_capacity(remaining.len() + 1);
            if !control_taken {
                alternates.push(control);
            }
            alternates.extend(remaining);
            (Winner::canonical(best), alternates, Outcome::Canonical)
        } else {
            remaining.insert(0, best);
            (Winner::control(term, control.count, true), remaining, Outcome::Control)
        }
    };

    if outcome.claims() {
        claims.claim(&winner.value);
    }

    // Stable: equal counts keep candidate order
    alternates.sort_by(|a, b| b.count.cmp(&a.count));
    alternates.truncate(max_alternates);

    ReconciliationResult {
        term: term.to_string(),
        winner,
        alternates,
        outcome,
        error: match outcome {
            Outcome::Exhausted => Some("already claimed by an earlier term".to_string()),
            _ => None,
        },
    }
}

/// Result for a term whose index lookup failed
fn degraded(term: &str, err: &AppError, claims: &mut ClaimSet) -> ReconciliationResult {
    let outcome = if claims.is_claimed(term) {
        Outcome::Exhausted
    } else {
        claims.claim(term);
        Outcome::Failed
    };

    ReconciliationResult {
        term: term.to_string(),
        winner: Winner::control(term, 0, false),
        alternates: Vec::new(),
        outcome,
        error: Some(err.to_string()),
    }
}

/// Greedy first-come-first-served allocator
#[derive(Clone)]
pub struct Allocator {
    matcher: TermMatcher,
    max_alternates: usize,
}

impl Allocator {
    pub fn new(matcher: TermMatcher, max_alternates: usize) -> Self {
        Self {
            matcher,
            max_alternates,
        }
    }

    /// Reconcile `terms` against `column`, strictly in input order
    ///
    /// Never fails: a term whose lookup errors gets a zero-count control
    /// winner carrying the error.
    pub async fn allocate(&self, terms: &[String], column: &str) -> Vec<ReconciliationResult> {
        let start = Instant::now();
        let mut claims = ClaimSet::new();
        let mut results = Vec::with_capacity(terms.len());

        for term in terms {
            let term = term.trim();
            let result = match self.matcher.match_term(term, column).await {
                Ok(found) => assign(term, found, &mut claims, self.max_alternates),
                Err(e) => {
                    tracing::warn!(term, column, error = %e, "Term lookup failed, using control");
                    degraded(term, &e, &mut claims)
                }
            };

            record_reconciled_term(column, result.outcome.as_str());
            results.push(result);
        }

        tracing::info!(
            column,
            terms = results.len(),
            matched = results.iter().filter(|r| r.winner.matched).count(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Terms allocated"
        );

        results
    }
}
