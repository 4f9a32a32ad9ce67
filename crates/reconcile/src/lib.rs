//! Audience Forge Reconciliation Engine
//!
//! Turns AI-proposed candidate terms into index-backed filters:
//! - Term matching against canonical column values
//! - Greedy, order-dependent allocation of winners (no value claimed twice)
//! - Location expansion across sibling place columns
//! - Compilation of filter rules into one boolean query

pub mod allocation;
pub mod compiler;
pub mod filter;
pub mod location;
pub mod matcher;
pub mod pipeline;

pub use allocation::{Allocator, Outcome, ReconciliationResult, Winner};
pub use compiler::{compile, FieldMapping, Query};
pub use filter::{validate_rules, Combinator, Condition, FilterRule};
pub use location::LocationExpander;
pub use matcher::{MatcherSettings, TermMatch, TermMatcher};
pub use pipeline::{AudienceDefinition, AudiencePipeline, RoleReconciliation, Target, TermSource};
