//! Audience pipeline
//!
//! description -> candidate terms per role -> reconciled winners -> filter
//! rules -> location expansion -> compiled query.
//!
//! Roles run concurrently; terms within a role are allocated sequentially.

use crate::allocation::{Allocator, ReconciliationResult};
use crate::compiler::{compile, Query};
use crate::filter::{Combinator, FilterRule};
use crate::location::{is_location_column, LocationExpander};
use crate::matcher::{MatcherSettings, TermMatcher};
use audience_common::config::{AppConfig, ReconcileConfig};
use audience_common::extraction::normalize_terms;
use audience_common::index::SearchIndex;
use audience_common::metrics::{record_compile, record_extraction};
use audience_common::{Extractor, TermRole};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// One role to reconcile, optionally against a non-default column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub role: TermRole,
    #[serde(default)]
    pub column: Option<String>,
}

impl Target {
    pub fn new(role: TermRole) -> Self {
        Self { role, column: None }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Every role against its configured column
    pub fn all_roles() -> Vec<Target> {
        TermRole::ALL.into_iter().map(Target::new).collect()
    }
}

/// Where a role's candidate terms come from
#[derive(Debug, Clone)]
pub enum TermSource<'a> {
    /// Ask the extractor
    Description(&'a str),
    /// Caller already has the terms
    Terms(Vec<String>),
}

/// Reconciled terms for one role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleReconciliation {
    pub role: TermRole,
    pub column: String,
    pub results: Vec<ReconciliationResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Everything needed to target an audience
#[derive(Debug, Clone)]
pub struct AudienceDefinition {
    pub targets: Vec<RoleReconciliation>,
    /// Rules after location expansion, in target order
    pub rules: Vec<FilterRule>,
    pub query: Query,
    pub warnings: Vec<String>,
}

/// Wires extraction, allocation, expansion and compilation together
#[derive(Clone)]
pub struct AudiencePipeline {
    extractor: Arc<dyn Extractor>,
    allocator: Allocator,
    expander: LocationExpander,
    settings: ReconcileConfig,
    max_terms: usize,
}

impl AudiencePipeline {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        index: Arc<dyn SearchIndex>,
        config: &AppConfig,
    ) -> Self {
        let matcher = TermMatcher::new(
            index,
            MatcherSettings::from_config(&config.reconcile, config.index_timeout()),
        );

        Self {
            extractor,
            allocator: Allocator::new(matcher, config.reconcile.max_alternates),
            expander: LocationExpander::new(config.reconcile.country_literal.clone()),
            settings: config.reconcile.clone(),
            max_terms: config.extraction.max_terms,
        }
    }

    pub fn expander(&self) -> &LocationExpander {
        &self.expander
    }

    /// Column a target reconciles against
    pub fn column_for(&self, target: &Target) -> String {
        match target.column.as_deref().map(str::trim) {
            Some(column) if !column.is_empty() => column.to_string(),
            _ => self.settings.column_for(target.role),
        }
    }

    /// Reconcile one role. Extraction failures leave the role empty with a
    /// warning instead of failing the request.
    pub async fn reconcile_role(&self, source: TermSource<'_>, target: &Target) -> RoleReconciliation {
        let column = self.column_for(target);
        let mut warnings = Vec::new();

        // Caller terms keep duplicates: a repeated term competes for a
        // second value instead of vanishing
        let terms = match source {
            TermSource::Terms(terms) => clean_terms(terms),
            TermSource::Description(description) => {
                match self.extract(description, target.role).await {
                    Ok(terms) => normalize_terms(terms, self.max_terms),
                    Err(warning) => {
                        warnings.push(warning);
                        Vec::new()
                    }
                }
            }
        };

        let results = if terms.is_empty() {
            Vec::new()
        } else {
            self.allocator.allocate(&terms, &column).await
        };

        warnings.extend(
            results
                .iter()
                .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.term, e))),
        );

        RoleReconciliation {
            role: target.role,
            column,
            results,
            warnings,
        }
    }

    /// Full audience definition for a description
    pub async fn build(&self, description: &str, targets: &[Target]) -> AudienceDefinition {
        let start = Instant::now();

        let reconciled = join_all(
            targets
                .iter()
                .map(|t| self.reconcile_role(TermSource::Description(description), t)),
        )
        .await;

        let mut rules = Vec::new();
        for role in &reconciled {
            if let Some(rule) = self.winner_rule(role) {
                let combinator = if rules.is_empty() {
                    Combinator::Open
                } else {
                    Combinator::And
                };
                rules.push(rule.joined(combinator));
            }
        }

        let rules = self.expander.expand_all(&rules);
        let query = compile(&rules);
        record_compile(rules.len());

        let warnings: Vec<String> = reconciled
            .iter()
            .flat_map(|r| r.warnings.iter().map(|w| format!("{}: {}", r.role.as_str(), w)))
            .collect();

        tracing::info!(
            targets = reconciled.len(),
            rules = rules.len(),
            warnings = warnings.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Audience built"
        );

        AudienceDefinition {
            targets: reconciled,
            rules,
            query,
            warnings,
        }
    }

    /// One `contains` rule over a role's winners, if any survive
    fn winner_rule(&self, role: &RoleReconciliation) -> Option<FilterRule> {
        let location = is_location_column(&role.column);
        let mut seen = HashSet::new();

        let tokens: Vec<String> = role
            .results
            .iter()
            .filter(|r| r.outcome.claims())
            .map(|r| r.winner.value.clone())
            .filter(|v| !(location && self.expander.is_country_literal(v)))
            .filter(|v| seen.insert(v.to_lowercase()))
            .collect();

        if tokens.is_empty() {
            None
        } else {
            Some(FilterRule::contains(role.column.clone(), tokens))
        }
    }

    async fn extract(&self, description: &str, role: TermRole) -> Result<Vec<String>, String> {
        let start = Instant::now();
        let result = self.extractor.extract(description, role).await;
        record_extraction(start.elapsed().as_secs_f64(), role.as_str(), result.is_ok());

        result.map_err(|e| {
            tracing::warn!(
                role = role.as_str(),
                model = self.extractor.model_name(),
                error = %e,
                "Candidate extraction failed"
            );
            format!("extraction failed: {}", e)
        })
    }
}

/// Trim and drop blanks, keeping order and duplicates
fn clean_terms(terms: Vec<String>) -> Vec<String> {
    terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{LOCALITY, PRIMARY_LOCATION};
    use async_trait::async_trait;
    use audience_common::errors::{AppError, Result};
    use audience_common::extraction::MockExtractor;
    use audience_common::index::InMemoryIndex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn people() -> InMemoryIndex {
        InMemoryIndex::from_json(json!([
            { "job_title": "HR Manager", "location": "Denver, CO", "locality": "Denver", "metro": "Denver Metro" },
            { "job_title": "HR Manager", "location": "Boulder, CO", "locality": "Boulder" },
            { "job_title": "Senior Manager", "location": "Denver, CO", "locality": "Denver" },
            { "job_title": "People Partner", "location": "Austin, TX", "locality": "Austin" },
            { "job_title": "Engineer", "locality": "Denver" }
        ]))
        .unwrap()
    }

    fn extractor() -> MockExtractor {
        MockExtractor::new()
            .with_terms(TermRole::Title, &["HR Manager", "hr manager", "People Partner"])
            .with_terms(TermRole::Location, &["Denver", "United States"])
    }

    fn pipeline(extractor: impl Extractor + 'static, index: InMemoryIndex) -> AudiencePipeline {
        AudiencePipeline::new(Arc::new(extractor), Arc::new(index), &AppConfig::default())
    }

    struct DownExtractor;

    #[async_trait]
    impl Extractor for DownExtractor {
        async fn extract(&self, _description: &str, _role: TermRole) -> Result<Vec<String>> {
            Err(AppError::ExtractionError {
                message: "API error 401".into(),
            })
        }

        fn model_name(&self) -> &str {
            "down"
        }
    }

    #[test]
    fn test_column_for_target() {
        let pipeline = pipeline(MockExtractor::new(), InMemoryIndex::default());
        assert_eq!(pipeline.column_for(&Target::new(TermRole::Title)), "job_title");
        assert_eq!(
            pipeline.column_for(&Target::new(TermRole::Location).with_column(LOCALITY)),
            LOCALITY
        );
        assert_eq!(
            pipeline.column_for(&Target::new(TermRole::Industry).with_column("  ")),
            "industry"
        );
    }

    #[tokio::test]
    async fn test_reconcile_role_from_terms() {
        let pipeline = pipeline(MockExtractor::new(), people());
        let role = pipeline
            .reconcile_role(
                TermSource::Terms(vec!["HR Manager".into(), " hr manager ".into(), "".into()]),
                &Target::new(TermRole::Title),
            )
            .await;

        assert_eq!(role.column, "job_title");
        assert_eq!(role.results.len(), 2);
        assert_eq!(role.results[0].term, "HR Manager");
        assert_eq!(role.results[0].winner.value, "HR Manager");
        assert_eq!(role.results[0].winner.count, 2);
        assert_eq!(role.results[1].term, "hr manager");
        assert_eq!(role.results[1].winner.value, "Senior Manager");
        assert!(role.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_caller_duplicates_each_get_a_result() {
        let index = InMemoryIndex::with_column_counts(
            "job_title",
            &[("Manager", 500), ("Senior Manager", 300)],
        );
        let pipeline = pipeline(MockExtractor::new(), index);
        let role = pipeline
            .reconcile_role(
                TermSource::Terms(vec!["Manager".into(), "manager".into()]),
                &Target::new(TermRole::Title),
            )
            .await;

        let winners: Vec<&str> = role.results.iter().map(|r| r.winner.value.as_str()).collect();
        assert_eq!(winners, vec!["Manager", "Senior Manager"]);
    }

    #[tokio::test]
    async fn test_extracted_terms_are_deduplicated() {
        let extractor = MockExtractor::new().with_terms(TermRole::Title, &["Manager", " manager "]);
        let pipeline = pipeline(extractor, people());
        let role = pipeline
            .reconcile_role(TermSource::Description("managers"), &Target::new(TermRole::Title))
            .await;

        assert_eq!(role.results.len(), 1);
    }

    #[tokio::test]
    async fn test_build_audience() {
        let pipeline = pipeline(extractor(), people());
        let audience = pipeline
            .build(
                "HR managers in Denver",
                &[Target::new(TermRole::Title), Target::new(TermRole::Location)],
            )
            .await;

        assert_eq!(
            audience.rules,
            vec![
                FilterRule::contains("job_title", ["HR Manager", "People Partner"]),
                FilterRule::contains(PRIMARY_LOCATION, ["Denver, CO"]),
                FilterRule::contains(LOCALITY, ["Denver"]).joined(Combinator::Or),
            ]
        );

        let hits: Vec<_> = people()
            .records()
            .iter()
            .filter(|r| audience.query.matches(r))
            .cloned()
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["location"], "Denver, CO");
        assert!(audience.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_roles_without_terms_emit_no_rule() {
        let pipeline = pipeline(extractor(), people());
        let audience = pipeline.build("anyone", &Target::all_roles()).await;

        assert_eq!(audience.targets.len(), 4);
        assert!(audience.rules.iter().all(|r| r.column != "industry" && r.column != "category"));
    }

    #[tokio::test]
    async fn test_extraction_failure_degrades() {
        let pipeline = pipeline(DownExtractor, people());
        let audience = pipeline.build("HR managers", &[Target::new(TermRole::Title)]).await;

        assert!(audience.rules.is_empty());
        assert_eq!(audience.query, Query::MatchAll);
        assert_eq!(audience.warnings.len(), 1);
        assert!(audience.warnings[0].starts_with("title: extraction failed"));
    }

    #[tokio::test]
    async fn test_country_literal_never_becomes_a_token() {
        let extractor = MockExtractor::new().with_terms(TermRole::Location, &["United States"]);
        let pipeline = pipeline(extractor, people());
        let audience = pipeline.build("anyone in the US", &[Target::new(TermRole::Location)]).await;

        assert!(audience.rules.is_empty());
        assert_eq!(audience.query, Query::MatchAll);
    }
}
