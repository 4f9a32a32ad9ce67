//! Location expansion
//!
//! A place filter on one location column is widened into OR-linked rules
//! over its sibling columns, so "Denver" written as a free-text location
//! also finds records that only carry it as a city or metro area.

use crate::filter::{Combinator, FilterRule};
use phf::phf_map;

/// Free-text place
pub const PRIMARY_LOCATION: &str = "location";
/// City
pub const LOCALITY: &str = "locality";
/// State or region
pub const REGION: &str = "region";
/// Zip or postal code
pub const POSTAL_CODE: &str = "postal_code";
/// Metro area
pub const METRO: &str = "metro";

/// Column -> columns searched, in emission order. The first entry is always
/// the column itself.
static EXPANSIONS: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "location" => &["location", "locality", "metro"],
    "locality" => &["locality", "location", "metro"],
    "region" => &["region", "location"],
    "postal_code" => &["postal_code"],
    "metro" => &["metro", "location", "locality"],
};

/// Whether `column` belongs to the location family
pub fn is_location_column(column: &str) -> bool {
    EXPANSIONS.contains_key(column)
}

/// Rewrites location filters into sibling-column disjunctions
#[derive(Debug, Clone)]
pub struct LocationExpander {
    country_literal: String,
}

impl Default for LocationExpander {
    fn default() -> Self {
        Self::new("United States")
    }
}

impl LocationExpander {
    pub fn new(country_literal: impl Into<String>) -> Self {
        Self {
            country_literal: country_literal.into(),
        }
    }

    /// Expand one filter. `has_prior_location` says whether a location rule
    /// was already emitted earlier in the overall rule list.
    pub fn expand(&self, filter: &FilterRule, has_prior_location: bool) -> Vec<FilterRule> {
        let Some(columns) = EXPANSIONS.get(filter.column.as_str()) else {
            return vec![filter.clone()];
        };

        if self.is_country_only(filter) {
            tracing::debug!(column = %filter.column, "Dropping whole-country location filter");
            return Vec::new();
        }

        // Emptiness checks carry no place to widen
        if !filter.condition.takes_tokens() {
            return vec![filter.clone()];
        }

        let tokens: Vec<String> = filter.clean_tokens().map(str::to_string).collect();
        let first = if has_prior_location {
            Combinator::And
        } else {
            Combinator::Open
        };

        if filter.column == PRIMARY_LOCATION && tokens.iter().any(|t| t.contains(',')) {
            // "City, State": the free-text column keeps the full value, the
            // city part is also tried as a locality
            let cities = dedupe(tokens.iter().map(|t| city_part(t).to_string()));
            let mut rules = vec![FilterRule::contains(PRIMARY_LOCATION, tokens).joined(first)];
            // ", Ohio" has no city part to try
            if !cities.is_empty() {
                rules.push(FilterRule::contains(LOCALITY, cities).joined(Combinator::Or));
            }
            return rules;
        }

        columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let combinator = if i == 0 { first } else { Combinator::Or };
                FilterRule::contains(*column, tokens.clone()).joined(combinator)
            })
            .collect()
    }

    /// Expand every location filter in a rule list, in order
    pub fn expand_all(&self, rules: &[FilterRule]) -> Vec<FilterRule> {
        let mut out = Vec::with_capacity(rules.len());
        let mut seen_location = false;

        for rule in rules {
            if !is_location_column(&rule.column) {
                out.push(rule.clone());
                continue;
            }

            let expanded = self.expand(rule, seen_location);
            seen_location |= !expanded.is_empty();
            out.extend(expanded);
        }

        out
    }

    /// Whether `value` is the whole-country literal
    pub fn is_country_literal(&self, value: &str) -> bool {
        value.trim().eq_ignore_ascii_case(self.country_literal.trim())
    }

    fn is_country_only(&self, filter: &FilterRule) -> bool {
        let tokens: Vec<&str> = filter.clean_tokens().collect();
        match tokens.as_slice() {
            [only] => self.is_country_literal(only),
            _ => false,
        }
    }
}

fn city_part(value: &str) -> &str {
    value.split(',').next().unwrap_or(value).trim()
}

fn dedupe(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expander() -> LocationExpander {
        LocationExpander::default()
    }

    #[test]
    fn test_country_literal_dropped() {
        for column in [PRIMARY_LOCATION, LOCALITY, REGION, METRO] {
            let filter = FilterRule::contains(column, ["united states"]);
            assert!(expander().expand(&filter, false).is_empty(), "{column}");
        }
    }

    #[test]
    fn test_country_literal_with_blank_tokens_dropped() {
        let filter = FilterRule::contains(PRIMARY_LOCATION, ["United States", " ", ""]);
        assert!(expander().expand(&filter, false).is_empty());

        let filter = FilterRule::contains(PRIMARY_LOCATION, ["United States", "Denver"]);
        assert_eq!(expander().expand(&filter, false).len(), 3);
    }

    #[test]
    fn test_country_literal_configurable() {
        let expander = LocationExpander::new("Australia");
        assert!(expander
            .expand(&FilterRule::contains(REGION, ["AUSTRALIA"]), false)
            .is_empty());
        assert_eq!(
            expander
                .expand(&FilterRule::contains(REGION, ["United States"]), false)
                .len(),
            2
        );
    }

    #[test]
    fn test_comma_location_splits_city() {
        let filter = FilterRule::contains(PRIMARY_LOCATION, ["Springfield, Ohio"]);
        assert_eq!(
            expander().expand(&filter, false),
            vec![
                FilterRule::contains(PRIMARY_LOCATION, ["Springfield, Ohio"]),
                FilterRule::contains(LOCALITY, ["Springfield"]).joined(Combinator::Or),
            ]
        );
    }

    #[test]
    fn test_primary_location_expansion() {
        let filter = FilterRule::contains(PRIMARY_LOCATION, ["Denver"]);
        assert_eq!(
            expander().expand(&filter, false),
            vec![
                FilterRule::contains(PRIMARY_LOCATION, ["Denver"]),
                FilterRule::contains(LOCALITY, ["Denver"]).joined(Combinator::Or),
                FilterRule::contains(METRO, ["Denver"]).joined(Combinator::Or),
            ]
        );
    }

    #[test]
    fn test_sibling_orders() {
        let columns = |column: &str| -> Vec<String> {
            expander()
                .expand(&FilterRule::contains(column, ["x"]), false)
                .into_iter()
                .map(|r| r.column)
                .collect()
        };

        assert_eq!(columns(LOCALITY), vec![LOCALITY, PRIMARY_LOCATION, METRO]);
        assert_eq!(columns(REGION), vec![REGION, PRIMARY_LOCATION]);
        assert_eq!(columns(POSTAL_CODE), vec![POSTAL_CODE]);
        assert_eq!(columns(METRO), vec![METRO, PRIMARY_LOCATION, LOCALITY]);
    }

    #[test]
    fn test_prior_location_opens_with_and() {
        let filter = FilterRule::contains(REGION, ["Texas"]);
        let rules = expander().expand(&filter, true);
        assert_eq!(rules[0].combinator, Combinator::And);
        assert_eq!(rules[1].combinator, Combinator::Or);
    }

    #[test]
    fn test_unrecognized_column_passes_through() {
        let filter = FilterRule::contains("country", ["United States"]).joined(Combinator::And);
        assert_eq!(expander().expand(&filter, false), vec![filter]);
    }

    #[test]
    fn test_emptiness_check_not_widened() {
        let filter = FilterRule::not_empty(METRO);
        assert_eq!(expander().expand(&filter, false), vec![filter]);
    }

    #[test]
    fn test_expand_all_tracks_prior_location() {
        let rules = vec![
            FilterRule::contains("job_title", ["Nurse"]),
            FilterRule::contains(PRIMARY_LOCATION, ["United States"]).joined(Combinator::And),
            FilterRule::contains(POSTAL_CODE, ["80202"]).joined(Combinator::And),
            FilterRule::contains(REGION, ["Colorado"]).joined(Combinator::And),
        ];

        let expanded = expander().expand_all(&rules);
        let summary: Vec<(&str, Combinator)> = expanded
            .iter()
            .map(|r| (r.column.as_str(), r.combinator))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("job_title", Combinator::Open),
                (POSTAL_CODE, Combinator::Open),
                (REGION, Combinator::And),
                (PRIMARY_LOCATION, Combinator::Or),
            ]
        );
    }

    #[test]
    fn test_comma_location_without_city_skips_locality() {
        let filter = FilterRule::contains(PRIMARY_LOCATION, [", Ohio"]);
        assert_eq!(
            expander().expand(&filter, false),
            vec![FilterRule::contains(PRIMARY_LOCATION, [", Ohio"])]
        );
    }

    #[test]
    fn test_comma_location_without_city_stays_restrictive() {
        let rules = expander().expand_all(&[
            FilterRule::contains("job_title", ["Nurse"]),
            FilterRule::contains(PRIMARY_LOCATION, [", Ohio"]).joined(Combinator::And),
        ]);
        assert!(rules.iter().all(|r| r.clean_tokens().next().is_some()));

        let query = crate::compiler::compile(&rules);
        let record: audience_common::index::Record = [
            ("job_title".to_string(), "Nurse".to_string()),
            ("location".to_string(), "Austin, TX".to_string()),
        ]
        .into_iter()
        .collect();
        assert!(!query.matches(&record));
    }
}
