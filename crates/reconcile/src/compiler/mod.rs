//! Query compiler
//!
//! Turns an ordered filter rule list into one boolean query. Pure: no index
//! access, same input always yields a structurally identical tree.
//!
//! Combination: every rule opens a new conjunctive ("must") group unless its
//! combinator is `OR`, in which case it joins the group of the rule right
//! before it. Callers that need a multi-rule disjunction emit its rules
//! adjacently (the location expander does).

mod query;

pub use query::{BoolQuery, FieldMapping, Query};

use crate::filter::{Combinator, Condition, FilterRule};

/// Compile a rule list into a single query
pub fn compile(rules: &[FilterRule]) -> Query {
    if rules.is_empty() {
        return Query::MatchAll;
    }

    let mut groups: Vec<Vec<Query>> = Vec::new();
    for rule in rules {
        let clause = translate(rule);
        match (rule.combinator, groups.last_mut()) {
            (Combinator::Or, Some(group)) => group.push(clause),
            _ => groups.push(vec![clause]),
        }
    }

    Query::Bool(BoolQuery {
        must: groups.into_iter().map(Query::any_of).collect(),
        ..BoolQuery::default()
    })
}

/// Translate one rule on its own
pub fn translate(rule: &FilterRule) -> Query {
    let field = rule.column.as_str();

    match rule.condition {
        Condition::IsEmpty => Query::Bool(BoolQuery {
            should: vec![
                Query::Bool(BoolQuery {
                    must_not: vec![exists(field)],
                    ..BoolQuery::default()
                }),
                empty_string(field),
            ],
            minimum_should_match: Some(1),
            ..BoolQuery::default()
        }),
        Condition::IsNotEmpty => Query::Bool(BoolQuery {
            must: vec![exists(field)],
            must_not: vec![empty_string(field)],
            ..BoolQuery::default()
        }),
        Condition::Contains => {
            // Each token: all of its sub-words. Tokens: any of them.
            let per_token: Vec<Query> = rule
                .clean_tokens()
                .map(|token| {
                    Query::all_of(
                        token
                            .split_whitespace()
                            .map(|word| Query::Wildcard {
                                field: field.to_string(),
                                value: word.to_lowercase(),
                            })
                            .collect(),
                    )
                })
                .collect();
            Query::any_of(per_token)
        }
        Condition::Equals => Query::any_of(
            rule.clean_tokens()
                .map(|token| Query::Term {
                    field: field.to_string(),
                    value: token.to_string(),
                })
                .collect(),
        ),
        Condition::Unknown => Query::MatchAll,
    }
}

fn exists(field: &str) -> Query {
    Query::Exists {
        field: field.to_string(),
    }
}

fn empty_string(field: &str) -> Query {
    Query::Term {
        field: field.to_string(),
        value: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audience_common::index::Record;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn wildcard(field: &str, value: &str) -> Query {
        Query::Wildcard {
            field: field.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_empty_rules_match_everything() {
        assert_eq!(compile(&[]), Query::MatchAll);
        assert_eq!(compile(&[]).to_dsl(&FieldMapping::default()), json!({ "match_all": {} }));
    }

    #[test]
    fn test_contains_splits_sub_words() {
        let rule = FilterRule::contains("category", ["Car Wash", "Detailing"]);
        assert_eq!(
            translate(&rule),
            Query::any_of(vec![
                Query::all_of(vec![wildcard("category", "car"), wildcard("category", "wash")]),
                wildcard("category", "detailing"),
            ])
        );
    }

    #[test]
    fn test_contains_semantics_on_records() {
        let query = compile(&[FilterRule::contains("category", ["Car Wash", "Detailing"])]);

        assert!(query.matches(&record(&[("category", "Wash & Car Center")])));
        assert!(!query.matches(&record(&[("category", "Car Dealership")])));
        assert!(query.matches(&record(&[("category", "Auto Detailing Shop")])));
        assert!(!query.matches(&record(&[("title", "Car Wash")])));
    }

    #[test]
    fn test_equals_is_exact_and_case_insensitive() {
        let query = compile(&[FilterRule::equals("state", ["Ohio", "Iowa"])]);

        assert!(query.matches(&record(&[("state", "OHIO")])));
        assert!(query.matches(&record(&[("state", "iowa")])));
        assert!(!query.matches(&record(&[("state", "Ohio River")])));
    }

    #[test]
    fn test_empty_not_empty_duality() {
        let records = [
            record(&[]),
            record(&[("email", "")]),
            record(&[("email", "a@b.co")]),
            record(&[("phone", "555")]),
        ];
        let empty = compile(&[FilterRule::empty("email")]);
        let not_empty = compile(&[FilterRule::not_empty("email")]);

        for rec in &records {
            assert_ne!(empty.matches(rec), not_empty.matches(rec), "record {rec:?}");
        }
        assert!(empty.matches(&records[1]));
        assert!(not_empty.matches(&records[2]));
    }

    #[test]
    fn test_unknown_condition_matches_everything() {
        let rule = FilterRule::new("email", Condition::Unknown, vec!["x".into()]);
        assert_eq!(translate(&rule), Query::MatchAll);
        assert!(compile(&[rule]).matches(&record(&[])));
    }

    #[test]
    fn test_or_joins_previous_rule() {
        let rules = vec![
            FilterRule::contains("job_title", ["HR Manager"]),
            FilterRule::contains("location", ["Denver"]).joined(Combinator::And),
            FilterRule::contains("locality", ["Denver"]).joined(Combinator::Or),
            FilterRule::contains("metro", ["Denver"]).joined(Combinator::Or),
        ];

        let Query::Bool(root) = compile(&rules) else {
            panic!("expected bool root");
        };
        assert_eq!(root.must.len(), 2);
        assert_eq!(
            root.must[1],
            Query::any_of(vec![
                wildcard("location", "denver"),
                wildcard("locality", "denver"),
                wildcard("metro", "denver"),
            ])
        );

        let query = compile(&rules);
        assert!(query.matches(&record(&[("job_title", "HR Manager"), ("metro", "Denver Metro")])));
        assert!(!query.matches(&record(&[("job_title", "HR Manager"), ("region", "Colorado")])));
        assert!(!query.matches(&record(&[("job_title", "Engineer"), ("locality", "Denver")])));
    }

    #[test]
    fn test_open_combinator_mid_sequence_joins_like_and() {
        let rules = vec![
            FilterRule::contains("job_title", ["Nurse"]),
            FilterRule::contains("location", ["Boise"]),
        ];
        let Query::Bool(root) = compile(&rules) else {
            panic!("expected bool root");
        };
        assert_eq!(root.must.len(), 2);
    }

    #[test]
    fn test_leading_or_opens_group() {
        let rules = vec![FilterRule::contains("industry", ["Retail"]).joined(Combinator::Or)];
        let Query::Bool(root) = compile(&rules) else {
            panic!("expected bool root");
        };
        assert_eq!(root.must, vec![wildcard("industry", "retail")]);
    }

    #[test]
    fn test_compile_is_pure() {
        let rules = vec![
            FilterRule::contains("category", ["Car Wash"]),
            FilterRule::not_empty("email").joined(Combinator::And),
        ];
        assert_eq!(compile(&rules), compile(&rules));
        assert_eq!(
            compile(&rules).to_dsl(&FieldMapping::default()),
            compile(&rules).to_dsl(&FieldMapping::default())
        );
    }

    #[test]
    fn test_dsl_shape() {
        let rules = vec![
            FilterRule::contains("job_title", ["HR Manager"]),
            FilterRule::not_empty("email").joined(Combinator::And),
        ];
        assert_eq!(
            compile(&rules).to_dsl(&FieldMapping::default()),
            json!({ "bool": { "must": [
                { "bool": { "must": [
                    { "wildcard": { "job_title.keyword": { "value": "*hr*", "case_insensitive": true } } },
                    { "wildcard": { "job_title.keyword": { "value": "*manager*", "case_insensitive": true } } }
                ] } },
                { "bool": {
                    "must": [ { "exists": { "field": "email.keyword" } } ],
                    "must_not": [ { "term": { "email.keyword": { "value": "", "case_insensitive": true } } } ]
                } }
            ] } })
        );
    }
}
