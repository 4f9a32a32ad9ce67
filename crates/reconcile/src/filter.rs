//! Filter rules
//!
//! A filter rule targets one column with one condition. Rules form an
//! ordered sequence; each rule's combinator says how it joins the rule
//! before it.

use audience_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Condition applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Any token's sub-words all appear as substrings
    Contains,
    /// Case-insensitive exact match against any token
    Equals,
    /// Field absent or empty string
    IsEmpty,
    /// Field present and not the empty string
    IsNotEmpty,
    /// Anything else; compiles to match-everything
    #[serde(other)]
    Unknown,
}

impl Condition {
    /// Whether this condition needs at least one token
    pub fn takes_tokens(&self) -> bool {
        matches!(self, Condition::Contains | Condition::Equals)
    }
}

/// How a rule joins the rule before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Combinator {
    #[serde(rename = "AND", alias = "and", alias = "And")]
    And,
    #[serde(rename = "OR", alias = "or", alias = "Or")]
    Or,
    /// Opens a sequence; anywhere else it joins like AND
    #[default]
    #[serde(rename = "")]
    Open,
}

/// One typed filter rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub condition: Condition,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub combinator: Combinator,
}

impl FilterRule {
    pub fn new(column: impl Into<String>, condition: Condition, tokens: Vec<String>) -> Self {
        Self {
            column: column.into(),
            condition,
            tokens,
            combinator: Combinator::Open,
        }
    }

    pub fn contains<S: Into<String>>(column: impl Into<String>, tokens: impl IntoIterator<Item = S>) -> Self {
        Self::new(column, Condition::Contains, tokens.into_iter().map(Into::into).collect())
    }

    pub fn equals<S: Into<String>>(column: impl Into<String>, tokens: impl IntoIterator<Item = S>) -> Self {
        Self::new(column, Condition::Equals, tokens.into_iter().map(Into::into).collect())
    }

    pub fn empty(column: impl Into<String>) -> Self {
        Self::new(column, Condition::IsEmpty, Vec::new())
    }

    pub fn not_empty(column: impl Into<String>) -> Self {
        Self::new(column, Condition::IsNotEmpty, Vec::new())
    }

    /// Same rule with a different combinator
    pub fn joined(mut self, combinator: Combinator) -> Self {
        self.combinator = combinator;
        self
    }

    /// Tokens with surrounding whitespace removed and blanks dropped
    pub fn clean_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.trim()).filter(|t| !t.is_empty())
    }

    /// Reject rules the compiler cannot express faithfully
    pub fn validate(&self) -> Result<()> {
        if self.column.trim().is_empty() {
            return Err(AppError::MissingField {
                field: "column".to_string(),
            });
        }

        if self.condition.takes_tokens() && self.clean_tokens().next().is_none() {
            return Err(AppError::validation(
                "tokens",
                format!("{:?} on '{}' requires at least one token", self.condition, self.column),
            ));
        }

        Ok(())
    }
}

/// Validate a rule list, naming the offending index
pub fn validate_rules(rules: &[FilterRule]) -> Result<()> {
    for (i, rule) in rules.iter().enumerate() {
        rule.validate().map_err(|e| match e {
            AppError::Validation { message, field } => AppError::Validation {
                message,
                field: Some(format!("rules[{}].{}", i, field.unwrap_or_default())),
            },
            AppError::MissingField { field } => AppError::MissingField {
                field: format!("rules[{}].{}", i, field),
            },
            other => other,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_rule() {
        let rule: FilterRule = serde_json::from_value(json!({
            "column": "category",
            "condition": "contains",
            "tokens": ["Car Wash", "Detailing"],
            "combinator": "OR"
        }))
        .unwrap();

        assert_eq!(rule.condition, Condition::Contains);
        assert_eq!(rule.combinator, Combinator::Or);
        assert_eq!(rule.tokens.len(), 2);
    }

    #[test]
    fn test_deserialize_defaults_and_unknowns() {
        let rule: FilterRule = serde_json::from_value(json!({
            "column": "email",
            "condition": "starts_with"
        }))
        .unwrap();

        assert_eq!(rule.condition, Condition::Unknown);
        assert_eq!(rule.combinator, Combinator::Open);
        assert!(rule.tokens.is_empty());

        let open: Combinator = serde_json::from_value(json!("")).unwrap();
        assert_eq!(open, Combinator::Open);
        let and: Combinator = serde_json::from_value(json!("and")).unwrap();
        assert_eq!(and, Combinator::And);
    }

    #[test]
    fn test_validate() {
        assert!(FilterRule::contains("category", ["Car Wash"]).validate().is_ok());
        assert!(FilterRule::empty("email").validate().is_ok());

        let err = FilterRule::equals("state", ["  "]).validate().unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = FilterRule::not_empty(" ").validate().unwrap_err();
        assert!(matches!(err, AppError::MissingField { .. }));
    }

    #[test]
    fn test_validate_rules_names_index() {
        let rules = vec![
            FilterRule::contains("job_title", ["HR Manager"]),
            FilterRule::contains("industry", Vec::<String>::new()).joined(Combinator::And),
        ];

        match validate_rules(&rules).unwrap_err() {
            AppError::Validation { field, .. } => {
                assert_eq!(field.as_deref(), Some("rules[1].tokens"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
