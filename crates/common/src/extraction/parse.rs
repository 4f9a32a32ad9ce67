//! Parsing of model output into a term list
//!
//! Models are asked for a JSON array but routinely wrap it in a code fence,
//! prefix it with prose, or fall back to a bulleted list.

use regex_lite::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence pattern is valid")
    })
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("bullet pattern is valid"))
}

/// Extract a list of terms from model output. Never fails: unparseable
/// output yields an empty list.
pub fn parse_term_list(content: &str) -> Vec<String> {
    let body = fence_re()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();

    if let Some(terms) = parse_json_array(body) {
        return terms;
    }

    // Prose around an array: take the outermost brackets
    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
        if start < end {
            if let Some(terms) = parse_json_array(&body[start..=end]) {
                return terms;
            }
        }
    }

    parse_plain_list(body)
}

fn parse_json_array(text: &str) -> Option<Vec<String>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

fn parse_plain_list(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();

    // A single line is treated as comma separated, unless it looks like "City, ST"
    let items: Vec<String> = if lines.len() == 1 && lines[0].matches(',').count() > 1 {
        lines[0].split(',').map(|s| s.to_string()).collect()
    } else {
        lines.iter().map(|l| l.to_string()).collect()
    };

    items
        .into_iter()
        .map(|item| {
            bullet_re()
                .replace(&item, "")
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}
