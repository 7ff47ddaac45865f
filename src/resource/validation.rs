//! Declarative field constraints, evaluated uniformly before persistence.

use serde::Serialize;
use serde_json::Value;

use crate::store::Document;

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// Present, not null, and not blank text.
    Required,
    /// A JSON string.
    Text,
    MinLength(usize),
    MaxLength(usize),
    /// Numeric lower bound; non-numbers fail.
    Min(f64),
    Max(f64),
    Integer,
    OneOf(&'static [&'static str]),
    Email,
    /// Numeric and strictly below the named sibling field.
    LessThanField(&'static str),
    /// Equal to the named sibling field.
    MatchesField(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: &'static str,
    pub rule: Rule,
    pub message: &'static str,
}

impl FieldRule {
    pub const fn new(field: &'static str, rule: Rule, message: &'static str) -> Self {
        Self {
            field,
            rule,
            message,
        }
    }

    fn is_touched_by(&self, patch: &Document) -> bool {
        let sibling = match self.rule {
            Rule::LessThanField(other) | Rule::MatchesField(other) => Some(other),
            _ => None,
        };
        patch.contains_key(self.field) || sibling.is_some_and(|other| patch.contains_key(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Checks `candidate` against `rules` in table order and reports at most one
/// message per field. When `touched` is given (partial updates) only rules
/// for fields present in it, or whose sibling field is present in it, are
/// evaluated; `candidate` is then the merged document so cross-field rules
/// see the stored sibling values.
pub fn validate(
    rules: &[FieldRule],
    candidate: &Document,
    touched: Option<&Document>,
) -> Result<(), Vec<FieldError>> {
    let mut errors: Vec<FieldError> = Vec::new();
    for rule in rules {
        if touched.is_some_and(|patch| !rule.is_touched_by(patch)) {
            continue;
        }
        if errors.iter().any(|e| e.field == rule.field) {
            continue;
        }
        if !passes(rule.rule, candidate.get(rule.field), candidate) {
            errors.push(FieldError {
                field: rule.field.to_string(),
                message: rule.message.to_string(),
            });
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn passes(rule: Rule, value: Option<&Value>, candidate: &Document) -> bool {
    let value = match value {
        None | Some(Value::Null) => return !matches!(rule, Rule::Required),
        Some(value) => value,
    };
    match rule {
        Rule::Required => !value.as_str().is_some_and(|s| s.trim().is_empty()),
        Rule::Text => value.is_string(),
        Rule::MinLength(min) => text_len(value).is_some_and(|len| len >= min),
        Rule::MaxLength(max) => text_len(value).is_some_and(|len| len <= max),
        Rule::Min(min) => value.as_f64().is_some_and(|n| n >= min),
        Rule::Max(max) => value.as_f64().is_some_and(|n| n <= max),
        Rule::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
        Rule::OneOf(allowed) => value.as_str().is_some_and(|s| allowed.contains(&s)),
        Rule::Email => value.as_str().is_some_and(is_email),
        Rule::LessThanField(other) => {
            let limit = candidate.get(other).and_then(Value::as_f64);
            match (value.as_f64(), limit) {
                (Some(n), Some(limit)) => n < limit,
                (Some(_), None) => true,
                _ => false,
            }
        }
        Rule::MatchesField(other) => candidate.get(other) == Some(value),
    }
}

fn text_len(value: &Value) -> Option<usize> {
    value.as_str().map(|s| s.trim().chars().count())
}

fn is_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !raw.chars().any(char::is_whitespace)
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| {
                !host.is_empty() && !tld.is_empty() && !tld.ends_with('.')
            })
}
