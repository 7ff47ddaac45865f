//! Query Builder.
//!
//! Turns an untrusted, URL-shaped key/value description into a storage-agnostic
//! [`Query`]. Nothing here executes anything: each stage returns a piece that
//! the caller folds into a [`Query`], and the store adapter decides how to run it.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Number, Value};

pub mod eval;

/// Keys that steer the query instead of filtering documents.
pub const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_SORT: &str = "-price";
/// Internal version field every stored document carries.
pub const METADATA_FIELD: &str = "__v";
/// Primary key; always part of an inclusion projection.
pub const ID_FIELD: &str = "id";

/// Flat key/value query description as it arrives from a URL query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct QueryDescription(BTreeMap<String, String>);

impl QueryDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Overwrites `key`, used by route aliases that pin a sort or page size.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryDescription {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Operator tokens accepted in `field[op]` keys. `Ne` is reserved for
    /// programmatic scope filters and is never parsed from input.
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "gte" => Some(Self::Gte),
            "gt" => Some(Self::Gt),
            "lte" => Some(Self::Lte),
            "lt" => Some(Self::Lt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Comparison,
    pub value: Value,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Comparison, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Comparison::Ne, value)
    }
}

/// Conjunction of predicates. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn merge(mut self, other: Filter) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// Everything except [`METADATA_FIELD`].
    #[default]
    Default,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u64,
    pub limit: u64,
}

impl Page {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            skip: page.saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }
}

/// A prepared, storage-agnostic query description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: Option<Page>,
}

impl Query {
    pub fn scoped(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn and_filter(mut self, filter: Filter) -> Self {
        self.filter = self.filter.merge(filter);
        self
    }

    pub fn sort_by(mut self, keys: Vec<SortKey>) -> Self {
        self.sort = keys;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn paginate(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }
}

/// Every non-reserved key becomes a predicate; `field[gte]` style keys become
/// range predicates. Field names are not checked against any schema.
pub fn filter(description: &QueryDescription) -> Filter {
    description
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(key))
        .fold(Filter::new(), |filter, (key, raw)| {
            let (field, op) = split_operator(key);
            filter.and(Predicate::new(field, op, coerce(raw)))
        })
}

/// Sort keys from `sort`, falling back to [`DEFAULT_SORT`].
pub fn sort(description: &QueryDescription) -> Vec<SortKey> {
    sort_or(description, DEFAULT_SORT)
}

pub fn sort_or(description: &QueryDescription, default: &str) -> Vec<SortKey> {
    let spec = description
        .get("sort")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default);
    split_list(spec)
        .map(|token| match token.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                direction: Direction::Descending,
            },
            None => SortKey {
                field: token.to_string(),
                direction: Direction::Ascending,
            },
        })
        .filter(|key| !key.field.is_empty())
        .collect()
}

/// Field selection from `fields`. When inclusions and `-exclusions` are mixed
/// the inclusions win.
pub fn project(description: &QueryDescription) -> Projection {
    let Some(spec) = description.get("fields") else {
        return Projection::Default;
    };
    let (excluded, included): (Vec<&str>, Vec<&str>) =
        split_list(spec).partition(|token| token.starts_with('-'));
    if !included.is_empty() {
        let mut fields: Vec<String> = included.into_iter().map(str::to_string).collect();
        if !fields.iter().any(|f| f == ID_FIELD) {
            fields.insert(0, ID_FIELD.to_string());
        }
        return Projection::Include(fields);
    }
    let fields: Vec<String> = excluded
        .into_iter()
        .filter_map(|token| token.strip_prefix('-'))
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect();
    if fields.is_empty() {
        Projection::Default
    } else {
        Projection::Exclude(fields)
    }
}

/// `skip = (page - 1) * limit`; absent, zero or non-numeric values fall back
/// to page 1 and limit 100.
pub fn paginate(description: &QueryDescription) -> Page {
    let page = positive(description.get("page")).unwrap_or(DEFAULT_PAGE);
    let limit = positive(description.get("limit")).unwrap_or(DEFAULT_LIMIT);
    Page::new(page, limit)
}

/// Fluent form of the four stages, applied to a pre-scoped [`Query`].
pub struct QueryFeatures<'a> {
    query: Query,
    description: &'a QueryDescription,
    default_sort: &'a str,
}

impl<'a> QueryFeatures<'a> {
    pub fn new(query: Query, description: &'a QueryDescription) -> Self {
        Self {
            query,
            description,
            default_sort: DEFAULT_SORT,
        }
    }

    pub fn with_default_sort(mut self, default_sort: &'a str) -> Self {
        self.default_sort = default_sort;
        self
    }

    pub fn filter(mut self) -> Self {
        self.query = self.query.and_filter(filter(self.description));
        self
    }

    pub fn sort(mut self) -> Self {
        self.query = self.query.sort_by(sort_or(self.description, self.default_sort));
        self
    }

    pub fn limit_fields(mut self) -> Self {
        self.query = self.query.select(project(self.description));
        self
    }

    pub fn paginate(mut self) -> Self {
        self.query = self.query.paginate(paginate(self.description));
        self
    }

    pub fn into_query(self) -> Query {
        self.query
    }
}

fn split_operator(key: &str) -> (&str, Comparison) {
    key.strip_suffix(']')
        .and_then(|rest| rest.split_once('['))
        .and_then(|(field, token)| Comparison::from_token(token).map(|op| (field, op)))
        .filter(|(field, _)| !field.is_empty())
        .unwrap_or((key, Comparison::Eq))
}

fn split_list(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
}

/// Query strings carry only text; numbers and booleans are recovered here so
/// range predicates compare numerically.
pub fn coerce(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}
