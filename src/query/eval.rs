//! Evaluates prepared queries against in-process documents.

use std::cmp::Ordering;

use serde_json::Value;

use super::{
    Comparison, Direction, Filter, ID_FIELD, METADATA_FIELD, Predicate, Projection, SortKey,
};
use crate::store::Document;

/// Resolves a dotted path such as `startLocation.type`.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = document.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| value.get(segment))
}

pub fn matches(document: &Document, filter: &Filter) -> bool {
    filter
        .predicates()
        .iter()
        .all(|predicate| holds(lookup(document, &predicate.field), predicate))
}

fn holds(actual: Option<&Value>, predicate: &Predicate) -> bool {
    let expected = &predicate.value;
    match predicate.op {
        Comparison::Eq => actual.is_some_and(|value| loosely_equal(value, expected)),
        Comparison::Ne => !actual.is_some_and(|value| loosely_equal(value, expected)),
        Comparison::Gt => ordered(actual, expected).is_some_and(Ordering::is_gt),
        Comparison::Gte => ordered(actual, expected).is_some_and(Ordering::is_ge),
        Comparison::Lt => ordered(actual, expected).is_some_and(Ordering::is_lt),
        Comparison::Lte => ordered(actual, expected).is_some_and(Ordering::is_le),
    }
}

/// Query strings lose type information, so a coerced number still matches a
/// stored string with the same text and vice versa. Arrays match when any
/// element does.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Array(items), _) if !expected.is_array() => {
            items.iter().any(|item| loosely_equal(item, expected))
        }
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            *a == b.to_string()
        }
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => actual == expected,
    }
}

/// Range comparisons only hold between values of the same kind.
fn ordered(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

pub fn compare(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    keys.iter()
        .map(|key| {
            let ordering = total_order(lookup(a, &key.field), lookup(b, &key.field));
            match key.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn total_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .zip(y.as_f64())
            .and_then(|(x, y)| x.partial_cmp(&y))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

pub fn project(mut document: Document, projection: &Projection) -> Document {
    match projection {
        Projection::Default => {
            document.remove(METADATA_FIELD);
            document
        }
        Projection::Include(fields) => document
            .into_iter()
            .filter(|(key, _)| key == ID_FIELD || fields.iter().any(|f| f == key))
            .collect(),
        Projection::Exclude(fields) => {
            for field in fields {
                document.remove(field);
            }
            document.remove(METADATA_FIELD);
            document
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Predicate;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[test]
    fn range_predicates_compare_numbers() {
        let tour = doc(json!({"price": 700, "difficulty": "easy"}));
        let filter = Filter::new()
            .and(Predicate::new("price", Comparison::Gte, 500))
            .and(Predicate::eq("difficulty", "easy"));
        assert!(matches(&tour, &filter));

        let filter = Filter::new().and(Predicate::new("price", Comparison::Lt, 700));
        assert!(!matches(&tour, &filter));
    }

    #[test]
    fn range_predicates_never_match_across_types() {
        let tour = doc(json!({"price": 700, "name": "The Sea Explorer"}));
        for op in [Comparison::Gt, Comparison::Gte, Comparison::Lt, Comparison::Lte] {
            assert!(!matches(&tour, &Filter::new().and(Predicate::new("price", op, "abc"))));
            assert!(!matches(&tour, &Filter::new().and(Predicate::new("name", op, 5))));
        }
    }

    #[test]
    fn missing_fields_only_satisfy_not_equal() {
        let tour = doc(json!({"name": "x"}));
        assert!(matches(&tour, &Filter::new().and(Predicate::ne("secretTour", true))));
        assert!(!matches(&tour, &Filter::new().and(Predicate::eq("secretTour", true))));
        assert!(!matches(&tour, &Filter::new().and(Predicate::new("price", Comparison::Gt, 1))));
    }

    #[test]
    fn equality_tolerates_text_numbers() {
        let review = doc(json!({"tour": "42", "rating": 4}));
        assert!(matches(&review, &Filter::new().and(Predicate::eq("tour", 42))));
        assert!(matches(&review, &Filter::new().and(Predicate::eq("rating", 4.0))));
    }

    #[test]
    fn descending_sort_puts_missing_values_last() {
        let a = doc(json!({"price": 100}));
        let b = doc(json!({}));
        let keys = [SortKey {
            field: "price".into(),
            direction: Direction::Descending,
        }];
        assert_eq!(compare(&a, &b, &keys), Ordering::Less);
    }

    #[test]
    fn include_projection_keeps_id() {
        let tour = doc(json!({"id": "1", "name": "n", "price": 3, "__v": 0}));
        let projected = project(tour, &Projection::Include(vec!["name".into()]));
        assert_eq!(Value::Object(projected), json!({"id": "1", "name": "n"}));
    }
}
