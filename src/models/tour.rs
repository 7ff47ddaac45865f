use serde_json::Value;

use super::now_stamp;
use crate::query::{Filter, Predicate};
use crate::ratings::DEFAULT_AVERAGE;
use crate::resource::{FieldRule, Populate, Reference, ResourceKind, Rule, Stage, VirtualField};
use crate::store::Document;
use crate::utils::slugify;

pub const DIFFICULTIES: &[&str] = &["easy", "medium", "difficult"];

const RULES: &[FieldRule] = &[
    FieldRule::new("name", Rule::Required, "A tour must have a name"),
    FieldRule::new(
        "name",
        Rule::MaxLength(40),
        "A tour name must have less or equal then 40 characters",
    ),
    FieldRule::new(
        "name",
        Rule::MinLength(10),
        "A tour name must have more or equal then 10 characters",
    ),
    FieldRule::new("duration", Rule::Required, "A tour must have a duration"),
    FieldRule::new("duration", Rule::Min(1.0), "A tour must last at least one day"),
    FieldRule::new("maxGroupSize", Rule::Required, "A tour must have a group size"),
    FieldRule::new("maxGroupSize", Rule::Min(1.0), "A tour group must hold at least one person"),
    FieldRule::new("difficulty", Rule::Required, "A tour should have a difficulty"),
    FieldRule::new(
        "difficulty",
        Rule::OneOf(DIFFICULTIES),
        "Difficulty is either: easy, medium, difficult",
    ),
    FieldRule::new("ratingsAverage", Rule::Min(1.0), "Rating must be above 1.0"),
    FieldRule::new("ratingsAverage", Rule::Max(5.0), "Rating must be below 5.0"),
    FieldRule::new("ratingsQuantity", Rule::Min(0.0), "Ratings quantity cannot be negative"),
    FieldRule::new("price", Rule::Required, "A tour must have a price"),
    FieldRule::new("price", Rule::Min(0.0), "A tour price cannot be negative"),
    FieldRule::new(
        "priceDiscount",
        Rule::LessThanField("price"),
        "Discount price should be below the regular price",
    ),
    FieldRule::new("summary", Rule::Required, "A tour must have a summary"),
    FieldRule::new("imageCover", Rule::Required, "A tour must have a cover image"),
];

/// Reviews of a tour, each with its author expanded.
pub const REVIEWS: Populate = Populate::Virtual(VirtualField {
    field: "reviews",
    collection: "reviews",
    foreign_field: "tour",
    references: &[Reference {
        field: "user",
        collection: "users",
        select: &["name", "photo"],
    }],
});

pub static TOURS: ResourceKind = ResourceKind {
    collection: "tours",
    singular: "tour",
    rules: RULES,
    unique_fields: &["name"],
    hidden_fields: &[],
    read_only: &["ratingsAverage", "ratingsQuantity", "createdAt"],
    default_sort: "-price",
    soft_delete: None,
    auto_populate: &[],
    visibility,
    prepare,
    decorate,
};

fn visibility() -> Filter {
    Filter::new().and(Predicate::ne("secretTour", true))
}

/// Slugs follow the name; the rating summary always starts from the baseline.
fn prepare(document: &mut Document, stage: Stage) {
    document.remove("slug");
    if let Some(name) = document.get("name").and_then(Value::as_str) {
        let name = name.trim().to_string();
        document.insert("slug".into(), Value::String(slugify(&name)));
        document.insert("name".into(), Value::String(name));
    }
    if stage == Stage::Create {
        document.insert("ratingsQuantity".into(), Value::from(0));
        document.insert("ratingsAverage".into(), Value::from(DEFAULT_AVERAGE));
        document.entry("secretTour").or_insert(Value::Bool(false));
        document.insert("createdAt".into(), now_stamp());
    }
}

fn decorate(document: &mut Document) {
    if let Some(days) = document.get("duration").and_then(Value::as_f64) {
        document.insert("durationWeeks".into(), Value::from(days / 7.0));
    }
}
