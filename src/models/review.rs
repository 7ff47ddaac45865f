use super::now_stamp;
use crate::resource::{
    FieldRule, Populate, Reference, ResourceKind, Rule, Stage, no_decorate, no_visibility,
};
use crate::store::Document;

/// Field on a review that points at its tour.
pub const TOUR_FIELD: &str = "tour";
pub const USER_FIELD: &str = "user";
pub const RATING_FIELD: &str = "rating";

const RULES: &[FieldRule] = &[
    FieldRule::new("review", Rule::Required, "Review can not be empty!"),
    FieldRule::new(RATING_FIELD, Rule::Required, "A review must have a rating"),
    FieldRule::new(RATING_FIELD, Rule::Integer, "Rating must be a whole number"),
    FieldRule::new(RATING_FIELD, Rule::Min(1.0), "Rating must be above 1.0"),
    FieldRule::new(RATING_FIELD, Rule::Max(5.0), "Rating must be below 5.0"),
    FieldRule::new(TOUR_FIELD, Rule::Required, "Review must belong to a tour."),
    FieldRule::new(TOUR_FIELD, Rule::Text, "Review must belong to a tour."),
    FieldRule::new(USER_FIELD, Rule::Required, "Review must belong to a user."),
    FieldRule::new(USER_FIELD, Rule::Text, "Review must belong to a user."),
];

pub static REVIEWS: ResourceKind = ResourceKind {
    collection: "reviews",
    singular: "review",
    rules: RULES,
    unique_fields: &[],
    hidden_fields: &[],
    /// A review stays with the tour and author it was written for.
    read_only: &[TOUR_FIELD, USER_FIELD, "createdAt"],
    default_sort: "-createdAt",
    soft_delete: None,
    auto_populate: &[
        Populate::Reference(Reference {
            field: USER_FIELD,
            collection: "users",
            select: &["name", "photo"],
        }),
        Populate::Reference(Reference {
            field: TOUR_FIELD,
            collection: "tours",
            select: &["name"],
        }),
    ],
    visibility: no_visibility,
    prepare,
    decorate: no_decorate,
};

fn prepare(document: &mut Document, stage: Stage) {
    if stage == Stage::Create {
        document.insert("createdAt".into(), now_stamp());
    }
}
