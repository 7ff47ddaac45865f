mod handler;

pub use handler::{
    create_review,
    create_tour_review,
    delete_review,
    get_review,
    list_reviews,
    list_tour_reviews,
    update_review,
};
