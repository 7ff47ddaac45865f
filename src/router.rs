use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{delete, get, patch, post},
};

use crate::{
    AppState,
    middleware::{RateLimiter, log_errors, protect, rate_limit, restrict_to},
    models::Role,
    result::ApiResult,
    routes,
};

const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];
const GUIDES: &[Role] = &[Role::Admin, Role::LeadGuide, Role::Guide];
const REVIEWERS: &[Role] = &[Role::User];
const REVIEW_EDITORS: &[Role] = &[Role::User, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

/// Wraps `routes` so they run only for an authenticated caller holding one of `roles`.
fn restricted(
    state: &AppState,
    roles: &'static [Role],
    routes: Router<AppState>,
) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(roles, restrict_to))
        .route_layer(from_fn_with_state(state.clone(), protect))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResult::<()>::fail("Can't find this route on this server!")),
    )
}

pub fn build_router(state: AppState, rate_limiter: Option<Arc<RateLimiter>>) -> Router {
    let public_routes = Router::new()
        // tours
        .route("/tours", get(routes::tour::list_tours))
        .route("/tours/top-5-cheap", get(routes::tour::top_five_cheap))
        .route("/tours/tour-stats", get(routes::tour::get_tour_stats))
        .route("/tours/{id}", get(routes::tour::get_tour))
        // accounts
        .route("/users/signup", post(routes::user::signup))
        .route("/users/login", post(routes::user::login))
        .route("/users/forgot-password", post(routes::user::forgot_password))
        .route("/users/reset-password/{token}", patch(routes::user::reset_password));

    let protected_routes = Router::new()
        .route("/reviews", get(routes::review::list_reviews))
        .route("/reviews/{id}", get(routes::review::get_review))
        .route("/tours/{id}/reviews", get(routes::review::list_tour_reviews))
        .route("/users/update-password", patch(routes::user::update_password))
        .route("/users/me", get(routes::user::get_me))
        .route("/users/update-me", patch(routes::user::update_me))
        .route("/users/delete-me", delete(routes::user::delete_me))
        .route_layer(from_fn_with_state(state.clone(), protect));

    let staff_routes = restricted(
        &state,
        STAFF,
        Router::new().route("/tours", post(routes::tour::create_tour)).route(
            "/tours/{id}",
            patch(routes::tour::update_tour).delete(routes::tour::delete_tour),
        ),
    );
    let guide_routes = restricted(
        &state,
        GUIDES,
        Router::new().route("/tours/monthly-plan/{year}", get(routes::tour::get_monthly_plan)),
    );
    let reviewer_routes = restricted(
        &state,
        REVIEWERS,
        Router::new()
            .route("/reviews", post(routes::review::create_review))
            .route("/tours/{id}/reviews", post(routes::review::create_tour_review)),
    );
    let review_editor_routes = restricted(
        &state,
        REVIEW_EDITORS,
        Router::new().route(
            "/reviews/{id}",
            patch(routes::review::update_review).delete(routes::review::delete_review),
        ),
    );
    let admin_routes = restricted(
        &state,
        ADMINS,
        Router::new().route("/users", get(routes::user::list_users)).route(
            "/users/{id}",
            get(routes::user::get_user)
                .patch(routes::user::update_user)
                .delete(routes::user::delete_user),
        ),
    );

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(staff_routes)
        .merge(guide_routes)
        .merge(reviewer_routes)
        .merge(review_editor_routes)
        .merge(admin_routes);

    let router = Router::new()
        .nest(&state.config.api_base_uri, api)
        .fallback(not_found)
        .layer(from_fn(log_errors));

    let router = match rate_limiter {
        Some(limiter) => router.layer(from_fn_with_state(limiter, rate_limit)),
        None => router,
    };

    router.with_state(state)
}
