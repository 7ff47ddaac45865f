use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};

use crate::{
    AppState,
    error::AppError,
    middleware::CurrentUser,
    models::review::{TOUR_FIELD, USER_FIELD},
    query::{Filter, Predicate, QueryDescription},
    resource::Scope,
    result::ApiResult,
    store::Document,
};

async fn list(
    state: &AppState,
    description: &QueryDescription,
    scope_filter: Option<Filter>,
) -> Result<Json<ApiResult<Value>>, AppError> {
    let listing = state.reviews.list(description, scope_filter, Scope::Visible).await?;
    Ok(Json(ApiResult::listing(
        listing.results,
        json!({ "reviews": listing.items }),
    )))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(description): Query<QueryDescription>,
) -> Result<impl IntoResponse, AppError> {
    list(&state, &description, None).await
}

/// Reviews of one tour, from the nested `/tours/{id}/reviews` route.
pub async fn list_tour_reviews(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    Query(description): Query<QueryDescription>,
) -> Result<impl IntoResponse, AppError> {
    let scope = Filter::new().and(Predicate::eq(TOUR_FIELD, tour_id));
    list(&state, &description, Some(scope)).await
}

async fn create(
    state: &AppState,
    mut payload: Document,
    tour_id: Option<String>,
    author: &CurrentUser,
) -> Result<(StatusCode, Json<ApiResult<Value>>), AppError> {
    if let Some(tour_id) = tour_id {
        payload.entry(TOUR_FIELD).or_insert(Value::String(tour_id));
    }
    payload
        .entry(USER_FIELD)
        .or_insert_with(|| Value::String(author.0.id.clone()));

    let review = state.reviews.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResult::success(json!({ "review": review }))),
    ))
}

pub async fn create_review(
    State(state): State<AppState>,
    Extension(author): Extension<CurrentUser>,
    Json(payload): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    create(&state, payload, None, &author).await
}

pub async fn create_tour_review(
    State(state): State<AppState>,
    Path(tour_id): Path<String>,
    Extension(author): Extension<CurrentUser>,
    Json(payload): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    create(&state, payload, Some(tour_id), &author).await
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let review = state.reviews.get_one(&id, &[], Scope::Visible).await?;
    Ok(Json(ApiResult::success(json!({ "review": review }))))
}

pub async fn update_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let review = state.reviews.update(&id, patch, Scope::Visible).await?;
    Ok(Json(ApiResult::success(json!({ "review": review }))))
}

pub async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.reviews.delete(&id, Scope::Visible).await?;
    Ok(StatusCode::NO_CONTENT)
}
