use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    AppState,
    error::AppError,
    models::tour::REVIEWS,
    query::{Comparison, Filter, Predicate, QueryDescription},
    resource::Scope,
    result::ApiResult,
    store::Document,
};

use super::model::{STATS_MIN_AVERAGE, TOP_CHEAP_LIMIT, TOP_CHEAP_SORT, monthly_plan, tour_stats};

pub async fn list_tours(
    State(state): State<AppState>,
    Query(description): Query<QueryDescription>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state.tours.list(&description, None, Scope::Visible).await?;
    Ok(Json(ApiResult::listing(
        listing.results,
        json!({ "tours": listing.items }),
    )))
}

/// `list_tours` with the page size and sort pinned.
pub async fn top_five_cheap(
    state: State<AppState>,
    Query(mut description): Query<QueryDescription>,
) -> Result<impl IntoResponse, AppError> {
    description.set("limit", TOP_CHEAP_LIMIT);
    description.set("sort", TOP_CHEAP_SORT);
    list_tours(state, Query(description)).await
}

pub async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tour = state.tours.get_one(&id, &[REVIEWS], Scope::Visible).await?;
    Ok(Json(ApiResult::success(json!({ "tour": tour }))))
}

pub async fn create_tour(
    State(state): State<AppState>,
    Json(payload): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let tour = state.tours.create(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResult::success(json!({ "tour": tour }))),
    ))
}

pub async fn update_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let tour = state.tours.update(&id, patch, Scope::Visible).await?;
    Ok(Json(ApiResult::success(json!({ "tour": tour }))))
}

pub async fn delete_tour(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.tours.delete(&id, Scope::Visible).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_tour_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let filter = Filter::new().and(Predicate::new(
        "ratingsAverage",
        Comparison::Gte,
        STATS_MIN_AVERAGE,
    ));
    let tours = state.tours.find_all(filter, Scope::Visible).await?;
    let stats = tour_stats(&tours);
    Ok(Json(ApiResult::listing(stats.len(), json!({ "stats": stats }))))
}

pub async fn get_monthly_plan(
    State(state): State<AppState>,
    Path(year): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid year: {year}")))?;
    let tours = state.tours.find_all(Filter::new(), Scope::Visible).await?;
    let plan = monthly_plan(&tours, year);
    Ok(Json(ApiResult::listing(plan.len(), json!({ "plan": plan }))))
}
