use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    AppState,
    error::AppError,
    middleware::CurrentUser,
    models::{
        Identity,
        user::{PASSWORD, PASSWORD_CONFIRM},
    },
    query::QueryDescription,
    resource::Scope,
    result::ApiResult,
    store::Document,
};

use super::model::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest, SELF_EDITABLE_FIELDS,
    SIGNUP_FIELDS, UpdatePasswordRequest, pick, touches_password,
};

/// Issues a credential for `identity` and wraps it with the public view of the account.
async fn send_token(
    state: &AppState,
    identity: &Identity,
    status: StatusCode,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let token = state.credentials.issue(&identity.id)?;
    let user = state.users.get_one(&identity.id, &[], Scope::Visible).await?;
    Ok((status, Json(AuthResponse::new(token, user))))
}

#[axum::debug_handler]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let credentials = state.credentials.clone();
    let created = state
        .users
        .create_with(pick(&payload, SIGNUP_FIELDS), move |user| {
            let password = user.get(PASSWORD).and_then(Value::as_str).unwrap_or_default();
            let hashed = credentials.hash_password(password)?;
            user.insert(PASSWORD.into(), Value::String(hashed));
            user.remove(PASSWORD_CONFIRM);
            Ok(())
        })
        .await?;

    let id = created
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Internal("created user has no id".into()))?;
    info!(user = id, "account created");
    let token = state.credentials.issue(id)?;
    Ok((StatusCode::CREATED, Json(AuthResponse::new(token, created))))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(email), Some(password)) = (
        req.email.filter(|e| !e.trim().is_empty()),
        req.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::BadRequest("Please provide email and password!".into()));
    };

    let identity = state.credentials.login(&email, &password).await?;
    send_token(&state, &identity, StatusCode::OK).await
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.unwrap_or_default();
    let identity = state
        .credentials
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with that email address.".into()))?;

    let token = state.credentials.create_reset_token(&identity).await?;
    let reset_url = state.config.reset_url(&token);

    if let Err(e) = state.mailer.deliver(&identity.email, &reset_url).await {
        warn!(user = %identity.id, "reset mail failed, discarding token");
        state.credentials.clear_reset_token(&identity).await?;
        return Err(AppError::Mail(e));
    }
    Ok(Json(ApiResult::<()>::notice("Token sent to email!")))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = state
        .credentials
        .consume_reset_token(&token, &req.password, &req.password_confirm)
        .await?;
    info!(user = %identity.id, "password reset");
    send_token(&state, &identity, StatusCode::OK).await
}

#[axum::debug_handler]
pub async fn update_password(
    State(state): State<AppState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state
        .credentials
        .update_password(
            &identity,
            &req.password_current,
            &req.password,
            &req.password_confirm,
        )
        .await?;
    send_token(&state, &updated, StatusCode::OK).await
}

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.get_one(&identity.id, &[], Scope::Visible).await?;
    Ok(Json(ApiResult::success(json!({ "user": user }))))
}

#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
    Json(payload): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    if touches_password(&payload) {
        return Err(AppError::BadRequest(
            "This route is not for password updates. Please use /update-password.".into(),
        ));
    }
    let user = state
        .users
        .update(&identity.id, pick(&payload, SELF_EDITABLE_FIELDS), Scope::Visible)
        .await?;
    Ok(Json(ApiResult::success(json!({ "user": user }))))
}

#[axum::debug_handler]
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(CurrentUser(identity)): Extension<CurrentUser>,
) -> Result<StatusCode, AppError> {
    state.users.delete(&identity.id, Scope::Visible).await?;
    info!(user = %identity.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

// Administration. Deactivated accounts stay reachable here.

pub async fn list_users(
    State(state): State<AppState>,
    Query(description): Query<QueryDescription>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state.users.list(&description, None, Scope::All).await?;
    Ok(Json(ApiResult::listing(
        listing.results,
        json!({ "users": listing.items }),
    )))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.get_one(&id, &[], Scope::All).await?;
    Ok(Json(ApiResult::success(json!({ "user": user }))))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.users.update(&id, patch, Scope::All).await?;
    Ok(Json(ApiResult::success(json!({ "user": user }))))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.users.delete(&id, Scope::All).await?;
    Ok(StatusCode::NO_CONTENT)
}
