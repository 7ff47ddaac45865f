use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::authorize,
    error::AppError,
    models::{Identity, Role},
};

/// Identity resolved by [`protect`], available to handlers as
/// `Extension<CurrentUser>`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

pub async fn protect(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identity = state.guard.authenticate(req.headers()).await?;
    req.extensions_mut().insert(CurrentUser(identity));
    Ok(next.run(req).await)
}

/// Must run inside [`protect`].
pub async fn restrict_to(
    State(allowed): State<&'static [Role]>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let CurrentUser(identity) = req.extensions().get::<CurrentUser>().ok_or_else(|| {
        AppError::Unauthorized("You are not logged in! Please log in to get access.".into())
    })?;
    authorize(identity, allowed)?;
    Ok(next.run(req).await)
}
