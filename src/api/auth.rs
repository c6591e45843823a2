use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// Identity header set by the upstream auth proxy.
pub const USER_HEADER: &str = "x-user-email";

/// The signed-in user. Created in the store on first request.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing X-User-Email".to_string()))?;

        let user = state.users.ensure_user(email).await?;
        Ok(CurrentUser(user))
    }
}
