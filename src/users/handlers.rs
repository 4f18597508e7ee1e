use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{extractors::AuthUser, services::TokenAuthority},
    error::AppResult,
    state::AppState,
    users::repo_types::User,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/profile", get(get_profile))
}

/// Full user record for the bearer; hash and session are never serialized.
#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<User>> {
    let user = TokenAuthority::from_ref(&state)
        .current_user(user_id)
        .await?;
    Ok(Json(user))
}
