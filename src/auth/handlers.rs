use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, instrument, warn};

use crate::{
    auth::{
        cookies::{cleared_refresh_cookie, refresh_cookie, REFRESH_COOKIE},
        dto::{AccessTokenResponse, AuthResponse, LoginRequest, MessageResponse, RegisterRequest},
        jwt::JwtKeys,
        services::{TokenAuthority, TokenPair},
    },
    error::{AppError, AppResult},
    state::AppState,
    users::repo_types::NewUser,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/logout", post(logout))
}

fn with_refresh_cookie(state: &AppState, jar: CookieJar, pair: &TokenPair) -> CookieJar {
    let keys = JwtKeys::from_ref(state);
    jar.add(refresh_cookie(
        pair.refresh_token.clone(),
        keys.refresh_ttl,
        state.config.secure_cookies(),
    ))
}

fn presented_refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE).map(|c| c.value().to_string())
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let Json(payload) = payload?;
    let new_user = NewUser::try_from(payload).map_err(|msg| {
        warn!(reason = %msg, "registration rejected");
        AppError::Validation(msg)
    })?;

    let authority = TokenAuthority::from_ref(&state);
    let (user, pair) = authority.register(new_user).await?;

    let jar = with_refresh_cookie(&state, jar, &pair);
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse::new(user, pair.access_token)),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let Json(payload) = payload?;

    let authority = TokenAuthority::from_ref(&state);
    let (user, pair) = authority
        .authenticate(&payload.email, &payload.password)
        .await?;

    let jar = with_refresh_cookie(&state, jar, &pair);
    Ok((jar, Json(AuthResponse::new(user, pair.access_token))))
}

#[instrument(skip(state, jar))]
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<AccessTokenResponse>)> {
    let presented = presented_refresh_token(&jar);

    let authority = TokenAuthority::from_ref(&state);
    let (_, pair) = authority.rotate(presented.as_deref()).await?;

    let jar = with_refresh_cookie(&state, jar, &pair);
    Ok((
        jar,
        Json(AccessTokenResponse {
            access_token: pair.access_token,
        }),
    ))
}

/// Always clears the cookie, whatever the store says about the token.
#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let presented = presented_refresh_token(&jar);

    let authority = TokenAuthority::from_ref(&state);
    if let Err(e) = authority.logout(presented.as_deref()).await {
        error!(error = %e, "logout could not clear stored session");
    }

    let jar = jar.add(cleared_refresh_cookie(state.config.secure_cookies()));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}
