use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, SameSite};

pub const REFRESH_COOKIE: &str = "refreshToken";

/// HttpOnly, SameSite=Strict cookie carrying the refresh token.
pub fn refresh_cookie(token: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(
            i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX),
        ))
        .build()
}

/// Same attributes as [`refresh_cookie`], emptied and expired.
pub fn cleared_refresh_cookie(secure: bool) -> Cookie<'static> {
    let mut cookie = refresh_cookie(String::new(), Duration::ZERO, secure);
    cookie.make_removal();
    cookie
}
