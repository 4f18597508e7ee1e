use std::sync::Arc;

use axum::extract::FromRef;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
    },
    error::{AppError, AppResult},
    state::AppState,
    users::{
        repo::{UserStore, DUPLICATE_EMAIL},
        repo_types::{NewUser, User},
    },
};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";
pub const REFRESH_TOKEN_REQUIRED: &str = "Refresh token required";
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";
pub const UNAUTHORIZED: &str = "Unauthorized";

/// Hash checked when the email is unknown, so both login failures cost a
/// full argon2 verification.
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues, verifies and rotates tokens against a [`UserStore`]. Each user
/// holds at most one live refresh token; issuing a new one replaces it.
#[derive(Clone)]
pub struct TokenAuthority {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl FromRef<AppState> for TokenAuthority {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), JwtKeys::from_ref(state))
    }
}

impl TokenAuthority {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> AppResult<String> {
        Ok(self.keys.sign_access(user_id)?)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> AppResult<String> {
        Ok(self.keys.sign_refresh(user_id)?)
    }

    /// Issues a fresh pair and stores the refresh half as the user's only
    /// session, overwriting whatever was there.
    async fn start_session(&self, mut user: User) -> AppResult<(User, TokenPair)> {
        let pair = TokenPair {
            access_token: self.issue_access_token(user.id)?,
            refresh_token: self.issue_refresh_token(user.id)?,
        };
        user.refresh_token = Some(pair.refresh_token.clone());
        self.store.save(&user).await?;
        debug!(user_id = %user.id, "session stored");
        Ok((user, pair))
    }

    pub async fn register(&self, new_user: NewUser) -> AppResult<(User, TokenPair)> {
        if self.store.find_by_email(&new_user.email).await?.is_some() {
            warn!(email = %new_user.email, "email already registered");
            return Err(AppError::Validation(DUPLICATE_EMAIL.into()));
        }
        let user = self.store.create(new_user).await?;
        info!(user_id = %user.id, role = %user.role, "user registered");
        self.start_session(user).await
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(User, TokenPair)> {
        let Some(user) = self.store.find_by_email(email).await? else {
            let dummy = DUMMY_HASH
                .get_or_try_init(|| hash_password_blocking("not-a-real-password".into()))
                .await?;
            verify_password_blocking(password.to_string(), dummy.clone()).await?;
            warn!(email = %email, "login unknown email");
            return Err(AppError::Auth(INVALID_CREDENTIALS));
        };

        let ok = verify_password_blocking(password.to_string(), user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::Auth(INVALID_CREDENTIALS));
        }

        info!(user_id = %user.id, "user logged in");
        self.start_session(user).await
    }

    /// Exchanges the stored refresh token for a new pair. A token that is
    /// validly signed but no longer stored has been rotated or logged out.
    pub async fn rotate(&self, presented: Option<&str>) -> AppResult<(User, TokenPair)> {
        let token = presented
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Auth(REFRESH_TOKEN_REQUIRED))?;

        let claims = self.keys.verify_refresh(token).map_err(|e| {
            warn!(error = %e, "refresh token rejected");
            AppError::Auth(INVALID_REFRESH_TOKEN)
        })?;

        let user = match self.store.find_by_refresh_token(token).await? {
            Some(user) if user.id == claims.sub => user,
            Some(user) => {
                warn!(user_id = %user.id, sub = %claims.sub, "refresh token subject mismatch");
                return Err(AppError::Auth(INVALID_REFRESH_TOKEN));
            }
            None => {
                warn!(user_id = %claims.sub, jti = %claims.jti, "superseded refresh token presented");
                return Err(AppError::Auth(INVALID_REFRESH_TOKEN));
            }
        };

        let rotated = self.start_session(user).await?;
        info!(user_id = %rotated.0.id, "refresh token rotated");
        Ok(rotated)
    }

    /// Drops the session holding `presented`, if any. Unknown tokens are
    /// ignored.
    pub async fn logout(&self, presented: Option<&str>) -> AppResult<()> {
        if let Some(token) = presented.filter(|t| !t.is_empty()) {
            let cleared = self.store.clear_refresh_token(token).await?;
            info!(cleared, "logout");
        }
        Ok(())
    }

    pub fn verify_access_token(&self, token: &str) -> AppResult<Uuid> {
        self.keys
            .verify_access(token)
            .map(|claims| claims.sub)
            .map_err(|_| AppError::Auth(UNAUTHORIZED))
    }

    pub async fn current_user(&self, user_id: Uuid) -> AppResult<User> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Auth(UNAUTHORIZED))
    }
}
