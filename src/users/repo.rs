use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::auth::password::hash_password_blocking;
use crate::users::repo_types::{NewUser, Role, User};

pub const DUPLICATE_EMAIL: &str = "User already exists";
const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db)
                if db.is_unique_violation() && db.constraint() == Some(EMAIL_UNIQUE_CONSTRAINT) =>
            {
                StoreError::Validation(DUPLICATE_EMAIL.into())
            }
            _ => StoreError::Backend(e.into()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records and their single active refresh token.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<User>>;

    /// Validates and hashes `new_user`, then inserts it without a session.
    async fn create(&self, new_user: NewUser) -> StoreResult<User>;

    /// Persists profile fields and replaces (or clears) the session slot.
    async fn save(&self, user: &User) -> StoreResult<()>;

    /// Drops whichever session holds `token`. Returns whether one matched.
    async fn clear_refresh_token(&self, token: &str) -> StoreResult<bool>;
}

/// Validation plus hashing, shared by every store before it writes.
pub(crate) async fn prepare_new_user(new_user: NewUser) -> StoreResult<(NewUser, String)> {
    new_user.validate().map_err(StoreError::Validation)?;
    let hash = hash_password_blocking(new_user.password.clone()).await?;
    Ok((new_user, hash))
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    refresh_token: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|e| {
            StoreError::Backend(anyhow::anyhow!("corrupt user row {}: {}", row.id, e))
        })?;
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.name, u.email, u.password_hash, u.role,
           s.token AS refresh_token, u.created_at, u.updated_at
    FROM users u
    LEFT JOIN refresh_sessions s ON s.user_id = u.id
"#;

/// Postgres-backed store. Sessions live in `refresh_sessions`, one row per
/// user, so the user row itself never carries token state.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn select_user_where(clause: &str) -> String {
    format!("{SELECT_USER} WHERE {clause}")
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where("u.email = $1"))
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where("u.id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&select_user_where("s.token = $1"))
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        let (new_user, hash) = prepare_new_user(new_user).await?;
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password_hash, role,
                      NULL::text AS refresh_token, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_user.name.trim())
        .bind(&new_user.email)
        .bind(&hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.db)
        .await?;
        let user = User::try_from(row)?;
        debug!(user_id = %user.id, "user row inserted");
        Ok(user)
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE users
            SET name = $2, email = $3, password_hash = $4, role = $5, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .execute(&mut *tx)
        .await?;

        match &user.refresh_token {
            Some(token) => {
                sqlx::query(
                    r#"
                    INSERT INTO refresh_sessions (user_id, token, updated_at)
                    VALUES ($1, $2, now())
                    ON CONFLICT (user_id)
                    DO UPDATE SET token = EXCLUDED.token, updated_at = now()
                    "#,
                )
                .bind(user.id)
                .bind(token)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM refresh_sessions WHERE user_id = $1")
                    .bind(user.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn clear_refresh_token(&self, token: &str) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM refresh_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> UserRow {
        let now = OffsetDateTime::now_utc();
        UserRow {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            password_hash: "$argon2id$x".into(),
            role: role.into(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn row_converts_known_role() {
        let user = User::try_from(row("manager")).unwrap();
        assert_eq!(user.role, Role::Manager);
        assert!(user.refresh_token.is_none());
    }

    #[test]
    fn row_with_unknown_role_is_backend_error() {
        let err = User::try_from(row("admin")).unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn prepare_rejects_before_hashing() {
        let err = prepare_new_user(NewUser {
            name: "A".into(),
            email: "a@x.com".into(),
            password: "short".into(),
            role: Role::Client,
        })
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
