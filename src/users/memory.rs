use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::repo::{prepare_new_user, StoreError, StoreResult, UserStore, DUPLICATE_EMAIL};
use crate::users::repo_types::{NewUser, User};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    // user id -> token; mirrors the one-slot `refresh_sessions` table
    sessions: HashMap<Uuid, String>,
}

impl Inner {
    fn with_session(&self, user: &User) -> User {
        let mut user = user.clone();
        user.refresh_token = self.sessions.get(&user.id).cloned();
        user
    }
}

/// In-process store with the same semantics as `PgUserStore`.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.email == email)
            .map(|u| inner.with_session(u)))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).map(|u| inner.with_session(u)))
    }

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        let user_id = inner
            .sessions
            .iter()
            .find(|(_, t)| t.as_str() == token)
            .map(|(id, _)| *id);
        Ok(user_id
            .and_then(|id| inner.users.get(&id))
            .map(|u| inner.with_session(u)))
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        let (new_user, hash) = prepare_new_user(new_user).await?;
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Validation(DUPLICATE_EMAIL.into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name.trim().to_string(),
            email: new_user.email,
            password_hash: hash,
            role: new_user.role,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn save(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Validation(DUPLICATE_EMAIL.into()));
        }
        let Some(stored) = inner.users.get_mut(&user.id) else {
            return Err(StoreError::Backend(anyhow::anyhow!("no user {}", user.id)));
        };
        stored.name = user.name.clone();
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.role = user.role;
        stored.updated_at = OffsetDateTime::now_utc();
        match &user.refresh_token {
            Some(token) => {
                inner.sessions.insert(user.id, token.clone());
            }
            None => {
                inner.sessions.remove(&user.id);
            }
        }
        Ok(())
    }

    async fn clear_refresh_token(&self, token: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, t| t.as_str() != token);
        Ok(inner.sessions.len() != before)
    }
}

/// Store whose backend is always down.
pub struct FailingUserStore;

fn backend_down<T>() -> StoreResult<T> {
    Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
}

#[async_trait]
impl UserStore for FailingUserStore {
    async fn find_by_email(&self, _email: &str) -> StoreResult<Option<User>> {
        backend_down()
    }

    async fn find_by_id(&self, _id: Uuid) -> StoreResult<Option<User>> {
        backend_down()
    }

    async fn find_by_refresh_token(&self, _token: &str) -> StoreResult<Option<User>> {
        backend_down()
    }

    async fn create(&self, _new_user: NewUser) -> StoreResult<User> {
        backend_down()
    }

    async fn save(&self, _user: &User) -> StoreResult<()> {
        backend_down()
    }

    async fn clear_refresh_token(&self, _token: &str) -> StoreResult<bool> {
        backend_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "A".into(),
            email: email.into(),
            password: "secret1".into(),
            role: Role::Client,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_and_first_user_untouched() {
        let store = MemoryUserStore::new();
        let first = store.create(new_user("a@x.com")).await.unwrap();

        let err = store.create(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(ref m) if m == DUPLICATE_EMAIL));

        let found = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(found.password_hash, first.password_hash);
    }

    #[tokio::test]
    async fn email_uniqueness_is_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@x.com")).await.unwrap();
        assert!(store.create(new_user("A@x.com")).await.is_ok());
    }

    #[tokio::test]
    async fn stored_secret_is_not_plaintext() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("a@x.com")).await.unwrap();
        assert_ne!(user.password_hash, "secret1");
    }

    #[tokio::test]
    async fn session_slot_is_overwritten_and_cleared() {
        let store = MemoryUserStore::new();
        let mut user = store.create(new_user("a@x.com")).await.unwrap();

        user.refresh_token = Some("one".into());
        store.save(&user).await.unwrap();
        user.refresh_token = Some("two".into());
        store.save(&user).await.unwrap();

        assert!(store.find_by_refresh_token("one").await.unwrap().is_none());
        let found = store.find_by_refresh_token("two").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);

        assert!(store.clear_refresh_token("two").await.unwrap());
        assert!(!store.clear_refresh_token("two").await.unwrap());
        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.refresh_token.is_none());
    }

    #[tokio::test]
    async fn saving_unknown_user_fails() {
        let store = MemoryUserStore::new();
        let mut ghost = store.create(new_user("a@x.com")).await.unwrap();
        ghost.id = Uuid::new_v4();
        ghost.email = "ghost@x.com".into();
        ghost.refresh_token = Some("t".into());

        let err = store.save(&ghost).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.find_by_refresh_token("t").await.unwrap().is_none());
    }
}
