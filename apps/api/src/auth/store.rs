use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::roles::Role;
use crate::db::StoreError;
use crate::models::user::UserRow;

/// An authentication principal. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `false` when the email is already taken.
    async fn insert(&self, user: &User) -> Result<bool, StoreError>;

    /// Lookup by normalized (trimmed, lowercased) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: &User) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, name, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;

    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryUserStore {
        users: Mutex<HashMap<Uuid, User>>,
    }

    impl MemoryUserStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn remove(&self, id: Uuid) {
            self.users.lock().await.remove(&id);
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn insert(&self, user: &User) -> Result<bool, StoreError> {
            let mut users = self.users.lock().await;
            if users.values().any(|u| u.email == user.email) {
                return Ok(false);
            }
            users.insert(user.id, user.clone());
            Ok(true)
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            Ok(self
                .users
                .lock()
                .await
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            Ok(self.users.lock().await.get(&id).cloned())
        }
    }
}
