use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::jwt::TokenIssuer;
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::roles::Role;
use crate::auth::store::{User, UserStore};
use crate::auth::AuthError;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A user together with a freshly issued session token.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserStore>,
    tokens: TokenIssuer,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenIssuer) -> Self {
        Self { users, tokens }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&req.email);
        if !email.contains('@') {
            return Err(AuthError::Validation("A valid email is required".into()));
        }
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AuthError::Validation("Name is required".into()));
        }
        validate_password_strength(&req.password).map_err(AuthError::Validation)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let password = req.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(AuthError::Hashing)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            name,
            role: req.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        if !self.users.insert(&user).await? {
            return Err(AuthError::AlreadyExists);
        }

        info!("Registered user {} ({})", user.id, user.role);
        let token = self.tokens.issue(user.id, &user.email)?;
        Ok(Session { user, token })
    }

    /// Unknown email and wrong password fail with the same error.
    pub async fn login(&self, req: LoginRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&req.email);
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let password = req.password;
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(AuthError::Hashing)?;
        if !matches {
            return Err(AuthError::InvalidCredentials);
        }

        info!("User {} logged in", user.id);
        let token = self.tokens.issue(user.id, &user.email)?;
        Ok(Session { user, token })
    }

    /// Verifies a bearer token and reloads its user, so deleted accounts are refused.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        self.users
            .find_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UnknownUser)
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UnknownUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::memory::MemoryUserStore;

    fn service() -> (IdentityService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        let service = IdentityService::new(store.clone(), TokenIssuer::new("test-secret"));
        (service, store)
    }

    fn register_req(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "hunter22".into(),
            name: "Ada".into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn test_register_issues_token_for_reader() {
        let (service, _) = service();
        let session = service.register(register_req("Ada@Example.com ")).await.unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert_eq!(session.user.role, Role::Reader);
        assert_ne!(session.user.password_hash, "hunter22");

        let user = service.authenticate(&session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_register_with_content_role() {
        let (service, _) = service();
        let mut req = register_req("ed@example.com");
        req.role = Some(Role::Content);
        let session = service.register(req).await.unwrap();
        assert_eq!(session.user.role, Role::Content);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (service, _) = service();
        service.register(register_req("ada@example.com")).await.unwrap();
        let err = service
            .register(register_req("ADA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (service, _) = service();
        let mut short = register_req("a@b.c");
        short.password = "123".into();
        assert!(matches!(
            service.register(short).await.unwrap_err(),
            AuthError::Validation(_)
        ));
        assert!(matches!(
            service.register(register_req("no-at-sign")).await.unwrap_err(),
            AuthError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_login_succeeds_with_correct_password() {
        let (service, _) = service();
        service.register(register_req("ada@example.com")).await.unwrap();
        let session = service
            .login(LoginRequest {
                email: "ada@example.com".into(),
                password: "hunter22".into(),
            })
            .await
            .unwrap();
        assert!(!session.token.is_empty());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _) = service();
        service.register(register_req("ada@example.com")).await.unwrap();

        let wrong_password = service
            .login(LoginRequest {
                email: "ada@example.com".into(),
                password: "not-it".into(),
            })
            .await
            .unwrap_err();
        let unknown_email = service
            .login(LoginRequest {
                email: "nobody@example.com".into(),
                password: "hunter22".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
    }

    #[tokio::test]
    async fn test_deleted_user_token_is_refused() {
        let (service, store) = service();
        let session = service.register(register_req("ada@example.com")).await.unwrap();
        store.remove(session.user.id).await;
        let err = service.authenticate(&session.token).await.unwrap_err();
        assert!(matches!(err, AuthError::UnknownUser));
    }

    #[tokio::test]
    async fn test_tampered_token_is_invalid() {
        let (service, _) = service();
        let session = service.register(register_req("ada@example.com")).await.unwrap();
        let err = service
            .authenticate(&format!("{}x", session.token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
