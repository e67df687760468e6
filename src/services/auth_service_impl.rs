//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use sea_orm::{DbErr, SqlErr};
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::repositories::user::hash_password;
use crate::db::{NewUser, Store, User};
use crate::services::auth_service::{AuthError, AuthService};

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    async fn hash(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let security = self.security.clone();

        task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(AuthError::from)
    }
}

/// A unique violation that slipped past the existence checks.
fn duplicate_kind(err: &anyhow::Error) -> Option<AuthError> {
    let db_err = err.downcast_ref::<DbErr>()?;
    match db_err.sql_err()? {
        SqlErr::UniqueConstraintViolation(message) if message.contains("email") => {
            Some(AuthError::EmailTaken)
        }
        SqlErr::UniqueConstraintViolation(_) => Some(AuthError::UsernameTaken),
        _ => None,
    }
}

fn require(value: &str, field: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User, AuthError> {
        require(username, "Username")?;
        require(email, "Email")?;
        require(password, "Password")?;

        if self.store.username_exists(username).await? {
            return Err(AuthError::UsernameTaken);
        }
        if self.store.email_exists(email).await? {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.hash(password).await?;

        self.store
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                is_admin,
            })
            .await
            .map_err(|e| duplicate_kind(&e).unwrap_or_else(|| AuthError::from(e)))
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        self.store
            .verify_user_password(username, password)
            .await?
            .ok_or(AuthError::InvalidCredentials)
    }

    async fn load(&self, user_id: i32) -> Result<Option<User>, AuthError> {
        Ok(self.store.get_user(user_id).await?)
    }

    async fn delete_user(&self, user_id: i32) -> Result<bool, AuthError> {
        Ok(self.store.delete_user(user_id).await?)
    }
}
