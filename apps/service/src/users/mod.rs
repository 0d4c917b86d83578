//! Accounts: registration, credential checks and per-user preferences.

pub mod password;
pub mod sessions;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::database::Database;
use crate::database::models::User;
use crate::i18n::Locale;
use crate::monitoring::types::UserId;

pub use sessions::{LoginAttempt, Sessions};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 32;
pub const MIN_PASSWORD_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Username must be 3-32 letters, digits or underscores")]
    InvalidUsername,

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    InvalidPassword,

    #[error("Username {0} is already taken")]
    UsernameTaken(String),

    #[error("User {0} not found")]
    NotFound(UserId),

    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] argon2::password_hash::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Read access to users, as needed to route alerts and authenticate chats
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, UserError>;

    async fn get_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>, UserError>;

    /// The user whose credentials match, if any
    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserError>;
}

pub fn validate_username(username: &str) -> Result<&str, UserError> {
    let valid_chars = username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    let len = username.chars().count();
    if !valid_chars || !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(UserError::InvalidUsername);
    }
    Ok(username)
}

pub fn validate_password(password: &str) -> Result<&str, UserError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(UserError::InvalidPassword);
    }
    Ok(password)
}

/// Database-backed [`UserDirectory`] that can also create and update accounts
pub struct Accounts {
    database: Arc<dyn Database>,
    default_locale: Locale,
}

impl Accounts {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self { database, default_locale: Locale::default() }
    }

    /// Locale given to newly registered users
    pub fn with_default_locale(mut self, locale: Locale) -> Self {
        self.default_locale = locale;
        self
    }

    pub fn default_locale(&self) -> Locale {
        self.default_locale
    }

    /// Create an account bound to `chat_id`
    pub async fn register(
        &self,
        chat_id: &str,
        username: &str,
        password: &str,
    ) -> Result<User, UserError> {
        let username = validate_username(username)?;
        let password = validate_password(password)?;
        if self.database.get_user_by_username(username).await?.is_some() {
            return Err(UserError::UsernameTaken(username.to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            chat_id: chat_id.to_string(),
            username: username.to_string(),
            password_hash: password::hash_password(password)?,
            locale: self.default_locale,
            notifications_enabled: true,
            created_at: Utc::now(),
        };
        self.database.insert_user(&user).await?;
        tracing::info!(user = %user.id, username = %user.username, "Registered user");
        Ok(user)
    }

    /// Point future alerts for `user` at the chat it last logged in from
    pub async fn bind_chat(&self, user: &User, chat_id: &str) -> Result<User, UserError> {
        self.modify(user.id, |u| u.chat_id = chat_id.to_string()).await
    }

    pub async fn set_notifications(&self, id: UserId, enabled: bool) -> Result<User, UserError> {
        self.modify(id, |u| u.notifications_enabled = enabled).await
    }

    pub async fn set_locale(&self, id: UserId, locale: Locale) -> Result<User, UserError> {
        self.modify(id, |u| u.locale = locale).await
    }

    async fn modify(&self, id: UserId, change: impl FnOnce(&mut User)) -> Result<User, UserError> {
        let mut user = self.database.get_user(id).await?.ok_or(UserError::NotFound(id))?;
        change(&mut user);
        self.database.update_user(&user).await?;
        Ok(user)
    }
}

#[async_trait::async_trait]
impl UserDirectory for Accounts {
    async fn get_user(&self, id: UserId) -> Result<Option<User>, UserError> {
        Ok(self.database.get_user(id).await?)
    }

    async fn get_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>, UserError> {
        Ok(self.database.get_user_by_chat_id(chat_id).await?)
    }

    async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserError> {
        let Some(user) = self.database.get_user_by_username(username).await? else {
            return Ok(None);
        };
        let valid = password::verify_password(password, &user.password_hash)?;
        Ok(valid.then_some(user))
    }
}
