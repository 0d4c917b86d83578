//! Downtime alerts.
//!
//! The scheduler calls [`AlertDispatcher::dispatch_down`] once per up/unknown
//! to down transition. Errors are returned so the caller can log them; the
//! dispatcher itself neither retries nor queues.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::database::models::{Monitor, User};
use crate::i18n::Locale;
use crate::monitoring::types::UserId;
use crate::transport::{MessageTransport, TransportError};
use crate::users::{UserDirectory, UserError};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Owner {0} of the monitor no longer exists")]
    OwnerNotFound(UserId),

    #[error("Failed to look up monitor owner: {0}")]
    Directory(#[from] UserError),

    #[error("Failed to deliver alert: {0}")]
    Delivery(#[from] TransportError),
}

/// What happened to an alert that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The owner turned notifications off
    Muted,
}

pub struct AlertDispatcher {
    users: Arc<dyn UserDirectory>,
    transport: Arc<dyn MessageTransport>,
}

impl AlertDispatcher {
    pub fn new(users: Arc<dyn UserDirectory>, transport: Arc<dyn MessageTransport>) -> Self {
        Self { users, transport }
    }

    /// Alert the owner of `monitor` that it just went down
    pub async fn dispatch_down(
        &self,
        monitor: &Monitor,
        detail: &str,
    ) -> Result<Delivery, NotificationError> {
        let owner = self
            .users
            .get_user(monitor.user_id)
            .await?
            .ok_or(NotificationError::OwnerNotFound(monitor.user_id))?;
        self.notify_down(&owner, monitor, detail).await
    }

    pub async fn notify_down(
        &self,
        user: &User,
        monitor: &Monitor,
        detail: &str,
    ) -> Result<Delivery, NotificationError> {
        if !user.notifications_enabled {
            debug!(monitor = %monitor.id, user = %user.id, "Notifications muted, alert skipped");
            return Ok(Delivery::Muted);
        }

        let text = down_alert_text(user.locale, monitor, detail);
        self.transport.send_message(&user.chat_id, &text).await?;
        info!(monitor = %monitor.id, user = %user.id, "Sent downtime alert");
        Ok(Delivery::Sent)
    }
}

pub fn down_alert_text(locale: Locale, monitor: &Monitor, detail: &str) -> String {
    let locale = locale.code();
    format!(
        "⚠️ {}\n{}: {}\nURL: {}\n{}: {}",
        t!("monitor_down_alert", locale = locale),
        t!("name", locale = locale),
        monitor.name,
        monitor.url,
        t!("error", locale = locale),
        detail
    )
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators shared by the alert and scheduler tests

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct StaticUsers {
        users: Mutex<HashMap<UserId, User>>,
    }

    impl StaticUsers {
        pub fn insert(&self, user: User) {
            self.users.lock().unwrap().insert(user.id, user);
        }
    }

    #[async_trait::async_trait]
    impl UserDirectory for StaticUsers {
        async fn get_user(&self, id: UserId) -> Result<Option<User>, UserError> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn get_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>, UserError> {
            Ok(self.users.lock().unwrap().values().find(|u| u.chat_id == chat_id).cloned())
        }

        async fn validate_credentials(&self, _: &str, _: &str) -> Result<Option<User>, UserError> {
            Ok(None)
        }
    }

    /// Transport that records every message, optionally failing instead
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingTransport {
        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send_message(&self, destination: &str, text: &str) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Rejected("chat not found".to_string()));
            }
            self.sent.lock().unwrap().push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    pub fn user(chat_id: &str) -> User {
        User {
            id: uuid::Uuid::new_v4(),
            chat_id: chat_id.to_string(),
            username: format!("user{chat_id}"),
            password_hash: String::new(),
            locale: Locale::En,
            notifications_enabled: true,
            created_at: chrono::Utc::now(),
        }
    }
}
