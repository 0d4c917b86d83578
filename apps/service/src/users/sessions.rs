//! Per-chat session contexts.
//!
//! A session is created when a chat logs in or registers and destroyed on
//! logout or after the idle timeout. Failed login attempts are counted per
//! chat; reaching the limit locks the chat out for one idle timeout.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::monitoring::types::UserId;

#[derive(Debug, Clone)]
struct Session {
    user_id: Option<UserId>,
    failed_logins: u32,
    locked_until: Option<Instant>,
    last_seen: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self { user_id: None, failed_logins: 0, locked_until: None, last_seen: now }
    }
}

/// Result of recording a failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginAttempt {
    Remaining(u32),
    LockedOut,
}

pub struct Sessions {
    sessions: Mutex<HashMap<String, Session>>,
    idle_timeout: Duration,
    max_login_attempts: u32,
}

impl Sessions {
    pub fn new(idle_timeout: Duration, max_login_attempts: u32) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), idle_timeout, max_login_attempts: max_login_attempts.max(1) }
    }

    fn expired(&self, session: &Session, now: Instant) -> bool {
        now.duration_since(session.last_seen) >= self.idle_timeout
            && session.locked_until.is_none_or(|until| now >= until)
    }

    /// User logged in on this chat, refreshing the session's idle timer
    pub async fn current_user(&self, chat_id: &str) -> Option<UserId> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(chat_id)?;
        if self.expired(session, now) {
            sessions.remove(chat_id);
            return None;
        }
        if session.user_id.is_some() {
            session.last_seen = now;
        }
        session.user_id
    }

    pub async fn login(&self, chat_id: &str, user_id: UserId) {
        let now = Instant::now();
        let mut session = Session::new(now);
        session.user_id = Some(user_id);
        self.sessions.lock().await.insert(chat_id.to_string(), session);
    }

    /// Destroy the chat's session. Returns whether a user was logged in.
    pub async fn logout(&self, chat_id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .remove(chat_id)
            .is_some_and(|session| session.user_id.is_some())
    }

    pub async fn is_locked_out(&self, chat_id: &str) -> bool {
        let now = Instant::now();
        let sessions = self.sessions.lock().await;
        sessions
            .get(chat_id)
            .and_then(|s| s.locked_until)
            .is_some_and(|until| now < until)
    }

    pub async fn record_failed_login(&self, chat_id: &str) -> LoginAttempt {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(chat_id.to_string()).or_insert_with(|| Session::new(now));
        if session.locked_until.is_some_and(|until| now >= until) {
            session.locked_until = None;
            session.failed_logins = 0;
        }

        session.failed_logins += 1;
        session.last_seen = now;
        if session.failed_logins >= self.max_login_attempts {
            session.locked_until = Some(now + self.idle_timeout);
            LoginAttempt::LockedOut
        } else {
            LoginAttempt::Remaining(self.max_login_attempts - session.failed_logins)
        }
    }

    /// Drop idle sessions, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.expired(session, now));
        before - sessions.len()
    }
}
