use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use super::{Command, ParseError};
use crate::database::Database;
use crate::database::models::{Monitor, User};
use crate::i18n::Locale;
use crate::monitoring::scheduler::{NewMonitor, Scheduler, SchedulerError};
use crate::monitoring::store::{MonitorStore, StoreError};
use crate::monitoring::types::MonitorStatus;
use crate::monitoring::validation::{self, MAX_INTERVAL_SECONDS, ValidationError};
use crate::users::{Accounts, LoginAttempt, Sessions, UserDirectory, UserError};

/// Rows shown by `/history`
const HISTORY_LIMIT: usize = 10;

/// Shortest id prefix accepted in place of a full monitor id
pub const MIN_ID_PREFIX: usize = 4;

/// Outcome of resolving a user-typed monitor id
#[derive(Debug, PartialEq)]
pub enum Lookup {
    Found(Monitor),
    NotFound,
    Ambiguous,
}

/// Match `raw` against `monitors` as a full id or a unique id prefix
pub fn resolve_monitor(monitors: Vec<Monitor>, raw: &str) -> Lookup {
    if let Ok(id) = Uuid::parse_str(raw) {
        return match monitors.into_iter().find(|m| m.id == id) {
            Some(monitor) => Lookup::Found(monitor),
            None => Lookup::NotFound,
        };
    }

    let prefix = raw.replace('-', "").to_ascii_lowercase();
    if prefix.len() < MIN_ID_PREFIX || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
        return Lookup::NotFound;
    }

    let mut matches =
        monitors.into_iter().filter(|m| m.id.simple().to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(monitor), None) => Lookup::Found(monitor),
        (Some(_), Some(_)) => Lookup::Ambiguous,
        (None, _) => Lookup::NotFound,
    }
}

fn status_marker(status: MonitorStatus) -> &'static str {
    match status {
        MonitorStatus::Up => "🟢",
        MonitorStatus::Down => "🔴",
        MonitorStatus::Unknown => "⚪️",
    }
}

fn monitor_marker(monitor: &Monitor) -> String {
    let marker = status_marker(monitor.status);
    if monitor.is_active { marker.to_string() } else { format!("{marker} ⏸️") }
}

fn status_text(locale: Locale, monitor: &Monitor) -> String {
    let locale = locale.code();
    let key = match monitor.status {
        MonitorStatus::Up => "status_up",
        MonitorStatus::Down => "status_down",
        MonitorStatus::Unknown => "status_unknown",
    };
    let status = t!(key, locale = locale);
    if monitor.is_active {
        status.into_owned()
    } else {
        format!("{status} ({})", t!("status_paused", locale = locale))
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn validation_reply(locale: Locale, error: &ValidationError, min_interval: u64) -> String {
    let locale = locale.code();
    match error {
        ValidationError::InvalidScheme
        | ValidationError::InvalidUrl(_)
        | ValidationError::MissingHost => t!("invalid_url", locale = locale).into_owned(),
        ValidationError::IntervalTooShort { .. }
        | ValidationError::IntervalTooLong { .. }
        | ValidationError::IntervalNotANumber(_) => {
            t!("invalid_interval", locale = locale, min = min_interval, max = MAX_INTERVAL_SECONDS)
                .into_owned()
        }
        ValidationError::EmptyName | ValidationError::NameTooLong => {
            t!("invalid_name", locale = locale).into_owned()
        }
    }
}

/// Executes chat commands against the scheduler, store and accounts
pub struct CommandHandler {
    scheduler: Scheduler,
    store: Arc<MonitorStore>,
    accounts: Arc<Accounts>,
    sessions: Arc<Sessions>,
    history: Arc<dyn Database>,
}

impl CommandHandler {
    pub fn new(
        scheduler: Scheduler,
        store: Arc<MonitorStore>,
        accounts: Arc<Accounts>,
        sessions: Arc<Sessions>,
        history: Arc<dyn Database>,
    ) -> Self {
        Self { scheduler, store, accounts, sessions, history }
    }

    /// Reply to one message from `chat_id`
    pub async fn handle(&self, chat_id: &str, text: &str) -> String {
        let user = match self.current_user(chat_id).await {
            Ok(user) => user,
            Err(e) => {
                error!(chat_id, "Failed to load session user: {e:#}");
                None
            }
        };
        let locale = user.as_ref().map_or(self.accounts.default_locale(), |u| u.locale);

        let command = match text.parse::<Command>() {
            Ok(command) => command,
            Err(ParseError::Unknown) => return t!("unknown_command", locale = locale.code()).into_owned(),
            Err(ParseError::Usage(usage)) => {
                return t!("usage", locale = locale.code(), usage = usage).into_owned();
            }
        };

        match self.execute(chat_id, user, locale, command).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(chat_id, "Command failed: {e:#}");
                t!("internal_error", locale = locale.code()).into_owned()
            }
        }
    }

    async fn current_user(&self, chat_id: &str) -> Result<Option<User>> {
        let Some(id) = self.sessions.current_user(chat_id).await else {
            return Ok(None);
        };
        let user = self.accounts.get_user(id).await?;
        if user.is_none() {
            self.sessions.logout(chat_id).await;
        }
        Ok(user)
    }

    async fn execute(
        &self,
        chat_id: &str,
        user: Option<User>,
        locale: Locale,
        command: Command,
    ) -> Result<String> {
        let code = locale.code();
        match command {
            Command::Start => Ok(match &user {
                Some(user) => t!("welcome_back", locale = code, username = user.username),
                None => t!("welcome", locale = code),
            }
            .into_owned()),
            Command::Help => Ok(t!("help", locale = code).into_owned()),
            Command::Register { username, password } => {
                if user.is_some() {
                    return Ok(t!("already_logged_in", locale = code).into_owned());
                }
                self.register(chat_id, locale, &username, &password).await
            }
            Command::Login { username, password } => {
                if user.is_some() {
                    return Ok(t!("already_logged_in", locale = code).into_owned());
                }
                self.login(chat_id, locale, &username, &password).await
            }
            Command::Logout => {
                let key = if self.sessions.logout(chat_id).await { "logged_out" } else { "not_logged_in" };
                Ok(t!(key, locale = code).into_owned())
            }
            command => match user {
                Some(user) => self.execute_for(&user, command).await,
                None => Ok(t!("login_required", locale = code).into_owned()),
            },
        }
    }

    async fn register(
        &self,
        chat_id: &str,
        locale: Locale,
        username: &str,
        password: &str,
    ) -> Result<String> {
        if self.accounts.get_user_by_chat_id(chat_id).await?.is_some() {
            return Ok(t!("already_registered", locale = locale.code()).into_owned());
        }

        let key = match self.accounts.register(chat_id, username, password).await {
            Ok(user) => {
                self.sessions.login(chat_id, user.id).await;
                let reply =
                    t!("registration_success", locale = user.locale.code(), username = user.username);
                return Ok(reply.into_owned());
            }
            Err(UserError::InvalidUsername) => "invalid_username",
            Err(UserError::InvalidPassword) => "invalid_password",
            Err(UserError::UsernameTaken(_)) => "username_taken",
            Err(e) => return Err(e.into()),
        };
        Ok(t!(key, locale = locale.code()).into_owned())
    }

    async fn login(
        &self,
        chat_id: &str,
        locale: Locale,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let code = locale.code();
        if self.sessions.is_locked_out(chat_id).await {
            return Ok(t!("max_attempts", locale = code).into_owned());
        }

        match self.accounts.validate_credentials(username, password).await? {
            Some(user) => {
                let user = self.accounts.bind_chat(&user, chat_id).await?;
                self.sessions.login(chat_id, user.id).await;
                info!(user = %user.id, chat_id, "User logged in");
                Ok(t!("login_success", locale = user.locale.code(), username = user.username).into_owned())
            }
            None => Ok(match self.sessions.record_failed_login(chat_id).await {
                LoginAttempt::Remaining(attempts) => {
                    t!("invalid_credentials", locale = code, attempts = attempts)
                }
                LoginAttempt::LockedOut => t!("max_attempts", locale = code),
            }
            .into_owned()),
        }
    }

    /// Commands that need a logged-in user
    async fn execute_for(&self, user: &User, command: Command) -> Result<String> {
        let locale = user.locale;
        let code = locale.code();
        let min_interval = self.scheduler.min_interval_seconds();

        match command {
            Command::Add { name, url, interval } => {
                let interval_seconds = match validation::parse_interval(&interval, min_interval) {
                    Ok(seconds) => seconds,
                    Err(e) => return Ok(validation_reply(locale, &e, min_interval)),
                };
                let new = NewMonitor { user_id: user.id, name, url, interval_seconds };
                match self.scheduler.add(new).await {
                    Ok(monitor) => Ok(t!(
                        "monitor_added",
                        locale = code,
                        name = monitor.name,
                        interval = monitor.interval_seconds,
                        id = monitor.short_id()
                    )
                    .into_owned()),
                    Err(SchedulerError::Validation(e)) => Ok(validation_reply(locale, &e, min_interval)),
                    Err(e) => Err(e.into()),
                }
            }
            Command::List => {
                let monitors = self.store.list_for_user(user.id).await;
                if monitors.is_empty() {
                    return Ok(t!("no_monitors", locale = code).into_owned());
                }
                let lines: Vec<String> = monitors
                    .iter()
                    .map(|m| {
                        t!(
                            "monitor_line",
                            locale = code,
                            marker = monitor_marker(m),
                            name = m.name,
                            id = m.short_id()
                        )
                        .into_owned()
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Show(raw) => {
                let monitor = match self.find_monitor(user, &raw).await {
                    Ok(monitor) => monitor,
                    Err(reply) => return Ok(reply),
                };
                let last_checked = monitor
                    .last_checked
                    .map_or_else(|| t!("never", locale = code).into_owned(), format_time);
                let response_time = monitor
                    .last_response_time_ms
                    .map_or_else(|| t!("na", locale = code).into_owned(), |ms| format!("{ms}ms"));
                Ok(t!(
                    "monitor_details",
                    locale = code,
                    name = monitor.name,
                    url = monitor.url,
                    status = status_text(locale, &monitor),
                    last_checked = last_checked,
                    response_time = response_time,
                    uptime = format!("{:.2}", monitor.uptime_percentage),
                    interval = monitor.interval_seconds,
                    id = monitor.id
                )
                .into_owned())
            }
            Command::Pause(raw) => {
                let monitor = match self.find_monitor(user, &raw).await {
                    Ok(monitor) => monitor,
                    Err(reply) => return Ok(reply),
                };
                self.control_reply(locale, self.scheduler.pause(monitor.id).await, "monitor_paused")
            }
            Command::Resume(raw) => {
                let monitor = match self.find_monitor(user, &raw).await {
                    Ok(monitor) => monitor,
                    Err(reply) => return Ok(reply),
                };
                self.control_reply(locale, self.scheduler.resume(monitor.id).await, "monitor_resumed")
            }
            Command::Delete(raw) => {
                let monitor = match self.find_monitor(user, &raw).await {
                    Ok(monitor) => monitor,
                    Err(reply) => return Ok(reply),
                };
                self.scheduler.remove(monitor.id).await?;
                Ok(t!("monitor_deleted", locale = code, name = monitor.name).into_owned())
            }
            Command::Interval { id, seconds } => {
                let monitor = match self.find_monitor(user, &id).await {
                    Ok(monitor) => monitor,
                    Err(reply) => return Ok(reply),
                };
                let seconds = match validation::parse_interval(&seconds, min_interval) {
                    Ok(seconds) => seconds,
                    Err(e) => return Ok(validation_reply(locale, &e, min_interval)),
                };
                match self.scheduler.set_interval(monitor.id, seconds).await {
                    Ok(monitor) => Ok(t!(
                        "interval_updated",
                        locale = code,
                        name = monitor.name,
                        interval = monitor.interval_seconds
                    )
                    .into_owned()),
                    Err(SchedulerError::Validation(e)) => Ok(validation_reply(locale, &e, min_interval)),
                    Err(SchedulerError::Store(StoreError::NotFound(_))) => {
                        Ok(t!("monitor_not_found", locale = code).into_owned())
                    }
                }
            }
            Command::History(raw) => {
                let monitor = match self.find_monitor(user, &raw).await {
                    Ok(monitor) => monitor,
                    Err(reply) => return Ok(reply),
                };
                let logs = self.history.recent_logs(monitor.id, HISTORY_LIMIT).await?;
                if logs.is_empty() {
                    return Ok(t!("no_history", locale = code).into_owned());
                }

                let na = t!("na", locale = code);
                let mut lines = vec![t!("history_header", locale = code, name = monitor.name).into_owned()];
                for log in logs {
                    let response = log.response_time_ms.map_or_else(|| na.to_string(), |ms| format!("{ms}ms"));
                    let mut line =
                        format!("{} {} {}", status_marker(log.status), format_time(log.created_at), response);
                    if let Some(detail) = log.detail.filter(|d| !d.is_empty()) {
                        line.push_str(" - ");
                        line.push_str(&detail);
                    }
                    lines.push(line);
                }
                Ok(lines.join("\n"))
            }
            Command::Stats => Ok(self.stats(user).await),
            Command::Notifications(enabled) => {
                self.accounts.set_notifications(user.id, enabled).await?;
                let key = if enabled { "toggle_on" } else { "toggle_off" };
                let status = t!(key, locale = code);
                Ok(t!("notifications_toggled", locale = code, status = status).into_owned())
            }
            Command::Language(raw) => match raw.parse::<Locale>() {
                Ok(new_locale) => {
                    self.accounts.set_locale(user.id, new_locale).await?;
                    Ok(t!("language_changed", locale = new_locale.code()).into_owned())
                }
                Err(_) => Ok(t!("usage", locale = code, usage = "/language en|hi").into_owned()),
            },
            // Session commands are answered by `execute` before reaching here
            Command::Start
            | Command::Help
            | Command::Register { .. }
            | Command::Login { .. }
            | Command::Logout => Ok(t!("unknown_command", locale = code).into_owned()),
        }
    }

    /// The caller's monitor named by `raw`, or the reply explaining why there is none
    async fn find_monitor(&self, user: &User, raw: &str) -> Result<Monitor, String> {
        let monitors = self.store.list_for_user(user.id).await;
        match resolve_monitor(monitors, raw) {
            Lookup::Found(monitor) => Ok(monitor),
            Lookup::NotFound => Err(t!("monitor_not_found", locale = user.locale.code()).into_owned()),
            Lookup::Ambiguous => Err(t!("ambiguous_id", locale = user.locale.code(), id = raw).into_owned()),
        }
    }

    fn control_reply(
        &self,
        locale: Locale,
        result: Result<Monitor, SchedulerError>,
        key: &'static str,
    ) -> Result<String> {
        match result {
            Ok(monitor) => Ok(t!(key, locale = locale.code(), name = monitor.name).into_owned()),
            Err(SchedulerError::Store(StoreError::NotFound(_))) => {
                Ok(t!("monitor_not_found", locale = locale.code()).into_owned())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn stats(&self, user: &User) -> String {
        let monitors = self.store.list_for_user(user.id).await;
        let total = monitors.len();
        let active = monitors.iter().filter(|m| m.is_active).count();

        let avg_uptime = if total == 0 {
            100.0
        } else {
            monitors.iter().map(|m| m.uptime_percentage).sum::<f64>() / total as f64
        };
        let response_times: Vec<u64> =
            monitors.iter().filter_map(|m| m.last_response_time_ms).collect();
        let avg_response = if response_times.is_empty() {
            0.0
        } else {
            response_times.iter().sum::<u64>() as f64 / response_times.len() as f64
        };

        t!(
            "stats",
            locale = user.locale.code(),
            total_monitors = total,
            active_monitors = active,
            paused_monitors = total - active,
            avg_uptime = format!("{avg_uptime:.2}"),
            avg_response_time = format!("{avg_response:.2}")
        )
        .into_owned()
    }
}
