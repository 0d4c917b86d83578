use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{Monitor, MonitorLog, User, i64_to_timestamp, timestamp_to_i64};
use crate::i18n::Locale;
use crate::monitoring::types::{MonitorId, MonitorStatus, UserId};
use crate::pool::{LibsqlManager, LibsqlPool};

const MONITOR_COLUMNS: &str = "id, user_id, name, url, interval_seconds, is_active, status, last_checked, last_response_time_ms, uptime_percentage, has_been_checked, created_at";
const USER_COLUMNS: &str = "id, chat_id, username, password_hash, locale, notifications_enabled, created_at";

/// Durable storage for users, monitors and check history
#[async_trait]
pub trait Database: Send + Sync {
    /// Every stored monitor, active or paused
    async fn list_monitors(&self) -> Result<Vec<Monitor>>;

    /// Insert or overwrite a monitor by id
    async fn save_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// Delete a monitor and its history
    async fn delete_monitor(&self, id: MonitorId) -> Result<()>;

    /// Record an executed check, returning the new row id
    async fn append_log(&self, log: &MonitorLog) -> Result<i64>;

    /// Most recent checks of a monitor, newest first
    async fn recent_logs(&self, monitor_id: MonitorId, limit: usize) -> Result<Vec<MonitorLog>>;

    /// Delete history older than `cutoff`, returning how many rows went
    async fn cleanup_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Oldest account bound to `chat_id`
    async fn get_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn update_user(&self, user: &User) -> Result<()>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        self.pool.get().await.map_err(|e| anyhow::anyhow!("Failed to get database connection: {e}"))
    }

    async fn query_user(&self, filter: &str, value: String) -> Result<Option<User>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter} ORDER BY created_at LIMIT 1");
        let mut rows = conn.query(&sql, params![value]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }
}

fn bool_to_i64(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let status: String = row.get(6)?;

    Ok(Monitor {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid monitor id {id}"))?,
        user_id: Uuid::parse_str(&user_id)?,
        name: row.get(2)?,
        url: row.get(3)?,
        interval_seconds: row.get::<i64>(4)? as u64,
        is_active: row.get::<i64>(5)? != 0,
        status: MonitorStatus::from_db(&status),
        last_checked: row.get::<Option<i64>>(7)?.map(i64_to_timestamp),
        last_response_time_ms: row.get::<Option<i64>>(8)?.map(|v| v as u64),
        uptime_percentage: row.get(9)?,
        has_been_checked: row.get::<i64>(10)? != 0,
        created_at: i64_to_timestamp(row.get(11)?),
    })
}

fn user_from_row(row: &Row) -> Result<User> {
    let id: String = row.get(0)?;
    let locale: String = row.get(4)?;

    Ok(User {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid user id {id}"))?,
        chat_id: row.get(1)?,
        username: row.get(2)?,
        password_hash: row.get(3)?,
        locale: locale.parse::<Locale>().unwrap_or_default(),
        notifications_enabled: row.get::<i64>(5)? != 0,
        created_at: i64_to_timestamp(row.get(6)?),
    })
}

fn log_from_row(row: &Row) -> Result<MonitorLog> {
    let monitor_id: String = row.get(1)?;
    let status: String = row.get(2)?;

    Ok(MonitorLog {
        id: Some(row.get(0)?),
        monitor_id: Uuid::parse_str(&monitor_id)?,
        status: MonitorStatus::from_db(&status),
        response_time_ms: row.get::<Option<i64>>(3)?.map(|v| v as u64),
        detail: row.get(4)?,
        created_at: i64_to_timestamp(row.get(5)?),
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn list_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors ORDER BY created_at");
        let mut rows = conn.query(&sql, ()).await?;

        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }
        Ok(monitors)
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitors (id, user_id, name, url, interval_seconds, is_active, status, last_checked, last_response_time_ms, uptime_percentage, has_been_checked, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                interval_seconds = excluded.interval_seconds,
                is_active = excluded.is_active,
                status = excluded.status,
                last_checked = excluded.last_checked,
                last_response_time_ms = excluded.last_response_time_ms,
                uptime_percentage = excluded.uptime_percentage,
                has_been_checked = excluded.has_been_checked",
            params![
                monitor.id.to_string(),
                monitor.user_id.to_string(),
                monitor.name.clone(),
                monitor.url.clone(),
                monitor.interval_seconds as i64,
                bool_to_i64(monitor.is_active),
                monitor.status.to_string(),
                monitor.last_checked.map(timestamp_to_i64),
                monitor.last_response_time_ms.map(|v| v as i64),
                monitor.uptime_percentage,
                bool_to_i64(monitor.has_been_checked),
                timestamp_to_i64(monitor.created_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_monitor(&self, id: MonitorId) -> Result<()> {
        let conn = self.get_conn().await?;
        // Cascade covers this when foreign keys are on; be explicit for connections without it
        conn.execute("DELETE FROM monitor_logs WHERE monitor_id = ?", params![id.to_string()]).await?;
        conn.execute("DELETE FROM monitors WHERE id = ?", params![id.to_string()]).await?;
        Ok(())
    }

    async fn append_log(&self, log: &MonitorLog) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO monitor_logs (monitor_id, status, response_time_ms, detail, created_at) VALUES (?, ?, ?, ?, ?)",
            params![
                log.monitor_id.to_string(),
                log.status.to_string(),
                log.response_time_ms.map(|v| v as i64),
                log.detail.clone(),
                timestamp_to_i64(log.created_at)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn recent_logs(&self, monitor_id: MonitorId, limit: usize) -> Result<Vec<MonitorLog>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, monitor_id, status, response_time_ms, detail, created_at FROM monitor_logs WHERE monitor_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
                params![monitor_id.to_string(), limit as i64],
            )
            .await?;

        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            logs.push(log_from_row(&row)?);
        }
        Ok(logs)
    }

    async fn cleanup_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM monitor_logs WHERE created_at < ?", params![timestamp_to_i64(cutoff)])
            .await?;
        Ok(deleted)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.query_user("id = ?", id.to_string()).await
    }

    async fn get_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>> {
        self.query_user("chat_id = ?", chat_id.to_string()).await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.query_user("username = ?", username.to_string()).await
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO users (id, chat_id, username, password_hash, locale, notifications_enabled, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id.to_string(),
                user.chat_id.clone(),
                user.username.clone(),
                user.password_hash.clone(),
                user.locale.code(),
                bool_to_i64(user.notifications_enabled),
                timestamp_to_i64(user.created_at)
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE users SET chat_id = ?, password_hash = ?, locale = ?, notifications_enabled = ? WHERE id = ?",
            params![
                user.chat_id.clone(),
                user.password_hash.clone(),
                user.locale.code(),
                bool_to_i64(user.notifications_enabled),
                user.id.to_string()
            ],
        )
        .await?;
        Ok(())
    }
}
