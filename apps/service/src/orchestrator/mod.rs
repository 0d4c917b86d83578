/// Orchestrator module - coordinates all components
///
/// The orchestrator wires the database, monitor store, scheduler, accounts
/// and messaging transport together, then runs until Ctrl-C:
/// - hydrates the store and arms a timer for every active monitor
/// - runs history retention and session expiry in the background
/// - long-polls Telegram and answers each command message

pub mod retention;

pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::{
    AlertDispatcher, HttpChecker, MonitorStore, Scheduler, SchedulerSettings,
};
use crate::pool::LibsqlPool;
use crate::transport::telegram::Update;
use crate::transport::{LogTransport, MessageTransport, TelegramTransport};
use crate::users::{Accounts, Sessions};

/// How often idle sessions are swept
const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Back-off after a failed poll
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Main orchestrator for the Upbeat service
pub struct Orchestrator {
    config: Arc<Config>,
    database: Arc<dyn Database>,
    store: Arc<MonitorStore>,
    scheduler: Scheduler,
    sessions: Arc<Sessions>,
    handler: Arc<CommandHandler>,
    telegram: Option<Arc<TelegramTransport>>,
    transport: Arc<dyn MessageTransport>,
    task_handles: Vec<JoinHandle<()>>,
}

impl Orchestrator {
    /// Create and start a new orchestrator
    /// This is a convenience method that creates and immediately runs the orchestrator
    pub async fn start(config: Config, pool: LibsqlPool) -> Result<()> {
        let mut orchestrator = Self::new(config, pool).await?;
        orchestrator.run().await
    }

    async fn new(config: Config, pool: LibsqlPool) -> Result<Self> {
        let config = Arc::new(config);

        {
            let conn = pool.get().await?;
            info!("Initializing database schema...");
            initialize_database(&conn).await?;
        }
        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

        let store = Arc::new(MonitorStore::with_backend(database.clone()));
        let accounts = Arc::new(
            Accounts::new(database.clone()).with_default_locale(config.monitoring.default_locale),
        );

        let telegram = if config.telegram.bot_token.is_empty() {
            None
        } else {
            Some(Arc::new(TelegramTransport::new(
                config.telegram.api_base.clone(),
                config.telegram.bot_token.clone(),
            )?))
        };
        let transport: Arc<dyn MessageTransport> = match &telegram {
            Some(telegram) => telegram.clone(),
            None => Arc::new(LogTransport),
        };

        let alerts = Arc::new(AlertDispatcher::new(accounts.clone(), transport.clone()));
        let settings = SchedulerSettings {
            uptime_mode: config.monitoring.uptime_mode,
            min_interval_seconds: config.monitoring.min_interval_seconds,
        };
        let scheduler = Scheduler::with_history(
            store.clone(),
            Arc::new(HttpChecker::new()?),
            alerts,
            settings,
            database.clone(),
        );

        let sessions = Arc::new(Sessions::new(
            Duration::from_secs(config.session.idle_timeout_seconds),
            config.session.max_login_attempts,
        ));
        let handler = Arc::new(CommandHandler::new(
            scheduler.clone(),
            store.clone(),
            accounts,
            sessions.clone(),
            database.clone(),
        ));

        Ok(Self {
            config,
            database,
            store,
            scheduler,
            sessions,
            handler,
            telegram,
            transport,
            task_handles: Vec::new(),
        })
    }

    async fn run(&mut self) -> Result<()> {
        info!("Starting Upbeat orchestrator...");

        let loaded = self.store.hydrate().await?;
        info!("Loaded {} monitors from database", loaded);
        self.scheduler.start().await;

        let policy = RetentionPolicy { history_days: self.config.retention.history_days };
        let cleanup = RetentionCleanup::new(self.database.clone(), policy);
        self.task_handles.push(cleanup.start_periodic_cleanup());

        let sessions = self.sessions.clone();
        self.task_handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_SWEEP_PERIOD);
            loop {
                interval.tick().await;
                let purged = sessions.purge_expired().await;
                if purged > 0 {
                    debug!("Expired {} idle sessions", purged);
                }
            }
        }));

        match &self.telegram {
            Some(telegram) => {
                info!("Listening for Telegram commands");
                self.task_handles.push(tokio::spawn(poll_updates(
                    telegram.clone(),
                    self.handler.clone(),
                    self.transport.clone(),
                    self.config.telegram.poll_timeout_seconds,
                )));
            }
            None => warn!("No Telegram bot token configured; alerts are only written to the log"),
        }

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");

        for handle in self.task_handles.drain(..) {
            handle.abort();
        }
        self.scheduler.shutdown().await;

        info!("Upbeat orchestrator stopped");
        Ok(())
    }
}

/// Long-poll loop. Runs until aborted.
async fn poll_updates(
    telegram: Arc<TelegramTransport>,
    handler: Arc<CommandHandler>,
    replies: Arc<dyn MessageTransport>,
    poll_timeout_seconds: u64,
) {
    let mut offset = 0;
    loop {
        match telegram.get_updates(offset, poll_timeout_seconds).await {
            Ok(updates) => {
                offset = answer_updates(updates, &handler, replies.as_ref()).await.unwrap_or(offset);
            }
            Err(e) => {
                warn!("Failed to poll Telegram updates: {e}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
            }
        }
    }
}

/// Answer every text message in `updates`. Returns the offset that
/// acknowledges them, or `None` if there were none.
async fn answer_updates(
    updates: Vec<Update>,
    handler: &CommandHandler,
    replies: &dyn MessageTransport,
) -> Option<i64> {
    let mut next_offset = None;
    for update in updates {
        next_offset = Some(update.update_id + 1);
        let Some(message) = update.message else {
            continue;
        };
        let Some(text) = message.text else {
            continue;
        };

        let chat_id = message.chat.id.to_string();
        let reply = handler.handle(&chat_id, &text).await;
        if let Err(e) = replies.send_message(&chat_id, &reply).await {
            warn!(chat_id = %chat_id, "Failed to send reply: {e}");
        }
    }
    next_offset
}
