use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError, params};

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct LibsqlManager {
    database: Database,
    recycle_count: AtomicUsize,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database, recycle_count: AtomicUsize::new(0) }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // PRAGMAs that report a value must go through query, not execute
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ()).await?;
        conn.execute("PRAGMA foreign_keys = ON", ()).await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let recycle_count = self.recycle_count.fetch_add(1, Ordering::Relaxed) as u64;
        let row = conn
            .query("SELECT ?1", params![recycle_count])
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;
        if row.get::<u64>(0)? != recycle_count {
            return Err(managed::RecycleError::Backend(LibsqlError::QueryReturnedNoRows));
        }
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (creating if needed) the local database file at `path`
pub async fn open_pool(path: &Path, max_size: usize) -> anyhow::Result<LibsqlPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let database = libsql::Builder::new_local(path).build().await?;
    {
        let conn = database.connect()?;
        conn.query("PRAGMA journal_mode = WAL", ()).await?;
    }

    let pool = Pool::builder(LibsqlManager::new(database)).max_size(max_size).build()?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pooled_connections_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("nested/pool.db"), 2).await.unwrap();

        for _ in 0..3 {
            let conn = pool.get().await.unwrap();
            let mut rows = conn.query("SELECT 1", ()).await.unwrap();
            assert_eq!(rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap(), 1);
        }
        assert!(pool.status().size <= 2);
    }
}
