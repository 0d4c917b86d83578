/// Database abstraction layer
///
/// Users, monitors and check history live in a local LibSQL file accessed
/// through a deadpool connection pool.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Fresh migrated database in a temporary directory. Keep the guard alive
/// for as long as the database is used.
#[cfg(test)]
pub async fn test_database() -> (tempfile::TempDir, std::sync::Arc<dyn Database>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = crate::pool::open_pool(&dir.path().join("test.db"), 4).await.unwrap();
    {
        let conn = pool.get().await.unwrap();
        initialize_database(&conn).await.unwrap();
    }
    (dir, std::sync::Arc::new(DatabaseImpl::new_from_pool(pool)))
}
