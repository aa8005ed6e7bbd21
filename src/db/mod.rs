//! Registry: the shared SQLite connection and queue factory.
//!
//! One registry owns exactly one connection to one database. Every queue it
//! creates lives in its own table inside that database, and closing the
//! registry closes the connection for all of them.

pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::QueueOptions;
use crate::error::{Error, Result};
use crate::queue::Queue;
use crate::selection::{Fifo, Priority, Selection};

/// How long a statement waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Begin a transaction that takes the write lock up front.
///
/// A deferred `BEGIN` that later upgrades to a writer gets `SQLITE_BUSY`
/// immediately when another process holds the lock, bypassing the busy
/// timeout. `BEGIN IMMEDIATE` waits on it instead.
pub(crate) async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Owns the connection and hands out named queues.
#[derive(Debug, Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    /// Open or create a database file. WAL mode, so committed transactions
    /// survive a process crash without blocking readers.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        Self::connect_with(options).await
    }

    /// Private in-memory database (for testing). Gone once the registry closes.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect_with(options).await
    }

    /// Open a path from configuration, where `:memory:` selects an in-memory database.
    pub async fn open_location(location: &str) -> Result<Self> {
        match location {
            ":memory:" | "sqlite::memory:" => Self::open_in_memory().await,
            path => Self::open(path).await,
        }
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        // A single long-lived connection: writers are serialized here, and an
        // in-memory database would vanish if its connection were recycled.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        tracing::debug!("queue registry connected");
        Ok(Self { pool })
    }

    /// Create (or reattach to) a FIFO queue.
    ///
    /// Provisions the table, then requeues items orphaned by a previous run.
    pub async fn new_queue(&self, name: &str, options: QueueOptions) -> Result<Queue<Fifo>> {
        self.create(name, options).await
    }

    /// Create (or reattach to) a priority queue, adding the priority column to
    /// a table that predates it.
    pub async fn new_priority_queue(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<Queue<Priority>> {
        self.create(name, options).await
    }

    async fn create<S: Selection>(&self, name: &str, options: QueueOptions) -> Result<Queue<S>> {
        let setup = |source| Error::Setup {
            queue: name.to_string(),
            source,
        };

        let mut tx = begin_write(&self.pool).await.map_err(setup)?;
        schema::provision::<S>(&mut tx, name).await.map_err(setup)?;
        tx.commit().await.map_err(setup)?;

        let queue = Queue::new(self.pool.clone(), name, options);
        let requeued = queue.requeue_orphans().await.map_err(|e| match e {
            Error::Storage(source) => setup(source),
            other => other,
        })?;
        tracing::info!(
            queue = name,
            kind = S::KIND,
            remove_on_complete = options.remove_on_complete,
            requeued,
            "queue ready"
        );
        Ok(queue)
    }

    /// Close the shared connection. Queues created from this registry fail
    /// every later storage operation.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("queue registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Simple health check: run a `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
