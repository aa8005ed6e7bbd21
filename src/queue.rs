//! The queue engine: item lifecycle and its transactional transitions.
//!
//! ```text
//!   (none)      --enqueue-------------------> pending
//!   pending     --dequeue-------------------> (removed)
//!   pending     --dequeue_with_ack----------> processing (acked = 0)
//!   processing  --acknowledge, remove-------> (removed)
//!   processing  --acknowledge, retain-------> completed (acked = 1)
//!   processing  --requeue_orphans-----------> pending
//! ```
//!
//! Every state-changing call is one transaction: begin, read/write, commit.
//! Any `?` before the commit drops the transaction, which rolls it back, so
//! no call leaves a partial effect behind. The engine takes no in-process
//! locks; exclusion comes from the storage transaction alone.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use opentelemetry::KeyValue;
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::config::QueueOptions;
use crate::db::begin_write;
use crate::db::schema::quote_ident;
use crate::error::{Error, Result};
use crate::model::{AckToken, Claimed, QueueStats, Status};
use crate::selection::{Fifo, Priority, Selection};
use crate::telemetry::{metrics, queue as spans};

pub type FifoQueue = Queue<Fifo>;
pub type PriorityQueue = Queue<Priority>;

/// A named queue backed by one table. Share it across tasks behind an `Arc`.
pub struct Queue<S: Selection = Fifo> {
    pool: SqlitePool,
    name: String,
    options: QueueOptions,
    closed: AtomicBool,
    sql: Statements,
    _selection: PhantomData<fn() -> S>,
}

/// SQL text for one table, rendered once with the quoted table name.
struct Statements {
    insert: String,
    select_next: String,
    delete_by_id: String,
    claim: String,
    ack_remove: String,
    ack_retain: String,
    requeue: String,
    count_pending: String,
    values: String,
    stats: String,
    purge: String,
}

impl Statements {
    fn render<S: Selection>(table: &str) -> Self {
        let t = quote_ident(table);
        let order = S::ORDER_BY;
        let insert = if S::PRIORITIZED {
            format!(
                "INSERT INTO {t} (data, status, acked, created_at, updated_at, priority)
                 VALUES (?1, 'pending', 0, ?2, ?2, ?3)"
            )
        } else {
            format!(
                "INSERT INTO {t} (data, status, acked, created_at, updated_at)
                 VALUES (?1, 'pending', 0, ?2, ?2)"
            )
        };

        Self {
            insert,
            select_next: format!(
                "SELECT id, data FROM {t} WHERE status = 'pending' ORDER BY {order} LIMIT 1"
            ),
            delete_by_id: format!("DELETE FROM {t} WHERE id = ?1 AND status = 'pending'"),
            claim: format!(
                "UPDATE {t} SET status = 'processing', ack_id = ?1, acked = 0, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'"
            ),
            ack_remove: format!(
                "DELETE FROM {t} WHERE ack_id = ?1 AND status = 'processing' AND acked = 0"
            ),
            ack_retain: format!(
                "UPDATE {t} SET status = 'completed', acked = 1, updated_at = ?2
                 WHERE ack_id = ?1 AND status = 'processing' AND acked = 0"
            ),
            requeue: format!(
                "UPDATE {t} SET status = 'pending', ack_id = NULL, updated_at = ?1
                 WHERE status = 'processing' AND acked = 0"
            ),
            count_pending: format!("SELECT COUNT(*) FROM {t} WHERE status = 'pending'"),
            values: format!("SELECT data FROM {t} WHERE status = 'pending' ORDER BY {order}"),
            stats: format!("SELECT status, COUNT(*) FROM {t} GROUP BY status"),
            purge: format!("DELETE FROM {t}"),
        }
    }
}

impl<S: Selection> Queue<S> {
    /// Build an engine over an already provisioned table.
    pub(crate) fn new(pool: SqlitePool, name: &str, options: QueueOptions) -> Self {
        Self {
            pool,
            name: name.to_string(),
            options,
            closed: AtomicBool::new(false),
            sql: Statements::render::<S>(name),
            _selection: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> QueueOptions {
        self.options
    }

    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Append a pending item. Priority queues file it at priority 0.
    pub async fn enqueue(&self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.insert(payload.as_ref(), 0).await
    }

    async fn insert(&self, payload: &[u8], priority: i64) -> Result<()> {
        self.ensure_open()?;
        let span = spans::start_queue_span(&self.name, "enqueue");
        let result = self
            .insert_tx(payload, priority)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(()) => self.moved(&span, "enqueue", None, Some(Status::Pending)),
            Err(e) => self.fail("enqueue", e),
        }
        result
    }

    async fn insert_tx(&self, payload: &[u8], priority: i64) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;
        let mut query = sqlx::query(&self.sql.insert).bind(payload).bind(Utc::now());
        if S::PRIORITIZED {
            query = query.bind(priority);
        }
        query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Consumers
    // -----------------------------------------------------------------------

    /// Remove and return the next pending item. No re-delivery: once this
    /// returns, the item is gone whether or not the caller processes it.
    ///
    /// Returns `Ok(None)` immediately when nothing is pending.
    pub async fn dequeue(&self) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        let span = spans::start_queue_span(&self.name, "dequeue");
        let result = self.take_next().instrument(span.clone()).await;

        match &result {
            Ok(Some(_)) => self.moved(&span, "dequeue", Some(Status::Pending), None),
            Ok(None) => self.observe("dequeue", "empty"),
            Err(e) => self.fail("dequeue", e),
        }
        result
    }

    async fn take_next(&self) -> Result<Option<Vec<u8>>> {
        let mut tx = begin_write(&self.pool).await?;
        let Some((id, data)) = sqlx::query_as::<_, (i64, Vec<u8>)>(&self.sql.select_next)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let deleted = sqlx::query(&self.sql.delete_by_id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(data))
    }

    /// Claim the next pending item for processing. The item stays stored as
    /// `processing` until [`Queue::acknowledge`] is called with the returned
    /// token; if that never happens it is requeued the next time the queue
    /// is created.
    pub async fn dequeue_with_ack(&self) -> Result<Option<Claimed>> {
        self.ensure_open()?;
        let span = spans::start_queue_span(&self.name, "dequeue_with_ack");
        let result = self.claim_next().instrument(span.clone()).await;

        match &result {
            Ok(Some(_)) => self.moved(
                &span,
                "dequeue_with_ack",
                Some(Status::Pending),
                Some(Status::Processing),
            ),
            Ok(None) => self.observe("dequeue_with_ack", "empty"),
            Err(e) => self.fail("dequeue_with_ack", e),
        }
        result
    }

    async fn claim_next(&self) -> Result<Option<Claimed>> {
        let mut tx = begin_write(&self.pool).await?;
        let Some((id, payload)) = sqlx::query_as::<_, (i64, Vec<u8>)>(&self.sql.select_next)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        // Fresh token on every claim, never one left over from an earlier claim.
        let ack_token = AckToken::generate();
        let claimed = sqlx::query(&self.sql.claim)
            .bind(ack_token.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if claimed == 0 {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(Claimed { payload, ack_token }))
    }

    /// Confirm a claimed item: delete it, or mark it `completed` when the
    /// queue retains acknowledged items.
    ///
    /// Returns `Ok(false)` when no in-flight item holds `token` (already
    /// acknowledged, requeued, or never issued). Nothing changes in that case.
    /// Acknowledging still works after [`Queue::close`], so in-flight
    /// consumers can finish.
    pub async fn acknowledge(&self, token: &AckToken) -> Result<bool> {
        let span = spans::start_queue_span(&self.name, "acknowledge");
        let result = self.acknowledge_tx(token).instrument(span.clone()).await;

        let to = if self.options.remove_on_complete {
            None
        } else {
            Some(Status::Completed)
        };
        match &result {
            Ok(true) => self.moved(&span, "acknowledge", Some(Status::Processing), to),
            Ok(false) => {
                tracing::debug!(queue = %self.name, "acknowledge matched no in-flight item");
                self.observe("acknowledge", "miss");
            }
            Err(e) => self.fail("acknowledge", e),
        }
        result
    }

    async fn acknowledge_tx(&self, token: &AckToken) -> Result<bool> {
        let mut tx = begin_write(&self.pool).await?;
        let done = if self.options.remove_on_complete {
            sqlx::query(&self.sql.ack_remove)
                .bind(token.as_str())
                .execute(&mut *tx)
                .await?
        } else {
            sqlx::query(&self.sql.ack_retain)
                .bind(token.as_str())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?
        };

        // Dropping the transaction rolls it back; nothing was touched anyway.
        if done.rows_affected() == 0 {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Return every claimed-but-unacknowledged item to `pending`, clearing its
    /// token so a stale acknowledge cannot confirm the next claim.
    ///
    /// Runs when the queue is created. There is no attempt counter: an item
    /// that keeps crashing its consumer is redelivered indefinitely.
    pub async fn requeue_orphans(&self) -> Result<u64> {
        let span = spans::start_queue_span(&self.name, "requeue_orphans");
        let result = self.requeue_tx().instrument(span).await;

        match &result {
            Ok(0) => {}
            Ok(n) => {
                tracing::info!(queue = %self.name, requeued = n, "requeued orphaned items");
                metrics::requeued().add(*n, &[KeyValue::new("queue", self.name.clone())]);
                metrics::item_transitions().add(
                    *n,
                    &[
                        KeyValue::new("queue", self.name.clone()),
                        KeyValue::new("from", Status::Processing.as_str()),
                        KeyValue::new("to", Status::Pending.as_str()),
                    ],
                );
            }
            Err(e) => self.fail("requeue_orphans", e),
        }
        result
    }

    async fn requeue_tx(&self) -> Result<u64> {
        let mut tx = begin_write(&self.pool).await?;
        let requeued = sqlx::query(&self.sql.requeue)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(requeued)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Number of pending items. A single read, not linearizable with
    /// concurrent writers.
    pub async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&self.sql.count_pending)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Payloads of all pending items, in dequeue order.
    pub async fn values(&self) -> Result<Vec<Vec<u8>>> {
        let values = sqlx::query_scalar::<_, Vec<u8>>(&self.sql.values)
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }

    /// Row counts per status.
    pub async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&self.sql.stats)
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = count as u64;
            match status.parse::<Status>()? {
                Status::Pending => stats.pending = count,
                Status::Processing => stats.processing = count,
                Status::Completed => stats.completed = count,
            }
        }
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Delete every row regardless of status. Returns the number removed.
    ///
    /// Not isolated from concurrent producers: an enqueue racing a purge may
    /// or may not survive it.
    pub async fn purge(&self) -> Result<u64> {
        let span = spans::start_queue_span(&self.name, "purge");
        let result = self.purge_tx().instrument(span).await;

        match &result {
            Ok(n) => {
                tracing::info!(queue = %self.name, removed = n, "queue purged");
                self.observe("purge", "ok");
            }
            Err(e) => self.fail("purge", e),
        }
        result
    }

    async fn purge_tx(&self) -> Result<u64> {
        let mut tx = begin_write(&self.pool).await?;
        let removed = sqlx::query(&self.sql.purge)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed)
    }

    /// Stop accepting enqueue and dequeue calls. In-flight items are left as
    /// they are and the registry's connection stays open.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(queue = %self.name, "queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn observe(&self, operation: &'static str, result: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("kind", S::KIND),
                KeyValue::new("operation", operation),
                KeyValue::new("result", result),
            ],
        );
    }

    /// Record a successful transition on the span, the log and the counters.
    /// `from` is `None` for a new item, `to` is `None` for a removed one.
    fn moved(
        &self,
        span: &tracing::Span,
        operation: &'static str,
        from: Option<Status>,
        to: Option<Status>,
    ) {
        debug_assert!(
            from.is_none_or(|from| from.can_transition_to(to)),
            "illegal transition {from:?} -> {to:?}"
        );
        let from = from.map_or("none", Status::as_str);
        let to = Status::label(to);
        spans::record_transition(span, from, to);
        self.observe(operation, "ok");
        self.transition(from, to);
    }

    fn transition(&self, from: &'static str, to: &'static str) {
        metrics::item_transitions().add(
            1,
            &[
                KeyValue::new("queue", self.name.clone()),
                KeyValue::new("from", from),
                KeyValue::new("to", to),
            ],
        );
    }

    fn fail(&self, operation: &'static str, error: &Error) {
        tracing::warn!(queue = %self.name, operation, "transaction failed: {error}");
        self.observe(operation, "error");
    }
}

impl Queue<Priority> {
    /// Append a pending item. Lower values are served first; equal values
    /// keep insertion order. Any `i64` is accepted.
    pub async fn enqueue_with_priority(
        &self,
        payload: impl AsRef<[u8]>,
        priority: i64,
    ) -> Result<()> {
        self.insert(payload.as_ref(), priority).await
    }
}

impl<S: Selection> std::fmt::Debug for Queue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("kind", &S::KIND)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}
