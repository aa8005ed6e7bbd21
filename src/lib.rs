//! # sqliteq
//!
//! Durable work queues stored in SQLite tables.
//!
//! A [`Registry`] owns the database connection and hands out named queues.
//! Items move `pending -> processing -> completed` (or are removed) inside
//! single transactions, so a crash never leaves an item half-claimed.
//! Claims made with [`Queue::dequeue_with_ack`] are delivered at least once:
//! anything still unacknowledged when a queue is next created is requeued.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod selection;
pub mod telemetry;

pub use config::QueueOptions;
pub use db::Registry;
pub use error::{Error, Result};
pub use model::{AckToken, Claimed, QueueStats, Status};
pub use queue::{FifoQueue, PriorityQueue, Queue};
pub use selection::{Fifo, Priority, Selection};
