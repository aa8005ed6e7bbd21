//! Dequeue selection rules.
//!
//! The engine's transition logic is shared by every queue kind; a
//! [`Selection`] only decides which pending row is claimed next and which
//! extra columns and indexes the table needs for that.

/// A column the selection rule requires, added to legacy tables on first use.
#[derive(Debug, Clone, Copy)]
pub struct ExtraColumn {
    pub name: &'static str,
    /// Type and constraints as written after the column name in `ADD COLUMN`.
    pub definition: &'static str,
}

/// An index the selection rule requires. The table name is prefixed to
/// `suffix` to form the index name.
#[derive(Debug, Clone, Copy)]
pub struct ExtraIndex {
    pub suffix: &'static str,
    pub columns: &'static str,
}

/// Chooses the next pending item.
pub trait Selection: Send + Sync + 'static {
    /// Short label used in logs and metrics.
    const KIND: &'static str;

    /// `ORDER BY` body applied to pending rows; the first row wins.
    /// Must be a total order so retries pick the same row.
    const ORDER_BY: &'static str;

    /// Whether rows carry a priority value bound on insert.
    const PRIORITIZED: bool;

    fn extra_columns() -> &'static [ExtraColumn] {
        &[]
    }

    fn extra_indexes() -> &'static [ExtraIndex] {
        &[]
    }
}

/// Oldest pending item first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl Selection for Fifo {
    const KIND: &'static str = "fifo";
    const ORDER_BY: &'static str = "created_at ASC, id ASC";
    const PRIORITIZED: bool = false;
}

/// Lowest priority value first, oldest first within a priority.
#[derive(Debug, Clone, Copy, Default)]
pub struct Priority;

impl Selection for Priority {
    const KIND: &'static str = "priority";
    const ORDER_BY: &'static str = "priority ASC, created_at ASC, id ASC";
    const PRIORITIZED: bool = true;

    fn extra_columns() -> &'static [ExtraColumn] {
        &[ExtraColumn {
            name: "priority",
            definition: "INTEGER NOT NULL DEFAULT 0",
        }]
    }

    fn extra_indexes() -> &'static [ExtraIndex] {
        &[ExtraIndex {
            suffix: "priority_idx",
            columns: "status, priority, created_at",
        }]
    }
}
