//! Queue table provisioning and legacy-schema migration.
//!
//! Table names come from callers and are never trusted: every identifier is
//! quoted with [`quote_ident`] before it reaches a statement. Payloads and
//! tokens always go through parameter binding.

use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::selection::{ExtraColumn, Selection};

/// Columns added after the first schema generation. Tables created by older
/// releases lack them and are migrated in place.
const BASE_MIGRATIONS: &[ExtraColumn] = &[ExtraColumn {
    name: "acked",
    definition: "INTEGER NOT NULL DEFAULT 0",
}];

/// Quote an SQLite identifier, doubling any embedded quote.
/// See <https://www.sqlite.org/lang_keywords.html>.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create the table and indexes for a queue of kind `S`, migrating an
/// existing table that predates any required column. Idempotent.
pub(crate) async fn provision<S: Selection>(
    tx: &mut Transaction<'static, Sqlite>,
    table: &str,
) -> sqlx::Result<()> {
    let quoted = quote_ident(table);

    let extra: String = S::extra_columns()
        .iter()
        .map(|c| format!(",\n                {} {}", c.name, c.definition))
        .collect();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {quoted} (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                data        BLOB NOT NULL,
                status      TEXT NOT NULL,
                ack_id      TEXT UNIQUE,
                acked       INTEGER NOT NULL DEFAULT 0,
                created_at  TIMESTAMP,
                updated_at  TIMESTAMP{extra}
            )"
    ))
    .execute(&mut **tx)
    .await?;

    for column in BASE_MIGRATIONS.iter().chain(S::extra_columns()) {
        if column_exists(&mut **tx, table, column.name).await? {
            continue;
        }
        tracing::info!(
            queue = table,
            column = column.name,
            "migrating legacy queue table"
        );
        sqlx::query(&format!(
            "ALTER TABLE {quoted} ADD COLUMN {} {}",
            column.name, column.definition
        ))
        .execute(&mut **tx)
        .await?;
    }

    let indexes = [
        ("status_idx", "status, created_at"),
        ("ack_idx", "status, acked"),
        ("ack_id_idx", "ack_id"),
    ];
    let extra_indexes = S::extra_indexes().iter().map(|i| (i.suffix, i.columns));

    for (suffix, columns) in indexes.into_iter().chain(extra_indexes) {
        let index = quote_ident(&format!("{table}_{suffix}"));
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {quoted} ({columns})"
        ))
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn column_exists(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> sqlx::Result<bool> {
    let found = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2 LIMIT 1",
    )
    .bind(table)
    .bind(column)
    .fetch_optional(conn)
    .await?;
    Ok(found.is_some())
}
