//! Database schema migrations.
//!
//! Applies the initial schema: users (credential store), conversation_history
//! (dialogue store), items, and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use palaver_core::error::PalaverError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), PalaverError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PalaverError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PalaverError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), PalaverError> {
    conn.execute_batch(
        "
        -- Credential store. A NULL password_hash marks a chat-only identity.
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE CHECK (length(username) > 0),
            password_hash   TEXT,
            created_at      INTEGER NOT NULL
        );

        -- Dialogue store. Append-only; created_at is in microseconds.
        CREATE TABLE IF NOT EXISTS conversation_history (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id         INTEGER NOT NULL,
            sender          TEXT NOT NULL,
            message         TEXT NOT NULL DEFAULT '',
            created_at      INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_history_user
            ON conversation_history (user_id, created_at ASC, id ASC);

        CREATE TABLE IF NOT EXISTS items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            price           REAL NOT NULL DEFAULT 0
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| PalaverError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
