//! Repository implementations for SQLite-backed persistence.
//!
//! Provides UserRepository (credential store), DialogueRepository (dialogue
//! store) and ItemRepository that operate on the Database struct using raw SQL.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{ErrorCode, OptionalExtension};

use palaver_core::error::PalaverError;
use palaver_core::types::{DialogueTurn, Item, NewItem, User};

use crate::db::Database;

/// Repository for user identities and their password hashes.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a user with a login credential.
    ///
    /// Fails with `PalaverError::Conflict` when the username is taken,
    /// including by a chat-only identity.
    pub fn create(&self, username: &str, password_hash: &str) -> Result<User, PalaverError> {
        let created_at = Utc::now();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, password_hash, created_at.timestamp_micros()],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    PalaverError::Conflict(format!("username '{}' already exists", username))
                } else {
                    PalaverError::Storage(format!("Failed to create user: {}", e))
                }
            })?;

            Ok(User {
                id: conn.last_insert_rowid(),
                username: username.to_string(),
                password_hash: Some(password_hash.to_string()),
                created_at,
            })
        })
    }

    /// Find a user by exact username match.
    pub fn find_by_username(&self, username: &str) -> Result<Option<User>, PalaverError> {
        self.db
            .with_conn(|conn| select_by_username(conn, username))
    }

    /// Return the user with this username, creating a chat-only identity
    /// (no password hash) when none exists.
    ///
    /// The boolean is true when the identity was created by this call.
    /// Concurrent first contact from the same username resolves to one row.
    pub fn find_or_provision(&self, username: &str) -> Result<(User, bool), PalaverError> {
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO users (username, password_hash, created_at) VALUES (?1, NULL, ?2)
                     ON CONFLICT(username) DO NOTHING",
                    rusqlite::params![username, Utc::now().timestamp_micros()],
                )
                .map_err(|e| PalaverError::Storage(format!("Failed to provision user: {}", e)))?;

            let user = select_by_username(conn, username)?.ok_or_else(|| {
                PalaverError::Storage(format!("user '{}' vanished after provisioning", username))
            })?;
            Ok((user, inserted > 0))
        })
    }

    pub fn count(&self) -> Result<u64, PalaverError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(|e| PalaverError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn select_by_username(
    conn: &rusqlite::Connection,
    username: &str,
) -> Result<Option<User>, PalaverError> {
    conn.query_row(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
        rusqlite::params![username],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: from_micros(row.get(3)?),
            })
        },
    )
    .optional()
    .map_err(|e| PalaverError::Storage(e.to_string()))
}

/// Append-only log of conversation turns.
#[derive(Clone)]
pub struct DialogueRepository {
    db: Arc<Database>,
}

impl DialogueRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one turn for a user.
    ///
    /// The timestamp is assigned here and is strictly greater than every
    /// earlier turn of the same user, so write order is history order.
    pub fn append(
        &self,
        user_id: i64,
        sender: &str,
        message: &str,
    ) -> Result<DialogueTurn, PalaverError> {
        self.db.with_conn(|conn| {
            let last: Option<i64> = conn
                .query_row(
                    "SELECT MAX(created_at) FROM conversation_history WHERE user_id = ?1",
                    rusqlite::params![user_id],
                    |row| row.get(0),
                )
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let now = Utc::now().timestamp_micros();
            let created_at = match last {
                Some(last) if last >= now => last + 1,
                _ => now,
            };

            conn.execute(
                "INSERT INTO conversation_history (user_id, sender, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, sender, message, created_at],
            )
            .map_err(|e| PalaverError::Storage(format!("Failed to save turn: {}", e)))?;

            Ok(DialogueTurn {
                id: conn.last_insert_rowid(),
                user_id,
                sender: sender.to_string(),
                message: message.to_string(),
                created_at: from_micros(created_at),
            })
        })
    }

    /// Every turn for a user, oldest first.
    pub fn history(&self, user_id: i64) -> Result<Vec<DialogueTurn>, PalaverError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user_id, sender, message, created_at
                     FROM conversation_history
                     WHERE user_id = ?1
                     ORDER BY created_at ASC, id ASC",
                )
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![user_id], |row| {
                    Ok(DialogueTurn {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        sender: row.get(2)?,
                        message: row.get(3)?,
                        created_at: from_micros(row.get(4)?),
                    })
                })
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let mut turns = Vec::new();
            for row in rows {
                turns.push(row.map_err(|e| PalaverError::Storage(e.to_string()))?);
            }
            Ok(turns)
        })
    }

    /// Count turns across all users.
    pub fn count(&self) -> Result<u64, PalaverError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM conversation_history", [], |row| {
                    row.get(0)
                })
                .map_err(|e| PalaverError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

/// Repository for the item catalogue.
#[derive(Clone)]
pub struct ItemRepository {
    db: Arc<Database>,
}

impl ItemRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn list(&self) -> Result<Vec<Item>, PalaverError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, price FROM items ORDER BY id ASC")
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], row_to_item)
                .map_err(|e| PalaverError::Storage(e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(|e| PalaverError::Storage(e.to_string()))?);
            }
            Ok(items)
        })
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Item>, PalaverError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, price FROM items WHERE id = ?1",
                rusqlite::params![id],
                row_to_item,
            )
            .optional()
            .map_err(|e| PalaverError::Storage(e.to_string()))
        })
    }

    pub fn create(&self, item: &NewItem) -> Result<Item, PalaverError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO items (name, price) VALUES (?1, ?2)",
                rusqlite::params![item.name, item.price],
            )
            .map_err(|e| PalaverError::Storage(format!("Failed to create item: {}", e)))?;

            Ok(Item {
                id: conn.last_insert_rowid(),
                name: item.name.clone(),
                price: item.price,
            })
        })
    }

    /// Replace name and price. Returns `None` when the id does not exist.
    pub fn update(&self, id: i64, item: &NewItem) -> Result<Option<Item>, PalaverError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE items SET name = ?1, price = ?2 WHERE id = ?3",
                    rusqlite::params![item.name, item.price, id],
                )
                .map_err(|e| PalaverError::Storage(format!("Failed to update item: {}", e)))?;

            if changed == 0 {
                return Ok(None);
            }
            Ok(Some(Item {
                id,
                name: item.name.clone(),
                price: item.price,
            }))
        })
    }

    /// Delete by id. Returns false when nothing was deleted.
    pub fn delete(&self, id: i64) -> Result<bool, PalaverError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM items WHERE id = ?1", rusqlite::params![id])
                .map_err(|e| PalaverError::Storage(format!("Failed to delete item: {}", e)))?;
            Ok(changed > 0)
        })
    }

    pub fn count(&self) -> Result<u64, PalaverError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))
                .map_err(|e| PalaverError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}
