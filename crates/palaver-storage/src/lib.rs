//! Palaver storage crate - SQLite persistence.
//!
//! Provides a WAL-mode SQLite database with migrations and repository
//! implementations for users (credential store), conversation history
//! (dialogue store) and items.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{DialogueRepository, ItemRepository, UserRepository};
