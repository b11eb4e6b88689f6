//! Analyst Storage crate - SQLite persistence for sessions and knowledge chunks.
//!
//! Provides a WAL-mode SQLite database with migrations and repository
//! implementations for chat sessions (history, mode, generated BRD) and the
//! embedded reference documents behind retrieval.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{KnowledgeChunk, KnowledgeRepository, SessionRepository, DEFAULT_TITLE};
