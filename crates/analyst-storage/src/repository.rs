//! Repository implementations for SQLite-backed persistence.
//!
//! `SessionRepository` owns chat sessions (history, mode, generated BRD);
//! `KnowledgeRepository` owns embedded reference document chunks.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use analyst_core::error::AnalystError;
use analyst_core::types::{ConversationMode, Message, Role, Session, SessionSummary};

use crate::db::Database;

/// Title given to sessions until the first user message arrives.
pub const DEFAULT_TITLE: &str = "New Business Idea";

const TITLE_MAX_CHARS: usize = 60;

// =============================================================================
// SessionRepository
// =============================================================================

/// Repository for chat sessions.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create an empty session and return it.
    pub fn create(&self, title: Option<&str>) -> Result<Session, AnalystError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            title: title.unwrap_or(DEFAULT_TITLE).to_string(),
            messages: Vec::new(),
            mode: ConversationMode::General,
            brd_generated: false,
            brd_content: None,
            created_at: now,
            updated_at: now,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, title, messages, mode, brd_generated, created_at, updated_at)
                 VALUES (?1, ?2, '[]', ?3, 0, ?4, ?4)",
                rusqlite::params![
                    session.id.to_string(),
                    session.title,
                    session.mode.as_str(),
                    now.timestamp(),
                ],
            )
            .map_err(|e| AnalystError::Storage(format!("Failed to create session: {}", e)))?;
            Ok(())
        })?;

        Ok(session)
    }

    /// Find a session by ID.
    pub fn find(&self, id: Uuid) -> Result<Option<Session>, AnalystError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, title, messages, mode, brd_generated, brd_content, created_at, updated_at
                     FROM sessions WHERE session_id = ?1",
                )
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_session(row))
                })
                .optional()
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// List sessions, most recently updated first.
    pub fn list(&self, limit: u64) -> Result<Vec<SessionSummary>, AnalystError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, title, messages, mode, brd_generated, brd_content, created_at, updated_at
                     FROM sessions
                     ORDER BY updated_at DESC, created_at DESC
                     LIMIT ?1",
                )
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![limit], |row| Ok(row_to_session(row)))
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            let mut summaries = Vec::new();
            for row in rows {
                let session = row.map_err(|e| AnalystError::Storage(e.to_string()))??;
                summaries.push(SessionSummary {
                    id: session.id,
                    title: session.title,
                    mode: session.mode,
                    message_count: session.messages.len(),
                    brd_generated: session.brd_generated,
                    updated_at: session.updated_at,
                });
            }
            Ok(summaries)
        })
    }

    /// Append a completed turn and store the session's new mode.
    ///
    /// The stored history keeps only the most recent `history_limit`
    /// messages. A session still carrying the default title is renamed
    /// after its first user message.
    pub fn append_turn(
        &self,
        id: Uuid,
        user_message: &str,
        assistant_message: &str,
        mode: ConversationMode,
        history_limit: usize,
    ) -> Result<Session, AnalystError> {
        self.db.with_conn(|conn| {
            let (title, raw): (String, String) = conn
                .query_row(
                    "SELECT title, messages FROM sessions WHERE session_id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| AnalystError::Storage(e.to_string()))?
                .ok_or_else(|| AnalystError::SessionNotFound(id.to_string()))?;

            let mut messages: Vec<Message> = serde_json::from_str(&raw)?;
            let first_user_turn = !messages.iter().any(|m| m.role == Role::User);
            messages.push(Message::user(user_message).stamped());
            messages.push(Message::assistant(assistant_message).stamped());
            if messages.len() > history_limit {
                let excess = messages.len() - history_limit;
                messages.drain(..excess);
            }

            let title = if first_user_turn && title == DEFAULT_TITLE {
                title_from_message(user_message)
            } else {
                title
            };

            conn.execute(
                "UPDATE sessions SET messages = ?2, mode = ?3, title = ?4, updated_at = ?5
                 WHERE session_id = ?1",
                rusqlite::params![
                    id.to_string(),
                    serde_json::to_string(&messages)?,
                    mode.as_str(),
                    title,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| AnalystError::Storage(format!("Failed to append turn: {}", e)))?;
            Ok(())
        })?;

        self.find(id)?
            .ok_or_else(|| AnalystError::SessionNotFound(id.to_string()))
    }

    /// Overwrite the session's persisted mode.
    pub fn set_mode(&self, id: Uuid, mode: ConversationMode) -> Result<(), AnalystError> {
        self.update(
            id,
            "UPDATE sessions SET mode = ?2, updated_at = ?3 WHERE session_id = ?1",
            mode.as_str(),
        )
    }

    /// Rename a session.
    pub fn rename(&self, id: Uuid, title: &str) -> Result<(), AnalystError> {
        self.update(
            id,
            "UPDATE sessions SET title = ?2, updated_at = ?3 WHERE session_id = ?1",
            title,
        )
    }

    /// Store a generated BRD and flag the session.
    pub fn save_brd(&self, id: Uuid, content: &str) -> Result<(), AnalystError> {
        self.update(
            id,
            "UPDATE sessions SET brd_generated = 1, brd_content = ?2, updated_at = ?3
             WHERE session_id = ?1",
            content,
        )
    }

    /// Fetch the generated BRD, if any.
    ///
    /// Returns `Ok(None)` when the session exists but has no BRD yet, and
    /// `SessionNotFound` when the session does not exist.
    pub fn brd(&self, id: Uuid) -> Result<Option<String>, AnalystError> {
        self.db.with_conn(|conn| {
            let row: Option<(i64, Option<String>)> = conn
                .query_row(
                    "SELECT brd_generated, brd_content FROM sessions WHERE session_id = ?1",
                    rusqlite::params![id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            match row {
                None => Err(AnalystError::SessionNotFound(id.to_string())),
                Some((0, _)) => Ok(None),
                Some((_, content)) => Ok(content.filter(|c| !c.is_empty())),
            }
        })
    }

    /// Delete a session. Returns false if it did not exist.
    pub fn delete(&self, id: Uuid) -> Result<bool, AnalystError> {
        self.db.with_conn(|conn| {
            let n = conn
                .execute(
                    "DELETE FROM sessions WHERE session_id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| AnalystError::Storage(format!("Failed to delete session: {}", e)))?;
            Ok(n > 0)
        })
    }

    /// Count all sessions.
    pub fn count(&self) -> Result<u64, AnalystError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .map_err(|e| AnalystError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    fn update(&self, id: Uuid, sql: &str, value: &str) -> Result<(), AnalystError> {
        self.db.with_conn(|conn| {
            let n = conn
                .execute(
                    sql,
                    rusqlite::params![id.to_string(), value, Utc::now().timestamp()],
                )
                .map_err(|e| AnalystError::Storage(format!("Failed to update session: {}", e)))?;
            if n == 0 {
                return Err(AnalystError::SessionNotFound(id.to_string()));
            }
            Ok(())
        })
    }
}

fn title_from_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(TITLE_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, AnalystError> {
    let id_str: String = row.get(0).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let title: String = row.get(1).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let messages: String = row.get(2).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let mode: String = row.get(3).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let brd_generated: i64 = row.get(4).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let brd_content: Option<String> =
        row.get(5).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(6).map_err(|e| AnalystError::Storage(e.to_string()))?;
    let updated_at: i64 = row.get(7).map_err(|e| AnalystError::Storage(e.to_string()))?;

    Ok(Session {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| AnalystError::Storage(format!("Invalid UUID: {}", e)))?,
        title,
        messages: serde_json::from_str(&messages)?,
        mode: mode.parse().map_err(AnalystError::Storage)?,
        brd_generated: brd_generated != 0,
        brd_content,
        created_at: timestamp(created_at),
        updated_at: timestamp(updated_at),
    })
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

// =============================================================================
// KnowledgeRepository
// =============================================================================

/// An embedded chunk of a reference document.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeChunk {
    pub id: Uuid,
    /// File name the chunk came from.
    pub source: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Repository for embedded reference document chunks.
#[derive(Debug, Clone)]
pub struct KnowledgeRepository {
    db: Arc<Database>,
}

impl KnowledgeRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Replace every chunk of `source` with the given chunks atomically.
    pub fn replace_source(
        &self,
        source: &str,
        chunks: &[KnowledgeChunk],
    ) -> Result<(), AnalystError> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            tx.execute(
                "DELETE FROM knowledge_chunks WHERE source = ?1",
                rusqlite::params![source],
            )
            .map_err(|e| AnalystError::Storage(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO knowledge_chunks (id, source, chunk_index, content, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(|e| AnalystError::Storage(e.to_string()))?;
                for chunk in chunks {
                    stmt.execute(rusqlite::params![
                        chunk.id.to_string(),
                        source,
                        chunk.chunk_index as i64,
                        chunk.content,
                        serde_json::to_string(&chunk.embedding)?,
                    ])
                    .map_err(|e| AnalystError::Storage(format!("Failed to save chunk: {}", e)))?;
                }
            }

            tx.commit()
                .map_err(|e| AnalystError::Storage(e.to_string()))?;
            Ok(())
        })
    }

    /// Load every stored chunk, ordered by source and position.
    pub fn all(&self) -> Result<Vec<KnowledgeChunk>, AnalystError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, source, chunk_index, content, embedding
                     FROM knowledge_chunks ORDER BY source, chunk_index",
                )
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(|e| AnalystError::Storage(e.to_string()))?;

            let mut chunks = Vec::new();
            for row in rows {
                let (id, source, chunk_index, content, embedding) =
                    row.map_err(|e| AnalystError::Storage(e.to_string()))?;
                chunks.push(KnowledgeChunk {
                    id: Uuid::parse_str(&id)
                        .map_err(|e| AnalystError::Storage(format!("Invalid UUID: {}", e)))?,
                    source,
                    chunk_index: chunk_index as usize,
                    content,
                    embedding: serde_json::from_str(&embedding)?,
                });
            }
            Ok(chunks)
        })
    }

    pub fn count(&self) -> Result<u64, AnalystError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |row| row.get(0))
                .map_err(|e| AnalystError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    /// Remove all chunks.
    pub fn clear(&self) -> Result<(), AnalystError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM knowledge_chunks", [])
                .map_err(|e| AnalystError::Storage(e.to_string()))?;
            Ok(())
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
