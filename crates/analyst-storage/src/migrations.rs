//! Database schema migrations.
//!
//! v1 creates the sessions table, v2 the knowledge_chunks table used by the
//! retrieval index.

use rusqlite::Connection;
use tracing::info;

use analyst_core::error::AnalystError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), AnalystError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| AnalystError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AnalystError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: sessions");
    }
    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: knowledge_chunks");
    }

    Ok(())
}

/// Version 1: chat sessions with embedded message history and BRD.
fn apply_v1(conn: &Connection) -> Result<(), AnalystError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            session_id      TEXT PRIMARY KEY NOT NULL,
            title           TEXT NOT NULL DEFAULT 'New Business Idea',
            messages        TEXT NOT NULL DEFAULT '[]',
            mode            TEXT NOT NULL DEFAULT 'general'
                            CHECK (mode IN ('general', 'gathering', 'generating')),
            brd_generated   INTEGER NOT NULL DEFAULT 0,
            brd_content     TEXT,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_updated_at
            ON sessions (updated_at DESC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'sessions');
        ",
    )
    .map_err(|e| AnalystError::Storage(format!("Migration v1 failed: {}", e)))
}

/// Version 2: embedded reference document chunks.
fn apply_v2(conn: &Connection) -> Result<(), AnalystError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS knowledge_chunks (
            id              TEXT PRIMARY KEY NOT NULL,
            source          TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL,
            content         TEXT NOT NULL,
            embedding       TEXT NOT NULL,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            UNIQUE (source, chunk_index)
        );

        CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_source
            ON knowledge_chunks (source);

        INSERT INTO schema_migrations (version, name) VALUES (2, 'knowledge_chunks');
        ",
    )
    .map_err(|e| AnalystError::Storage(format!("Migration v2 failed: {}", e)))
}
