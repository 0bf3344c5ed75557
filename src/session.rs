//! Page-session transient storage.
//!
//! Values live in an in-memory SQLite database owned by the running app, so
//! they survive switching between pages but vanish with the session.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ClientResult;

/// Key under which the landing page leaves a query for the chat page.
pub const HANDOFF_KEY: &str = "initialQuery";

pub const EMPTY_QUERY_NOTICE: &str = "Please type a question.";

#[derive(Clone)]
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    pub fn open() -> ClientResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session_storage (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // poisoning is ignored
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, key: &str, value: &str) -> ClientResult<()> {
        self.conn().execute(
            "INSERT INTO session_storage (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Reads and deletes `key` in one statement.
    pub fn take(&self, key: &str) -> ClientResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "DELETE FROM session_storage WHERE key = ?1 RETURNING value",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Nothing to hand off; show [`EMPTY_QUERY_NOTICE`].
    Empty,
    /// Query stored; navigate to the chat page.
    Staged,
}

/// Landing-page search action. Never submits anything itself.
pub fn stage_handoff(store: &SessionStore, query: &str) -> ClientResult<SearchOutcome> {
    if query.trim().is_empty() {
        return Ok(SearchOutcome::Empty);
    }

    store.set(HANDOFF_KEY, query)?;
    tracing::debug!("handoff query staged for the chat page");
    Ok(SearchOutcome::Staged)
}

/// Single-use read of the staged query; blank values count as absent.
pub fn take_handoff(store: &SessionStore) -> ClientResult<Option<String>> {
    Ok(store
        .take(HANDOFF_KEY)?
        .filter(|query| !query.trim().is_empty()))
}
