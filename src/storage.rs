//! Persistence for per-profile log collections
//!
//! Collections are always written whole: a save replaces everything stored
//! for that profile, in the order given.

#[cfg(test)]
use std::cell::{Cell, RefCell};
#[cfg(test)]
use std::collections::HashMap;
use std::path::Path;
#[cfg(test)]
use std::rc::Rc;

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::GlucoError;
use crate::model::GlucoseLog;

/// Keyed, full-collection storage for log entries
pub trait LogRepository {
    /// Load the saved collection for a profile, empty when nothing is stored
    fn load(&self, profile_id: &str) -> Result<Vec<GlucoseLog>, GlucoError>;

    /// Overwrite the stored collection for a profile
    fn save(&self, profile_id: &str, logs: &[GlucoseLog]) -> Result<(), GlucoError>;
}

/// SQLite database for storing log collections
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Create or open a database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GlucoError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, gone when dropped
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, GlucoError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, GlucoError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS logs (
                profile_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (profile_id, position)
            );

            CREATE INDEX IF NOT EXISTS idx_logs_profile_id
                ON logs(profile_id, id);

            CREATE TABLE IF NOT EXISTS session (
                key INTEGER PRIMARY KEY CHECK (key = 1),
                profile_id TEXT NOT NULL
            );"
        )?;

        Ok(Self { conn })
    }

    /// Number of stored entries for a profile
    pub fn count(&self, profile_id: &str) -> Result<i64, GlucoError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM logs WHERE profile_id = ?1",
            params![profile_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Profile remembered from the last login, if any
    pub fn active_profile(&self) -> Result<Option<String>, GlucoError> {
        let profile = self.conn
            .query_row("SELECT profile_id FROM session WHERE key = 1", [], |row| row.get(0))
            .optional()?;
        Ok(profile)
    }

    pub fn set_active_profile(&self, profile_id: &str) -> Result<(), GlucoError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO session (key, profile_id) VALUES (1, ?1)",
            params![profile_id],
        )?;
        Ok(())
    }

    pub fn clear_active_profile(&self) -> Result<(), GlucoError> {
        self.conn.execute("DELETE FROM session", [])?;
        Ok(())
    }
}

impl LogRepository for SqliteRepository {
    fn load(&self, profile_id: &str) -> Result<Vec<GlucoseLog>, GlucoError> {
        let mut stmt = self.conn.prepare(
            "SELECT body FROM logs WHERE profile_id = ?1 ORDER BY position"
        )?;

        let bodies = stmt
            .query_map(params![profile_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let logs = bodies
            .iter()
            .map(|body| serde_json::from_str(body))
            .collect::<Result<Vec<GlucoseLog>, _>>()?;

        debug!("Loaded {} logs for profile {}", logs.len(), profile_id);
        Ok(logs)
    }

    fn save(&self, profile_id: &str, logs: &[GlucoseLog]) -> Result<(), GlucoError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM logs WHERE profile_id = ?1", params![profile_id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO logs (profile_id, position, id, timestamp, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            )?;
            for (position, log) in logs.iter().enumerate() {
                insert.execute(params![
                    profile_id,
                    position as i64,
                    log.id,
                    log.timestamp.to_rfc3339(),
                    serde_json::to_string(log)?,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Saved {} logs for profile {}", logs.len(), profile_id);
        Ok(())
    }
}

/// Process-local repository. Clones share the same collections.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryRepository {
    collections: Rc<RefCell<HashMap<String, Vec<GlucoseLog>>>>,
    fail_saves: Rc<Cell<bool>>,
}

#[cfg(test)]
impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail, for exercising error paths
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.set(fail);
    }

    /// Snapshot of what is currently stored for a profile
    pub fn stored(&self, profile_id: &str) -> Vec<GlucoseLog> {
        self.collections.borrow().get(profile_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
impl LogRepository for MemoryRepository {
    fn load(&self, profile_id: &str) -> Result<Vec<GlucoseLog>, GlucoError> {
        Ok(self.stored(profile_id))
    }

    fn save(&self, profile_id: &str, logs: &[GlucoseLog]) -> Result<(), GlucoError> {
        if self.fail_saves.get() {
            return Err(GlucoError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage unavailable",
            )));
        }
        self.collections.borrow_mut().insert(profile_id.to_string(), logs.to_vec());
        Ok(())
    }
}
