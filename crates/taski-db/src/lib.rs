pub mod access;
pub mod cards;
pub mod lists;
pub mod migrations;
pub mod models;
pub mod positions;
pub mod queries;

use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Transaction};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use taski_types::events::Mutation;

pub use access::EntityKind;
pub use positions::{SiblingScope, assign_position};

/// Receives every mutation right after its transaction commits.
///
/// Called while the writer lock is still held, so the order in which a sink
/// sees mutations is the order in which they were committed.
pub trait CommitSink: Send + Sync {
    fn committed(&self, mutation: Mutation);
}

/// Sink for storage tests that do not broadcast.
#[cfg(test)]
pub(crate) struct Discard;

#[cfg(test)]
impl CommitSink for Discard {
    fn committed(&self, _mutation: Mutation) {}
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run `f` in a write transaction. On commit, hand the mutations it
    /// produced to `sink` before releasing the connection.
    pub fn transact<F, T>(&self, sink: &dyn CommitSink, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<(T, Vec<Mutation>)>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let tx = conn.transaction()?;
        let (value, mutations) = f(&tx)?;
        tx.commit()?;

        for mutation in mutations {
            sink.committed(mutation);
        }
        Ok(value)
    }
}

/// True when `err` is a UNIQUE / CHECK / FOREIGN KEY violation, e.g. two
/// siblings asked for the same explicit position.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<rusqlite::Error>()
        .and_then(|e| e.sqlite_error_code())
        .is_some_and(|code| code == ErrorCode::ConstraintViolation)
}
