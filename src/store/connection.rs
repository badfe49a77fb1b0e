//! Per-invocation SQLite connection with guaranteed release.

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::ExecutionError;
use crate::config::StoreConfig;

/// VM instructions between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1000;

/// Owns one store connection for the duration of a single execution.
///
/// Dropping the guard closes the connection, so every exit path of the
/// blocking task (success, `?`, panic unwind) releases it. `live` counts
/// guards currently alive for the owning executor.
pub struct ScopedConnection {
    conn: Connection,
    live: Arc<AtomicUsize>,
}

impl ScopedConnection {
    /// Open an existing database; a missing file is a connection error, never an empty new store.
    pub fn open(config: &StoreConfig, live: Arc<AtomicUsize>) -> Result<Self, ExecutionError> {
        let mode = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        let flags = mode | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI;

        let conn =
            Connection::open_with_flags(&config.path, flags).map_err(ExecutionError::Connection)?;
        conn.busy_timeout(config.busy_timeout)
            .map_err(ExecutionError::Connection)?;

        live.fetch_add(1, Ordering::SeqCst);
        debug!(path = %config.path.display(), read_only = config.read_only, "store connection opened");
        Ok(Self { conn, live })
    }

    /// Interrupt any statement still running once `deadline` has passed.
    pub fn set_deadline(&self, deadline: Instant) -> Result<(), ExecutionError> {
        self.conn
            .progress_handler(PROGRESS_INTERVAL_OPS, Some(move || Instant::now() >= deadline))
            .map_err(ExecutionError::Connection)
    }
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!("store connection released");
    }
}
