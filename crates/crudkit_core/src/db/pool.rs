//! r2d2 connection manager for catalog-backed SQLite connections.
//!
//! # Invariants
//! - Every pooled connection is opened through `open_connection`, so the
//!   catalog is migrated before first use.
//! - A connection still inside a transaction counts as broken and is never
//!   handed out again.

use crate::db::open::open_connection;
use crate::db::DbError;
use rusqlite::Connection;

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    pub idle: usize,
    pub checked_out: usize,
    /// Connections currently open, idle or checked out.
    pub open: usize,
}

impl From<r2d2::State> for PoolStatus {
    fn from(state: r2d2::State) -> Self {
        let open = state.connections as usize;
        let idle = state.idle_connections as usize;
        Self {
            idle,
            checked_out: open.saturating_sub(idle),
            open,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogConnectionManager {
    target: String,
}

impl CatalogConnectionManager {
    /// `target` is a file path or a `file:` URI.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl r2d2::ManageConnection for CatalogConnectionManager {
    type Connection = Connection;
    type Error = DbError;

    fn connect(&self) -> Result<Connection, DbError> {
        open_connection(&self.target)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), DbError> {
        if !conn.is_autocommit() {
            return Err(DbError::Pool(
                "connection is still inside a transaction".to_string(),
            ));
        }
        conn.execute_batch("SELECT 1;")?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Connection) -> bool {
        !conn.is_autocommit()
    }
}
