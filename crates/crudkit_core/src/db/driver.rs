//! Driver contract the gateway orchestrates.
//!
//! # Responsibility
//! - Abstract connection acquisition and release (`ConnectionSource`).
//! - Abstract transaction control and procedure execution (`Session`).
//! - Provide the scoped lease that guarantees release on every exit path.
//!
//! # Invariants
//! - A leased connection is released exactly once, when the lease drops.
//! - Sessions report driver failures unchanged.

use crate::db::params::ParameterSet;
use crate::db::value::{DataRow, SqlValue};
use crate::db::DbResult;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// One stored-procedure invocation.
#[derive(Debug, Clone, Copy)]
pub struct ProcedureCall<'a> {
    pub name: &'a str,
    pub params: &'a ParameterSet,
    pub timeout: Duration,
}

/// Everything a procedure call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcedureOutput {
    /// Rows of the last result-producing statement.
    pub rows: Vec<DataRow>,
    pub rows_affected: usize,
    /// Output parameter values keyed by `@name`.
    pub outputs: Vec<(String, SqlValue)>,
}

impl ProcedureOutput {
    pub fn output(&self, name: &str) -> Option<&SqlValue> {
        self.outputs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

/// An open database session able to run procedures.
pub trait Session {
    fn begin(&mut self) -> DbResult<()>;
    fn commit(&mut self) -> DbResult<()>;
    fn rollback(&mut self) -> DbResult<()>;
    fn call(&mut self, call: &ProcedureCall<'_>) -> DbResult<ProcedureOutput>;
    fn procedure_exists(&mut self, name: &str) -> DbResult<bool>;
}

/// Hands out sessions and takes them back.
pub trait ConnectionSource: Send + Sync + 'static {
    type Conn: Session;

    fn acquire(&self) -> DbResult<Self::Conn>;
    fn release(&self, conn: Self::Conn);
}

/// Scoped connection; released back to its source on drop.
pub struct Lease<'s, S: ConnectionSource + ?Sized> {
    source: &'s S,
    conn: Option<S::Conn>,
}

impl<'s, S: ConnectionSource + ?Sized> Lease<'s, S> {
    pub fn acquire(source: &'s S) -> DbResult<Self> {
        let conn = source.acquire()?;
        Ok(Self {
            source,
            conn: Some(conn),
        })
    }
}

impl<S: ConnectionSource + ?Sized> Deref for Lease<'_, S> {
    type Target = S::Conn;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the connection out.
        self.conn.as_ref().expect("lease holds a connection until dropped")
    }
}

impl<S: ConnectionSource + ?Sized> DerefMut for Lease<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("lease holds a connection until dropped")
    }
}

impl<S: ConnectionSource + ?Sized> Drop for Lease<'_, S> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.source.release(conn);
        }
    }
}
