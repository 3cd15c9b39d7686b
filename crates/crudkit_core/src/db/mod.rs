//! Driver seam, value model and the SQLite backend.
//!
//! # Responsibility
//! - Define the connection/session contract the gateway orchestrates.
//! - Carry typed values and named parameters across that contract.
//! - Provide a concrete SQLite backend with a procedure catalog.
//!
//! # Invariants
//! - Driver failures are carried unchanged in `DbError::Sqlite`.
//! - Every other variant describes a configuration or mapping failure
//!   detected before or after the driver call.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod catalog;
pub mod driver;
pub mod migrations;
mod open;
pub mod params;
pub mod pool;
pub mod sqlite;
pub mod value;

pub use open::{open_connection, open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    InvalidConnectionString(String),
    InvalidName {
        kind: &'static str,
        name: String,
    },
    ProcedureNotFound(String),
    UnknownTableType(String),
    TableTypeMismatch {
        type_name: String,
        expected_columns: usize,
        actual_columns: usize,
    },
    TableArity {
        expected: usize,
        actual: usize,
    },
    Mapping {
        column: String,
        message: String,
    },
    MissingOutput(String),
    UnknownParameter {
        procedure: String,
        name: String,
    },
    Pool(String),
    Worker(String),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::InvalidConnectionString(message) => {
                write!(f, "invalid connection string: {message}")
            }
            Self::InvalidName { kind, name } => write!(f, "invalid {kind} name `{name}`"),
            Self::ProcedureNotFound(name) => {
                write!(f, "could not find stored procedure `{name}`")
            }
            Self::UnknownTableType(name) => write!(f, "unknown table type `{name}`"),
            Self::TableTypeMismatch {
                type_name,
                expected_columns,
                actual_columns,
            } => write!(
                f,
                "table type `{type_name}` declares {expected_columns} columns but parameter has {actual_columns}"
            ),
            Self::TableArity { expected, actual } => write!(
                f,
                "table row has {actual} values but the table declares {expected} columns"
            ),
            Self::Mapping { column, message } => {
                write!(f, "cannot map column `{column}`: {message}")
            }
            Self::MissingOutput(name) => {
                write!(f, "output parameter `{name}` was not set by the procedure")
            }
            Self::UnknownParameter { procedure, name } => write!(
                f,
                "procedure `{procedure}` has no parameter named `{name}`"
            ),
            Self::Pool(message) => write!(f, "connection pool: {message}"),
            Self::Worker(message) => write!(f, "blocking worker failed: {message}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "catalog schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
