//! Convention-based CRUD access to stored procedures.
//!
//! A [`CrudGateway`] maps a record type `T` to `usp_Get{T}List`,
//! `usp_Get{T}`, `usp_Create{T}`, `usp_Update{T}`, `usp_Update{T}List` and
//! `usp_Delete{T}List`, and bulk operations pass records as one
//! table-valued [`TableParam`].

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::ConnectionSettings;
pub use db::driver::{ConnectionSource, Lease, ProcedureCall, ProcedureOutput, Session};
pub use db::params::{ParamValue, ParameterSet};
pub use db::sqlite::{SqlitePool, SqliteSession};
pub use db::value::{DataRow, SqlField, SqlType, SqlValue};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{FieldDef, FromRow, Record, RecordShape};
pub use model::table_param::{TableColumn, TableParam, ToTableParam, INT_LIST_TABLE_TYPE};
pub use repo::crud_gateway::{CrudGateway, RETURN_ID_PARAM};
pub use repo::procedure_map::{Operation, ProcedureMap};
pub use repo::{CrudRepository, CrudRepositoryAsync};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
