//! Repository contracts and the stored-procedure gateway.
//!
//! # Responsibility
//! - Define the CRUD surface callers program against, blocking and async.
//! - Keep procedure naming and transaction handling out of caller code.
//!
//! # Invariants
//! - Blocking and async variants of an operation have identical semantics.
//! - Errors from the driver reach the caller unchanged.

use crate::db::value::SqlValue;
use crate::db::DbResult;
use crate::model::table_param::TableParam;
use async_trait::async_trait;

pub mod crud_gateway;
pub mod procedure_map;

/// Blocking CRUD operations for record type `T`.
///
/// `params` are `(key, value)` pairs bound as `@key`.
pub trait CrudRepository<T> {
    /// Calls `usp_Get{T}List` and decodes every row.
    fn get_list(&self, params: &[(&str, SqlValue)]) -> DbResult<Vec<T>>;

    /// Calls `usp_Get{T}`.
    ///
    /// Returns `None` when the procedure yields zero rows *or* more than one.
    fn get_single(&self, params: &[(&str, SqlValue)]) -> DbResult<Option<T>>;

    /// Calls `usp_Create{T}` in a transaction.
    ///
    /// Returns the `@Id` output when `get_return_id` is set, otherwise `1`.
    fn insert(&self, get_return_id: bool, params: &[(&str, SqlValue)]) -> DbResult<i64>;

    /// Calls `usp_Update{T}` in a transaction.
    fn update(&self, params: &[(&str, SqlValue)]) -> DbResult<()>;

    /// Calls `usp_Update{T}List` with `records` bound as one table parameter
    /// typed `T::TYPE_NAME`.
    fn update_list(&self, param_name: &str, records: &[T]) -> DbResult<()>;

    /// Same as [`update_list`](Self::update_list) with a pre-built table.
    fn update_list_table(&self, param_name: &str, table: TableParam) -> DbResult<()>;

    /// Calls `usp_Delete{T}List` with `ids` bound as an `[dbo].[IntList]`
    /// table parameter named `param_name`, plus any extra `params`.
    fn delete_list(&self, param_name: &str, ids: &[i32], params: &[(&str, SqlValue)])
        -> DbResult<()>;
}

/// Async twins of [`CrudRepository`]; each suspends only while the database
/// work runs on the blocking pool.
#[async_trait]
pub trait CrudRepositoryAsync<T: Send + Sync + 'static>: Send + Sync {
    async fn get_list_async(&self, params: &[(&str, SqlValue)]) -> DbResult<Vec<T>>;
    async fn get_single_async(&self, params: &[(&str, SqlValue)]) -> DbResult<Option<T>>;
    async fn insert_async(&self, get_return_id: bool, params: &[(&str, SqlValue)]) -> DbResult<i64>;
    async fn update_async(&self, params: &[(&str, SqlValue)]) -> DbResult<()>;
    async fn update_list_async(&self, param_name: &str, records: &[T]) -> DbResult<()>;
    async fn update_list_table_async(&self, param_name: &str, table: TableParam) -> DbResult<()>;
    async fn delete_list_async(
        &self,
        param_name: &str,
        ids: &[i32],
        params: &[(&str, SqlValue)],
    ) -> DbResult<()>;
}
