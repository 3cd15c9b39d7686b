//! Convention-based CRUD gateway over stored procedures.
//!
//! # Responsibility
//! - Map typed record operations onto procedure calls.
//! - Own the connection and transaction lifecycle of every call.
//!
//! # Invariants
//! - One leased connection per call, released exactly once on every path.
//! - Writes run inside a transaction; any failure rolls back before the
//!   original error is returned.
//! - Reads never open a transaction.
//! - Procedure names come from the setup-time `ProcedureMap` only.

use crate::config::{ConnectionSettings, DEFAULT_COMMAND_TIMEOUT_SECS};
use crate::db::driver::{ConnectionSource, Lease, ProcedureCall, ProcedureOutput, Session};
use crate::db::params::{parameter_name, ParameterSet};
use crate::db::sqlite::SqlitePool;
use crate::db::value::{SqlField, SqlType, SqlValue};
use crate::db::{DbError, DbResult};
use crate::logging::sanitize_message;
use crate::model::record::{FromRow, Record};
use crate::model::table_param::{TableParam, INT_LIST_TABLE_TYPE};
use crate::repo::procedure_map::{Operation, ProcedureMap};
use crate::repo::{CrudRepository, CrudRepositoryAsync};
use async_trait::async_trait;
use log::{error, info, warn};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Output parameter that receives a generated identity on insert.
pub const RETURN_ID_PARAM: &str = "@Id";

const MAX_LOGGED_ERROR_CHARS: usize = 240;

/// Stored-procedure gateway for record type `T`.
pub struct CrudGateway<T, S: ConnectionSource = SqlitePool> {
    source: Arc<S>,
    procedures: Arc<ProcedureMap>,
    command_timeout: Duration,
    _record: PhantomData<fn() -> T>,
}

impl<T, S: ConnectionSource> Clone for CrudGateway<T, S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            procedures: Arc::clone(&self.procedures),
            command_timeout: self.command_timeout,
            _record: PhantomData,
        }
    }
}

impl<T: Record> CrudGateway<T, SqlitePool> {
    /// Opens a SQLite pool from `connection_string` and applies its
    /// `Command Timeout`.
    pub fn connect(connection_string: &str) -> DbResult<Self> {
        let settings = ConnectionSettings::parse(connection_string)?;
        let command_timeout = settings.command_timeout();
        let pool = SqlitePool::new(settings)?;
        Ok(Self::new(Arc::new(pool))?.with_command_timeout(command_timeout))
    }
}

impl<T: Record, S: ConnectionSource> CrudGateway<T, S> {
    /// Uses the naming convention for `T`.
    pub fn new(source: Arc<S>) -> DbResult<Self> {
        Ok(Self::with_procedures(source, ProcedureMap::for_record::<T>()?))
    }
}

impl<T, S: ConnectionSource> CrudGateway<T, S> {
    pub fn with_procedures(source: Arc<S>, procedures: ProcedureMap) -> Self {
        Self {
            source,
            procedures: Arc::new(procedures),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            _record: PhantomData,
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn procedures(&self) -> &ProcedureMap {
        &self.procedures
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Checks that the database exposes every mapped procedure.
    pub fn verify_procedures(&self) -> DbResult<()> {
        let mut lease = Lease::acquire(&*self.source)?;
        let mut missing = Vec::new();
        for (_, name) in self.procedures.iter() {
            if !lease.procedure_exists(name)? {
                missing.push(name);
            }
        }

        if missing.is_empty() {
            info!(
                "event=procedures_verify module=gateway status=ok type={}",
                self.procedures.type_name()
            );
            return Ok(());
        }
        error!(
            "event=procedures_verify module=gateway status=error type={} missing={}",
            self.procedures.type_name(),
            missing.join(",")
        );
        Err(DbError::ProcedureNotFound(missing.join(", ")))
    }

    fn run(&self, op: Operation, params: &ParameterSet) -> DbResult<ProcedureOutput> {
        let name = self.procedures.name(op);
        let call = ProcedureCall {
            name,
            params,
            timeout: self.command_timeout,
        };
        let started_at = Instant::now();

        let result = Lease::acquire(&*self.source).and_then(|mut lease| {
            if op.is_write() {
                in_transaction(&mut *lease, &call)
            } else {
                lease.call(&call)
            }
        });

        match &result {
            Ok(output) => info!(
                "event=sp_call module=gateway status=ok op={} proc={} params={} rows={} duration_ms={}",
                op.as_str(),
                name,
                params.len(),
                output.rows.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=sp_call module=gateway status=error op={} proc={} params={} duration_ms={} error={}",
                op.as_str(),
                name,
                params.len(),
                started_at.elapsed().as_millis(),
                sanitize_message(&err.to_string(), MAX_LOGGED_ERROR_CHARS)
            ),
        }
        result
    }
}

fn in_transaction<C: Session>(conn: &mut C, call: &ProcedureCall<'_>) -> DbResult<ProcedureOutput> {
    conn.begin()?;
    let outcome = conn.call(call).and_then(|output| conn.commit().map(|()| output));
    if outcome.is_err() {
        if let Err(rollback_err) = conn.rollback() {
            warn!(
                "event=tx_rollback module=gateway status=error proc={} error={}",
                call.name,
                sanitize_message(&rollback_err.to_string(), MAX_LOGGED_ERROR_CHARS)
            );
        }
    }
    outcome
}

impl<T: FromRow + Record, S: ConnectionSource> CrudGateway<T, S> {
    fn get_list_with(&self, params: &ParameterSet) -> DbResult<Vec<T>> {
        let output = self.run(Operation::GetList, params)?;
        output.rows.iter().map(T::from_row).collect()
    }

    fn get_single_with(&self, params: &ParameterSet) -> DbResult<Option<T>> {
        let output = self.run(Operation::GetSingle, params)?;
        match output.rows.as_slice() {
            [row] => T::from_row(row).map(Some),
            _ => Ok(None),
        }
    }

    fn insert_with(&self, get_return_id: bool, mut params: ParameterSet) -> DbResult<i64> {
        if get_return_id {
            params.add_output(RETURN_ID_PARAM, SqlType::Int);
        }
        let output = self.run(Operation::Create, &params)?;
        if !get_return_id {
            return Ok(1);
        }

        match output.output(RETURN_ID_PARAM) {
            Some(value) if !value.is_null() => {
                i64::from_sql_value(value.clone()).map_err(|message| DbError::Mapping {
                    column: RETURN_ID_PARAM.to_string(),
                    message,
                })
            }
            _ => Err(DbError::MissingOutput(RETURN_ID_PARAM.to_string())),
        }
    }

    fn update_with(&self, params: &ParameterSet) -> DbResult<()> {
        self.run(Operation::Update, params).map(|_| ())
    }

    fn update_list_with(&self, param_name: &str, table: TableParam) -> DbResult<()> {
        let mut params = ParameterSet::new();
        params.add_table(param_name, table);
        self.run(Operation::UpdateList, &params).map(|_| ())
    }

    fn delete_list_with(&self, mut params: ParameterSet, param_name: &str, ids: &[i32]) -> DbResult<()> {
        let table = TableParam::from_records(ids, INT_LIST_TABLE_TYPE)?;
        params.add_table(param_name, table);
        self.run(Operation::DeleteList, &params).map(|_| ())
    }

    fn record_table(records: &[T]) -> DbResult<TableParam> {
        TableParam::from_records(records, T::TYPE_NAME)
    }
}

impl<T: FromRow + Record + Send + Sync + 'static, S: ConnectionSource> CrudGateway<T, S> {
    /// Runs `work` on a clone of this gateway on the blocking thread pool.
    async fn blocking<R, F>(&self, work: F) -> DbResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Self) -> DbResult<R> + Send + 'static,
    {
        let gateway = self.clone();
        tokio::task::spawn_blocking(move || work(&gateway))
            .await
            .map_err(|err| DbError::Worker(err.to_string()))?
    }
}

impl<T: FromRow + Record, S: ConnectionSource> CrudRepository<T> for CrudGateway<T, S> {
    fn get_list(&self, params: &[(&str, SqlValue)]) -> DbResult<Vec<T>> {
        self.get_list_with(&ParameterSet::from_pairs(params))
    }

    fn get_single(&self, params: &[(&str, SqlValue)]) -> DbResult<Option<T>> {
        self.get_single_with(&ParameterSet::from_pairs(params))
    }

    fn insert(&self, get_return_id: bool, params: &[(&str, SqlValue)]) -> DbResult<i64> {
        self.insert_with(get_return_id, ParameterSet::from_pairs(params))
    }

    fn update(&self, params: &[(&str, SqlValue)]) -> DbResult<()> {
        self.update_with(&ParameterSet::from_pairs(params))
    }

    fn update_list(&self, param_name: &str, records: &[T]) -> DbResult<()> {
        self.update_list_with(param_name, Self::record_table(records)?)
    }

    fn update_list_table(&self, param_name: &str, table: TableParam) -> DbResult<()> {
        self.update_list_with(param_name, table)
    }

    fn delete_list(
        &self,
        param_name: &str,
        ids: &[i32],
        params: &[(&str, SqlValue)],
    ) -> DbResult<()> {
        self.delete_list_with(ParameterSet::from_pairs(params), param_name, ids)
    }
}

#[async_trait]
impl<T, S> CrudRepositoryAsync<T> for CrudGateway<T, S>
where
    T: FromRow + Record + Send + Sync + 'static,
    S: ConnectionSource,
{
    async fn get_list_async(&self, params: &[(&str, SqlValue)]) -> DbResult<Vec<T>> {
        let params = ParameterSet::from_pairs(params);
        self.blocking(move |gateway| gateway.get_list_with(&params))
            .await
    }

    async fn get_single_async(&self, params: &[(&str, SqlValue)]) -> DbResult<Option<T>> {
        let params = ParameterSet::from_pairs(params);
        self.blocking(move |gateway| gateway.get_single_with(&params))
            .await
    }

    async fn insert_async(&self, get_return_id: bool, params: &[(&str, SqlValue)]) -> DbResult<i64> {
        let params = ParameterSet::from_pairs(params);
        self.blocking(move |gateway| gateway.insert_with(get_return_id, params))
            .await
    }

    async fn update_async(&self, params: &[(&str, SqlValue)]) -> DbResult<()> {
        let params = ParameterSet::from_pairs(params);
        self.blocking(move |gateway| gateway.update_with(&params))
            .await
    }

    async fn update_list_async(&self, param_name: &str, records: &[T]) -> DbResult<()> {
        let table = Self::record_table(records)?;
        let param_name = parameter_name(param_name);
        self.blocking(move |gateway| gateway.update_list_with(&param_name, table))
            .await
    }

    async fn update_list_table_async(&self, param_name: &str, table: TableParam) -> DbResult<()> {
        let param_name = parameter_name(param_name);
        self.blocking(move |gateway| gateway.update_list_with(&param_name, table))
            .await
    }

    async fn delete_list_async(
        &self,
        param_name: &str,
        ids: &[i32],
        params: &[(&str, SqlValue)],
    ) -> DbResult<()> {
        let params = ParameterSet::from_pairs(params);
        let param_name = parameter_name(param_name);
        let ids = ids.to_vec();
        self.blocking(move |gateway| gateway.delete_list_with(params, &param_name, &ids))
            .await
    }
}
