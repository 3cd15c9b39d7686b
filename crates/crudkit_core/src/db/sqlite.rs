//! SQLite implementation of the driver contract.
//!
//! # Responsibility
//! - Pool rusqlite connections behind `ConnectionSource`.
//! - Execute catalog procedures with named parameters and table parameters.
//! - Enforce the per-call command timeout.
//!
//! # Invariants
//! - `Max Pool Size` caps open connections; callers wait up to
//!   `Connect Timeout` for one to free up.
//! - In-memory databases live in the `memdb` VFS so lock waits honour the
//!   busy timeout like file databases do.
//! - Write transactions start with `BEGIN IMMEDIATE`.
//! - Table parameters live in temp tables named after the parameter (without
//!   `@`) for the duration of one call only.
//! - Temp table columns take the registered table type's names, positionally.
//! - Parameter names resolve case-insensitively, and every supplied scalar
//!   must be referenced by the procedure body.
//! - A connection returned with an open transaction is rolled back first.

use crate::config::ConnectionSettings;
use crate::db::catalog::{self, normalize_table_type_name};
use crate::db::driver::{ConnectionSource, Lease, ProcedureCall, ProcedureOutput, Session};
use crate::db::open::open_connection;
use crate::db::params::{ParamValue, ParameterSet};
use crate::db::pool::{CatalogConnectionManager, PoolStatus};
use crate::db::value::{DataRow, SqlValue};
use crate::db::{DbError, DbResult};
use crate::model::table_param::{TableColumn, TableParam};
use log::{debug, warn};
use r2d2::{Pool, PooledConnection};
use rusqlite::{params_from_iter, Batch, Connection, Statement};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use uuid::Uuid;

/// Virtual machine steps between command timeout checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;

/// Pooled SQLite connection source.
pub struct SqlitePool {
    settings: ConnectionSettings,
    pool: Pool<CatalogConnectionManager>,
    // memdb databases vanish with their last connection.
    _anchor: Option<Mutex<Connection>>,
}

impl SqlitePool {
    /// Parses `connection_string` and opens the pool.
    pub fn connect(connection_string: &str) -> DbResult<Self> {
        Self::new(ConnectionSettings::parse(connection_string)?)
    }

    /// Opens the pool; the first connection applies catalog migrations.
    pub fn new(settings: ConnectionSettings) -> DbResult<Self> {
        settings.validate()?;
        let target = if settings.is_memory() {
            format!("file:/crudkit-{}?vfs=memdb", Uuid::new_v4().simple())
        } else {
            settings.data_source.clone()
        };

        // Opened outside r2d2 so migration errors surface with their own type.
        let first = open_connection(&target)?;
        let anchor = settings.is_memory().then(|| Mutex::new(first));

        let max_size = u32::try_from(settings.max_pool_size).map_err(|_| {
            DbError::InvalidConnectionString(format!(
                "`Max Pool Size` {} is too large",
                settings.max_pool_size
            ))
        })?;
        let pool = Pool::builder()
            .max_size(max_size)
            .min_idle(Some(0))
            .connection_timeout(settings.connect_timeout())
            .build_unchecked(CatalogConnectionManager::new(target));

        Ok(Self {
            settings,
            pool,
            _anchor: anchor,
        })
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus::from(self.pool.state())
    }

    /// Creates or replaces a procedure in this database's catalog.
    pub fn define_procedure(&self, name: &str, body: &str) -> DbResult<()> {
        let lease = Lease::acquire(self)?;
        catalog::create_procedure(&lease.conn, name, body)
    }

    pub fn drop_procedure(&self, name: &str) -> DbResult<bool> {
        let lease = Lease::acquire(self)?;
        catalog::drop_procedure(&lease.conn, name)
    }

    /// Creates or replaces a table type with ordered columns.
    pub fn define_table_type(&self, name: &str, columns: &[TableColumn]) -> DbResult<()> {
        let lease = Lease::acquire(self)?;
        catalog::create_table_type(&lease.conn, name, columns)
    }

    /// Runs `f` on a leased raw connection.
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> DbResult<R>) -> DbResult<R> {
        let lease = Lease::acquire(self)?;
        f(&lease.conn)
    }
}

impl ConnectionSource for SqlitePool {
    type Conn = SqliteSession;

    fn acquire(&self) -> DbResult<SqliteSession> {
        let conn = self
            .pool
            .get()
            .map_err(|err| DbError::Pool(err.to_string()))?;
        Ok(SqliteSession { conn })
    }

    fn release(&self, session: SqliteSession) {
        let conn = session.conn;
        if !conn.is_autocommit() {
            // On failure the manager sees the open transaction and drops it.
            if let Err(err) = conn.execute_batch("ROLLBACK;") {
                warn!(
                    "event=conn_release module=sqlite status=error error_code=rollback_failed error={}",
                    err
                );
            }
        }
        drop(conn);
    }
}

/// One checked-out SQLite connection.
pub struct SqliteSession {
    conn: PooledConnection<CatalogConnectionManager>,
}

impl Session for SqliteSession {
    fn begin(&mut self) -> DbResult<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE;")?;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }

    fn call(&mut self, call: &ProcedureCall<'_>) -> DbResult<ProcedureOutput> {
        let body = catalog::procedure_body(&self.conn, call.name)?
            .ok_or_else(|| DbError::ProcedureNotFound(call.name.to_string()))?;

        let mut staged = Vec::new();
        let result = self
            .stage_tables(call.params, &mut staged)
            .and_then(|()| self.run_with_deadline(&body, call));
        self.drop_staged(&staged);
        result
    }

    fn procedure_exists(&mut self, name: &str) -> DbResult<bool> {
        Ok(catalog::procedure_body(&self.conn, name)?.is_some())
    }
}

impl SqliteSession {
    fn stage_tables(&self, params: &ParameterSet, staged: &mut Vec<String>) -> DbResult<()> {
        for (name, value) in params.iter() {
            if let ParamValue::Table(table) = value {
                let table_name = name.trim_start_matches('@').to_string();
                self.stage_table(&table_name, table)?;
                staged.push(table_name);
            }
        }
        Ok(())
    }

    fn stage_table(&self, table_name: &str, table: &TableParam) -> DbResult<()> {
        let type_name = normalize_table_type_name(table.type_name())?;
        let columns = catalog::table_type_columns(&self.conn, &type_name)?
            .ok_or_else(|| DbError::UnknownTableType(type_name.clone()))?;
        if columns.len() != table.columns().len() {
            return Err(DbError::TableTypeMismatch {
                type_name,
                expected_columns: columns.len(),
                actual_columns: table.columns().len(),
            });
        }

        let quoted = quote_ident(table_name);
        let column_decls = columns
            .iter()
            .map(|column| format!("{} {}", quote_ident(&column.name), column.sql_type.sqlite_decl()))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS temp.{quoted}; CREATE TEMP TABLE {quoted} ({column_decls});"
        ))?;

        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut insert = self
            .conn
            .prepare(&format!("INSERT INTO temp.{quoted} VALUES ({placeholders});"))?;
        for row in table.rows() {
            insert.execute(params_from_iter(row.iter()))?;
        }

        debug!(
            "event=tvp_stage module=sqlite status=ok table={} type={} rows={}",
            table_name,
            type_name,
            table.len()
        );
        Ok(())
    }

    fn drop_staged(&self, staged: &[String]) {
        for table_name in staged {
            let sql = format!("DROP TABLE IF EXISTS temp.{};", quote_ident(table_name));
            if let Err(err) = self.conn.execute_batch(&sql) {
                warn!(
                    "event=tvp_drop module=sqlite status=error table={} error={}",
                    table_name, err
                );
            }
        }
    }

    fn run_with_deadline(&self, body: &str, call: &ProcedureCall<'_>) -> DbResult<ProcedureOutput> {
        if let Some(deadline) = Instant::now().checked_add(call.timeout) {
            self.conn
                .progress_handler(PROGRESS_CHECK_OPS, Some(move || Instant::now() > deadline));
        }
        let result = self.run_body(body, call);
        self.conn.progress_handler(0, None::<fn() -> bool>);
        result
    }

    fn run_body(&self, body: &str, call: &ProcedureCall<'_>) -> DbResult<ProcedureOutput> {
        let mut output = ProcedureOutput::default();
        let mut referenced = HashSet::new();
        let mut batch = Batch::new(&self.conn, body);

        while let Some(mut stmt) = batch.next()? {
            bind_named(&mut stmt, call, &mut referenced)?;
            if stmt.column_count() == 0 {
                output.rows_affected += stmt.raw_execute()?;
                continue;
            }

            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut rows = stmt.raw_query();
            let mut collected = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for index in 0..columns.len() {
                    values.push(SqlValue::from(row.get_ref(index)?));
                }
                collected.push(DataRow::new(Arc::clone(&columns), values));
            }
            output.rows = collected;
        }

        for (name, value) in call.params.iter() {
            match value {
                ParamValue::Scalar(_) if !referenced.contains(name) => {
                    return Err(DbError::UnknownParameter {
                        procedure: call.name.to_string(),
                        name: name.to_string(),
                    });
                }
                ParamValue::Output(_) => {
                    let column = name.trim_start_matches('@');
                    let bound = output
                        .rows
                        .first()
                        .and_then(|row| row.value(column))
                        .cloned()
                        .unwrap_or(SqlValue::Null);
                    output.outputs.push((name.to_string(), bound));
                }
                _ => {}
            }
        }

        Ok(output)
    }
}

/// Binds every `@name` placeholder of `stmt` and records which supplied
/// parameters were used.
fn bind_named<'p>(
    stmt: &mut Statement<'_>,
    call: &ProcedureCall<'p>,
    referenced: &mut HashSet<&'p str>,
) -> DbResult<()> {
    for index in 1..=stmt.parameter_count() {
        let Some(placeholder) = stmt.parameter_name(index) else {
            continue;
        };
        let Some((name, value)) = call
            .params
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(placeholder))
        else {
            continue;
        };
        match value {
            ParamValue::Scalar(value) => stmt.raw_bind_parameter(index, value)?,
            ParamValue::Output(_) => stmt.raw_bind_parameter(index, SqlValue::Null)?,
            ParamValue::Table(_) => {
                return Err(DbError::InvalidName {
                    kind: "scalar parameter (table parameters are read from their temp table)",
                    name: name.to_string(),
                })
            }
        }
        referenced.insert(name);
    }
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
