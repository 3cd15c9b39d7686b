#![allow(dead_code)]

use crudkit_core::{
    ConnectionSource, DataRow, DbError, DbResult, ParameterSet, ProcedureCall, ProcedureOutput,
    Session, SqlValue, SqlitePool,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

crudkit_core::record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Customer {
        pub customer_id: i32,
        pub name: String,
        pub email: Option<String>,
    }
}

/// One procedure call seen by the double.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub name: String,
    pub params: ParameterSet,
    pub in_transaction: bool,
    pub timeout: Duration,
}

#[derive(Debug, Default, Clone)]
pub struct Journal {
    pub acquired: usize,
    pub released: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub calls: Vec<RecordedCall>,
    /// Statement effects that survived a commit (or ran in autocommit).
    pub committed: Vec<String>,
}

/// What every session of a `RecordingSource` does.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub rows: Vec<DataRow>,
    pub outputs: Vec<(String, SqlValue)>,
    /// Statements each procedure call runs.
    pub statements: usize,
    /// Zero-based statement index that fails, if any.
    pub fail_at_statement: Option<usize>,
    pub fail_commit: bool,
    pub fail_acquire: bool,
    pub missing_procedures: Vec<String>,
}

/// Driver double that records lifecycle events and stages statement effects.
pub struct RecordingSource {
    journal: Arc<Mutex<Journal>>,
    plan: Plan,
}

impl RecordingSource {
    pub fn new(plan: Plan) -> Self {
        Self {
            journal: Arc::new(Mutex::new(Journal::default())),
            plan,
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.lock().unwrap().clone()
    }
}

pub struct RecordingSession {
    journal: Arc<Mutex<Journal>>,
    plan: Plan,
    pending: Vec<String>,
    in_transaction: bool,
}

fn driver_failure() -> DbError {
    DbError::Sqlite(rusqlite::Error::ExecuteReturnedResults)
}

impl ConnectionSource for RecordingSource {
    type Conn = RecordingSession;

    fn acquire(&self) -> DbResult<RecordingSession> {
        if self.plan.fail_acquire {
            return Err(driver_failure());
        }
        self.journal.lock().unwrap().acquired += 1;
        Ok(RecordingSession {
            journal: Arc::clone(&self.journal),
            plan: self.plan.clone(),
            pending: Vec::new(),
            in_transaction: false,
        })
    }

    fn release(&self, _conn: RecordingSession) {
        self.journal.lock().unwrap().released += 1;
    }
}

impl Session for RecordingSession {
    fn begin(&mut self) -> DbResult<()> {
        self.in_transaction = true;
        self.journal.lock().unwrap().begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        if self.plan.fail_commit {
            return Err(driver_failure());
        }
        let mut journal = self.journal.lock().unwrap();
        journal.commits += 1;
        journal.committed.append(&mut self.pending);
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.pending.clear();
        self.in_transaction = false;
        self.journal.lock().unwrap().rollbacks += 1;
        Ok(())
    }

    fn call(&mut self, call: &ProcedureCall<'_>) -> DbResult<ProcedureOutput> {
        self.journal.lock().unwrap().calls.push(RecordedCall {
            name: call.name.to_string(),
            params: call.params.clone(),
            in_transaction: self.in_transaction,
            timeout: call.timeout,
        });

        for index in 0..self.plan.statements {
            if self.plan.fail_at_statement == Some(index) {
                return Err(driver_failure());
            }
            let effect = format!("{}#{index}", call.name);
            if self.in_transaction {
                self.pending.push(effect);
            } else {
                self.journal.lock().unwrap().committed.push(effect);
            }
        }

        Ok(ProcedureOutput {
            rows: self.plan.rows.clone(),
            rows_affected: self.plan.statements,
            outputs: self.plan.outputs.clone(),
        })
    }

    fn procedure_exists(&mut self, name: &str) -> DbResult<bool> {
        Ok(!self.plan.missing_procedures.iter().any(|missing| missing == name))
    }
}

pub fn customer_row(customer_id: i32, name: &str, email: Option<&str>) -> DataRow {
    let columns: Arc<[String]> = ["customer_id", "name", "email"]
        .iter()
        .map(|column| column.to_string())
        .collect();
    DataRow::new(
        columns,
        vec![
            SqlValue::from(customer_id),
            SqlValue::from(name),
            SqlValue::from(email),
        ],
    )
}

const CUSTOMER_SCHEMA_SQL: &str = "
CREATE TABLE customers (
    customer_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT
);
CREATE TABLE audit (
    audit_id INTEGER PRIMARY KEY,
    action TEXT NOT NULL,
    actor TEXT NOT NULL
);";

/// Installs the customer tables, table type and the six procedures.
pub fn install_customer_procedures(pool: &SqlitePool) {
    pool.with_connection(|conn| {
        conn.execute_batch(CUSTOMER_SCHEMA_SQL)?;
        Ok(())
    })
    .unwrap();

    pool.define_table_type(
        "[dbo].[Customer]",
        &[
            crudkit_core::TableColumn {
                name: "customer_id".to_string(),
                sql_type: crudkit_core::SqlType::Int,
            },
            crudkit_core::TableColumn {
                name: "name".to_string(),
                sql_type: crudkit_core::SqlType::Text,
            },
            crudkit_core::TableColumn {
                name: "email".to_string(),
                sql_type: crudkit_core::SqlType::Text,
            },
        ],
    )
    .unwrap();

    let procedures = [
        (
            "usp_GetCustomerList",
            "SELECT customer_id, name, email FROM customers
             WHERE @Name IS NULL OR name = @Name
             ORDER BY customer_id;",
        ),
        (
            "usp_GetCustomer",
            "SELECT customer_id, name, email FROM customers
             WHERE customer_id = @CustomerId OR name = @Name
             ORDER BY customer_id;",
        ),
        (
            "usp_CreateCustomer",
            "INSERT INTO customers (name, email) VALUES (@Name, @Email);
             SELECT last_insert_rowid() AS Id;",
        ),
        (
            "usp_UpdateCustomer",
            "UPDATE customers SET name = @Name, email = @Email WHERE customer_id = @CustomerId;
             INSERT INTO audit (action, actor) VALUES ('update', @Actor);",
        ),
        (
            "usp_UpdateCustomerList",
            "UPDATE customers
             SET name = u.name, email = u.email
             FROM temp.Updates AS u
             WHERE customers.customer_id = u.customer_id;",
        ),
        (
            "usp_DeleteCustomerList",
            "DELETE FROM customers WHERE customer_id IN (SELECT Id FROM temp.Ids);
             INSERT INTO audit (action, actor) VALUES ('delete', @DeletedBy);",
        ),
    ];
    for (name, body) in procedures {
        pool.define_procedure(name, body).unwrap();
    }
}

pub fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    pool.with_connection(|conn| {
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    })
    .unwrap()
}
