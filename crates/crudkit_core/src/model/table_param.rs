//! Table-valued parameter builder.
//!
//! # Responsibility
//! - Turn an ordered slice of records into one tabular procedure parameter.
//!
//! # Invariants
//! - Columns are derived once from the record type, never per instance.
//! - Every row has exactly one value per column.
//! - Nullable fields are declared with their underlying type.

use crate::db::value::{SqlType, SqlValue};
use crate::db::{DbError, DbResult};
use crate::model::record::{Record, RecordShape};

/// Table type used for lists of integer identifiers.
pub const INT_LIST_TABLE_TYPE: &str = "[dbo].[IntList]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub sql_type: SqlType,
}

/// Named tabular structure bound as a single procedure parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TableParam {
    type_name: String,
    columns: Vec<TableColumn>,
    rows: Vec<Vec<SqlValue>>,
}

impl TableParam {
    /// Creates an empty table with explicit columns.
    pub fn new(type_name: impl Into<String>, columns: Vec<TableColumn>) -> Self {
        Self {
            type_name: type_name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates an empty table whose columns follow `T`'s schema.
    pub fn for_record<T: Record>(type_name: impl Into<String>) -> Self {
        let columns = match T::shape() {
            RecordShape::Fields(fields) => fields
                .iter()
                .map(|field| TableColumn {
                    name: field.name.to_string(),
                    sql_type: field.sql_type,
                })
                .collect(),
            RecordShape::Scalar(sql_type) => vec![TableColumn {
                name: T::TYPE_NAME.to_string(),
                sql_type,
            }],
        };
        Self::new(type_name, columns)
    }

    /// Builds a populated table from records, in input order.
    pub fn from_records<T: Record>(records: &[T], type_name: impl Into<String>) -> DbResult<Self> {
        let mut table = Self::for_record::<T>(type_name);
        table.rows.reserve(records.len());
        for record in records {
            table.push_row(record.to_row())?;
        }
        Ok(table)
    }

    /// Appends one row; its arity must match the column count.
    pub fn push_row(&mut self, row: Vec<SqlValue>) -> DbResult<()> {
        if row.len() != self.columns.len() {
            return Err(DbError::TableArity {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<SqlValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Converts a slice of records into a [`TableParam`].
pub trait ToTableParam {
    fn to_table_param(&self, type_name: &str) -> DbResult<TableParam>;
}

impl<T: Record> ToTableParam for [T] {
    fn to_table_param(&self, type_name: &str) -> DbResult<TableParam> {
        TableParam::from_records(self, type_name)
    }
}
