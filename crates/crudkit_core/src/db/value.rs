//! Typed values exchanged with the driver.
//!
//! # Responsibility
//! - Model the scalar values a procedure accepts and returns.
//! - Map Rust field types to their declared SQL type (`SqlField`).
//! - Hold fully owned result rows so sessions never leak driver lifetimes.
//!
//! # Invariants
//! - `Option<X>` declares the SQL type of `X`; nullability is tracked
//!   separately and never changes the declared type.
//! - Column lookups on `DataRow` are case-insensitive.

use crate::db::{DbError, DbResult};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Declared column/parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Int,
    BigInt,
    Float,
    Text,
    Bit,
    Binary,
}

impl SqlType {
    /// Column declaration used when materializing a table in SQLite.
    pub fn sqlite_decl(self) -> &'static str {
        match self {
            Self::Int | Self::BigInt | Self::Bit => "INTEGER",
            Self::Float => "REAL",
            Self::Text => "TEXT",
            Self::Binary => "BLOB",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::BigInt => "bigint",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bit => "bit",
            Self::Binary => "binary",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "int" => Some(Self::Int),
            "bigint" => Some(Self::BigInt),
            "float" => Some(Self::Float),
            "text" => Some(Self::Text),
            "bit" => Some(Self::Bit),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// A single scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bit(bool),
    Binary(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bit(_) => "bit",
            Self::Binary(_) => "binary",
        }
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(v) => Self::Int(v),
            ValueRef::Real(v) => Self::Float(v),
            ValueRef::Text(v) => Self::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => Self::Binary(v.to_vec()),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Int(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Self::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Self::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Self::Bit(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            Self::Binary(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v.as_slice())),
        })
    }
}

macro_rules! impl_from_for_sql_value {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

impl_from_for_sql_value! {
    i32 => |v| SqlValue::Int(i64::from(v)),
    i64 => |v| SqlValue::Int(v),
    f64 => |v| SqlValue::Float(v),
    bool => |v| SqlValue::Bit(v),
    String => |v| SqlValue::Text(v),
    &str => |v| SqlValue::Text(v.to_string()),
    Vec<u8> => |v| SqlValue::Binary(v),
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Rust types usable as record fields.
pub trait SqlField: Sized {
    /// Declared SQL type, with any nullable wrapper unwrapped.
    const SQL_TYPE: SqlType;
    const NULLABLE: bool = false;

    fn to_sql_value(&self) -> SqlValue;
    fn from_sql_value(value: SqlValue) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &SqlValue) -> String {
    format!("expected {expected}, found {}", value.kind())
}

impl SqlField for i64 {
    const SQL_TYPE: SqlType = SqlType::BigInt;

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Int(*self)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Int(v) => Ok(v),
            SqlValue::Bit(v) => Ok(i64::from(v)),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl SqlField for i32 {
    const SQL_TYPE: SqlType = SqlType::Int;

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Int(i64::from(*self))
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        i32::try_from(wide).map_err(|_| format!("integer {wide} out of range for i32"))
    }
}

impl SqlField for f64 {
    const SQL_TYPE: SqlType = SqlType::Float;

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Float(*self)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Float(v) => Ok(v),
            // SQLite hands back integral REAL values as integers.
            SqlValue::Int(v) => Ok(v as f64),
            other => Err(mismatch("float", &other)),
        }
    }
}

impl SqlField for bool {
    const SQL_TYPE: SqlType = SqlType::Bit;

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Bit(*self)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Bit(v) => Ok(v),
            SqlValue::Int(0) => Ok(false),
            SqlValue::Int(1) => Ok(true),
            SqlValue::Int(other) => Err(format!("integer {other} is not a bit value")),
            other => Err(mismatch("bit", &other)),
        }
    }
}

impl SqlField for String {
    const SQL_TYPE: SqlType = SqlType::Text;

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Text(v) => Ok(v),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl SqlField for Vec<u8> {
    const SQL_TYPE: SqlType = SqlType::Binary;

    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Binary(self.clone())
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Binary(v) => Ok(v),
            other => Err(mismatch("binary", &other)),
        }
    }
}

impl<T: SqlField> SqlField for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;

    fn to_sql_value(&self) -> SqlValue {
        self.as_ref().map_or(SqlValue::Null, SqlField::to_sql_value)
    }

    fn from_sql_value(value: SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// One fully owned result row.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl DataRow {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the raw value of a column, matched case-insensitively.
    pub fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
            .and_then(|index| self.values.get(index))
    }

    /// Decodes a named column into a field type.
    pub fn get<V: SqlField>(&self, column: &str) -> DbResult<V> {
        let value = self.value(column).ok_or_else(|| DbError::Mapping {
            column: column.to_string(),
            message: "column not present in result set".to_string(),
        })?;
        V::from_sql_value(value.clone()).map_err(|message| DbError::Mapping {
            column: column.to_string(),
            message,
        })
    }

    /// Decodes a column by position.
    pub fn get_at<V: SqlField>(&self, index: usize) -> DbResult<V> {
        let column = self
            .columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{index}"));
        let value = self.values.get(index).ok_or_else(|| DbError::Mapping {
            column: column.clone(),
            message: "column index out of range".to_string(),
        })?;
        V::from_sql_value(value.clone()).map_err(|message| DbError::Mapping { column, message })
    }
}
