//! Procedure and table-type catalog for the SQLite backend.
//!
//! # Responsibility
//! - Store procedure bodies by name so SQLite can expose `usp_*` procedures.
//! - Store table types (ordered columns) that table-valued parameters bind to.
//! - Validate and normalize procedure and table type names.
//!
//! # Invariants
//! - Procedure and table type names are compared case-insensitively.
//! - Table type names are stored as `schema.name` without brackets.
//! - Table type columns keep their declared ordinal order.

use crate::db::value::SqlType;
use crate::db::{DbError, DbResult};
use crate::model::table_param::TableColumn;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};

const DEFAULT_SCHEMA: &str = "dbo";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));
static TABLE_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\[?([A-Za-z_][A-Za-z0-9_]*)\]?\.)?\[?([A-Za-z_][A-Za-z0-9_]*)\]?$")
        .expect("valid table type regex")
});

/// Checks that `name` is a plain identifier usable as a procedure name.
pub fn validate_procedure_name(name: &str) -> DbResult<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidName {
            kind: "procedure",
            name: name.to_string(),
        })
    }
}

/// Normalizes `[dbo].[IntList]`, `dbo.IntList` and `IntList` to `dbo.IntList`.
pub fn normalize_table_type_name(name: &str) -> DbResult<String> {
    let captures = TABLE_TYPE_RE
        .captures(name.trim())
        .ok_or_else(|| DbError::InvalidName {
            kind: "table type",
            name: name.to_string(),
        })?;
    let schema = captures.get(1).map_or(DEFAULT_SCHEMA, |m| m.as_str());
    let type_name = captures.get(2).map_or("", |m| m.as_str());
    Ok(format!("{schema}.{type_name}"))
}

/// Creates or replaces a procedure body.
pub fn create_procedure(conn: &Connection, name: &str, body: &str) -> DbResult<()> {
    validate_procedure_name(name)?;
    conn.execute(
        "INSERT INTO crud_procedures (name, body) VALUES (?1, ?2)
         ON CONFLICT (name) DO UPDATE SET body = excluded.body;",
        params![name, body],
    )?;
    info!("event=procedure_define module=catalog status=ok proc={name}");
    Ok(())
}

/// Removes a procedure; returns whether it existed.
pub fn drop_procedure(conn: &Connection, name: &str) -> DbResult<bool> {
    let changed = conn.execute("DELETE FROM crud_procedures WHERE name = ?1;", [name])?;
    Ok(changed > 0)
}

pub fn procedure_body(conn: &Connection, name: &str) -> DbResult<Option<String>> {
    let body = conn
        .query_row(
            "SELECT body FROM crud_procedures WHERE name = ?1;",
            [name],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(body)
}

/// Creates or replaces a table type with ordered columns.
pub fn create_table_type(conn: &Connection, name: &str, columns: &[TableColumn]) -> DbResult<()> {
    let type_name = normalize_table_type_name(name)?;
    for column in columns {
        if !IDENTIFIER_RE.is_match(&column.name) {
            return Err(DbError::InvalidName {
                kind: "column",
                name: column.name.clone(),
            });
        }
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM crud_table_types WHERE name = ?1;",
        [type_name.as_str()],
    )?;
    tx.execute(
        "INSERT INTO crud_table_types (name) VALUES (?1);",
        [type_name.as_str()],
    )?;
    for (ordinal, column) in columns.iter().enumerate() {
        tx.execute(
            "INSERT INTO crud_table_type_columns (type_name, ordinal, name, sql_type)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                type_name,
                ordinal as i64,
                column.name,
                column.sql_type.as_str()
            ],
        )?;
    }
    tx.commit()?;

    info!(
        "event=table_type_define module=catalog status=ok type={} columns={}",
        type_name,
        columns.len()
    );
    Ok(())
}

/// Returns a table type's columns in ordinal order, or `None` if undefined.
pub fn table_type_columns(conn: &Connection, name: &str) -> DbResult<Option<Vec<TableColumn>>> {
    let type_name = normalize_table_type_name(name)?;
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM crud_table_types WHERE name = ?1);",
        [type_name.as_str()],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    let mut stmt = conn.prepare(
        "SELECT name, sql_type FROM crud_table_type_columns
         WHERE type_name = ?1
         ORDER BY ordinal ASC;",
    )?;
    let mut rows = stmt.query([type_name.as_str()])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let sql_type_text: String = row.get(1)?;
        let sql_type = SqlType::parse(&sql_type_text).ok_or_else(|| DbError::Mapping {
            column: format!("{type_name}.{name}"),
            message: format!("unknown sql type `{sql_type_text}` in table type catalog"),
        })?;
        columns.push(TableColumn { name, sql_type });
    }
    Ok(Some(columns))
}

#[cfg(test)]
mod tests {
    use super::{normalize_table_type_name, validate_procedure_name};

    #[test]
    fn table_type_names_normalize_to_schema_qualified_form() {
        assert_eq!(
            normalize_table_type_name("[dbo].[IntList]").unwrap(),
            "dbo.IntList"
        );
        assert_eq!(normalize_table_type_name("IntList").unwrap(), "dbo.IntList");
        assert_eq!(
            normalize_table_type_name("sales.Customer").unwrap(),
            "sales.Customer"
        );
        assert!(normalize_table_type_name("dbo.Int List").is_err());
        assert!(normalize_table_type_name("").is_err());
    }

    #[test]
    fn procedure_names_must_be_identifiers() {
        assert!(validate_procedure_name("usp_GetCustomerList").is_ok());
        assert!(validate_procedure_name("usp_Get Customer").is_err());
        assert!(validate_procedure_name("usp;DROP").is_err());
        assert!(validate_procedure_name("").is_err());
    }
}
