//! Named parameter sets for procedure calls.
//!
//! # Invariants
//! - Every stored name carries exactly one leading `@`.
//! - Names compare case-insensitively, like SQL Server parameter names.
//! - Insertion order is preserved; re-adding a name replaces its value in place.

use crate::db::value::{SqlType, SqlValue};
use crate::model::table_param::TableParam;

/// Value bound to one named parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(SqlValue),
    Table(TableParam),
    /// Output slot filled by the procedure; read back with
    /// `ProcedureOutput::output`.
    Output(SqlType),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, ParamValue)>,
}

/// Normalizes a caller key to its `@`-prefixed parameter name.
pub fn parameter_name(key: &str) -> String {
    format!("@{}", key.trim_start_matches('@'))
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from caller key/value pairs, prefixing each key with `@`.
    pub fn from_pairs(pairs: &[(&str, SqlValue)]) -> Self {
        let mut set = Self::new();
        for (key, value) in pairs {
            set.add(key, value.clone());
        }
        set
    }

    pub fn add(&mut self, key: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.insert(key, ParamValue::Scalar(value.into()))
    }

    pub fn add_table(&mut self, key: &str, table: TableParam) -> &mut Self {
        self.insert(key, ParamValue::Table(table))
    }

    pub fn add_output(&mut self, key: &str, sql_type: SqlType) -> &mut Self {
        self.insert(key, ParamValue::Output(sql_type))
    }

    fn insert(&mut self, key: &str, value: ParamValue) -> &mut Self {
        let name = parameter_name(key);
        let existing = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name));
        match existing {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        let name = parameter_name(key);
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a `Vec<(&str, SqlValue)>` of named procedure parameters.
///
/// ```
/// use crudkit_core::sp_params;
///
/// let params = sp_params!["CustomerId" => 7, "Name" => "Ada"];
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! sp_params {
    () => {
        ::std::vec::Vec::<(&str, $crate::SqlValue)>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        vec![$(($key, $crate::SqlValue::from($value))),+]
    };
}
