//! Compile-time record schemas.
//!
//! # Responsibility
//! - Describe a record type's name, column layout and row values.
//! - Decode result rows back into records.
//!
//! # Invariants
//! - Field order is declaration order and never depends on runtime
//!   introspection.
//! - Scalar records have exactly one column named after the type.

use crate::db::value::{DataRow, SqlField, SqlType, SqlValue};
use crate::db::DbResult;

/// One declared field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    /// Column name; the field name unless renamed in `record!`.
    pub name: &'static str,
    /// Declared type with any `Option` wrapper unwrapped.
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// Column layout of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordShape {
    /// Record with named fields, one column each.
    Fields(&'static [FieldDef]),
    /// Record that is itself a single value.
    Scalar(SqlType),
}

/// Schema description for a record type.
///
/// Usually generated by [`record!`](crate::record); scalar impls exist for
/// the built-in field types.
pub trait Record {
    /// Name used in procedure names and for scalar columns.
    const TYPE_NAME: &'static str;

    fn shape() -> RecordShape;

    /// Values in column order.
    fn to_row(&self) -> Vec<SqlValue>;
}

/// Decodes a record from one result row.
pub trait FromRow: Sized {
    fn from_row(row: &DataRow) -> DbResult<Self>;
}

macro_rules! scalar_record {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Record for $ty {
                const TYPE_NAME: &'static str = $name;

                fn shape() -> RecordShape {
                    RecordShape::Scalar(<$ty as SqlField>::SQL_TYPE)
                }

                fn to_row(&self) -> Vec<SqlValue> {
                    vec![self.to_sql_value()]
                }
            }

            impl FromRow for $ty {
                fn from_row(row: &DataRow) -> DbResult<Self> {
                    row.get_at(0)
                }
            }
        )*
    };
}

scalar_record! {
    i32 => "i32",
    i64 => "i64",
    f64 => "f64",
    bool => "bool",
    String => "String",
    Vec<u8> => "Bytes",
}

/// Declares a struct together with its `Record` and `FromRow` impls.
///
/// Columns are named after the fields, in declaration order. A field can
/// name its column explicitly with `=> "Column"` after its type.
///
/// ```
/// crudkit_core::record! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub struct Customer {
///         pub customer_id: i32 => "CustomerId",
///         pub name: String,
///         pub email: Option<String>,
///     }
/// }
///
/// use crudkit_core::{Record, RecordShape};
/// assert_eq!(Customer::TYPE_NAME, "Customer");
/// let RecordShape::Fields(fields) = Customer::shape() else { unreachable!() };
/// assert_eq!(fields[0].name, "CustomerId");
/// assert_eq!(fields[1].name, "name");
/// ```
#[macro_export]
macro_rules! record {
    (@column $field:ident $column:literal) => {
        $column
    };
    (@column $field:ident) => {
        stringify!($field)
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty $(=> $column:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($(#[$field_meta])* $field_vis $field: $ty),*
        }

        impl $crate::model::record::Record for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn shape() -> $crate::model::record::RecordShape {
                const FIELDS: &[$crate::model::record::FieldDef] = &[
                    $($crate::model::record::FieldDef {
                        name: $crate::record!(@column $field $($column)?),
                        sql_type: <$ty as $crate::db::value::SqlField>::SQL_TYPE,
                        nullable: <$ty as $crate::db::value::SqlField>::NULLABLE,
                    }),*
                ];
                $crate::model::record::RecordShape::Fields(FIELDS)
            }

            fn to_row(&self) -> ::std::vec::Vec<$crate::db::value::SqlValue> {
                vec![$($crate::db::value::SqlField::to_sql_value(&self.$field)),*]
            }
        }

        impl $crate::model::record::FromRow for $name {
            fn from_row(row: &$crate::db::value::DataRow) -> $crate::db::DbResult<Self> {
                Ok(Self {
                    $($field: row.get($crate::record!(@column $field $($column)?))?),*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::{FromRow, Record, RecordShape};
    use crate::db::value::{DataRow, SqlType, SqlValue};
    use std::sync::Arc;

    crate::record! {
        #[derive(Debug, PartialEq)]
        struct Invoice {
            invoice_id: i64,
            amount: f64,
            paid: Option<bool>,
        }
    }

    #[test]
    fn macro_declares_fields_in_order() {
        let RecordShape::Fields(fields) = Invoice::shape() else {
            panic!("expected field shape");
        };
        let names: Vec<&str> = fields.iter().map(|field| field.name).collect();
        assert_eq!(names, vec!["invoice_id", "amount", "paid"]);
        assert_eq!(fields[2].sql_type, SqlType::Bit);
        assert!(fields[2].nullable);
    }

    #[test]
    fn macro_round_trips_through_a_row() {
        let invoice = Invoice {
            invoice_id: 4,
            amount: 12.5,
            paid: None,
        };
        let columns: Arc<[String]> = ["invoice_id", "amount", "paid"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        let row = DataRow::new(columns, invoice.to_row());
        assert_eq!(Invoice::from_row(&row).unwrap(), invoice);
    }

    crate::record! {
        #[derive(Debug, PartialEq)]
        struct LegacyOrder {
            order_id: i32 => "OrderID",
            placed_by: String => "PlacedBy",
            note: Option<String>,
        }
    }

    #[test]
    fn renamed_columns_drive_shape_and_decoding() {
        let RecordShape::Fields(fields) = LegacyOrder::shape() else {
            panic!("expected field shape");
        };
        let names: Vec<&str> = fields.iter().map(|field| field.name).collect();
        assert_eq!(names, vec!["OrderID", "PlacedBy", "note"]);

        let columns: Arc<[String]> = ["OrderID", "PlacedBy", "Note"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        let row = DataRow::new(
            columns,
            vec![SqlValue::Int(12), "ops".into(), SqlValue::Null],
        );
        assert_eq!(
            LegacyOrder::from_row(&row).unwrap(),
            LegacyOrder {
                order_id: 12,
                placed_by: "ops".to_string(),
                note: None,
            }
        );
    }

    #[test]
    fn scalars_use_their_own_type_name() {
        assert_eq!(<i32 as Record>::TYPE_NAME, "i32");
        assert_eq!(<i32 as Record>::shape(), RecordShape::Scalar(SqlType::Int));
        assert_eq!(7_i32.to_row(), vec![SqlValue::Int(7)]);
    }
}
