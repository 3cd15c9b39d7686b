//! Record schemas and the tabular parameter built from them.
//!
//! # Responsibility
//! - Describe caller record types explicitly, without runtime reflection.
//! - Convert record lists into table-valued parameters for bulk calls.

pub mod record;
pub mod table_param;
