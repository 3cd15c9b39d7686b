//! Setup-time mapping from CRUD operation to stored-procedure name.
//!
//! # Invariants
//! - Every operation has exactly one procedure name.
//! - Names are validated when the map is built, never at call time.

use crate::db::catalog::validate_procedure_name;
use crate::db::DbResult;
use crate::model::record::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetList,
    GetSingle,
    Create,
    Update,
    UpdateList,
    DeleteList,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::GetList,
        Operation::GetSingle,
        Operation::Create,
        Operation::Update,
        Operation::UpdateList,
        Operation::DeleteList,
    ];

    /// `usp_<Verb><TypeName>[List]`.
    pub fn conventional_name(self, type_name: &str) -> String {
        match self {
            Self::GetList => format!("usp_Get{type_name}List"),
            Self::GetSingle => format!("usp_Get{type_name}"),
            Self::Create => format!("usp_Create{type_name}"),
            Self::Update => format!("usp_Update{type_name}"),
            Self::UpdateList => format!("usp_Update{type_name}List"),
            Self::DeleteList => format!("usp_Delete{type_name}List"),
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(self, Self::GetList | Self::GetSingle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetList => "get_list",
            Self::GetSingle => "get_single",
            Self::Create => "insert",
            Self::Update => "update",
            Self::UpdateList => "update_list",
            Self::DeleteList => "delete_list",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureMap {
    type_name: String,
    names: [String; 6],
}

impl ProcedureMap {
    /// Builds the naming-convention map for `type_name`.
    pub fn conventional(type_name: &str) -> DbResult<Self> {
        let names = Operation::ALL.map(|op| op.conventional_name(type_name));
        for name in &names {
            validate_procedure_name(name)?;
        }
        Ok(Self {
            type_name: type_name.to_string(),
            names,
        })
    }

    pub fn for_record<T: Record>() -> DbResult<Self> {
        Self::conventional(T::TYPE_NAME)
    }

    /// Replaces the procedure used for one operation.
    pub fn with_override(mut self, op: Operation, name: impl Into<String>) -> DbResult<Self> {
        let name = name.into();
        validate_procedure_name(&name)?;
        self.names[op.index()] = name;
        Ok(self)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self, op: Operation) -> &str {
        &self.names[op.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, &str)> {
        Operation::ALL
            .into_iter()
            .map(move |op| (op, self.name(op)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Operation, ProcedureMap};
    use crate::db::DbError;

    #[test]
    fn conventional_names_follow_the_contract() {
        let map = ProcedureMap::conventional("Customer").unwrap();
        assert_eq!(map.name(Operation::GetList), "usp_GetCustomerList");
        assert_eq!(map.name(Operation::GetSingle), "usp_GetCustomer");
        assert_eq!(map.name(Operation::Create), "usp_CreateCustomer");
        assert_eq!(map.name(Operation::Update), "usp_UpdateCustomer");
        assert_eq!(map.name(Operation::UpdateList), "usp_UpdateCustomerList");
        assert_eq!(map.name(Operation::DeleteList), "usp_DeleteCustomerList");
    }

    #[test]
    fn overrides_replace_one_entry_and_are_validated() {
        let map = ProcedureMap::conventional("Customer")
            .unwrap()
            .with_override(Operation::DeleteList, "usp_PurgeCustomers")
            .unwrap();
        assert_eq!(map.name(Operation::DeleteList), "usp_PurgeCustomers");
        assert_eq!(map.name(Operation::GetList), "usp_GetCustomerList");

        let err = map
            .with_override(Operation::Update, "usp_Update Customer")
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidName { kind: "procedure", .. }));
    }

    #[test]
    fn invalid_type_names_fail_at_setup() {
        assert!(ProcedureMap::conventional("Customer;--").is_err());
    }

    #[test]
    fn only_reads_run_outside_transactions() {
        let writes: Vec<Operation> = Operation::ALL
            .into_iter()
            .filter(|op| op.is_write())
            .collect();
        assert_eq!(
            writes,
            vec![
                Operation::Create,
                Operation::Update,
                Operation::UpdateList,
                Operation::DeleteList
            ]
        );
    }
}
