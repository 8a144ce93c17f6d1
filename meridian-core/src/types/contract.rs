//! Deployed contract records

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A deployed contract. Write-once: redeploying an existing name is
/// rejected by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// Contract name, `[A-Za-z0-9_]+`.
    pub name: String,
    /// Account that deployed the contract.
    pub owner: String,
    /// The wrapped template source; this is what runs on every call.
    pub code: String,
    /// Fully-qualified `<contract>_<table>` names created at deploy time.
    pub tables: BTreeSet<String>,
}

impl Contract {
    /// Whether this contract owns the fully-qualified table.
    pub fn owns_table(&self, qualified: &str) -> bool {
        self.tables.contains(qualified)
    }

    /// Fully-qualified name of one of this contract's tables.
    pub fn qualified_table(&self, table: &str) -> String {
        format!("{}_{}", self.name, table)
    }
}

/// Contract names: letters, digits and underscore, non-empty.
pub fn is_valid_contract_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table names: letters and underscore only, non-empty.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_name_validation() {
        assert!(is_valid_contract_name("tok"));
        assert!(is_valid_contract_name("tok_v2"));
        assert!(is_valid_contract_name("Tok2"));
        assert!(!is_valid_contract_name(""));
        assert!(!is_valid_contract_name("tok-v2"));
        assert!(!is_valid_contract_name("tok v2"));
    }

    #[test]
    fn table_name_rejects_digits() {
        assert!(is_valid_table_name("balances"));
        assert!(is_valid_table_name("_internal"));
        assert!(!is_valid_table_name("balances2"));
        assert!(!is_valid_table_name(""));
    }

    #[test]
    fn table_ownership() {
        let mut tables = BTreeSet::new();
        tables.insert("tok_balances".to_string());
        let contract = Contract {
            name: "tok".to_string(),
            owner: "alice".to_string(),
            code: String::new(),
            tables,
        };
        assert!(contract.owns_table("tok_balances"));
        assert!(!contract.owns_table("tok_supply"));
        assert_eq!(contract.qualified_table("supply"), "tok_supply");
    }
}
