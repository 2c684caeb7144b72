//! The compilation environment.
//!
//! Everything identifier resolution can see is supplied here by the caller:
//! opcode identifiers, named scripts, declared variables, and the compiler
//! operations that turn variable references into bytecode. Operation tables
//! are boxed functions so callers can plug in wallets, signers, or fixtures.

use indexmap::IndexMap;
use num_bigint::BigInt;

use bitauth_vm::{encode_bigint, opcodes};

/// A compiler operation: `(identifier, data, environment)` to bytecode or a
/// recoverable error message.
pub type CompilerOperation = Box<
    dyn Fn(&str, &CompilationData, &CompilationEnvironment) -> Result<Vec<u8>, String>
        + Send
        + Sync,
>;

/// An operation table for one variable type or built-in variable.
pub enum OperationsTable {
    /// A single operation, called with the full identifier.
    Direct(CompilerOperation),
    /// Operations dispatched on the identifier's dotted operation segment.
    ById(IndexMap<String, CompilerOperation>),
}

/// Operation tables, one slot per variable type and built-in variable.
#[derive(Default)]
pub struct CompilerOperations {
    pub key: Option<OperationsTable>,
    pub hd_key: Option<OperationsTable>,
    pub address_data: Option<OperationsTable>,
    pub wallet_data: Option<OperationsTable>,
    pub current_block_height: Option<OperationsTable>,
    pub current_block_time: Option<OperationsTable>,
    pub signing_serialization: Option<OperationsTable>,
}

/// The declared type of a template variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Key,
    HdKey,
    AddressData,
    WalletData,
}

impl VariableType {
    pub fn name(self) -> &'static str {
        match self {
            VariableType::Key => "Key",
            VariableType::HdKey => "HdKey",
            VariableType::AddressData => "AddressData",
            VariableType::WalletData => "WalletData",
        }
    }
}

/// A declared template variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub variable_type: VariableType,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Variable {
    pub fn new(variable_type: VariableType) -> Self {
        Self {
            variable_type,
            name: None,
            description: None,
        }
    }
}

/// Identifiers of the built-in variables (not declared in `variables`).
pub const BUILTIN_VARIABLES: [&str; 3] = [
    "current_block_height",
    "current_block_time",
    "signing_serialization",
];

/// The tables identifier resolution consults, in resolution order: opcodes,
/// variables (via operations), then scripts.
#[derive(Default)]
pub struct CompilationEnvironment {
    pub opcodes: IndexMap<String, u8>,
    pub variables: IndexMap<String, Variable>,
    pub scripts: IndexMap<String, String>,
    pub operations: CompilerOperations,
}

impl CompilationEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with the full BCH opcode identifier set and the
    /// standard operations for built-ins and data variables.
    pub fn standard_bch() -> Self {
        let mut opcode_table: IndexMap<String, u8> = opcodes::identifiers()
            .map(|(name, byte)| (name.to_string(), byte))
            .collect();
        opcode_table.insert("OP_FALSE".to_string(), opcodes::OP_0);
        opcode_table.insert("OP_TRUE".to_string(), opcodes::OP_1);
        Self {
            opcodes: opcode_table,
            variables: IndexMap::new(),
            scripts: IndexMap::new(),
            operations: standard_operations(),
        }
    }

    pub fn with_script(mut self, id: impl Into<String>, source: impl Into<String>) -> Self {
        self.scripts.insert(id.into(), source.into());
        self
    }

    pub fn with_variable(mut self, id: impl Into<String>, variable: Variable) -> Self {
        self.variables.insert(id.into(), variable);
        self
    }
}

/// Per-compilation values consumed by compiler operations.
#[derive(Debug, Clone, Default)]
pub struct CompilationData {
    pub current_block_height: Option<u64>,
    pub current_block_time: Option<u64>,
    /// Public keys by `Key` variable identifier.
    pub public_keys: IndexMap<String, Vec<u8>>,
    /// Raw bytecode by `AddressData` variable identifier.
    pub address_data: IndexMap<String, Vec<u8>>,
    /// Raw bytecode by `WalletData` variable identifier.
    pub wallet_data: IndexMap<String, Vec<u8>>,
    /// Signing-serialization components by operation identifier.
    pub signing_serializations: IndexMap<String, Vec<u8>>,
}

impl CompilationData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_height(mut self, height: u64) -> Self {
        self.current_block_height = Some(height);
        self
    }

    pub fn with_block_time(mut self, time: u64) -> Self {
        self.current_block_time = Some(time);
        self
    }

    pub fn with_address_data(mut self, id: impl Into<String>, bytecode: Vec<u8>) -> Self {
        self.address_data.insert(id.into(), bytecode);
        self
    }

    pub fn with_wallet_data(mut self, id: impl Into<String>, bytecode: Vec<u8>) -> Self {
        self.wallet_data.insert(id.into(), bytecode);
        self
    }

    pub fn with_public_key(mut self, id: impl Into<String>, public_key: Vec<u8>) -> Self {
        self.public_keys.insert(id.into(), public_key);
        self
    }
}

/// The standard operation tables.
///
/// Signature generation is deliberately absent: producing `key.signature.*`
/// requires a transaction signer, so signing-capable callers register their
/// own `Key` table over this one.
pub fn standard_operations() -> CompilerOperations {
    let mut key_operations: IndexMap<String, CompilerOperation> = IndexMap::new();
    key_operations.insert(
        "public_key".to_string(),
        Box::new(|identifier, data, _env| {
            let variable_id = identifier.split('.').next().unwrap_or(identifier);
            data.public_keys.get(variable_id).cloned().ok_or_else(|| {
                format!("No public key was provided for the Key variable \"{variable_id}\".")
            })
        }),
    );

    CompilerOperations {
        key: Some(OperationsTable::ById(key_operations)),
        hd_key: None,
        address_data: Some(OperationsTable::Direct(Box::new(
            |identifier, data, _env| {
                data.address_data.get(identifier).cloned().ok_or_else(|| {
                    format!("No bytecode was provided for the AddressData variable \"{identifier}\".")
                })
            },
        ))),
        wallet_data: Some(OperationsTable::Direct(Box::new(
            |identifier, data, _env| {
                data.wallet_data.get(identifier).cloned().ok_or_else(|| {
                    format!("No bytecode was provided for the WalletData variable \"{identifier}\".")
                })
            },
        ))),
        current_block_height: Some(OperationsTable::Direct(Box::new(
            |_identifier, data, _env| {
                data.current_block_height
                    .map(|height| encode_bigint(&BigInt::from(height)))
                    .ok_or_else(|| {
                        "No current block height was provided to this compilation.".to_string()
                    })
            },
        ))),
        current_block_time: Some(OperationsTable::Direct(Box::new(
            |_identifier, data, _env| {
                data.current_block_time
                    .map(|time| encode_bigint(&BigInt::from(time)))
                    .ok_or_else(|| {
                        "No current block time was provided to this compilation.".to_string()
                    })
            },
        ))),
        signing_serialization: Some(OperationsTable::Direct(Box::new(
            |identifier, data, _env| {
                let component = identifier.split_once('.').map(|(_, rest)| rest).ok_or_else(
                    || {
                        "The \"signing_serialization\" variable requires a component identifier, \
                         e.g. 'signing_serialization.full_all_outputs'."
                            .to_string()
                    },
                )?;
                data.signing_serializations
                    .get(component)
                    .cloned()
                    .ok_or_else(|| {
                        format!(
                            "No signing-serialization component \"{component}\" was provided to \
                             this compilation."
                        )
                    })
            },
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_environment_opcodes() {
        let environment = CompilationEnvironment::standard_bch();
        assert_eq!(environment.opcodes.get("OP_DUP"), Some(&0x76));
        assert_eq!(environment.opcodes.get("OP_FALSE"), Some(&0x00));
        assert_eq!(environment.opcodes.get("OP_TRUE"), Some(&0x51));
        assert!(environment.opcodes.get("OP_MADE_UP").is_none());
    }

    #[test]
    fn test_block_height_operation() {
        let environment = CompilationEnvironment::standard_bch();
        let data = CompilationData::new().with_block_height(600_000);
        let Some(OperationsTable::Direct(operation)) =
            &environment.operations.current_block_height
        else {
            panic!("expected direct operation");
        };
        let bytecode = operation("current_block_height", &data, &environment).unwrap();
        assert_eq!(bytecode, vec![0xc0, 0x27, 0x09]);

        let missing = operation("current_block_height", &CompilationData::new(), &environment);
        assert!(missing.is_err());
    }

    #[test]
    fn test_signing_serialization_requires_component() {
        let environment = CompilationEnvironment::standard_bch();
        let mut data = CompilationData::new();
        data.signing_serializations
            .insert("full_all_outputs".to_string(), vec![0x01, 0x02]);
        let Some(OperationsTable::Direct(operation)) =
            &environment.operations.signing_serialization
        else {
            panic!("expected direct operation");
        };
        assert_eq!(
            operation(
                "signing_serialization.full_all_outputs",
                &data,
                &environment
            ),
            Ok(vec![0x01, 0x02])
        );
        assert!(operation("signing_serialization", &data, &environment).is_err());
    }
}
