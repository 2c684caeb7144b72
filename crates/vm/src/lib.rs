//! Bitcoin Cash script virtual machine.
//!
//! The crate is organized around a plain stack machine ([`vm::BchVm`]) whose
//! per-opcode behavior is tuned by an [`bch::InstructionSetFlags`] bundle,
//! plus the consensus orchestration ([`bch`]) that validates full
//! unlocking/locking programs including P2SH and the SegWit-recovery
//! exemption. Hashing and curve operations are collaborators behind
//! [`crypto::VmCrypto`]; the machine itself never hashes.

pub mod bch;
pub mod crypto;
pub mod error;
pub mod instruction;
pub mod number;
pub mod opcodes;
mod ops;
pub mod state;
pub mod vm;

pub use bch::{AuthenticationProgram, InstructionSetBch, InstructionSetFlags};
pub use crypto::{StandardCrypto, VmCrypto};
pub use error::VmError;
pub use instruction::{
    disassemble_bytecode, disassemble_instructions, encode_data_push, instructions_are_malformed,
    parse_bytecode, serialize_instructions, Instruction,
};
pub use number::{decode_script_number, encode_bigint, encode_script_number};
pub use state::{
    stack_item_is_truthy, ProgramState, SigningSerializer, TransactionContext,
    MAX_BYTECODE_LENGTH, MAX_OPERATIONS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_DEPTH,
};
pub use vm::BchVm;
