//! Program state for the stack machine.

use std::fmt;
use std::sync::Arc;

use crate::error::VmError;
use crate::instruction::Instruction;
use crate::number::{decode_script_number, MAX_SCRIPT_NUMBER_LENGTH};

/// Maximum bytecode length for a single script.
pub const MAX_BYTECODE_LENGTH: usize = 10_000;

/// Maximum combined depth of the stack and alternate stack.
pub const MAX_STACK_DEPTH: usize = 1_000;

/// Maximum length of a single stack item.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum number of counted (non-push) operations per script.
pub const MAX_OPERATIONS_PER_SCRIPT: usize = 201;

/// Maximum number of public keys per multisig check.
pub const MAX_MULTISIG_PUBLIC_KEYS: usize = 20;

/// Provider of signing-serialization preimages.
///
/// The VM never constructs transactions; the preimage covering
/// `covered_bytecode` under `sighash_type` is the caller's responsibility.
pub trait SigningSerializer: Send + Sync {
    fn signing_serialization(&self, covered_bytecode: &[u8], sighash_type: u8) -> Vec<u8>;
}

/// A serializer for contexts where no signature checks will run.
pub struct NullSigningSerializer;

impl SigningSerializer for NullSigningSerializer {
    fn signing_serialization(&self, _covered_bytecode: &[u8], _sighash_type: u8) -> Vec<u8> {
        Vec::new()
    }
}

/// Transaction-level context read (never written) by the VM.
#[derive(Clone)]
pub struct TransactionContext {
    pub version: u32,
    pub locktime: u32,
    pub sequence_number: u32,
    pub input_index: u32,
    pub output_value: u64,
    pub signer: Arc<dyn SigningSerializer>,
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self {
            version: 2,
            locktime: 0,
            sequence_number: 0,
            input_index: 0,
            output_value: 0,
            signer: Arc::new(NullSigningSerializer),
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TransactionContext")
            .field("version", &self.version)
            .field("locktime", &self.locktime)
            .field("sequence_number", &self.sequence_number)
            .field("input_index", &self.input_index)
            .field("output_value", &self.output_value)
            .finish_non_exhaustive()
    }
}

/// Complete evaluation state of one script run.
///
/// A fresh state is created per evaluation; nothing is shared between runs
/// except the read-only [`TransactionContext`].
#[derive(Debug, Clone)]
pub struct ProgramState {
    pub instructions: Vec<Instruction>,
    pub ip: usize,
    pub stack: Vec<Vec<u8>>,
    pub alternate_stack: Vec<Vec<u8>>,
    pub execution_stack: Vec<bool>,
    pub last_code_separator: Option<usize>,
    pub operation_count: usize,
    pub error: Option<VmError>,
    pub context: TransactionContext,
}

impl ProgramState {
    pub fn new(
        instructions: Vec<Instruction>,
        stack: Vec<Vec<u8>>,
        context: TransactionContext,
    ) -> Self {
        Self {
            instructions,
            ip: 0,
            stack,
            alternate_stack: Vec::new(),
            execution_stack: Vec::new(),
            last_code_separator: None,
            operation_count: 0,
            error: None,
            context,
        }
    }

    /// A state that failed before evaluation began.
    pub fn failed(
        instructions: Vec<Instruction>,
        context: TransactionContext,
        error: VmError,
    ) -> Self {
        let mut state = Self::new(instructions, Vec::new(), context);
        state.error = Some(error);
        state
    }

    /// Whether the current position is inside an all-true conditional path.
    pub fn executing(&self) -> bool {
        self.execution_stack.iter().all(|branch| *branch)
    }

    /// Record `error` unless a previous failure is already recorded.
    pub fn fail(&mut self, error: VmError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn pop(&mut self) -> Result<Vec<u8>, VmError> {
        self.stack.pop().ok_or(VmError::EmptyStack)
    }

    pub fn pop_alternate(&mut self) -> Result<Vec<u8>, VmError> {
        self.alternate_stack.pop().ok_or(VmError::EmptyAlternateStack)
    }

    /// Pop and decode a script number (4-byte limit).
    pub fn pop_number(&mut self, require_minimal: bool) -> Result<i64, VmError> {
        let item = self.pop()?;
        decode_script_number(&item, require_minimal, MAX_SCRIPT_NUMBER_LENGTH)
    }

    /// Item `depth` entries down from the top of the stack (`0` is the top).
    pub fn peek(&self, depth: usize) -> Result<&[u8], VmError> {
        if depth >= self.stack.len() {
            return Err(VmError::EmptyStack);
        }
        Ok(&self.stack[self.stack.len() - 1 - depth])
    }

    pub fn push(&mut self, item: Vec<u8>) {
        self.stack.push(item);
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push(if value { vec![1] } else { Vec::new() });
    }
}

/// Stack item truthiness: false is empty or all zeros, allowing a negative
/// zero (`0x80`) sign byte in the final position.
pub fn stack_item_is_truthy(item: &[u8]) -> bool {
    for (index, byte) in item.iter().enumerate() {
        if *byte != 0 {
            return !(index == item.len() - 1 && *byte == 0x80);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!stack_item_is_truthy(&[]));
        assert!(!stack_item_is_truthy(&[0x00]));
        assert!(!stack_item_is_truthy(&[0x00, 0x00]));
        assert!(!stack_item_is_truthy(&[0x80]));
        assert!(!stack_item_is_truthy(&[0x00, 0x80]));
        assert!(stack_item_is_truthy(&[0x01]));
        assert!(stack_item_is_truthy(&[0x80, 0x00]));
        assert!(stack_item_is_truthy(&[0x00, 0x01]));
    }

    #[test]
    fn test_executing() {
        let mut state = ProgramState::new(Vec::new(), Vec::new(), TransactionContext::default());
        assert!(state.executing());
        state.execution_stack.push(true);
        assert!(state.executing());
        state.execution_stack.push(false);
        assert!(!state.executing());
    }

    #[test]
    fn test_peek_depth() {
        let mut state = ProgramState::new(Vec::new(), Vec::new(), TransactionContext::default());
        state.push(vec![1]);
        state.push(vec![2]);
        assert_eq!(state.peek(0), Ok(&[2u8][..]));
        assert_eq!(state.peek(1), Ok(&[1u8][..]));
        assert_eq!(state.peek(2), Err(VmError::EmptyStack));
    }

    #[test]
    fn test_fail_keeps_first_error() {
        let mut state = ProgramState::new(Vec::new(), Vec::new(), TransactionContext::default());
        state.fail(VmError::CalledReturn);
        state.fail(VmError::FailedVerify);
        assert_eq!(state.error, Some(VmError::CalledReturn));
    }
}
