//! Virtual machine errors.
//!
//! Consensus failures are values: an operation that fails stores a `VmError`
//! in the program state and evaluation halts. Callers must inspect the final
//! state's error before trusting its stack.

use thiserror::Error;

/// Result type for single VM operations.
pub type OpResult = std::result::Result<(), VmError>;

/// Errors produced during bytecode evaluation and program validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("unlocking bytecode exceeds the maximum bytecode length")]
    ExceededMaximumBytecodeLengthUnlocking,

    #[error("locking bytecode exceeds the maximum bytecode length")]
    ExceededMaximumBytecodeLengthLocking,

    #[error("unlocking bytecode ends with a malformed push instruction")]
    MalformedUnlockingBytecode,

    #[error("locking bytecode ends with a malformed push instruction")]
    MalformedLockingBytecode,

    #[error("P2SH redeem bytecode ends with a malformed push instruction")]
    MalformedP2shBytecode,

    #[error("unlocking bytecode may contain only push operations")]
    RequiresPushOnly,

    #[error("evaluation reached a malformed push instruction")]
    MalformedInstruction,

    #[error("exceeded the maximum operation count of 201")]
    ExceededMaximumOperationCount,

    #[error("exceeded the maximum combined stack depth of 1000 items")]
    ExceededMaximumStackDepth,

    #[error("exceeded the maximum stack item length of 520 bytes")]
    ExceededMaximumStackItemLength,

    #[error("script number exceeds the maximum encoded length")]
    ExceededMaximumScriptNumberLength,

    #[error("encoding is not minimal")]
    RequiresMinimalEncoding,

    #[error("operation requires more items than are present on the stack")]
    EmptyStack,

    #[error("operation requires more items than are present on the alternate stack")]
    EmptyAlternateStack,

    #[error("stack index is out of range")]
    InvalidStackIndex,

    #[error("encountered an OP_ELSE outside of a conditional block")]
    UnexpectedElse,

    #[error("encountered an OP_ENDIF outside of a conditional block")]
    UnexpectedEndIf,

    #[error("evaluation ended inside an unclosed conditional block")]
    NonEmptyExecutionStack,

    #[error("called an unassigned opcode (0x{opcode:02x})")]
    UnrecognizedOpcode { opcode: u8 },

    #[error("called a disabled operation (0x{opcode:02x})")]
    OperationDisabled { opcode: u8 },

    #[error("called an upgradable NOP operation")]
    CalledUpgradableNop,

    #[error("called a reserved operation")]
    CalledReserved,

    #[error("called OP_RETURN")]
    CalledReturn,

    #[error("verification failed: the top stack item is falsy")]
    FailedVerify,

    #[error("final stack must contain exactly one item")]
    RequiresCleanStack,

    #[error("signature encoding is invalid")]
    InvalidSignatureEncoding,

    #[error("public key encoding is invalid")]
    InvalidPublicKeyEncoding,

    #[error("a failing signature check must consume a null signature")]
    NonNullSignatureFailure,

    #[error("exceeded the maximum of 20 public keys per multisig check")]
    ExceededMaximumMultisigPublicKeyCount,

    #[error("multisig signature count is out of range")]
    InvalidMultisigSignatureCount,

    #[error("the multisig protocol bug value must be a null value")]
    InvalidProtocolBugValue,

    #[error("Schnorr-size signatures are not allowed in multisig checks")]
    SchnorrSizedSignatureInCheckMultisig,

    #[error("division by zero")]
    DivisionByZero,

    #[error("bitwise operands must have identical lengths")]
    MismatchedBitwiseOperandLength,

    #[error("split index is out of range")]
    InvalidSplitIndex,

    #[error("the requested number cannot be encoded in the requested length")]
    ImpossibleEncoding,

    #[error("locktime values may not be negative")]
    NegativeLocktime,

    #[error("the transaction does not satisfy the required locktime")]
    UnsatisfiedLocktime,
}
