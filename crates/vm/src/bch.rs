//! Consensus orchestration for Bitcoin Cash programs.
//!
//! Wraps the plain stack machine with the transaction-level rules: bytecode
//! limits, push-only unlocking scripts, P2SH redeem-script evaluation, and
//! the SegWit-recovery exemption.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VmError;
use crate::instruction::{
    instructions_are_malformed, is_push_only, parse_bytecode, Instruction,
};
use crate::opcodes as op;
use crate::state::{
    stack_item_is_truthy, ProgramState, TransactionContext, MAX_BYTECODE_LENGTH,
};
use crate::vm::BchVm;

/// The four strictness switches behind the named instruction sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSetFlags {
    /// Fail on NOP1/NOP4-NOP10 rather than ignoring them.
    pub disallow_upgradable_nops: bool,
    /// Require the CHECKMULTISIG protocol bug value to be null.
    pub require_bug_value_zero: bool,
    /// Require minimal number encodings and minimal push opcodes.
    pub require_minimal_encoding: bool,
    /// Require failing signature checks to consume null signatures.
    pub require_null_signature_failures: bool,
}

/// Named Bitcoin Cash instruction set variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionSetBch {
    Bch2019May,
    Bch2019MayStrict,
    Bch2019Nov,
    Bch2019NovStrict,
}

impl InstructionSetBch {
    pub const ALL: [InstructionSetBch; 4] = [
        InstructionSetBch::Bch2019May,
        InstructionSetBch::Bch2019MayStrict,
        InstructionSetBch::Bch2019Nov,
        InstructionSetBch::Bch2019NovStrict,
    ];

    /// The flag bundle for this variant.
    ///
    /// The November 2019 upgrade activated minimal-encoding and null-failure
    /// enforcement as consensus; the strict variants add the remaining
    /// policy rules.
    pub fn flags(self) -> InstructionSetFlags {
        match self {
            InstructionSetBch::Bch2019May => InstructionSetFlags::default(),
            InstructionSetBch::Bch2019Nov => InstructionSetFlags {
                require_minimal_encoding: true,
                require_null_signature_failures: true,
                ..InstructionSetFlags::default()
            },
            InstructionSetBch::Bch2019MayStrict | InstructionSetBch::Bch2019NovStrict => {
                InstructionSetFlags {
                    disallow_upgradable_nops: true,
                    require_bug_value_zero: true,
                    require_minimal_encoding: true,
                    require_null_signature_failures: true,
                }
            }
        }
    }
}

/// A single input's authentication program.
#[derive(Debug, Clone)]
pub struct AuthenticationProgram {
    pub unlocking_bytecode: Vec<u8>,
    pub locking_bytecode: Vec<u8>,
    pub context: TransactionContext,
}

impl BchVm {
    /// A VM configured for a named instruction set.
    pub fn for_instruction_set(instruction_set: InstructionSetBch) -> Self {
        Self::new(instruction_set.flags())
    }

    /// Evaluate a full authentication program and return the final state.
    ///
    /// The returned state's `error` must be inspected (or [`BchVm::verify`]
    /// used) before its stack is trusted.
    pub fn evaluate_program(&self, program: &AuthenticationProgram) -> ProgramState {
        let unlocking_instructions = parse_bytecode(&program.unlocking_bytecode);
        let context = program.context.clone();

        let failed = |error: VmError| {
            ProgramState::failed(unlocking_instructions.clone(), context.clone(), error)
        };
        if program.unlocking_bytecode.len() > MAX_BYTECODE_LENGTH {
            return failed(VmError::ExceededMaximumBytecodeLengthUnlocking);
        }
        if instructions_are_malformed(&unlocking_instructions) {
            return failed(VmError::MalformedUnlockingBytecode);
        }
        if program.locking_bytecode.len() > MAX_BYTECODE_LENGTH {
            return failed(VmError::ExceededMaximumBytecodeLengthLocking);
        }
        let locking_instructions = parse_bytecode(&program.locking_bytecode);
        if instructions_are_malformed(&locking_instructions) {
            return failed(VmError::MalformedLockingBytecode);
        }
        if !is_push_only(&unlocking_instructions) {
            return failed(VmError::RequiresPushOnly);
        }

        let unlocking_result = self.evaluate(ProgramState::new(
            unlocking_instructions,
            Vec::new(),
            context.clone(),
        ));
        if unlocking_result.error.is_some() {
            return unlocking_result;
        }
        debug!(
            stack_depth = unlocking_result.stack.len(),
            "unlocking bytecode evaluated"
        );

        let locking_result = self.evaluate(ProgramState::new(
            locking_instructions.clone(),
            unlocking_result.stack.clone(),
            context.clone(),
        ));
        if locking_result.error.is_some() {
            return locking_result;
        }

        if !is_p2sh_locking(&locking_instructions) {
            return locking_result;
        }

        // P2SH: the top of the unlocking stack is the redeem script.
        let mut p2sh_stack = unlocking_result.stack.clone();
        let Some(redeem_bytecode) = p2sh_stack.pop() else {
            return locking_result;
        };

        if p2sh_stack.is_empty() && is_witness_program(&redeem_bytecode) {
            debug!("SegWit-recovery exemption applied");
            return locking_result;
        }

        let redeem_instructions = parse_bytecode(&redeem_bytecode);
        if instructions_are_malformed(&redeem_instructions) {
            let mut state = locking_result;
            state.fail(VmError::MalformedP2shBytecode);
            return state;
        }
        debug!("evaluating P2SH redeem bytecode");
        self.evaluate(ProgramState::new(redeem_instructions, p2sh_stack, context))
    }

    /// Final acceptance: no error, balanced conditionals, and a single
    /// truthy stack item.
    pub fn verify(&self, state: &ProgramState) -> Result<(), VmError> {
        if let Some(error) = &state.error {
            return Err(error.clone());
        }
        if !state.execution_stack.is_empty() {
            return Err(VmError::NonEmptyExecutionStack);
        }
        if state.stack.len() != 1 {
            return Err(VmError::RequiresCleanStack);
        }
        if !stack_item_is_truthy(&state.stack[0]) {
            return Err(VmError::FailedVerify);
        }
        Ok(())
    }

    /// Evaluate and verify in one call.
    pub fn validate_program(&self, program: &AuthenticationProgram) -> Result<(), VmError> {
        self.verify(&self.evaluate_program(program))
    }
}

/// Exactly `OP_HASH160 OP_PUSHBYTES_20 <hash> OP_EQUAL`.
fn is_p2sh_locking(instructions: &[Instruction]) -> bool {
    matches!(
        instructions,
        [
            Instruction::Op { opcode: op::OP_HASH160 },
            Instruction::Push { opcode: op::OP_PUSHBYTES_20, data },
            Instruction::Op { opcode: op::OP_EQUAL },
        ] if data.len() == 20
    )
}

/// The SegWit program shape: a version byte (`OP_0` or `OP_1`..`OP_16`)
/// followed by a direct push of the remaining bytes, 4 to 42 bytes total.
fn is_witness_program(bytecode: &[u8]) -> bool {
    if bytecode.len() < 4 || bytecode.len() > 42 {
        return false;
    }
    let version = bytecode[0];
    if version != op::OP_0 && !(op::OP_1..=op::OP_16).contains(&version) {
        return false;
    }
    usize::from(bytecode[1]) + 2 == bytecode.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{StandardCrypto, VmCrypto};
    use crate::instruction::encode_data_push;

    fn vm() -> BchVm {
        BchVm::for_instruction_set(InstructionSetBch::Bch2019Nov)
    }

    fn program(unlocking: Vec<u8>, locking: Vec<u8>) -> AuthenticationProgram {
        AuthenticationProgram {
            unlocking_bytecode: unlocking,
            locking_bytecode: locking,
            context: TransactionContext::default(),
        }
    }

    #[test]
    fn test_preset_flags() {
        assert_eq!(
            InstructionSetBch::Bch2019May.flags(),
            InstructionSetFlags::default()
        );
        let nov = InstructionSetBch::Bch2019Nov.flags();
        assert!(nov.require_minimal_encoding);
        assert!(nov.require_null_signature_failures);
        assert!(!nov.disallow_upgradable_nops);
        assert!(!nov.require_bug_value_zero);
        for strict in [
            InstructionSetBch::Bch2019MayStrict,
            InstructionSetBch::Bch2019NovStrict,
        ] {
            let flags = strict.flags();
            assert!(flags.disallow_upgradable_nops);
            assert!(flags.require_bug_value_zero);
            assert!(flags.require_minimal_encoding);
            assert!(flags.require_null_signature_failures);
        }
    }

    #[test]
    fn test_simple_program_accepts() {
        // Unlocking pushes 3; locking checks 3.
        let result = vm().evaluate_program(&program(
            vec![op::OP_3],
            vec![op::OP_3, op::OP_EQUAL],
        ));
        assert!(vm().verify(&result).is_ok());
    }

    #[test]
    fn test_requires_push_only() {
        // OP_ADD in unlocking bytecode fails before any evaluation.
        let result = vm().evaluate_program(&program(
            vec![op::OP_1, op::OP_2, op::OP_ADD],
            vec![op::OP_3, op::OP_EQUAL],
        ));
        assert_eq!(result.error, Some(VmError::RequiresPushOnly));
    }

    #[test]
    fn test_precheck_order() {
        // Oversized unlocking bytecode wins over a malformed locking script.
        let oversized = vec![0u8; MAX_BYTECODE_LENGTH + 1];
        let result = vm().evaluate_program(&program(oversized, vec![0x02, 0xaa]));
        assert_eq!(
            result.error,
            Some(VmError::ExceededMaximumBytecodeLengthUnlocking)
        );

        let result = vm().evaluate_program(&program(vec![op::OP_1], vec![0x02, 0xaa]));
        assert_eq!(result.error, Some(VmError::MalformedLockingBytecode));

        let result = vm().evaluate_program(&program(vec![0x02, 0xaa], vec![op::OP_1]));
        assert_eq!(result.error, Some(VmError::MalformedUnlockingBytecode));
    }

    fn p2sh_locking_for(redeem: &[u8]) -> Vec<u8> {
        let hash = StandardCrypto::new().hash160(redeem);
        let mut locking = vec![op::OP_HASH160];
        locking.extend(encode_data_push(&hash));
        locking.push(op::OP_EQUAL);
        locking
    }

    #[test]
    fn test_p2sh_redeem_evaluation() {
        // Redeem script: OP_1 (trivially truthy).
        let redeem = vec![op::OP_1];
        let locking = p2sh_locking_for(&redeem);
        let unlocking = encode_data_push(&redeem);
        let result = vm().evaluate_program(&program(unlocking, locking.clone()));
        assert!(vm().verify(&result).is_ok());

        // A redeem script evaluating to false is rejected.
        let bad_redeem = vec![op::OP_0];
        let locking = p2sh_locking_for(&bad_redeem);
        let unlocking = encode_data_push(&bad_redeem);
        let result = vm().evaluate_program(&program(unlocking, locking));
        assert!(vm().verify(&result).is_err());
    }

    #[test]
    fn test_p2sh_acceptance_follows_redeem_result() {
        // Acceptance under the P2SH pattern is decided by the redeem-script
        // evaluation, not by the locking run's EQUAL outcome.
        let redeem = vec![op::OP_1, op::OP_2, op::OP_EQUAL];
        let locking = p2sh_locking_for(&redeem);
        let unlocking = encode_data_push(&redeem);
        let result = vm().evaluate_program(&program(unlocking, locking));
        assert_eq!(result.error, None);
        assert_eq!(vm().verify(&result), Err(VmError::FailedVerify));
    }

    #[test]
    fn test_p2sh_redeem_uses_remaining_unlocking_stack() {
        // Redeem script: OP_ADD OP_3 OP_EQUAL; unlocking supplies 1 and 2.
        let redeem = vec![op::OP_ADD, op::OP_3, op::OP_EQUAL];
        let locking = p2sh_locking_for(&redeem);
        let mut unlocking = vec![op::OP_1, op::OP_2];
        unlocking.extend(encode_data_push(&redeem));
        let result = vm().evaluate_program(&program(unlocking, locking));
        assert!(vm().verify(&result).is_ok());
    }

    #[test]
    fn test_segwit_recovery_exemption() {
        // A P2SH-wrapped witness program: OP_0 OP_PUSHBYTES_20 <20 bytes>.
        let mut witness_program = vec![op::OP_0, 20];
        witness_program.extend_from_slice(&[0x42; 20]);
        assert!(is_witness_program(&witness_program));

        let locking = p2sh_locking_for(&witness_program);
        let unlocking = encode_data_push(&witness_program);
        // Without the exemption this would fail: the witness program is not
        // a meaningful redeem script. The locking result (EQUAL succeeded)
        // is returned unchanged.
        let result = vm().evaluate_program(&program(unlocking, locking));
        assert!(vm().verify(&result).is_ok());
    }

    #[test]
    fn test_segwit_recovery_requires_empty_remaining_stack() {
        let mut witness_program = vec![op::OP_0, 20];
        witness_program.extend_from_slice(&[0x42; 20]);
        let locking = p2sh_locking_for(&witness_program);
        // An extra unlocking push disables the exemption; the witness
        // program is then evaluated as a redeem script and leaves a dirty
        // stack.
        let mut unlocking = vec![op::OP_1];
        unlocking.extend(encode_data_push(&witness_program));
        let result = vm().evaluate_program(&program(unlocking, locking));
        assert!(vm().verify(&result).is_err());
    }

    #[test]
    fn test_is_witness_program_bounds() {
        assert!(!is_witness_program(&[op::OP_0, 1, 0xaa]));
        assert!(is_witness_program(&[op::OP_0, 2, 0xaa, 0xbb]));
        assert!(is_witness_program(&[op::OP_16, 2, 0xaa, 0xbb]));
        assert!(!is_witness_program(&[op::OP_DUP, 2, 0xaa, 0xbb]));
        assert!(!is_witness_program(&[op::OP_0, 3, 0xaa, 0xbb]));
        let mut long = vec![op::OP_0, 41];
        long.extend_from_slice(&[0xaa; 41]);
        assert!(!is_witness_program(&long));
        let mut max = vec![op::OP_0, 40];
        max.extend_from_slice(&[0xaa; 40]);
        assert!(is_witness_program(&max));
    }

    #[test]
    fn test_verify_requires_clean_truthy_stack() {
        let result = vm().evaluate_program(&program(
            vec![op::OP_1, op::OP_1],
            vec![op::OP_NOP],
        ));
        assert_eq!(vm().verify(&result), Err(VmError::RequiresCleanStack));

        let result = vm().evaluate_program(&program(vec![op::OP_0], vec![op::OP_NOP]));
        assert_eq!(vm().verify(&result), Err(VmError::FailedVerify));
    }
}
