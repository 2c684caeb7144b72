//! The stack machine.
//!
//! A [`BchVm`] owns a 256-entry dispatch table of boxed operations, built
//! once at construction. Each table entry is a plain operation composed with
//! the combinators below: operation counting (everything above `OP_16`),
//! conditional evaluation (everything except control flow and disabled
//! opcodes, which must act even in skipped branches), and post-operation
//! resource limits.

use std::sync::Arc;

use tracing::trace;

use crate::bch::InstructionSetFlags;
use crate::crypto::{StandardCrypto, VmCrypto};
use crate::error::{OpResult, VmError};
use crate::instruction::{push_is_minimal, Instruction};
use crate::opcodes as op;
use crate::ops::{arithmetic, bitwise, crypto_ops, flow, splice, stack, time};
use crate::state::{
    ProgramState, MAX_OPERATIONS_PER_SCRIPT, MAX_SCRIPT_ELEMENT_SIZE, MAX_STACK_DEPTH,
};

/// A composed table entry.
type Operation = Box<dyn Fn(&mut ProgramState, &BchVm) -> OpResult + Send + Sync>;

/// Bitcoin Cash script virtual machine.
pub struct BchVm {
    flags: InstructionSetFlags,
    crypto: Arc<dyn VmCrypto>,
    operations: Vec<Operation>,
}

impl BchVm {
    /// A VM over the given flag bundle, backed by [`StandardCrypto`].
    pub fn new(flags: InstructionSetFlags) -> Self {
        Self::with_crypto(flags, Arc::new(StandardCrypto::new()))
    }

    /// A VM with a caller-supplied crypto collaborator.
    pub fn with_crypto(flags: InstructionSetFlags, crypto: Arc<dyn VmCrypto>) -> Self {
        Self {
            flags,
            crypto,
            operations: build_operations(),
        }
    }

    pub fn flags(&self) -> InstructionSetFlags {
        self.flags
    }

    pub fn crypto(&self) -> &dyn VmCrypto {
        self.crypto.as_ref()
    }

    /// Execute the instruction at `state.ip` and advance.
    pub fn step(&self, state: &mut ProgramState) {
        let Some(instruction) = state.instructions.get(state.ip).cloned() else {
            return;
        };
        trace!(ip = state.ip, opcode = instruction.opcode(), "step");
        match instruction {
            Instruction::Push { opcode, data } => {
                if state.executing() {
                    if let Err(error) = self.execute_data_push(state, opcode, data) {
                        state.fail(error);
                    }
                }
            }
            Instruction::MalformedPush { .. } => state.fail(VmError::MalformedInstruction),
            Instruction::Op { opcode } => {
                let operation = &self.operations[usize::from(opcode)];
                if let Err(error) = operation(state, self) {
                    state.fail(error);
                }
            }
        }
        state.ip += 1;
    }

    /// Run to completion and return the final state.
    pub fn evaluate(&self, mut state: ProgramState) -> ProgramState {
        while continues(&state) {
            self.step(&mut state);
        }
        state
    }

    /// Run to completion, recording the state after every executed
    /// instruction. The first entry is the initial state; the sample for the
    /// instruction at `ip` is at index `ip + 1`.
    pub fn debug(&self, mut state: ProgramState) -> Vec<ProgramState> {
        let mut samples = vec![state.clone()];
        while continues(&state) {
            self.step(&mut state);
            samples.push(state.clone());
        }
        samples
    }

    fn execute_data_push(
        &self,
        state: &mut ProgramState,
        opcode: u8,
        data: Vec<u8>,
    ) -> OpResult {
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(VmError::ExceededMaximumStackItemLength);
        }
        if self.flags.require_minimal_encoding && !push_is_minimal(opcode, &data) {
            return Err(VmError::RequiresMinimalEncoding);
        }
        state.push(data);
        enforce_limits(state)
    }
}

fn continues(state: &ProgramState) -> bool {
    state.error.is_none() && state.ip < state.instructions.len()
}

fn enforce_limits(state: &ProgramState) -> OpResult {
    if state.stack.len() + state.alternate_stack.len() > MAX_STACK_DEPTH {
        return Err(VmError::ExceededMaximumStackDepth);
    }
    if state
        .stack
        .last()
        .is_some_and(|top| top.len() > MAX_SCRIPT_ELEMENT_SIZE)
    {
        return Err(VmError::ExceededMaximumStackItemLength);
    }
    Ok(())
}

/// Skip the wrapped operation while any conditional branch is inactive.
fn conditionally_evaluate(operation: Operation) -> Operation {
    Box::new(move |state: &mut ProgramState, vm: &BchVm| {
        if state.executing() {
            operation(state, vm)
        } else {
            Ok(())
        }
    })
}

/// Count the wrapped operation against the per-script operation budget.
fn increment_operation_count(operation: Operation) -> Operation {
    Box::new(move |state: &mut ProgramState, vm: &BchVm| {
        state.operation_count += 1;
        if state.operation_count > MAX_OPERATIONS_PER_SCRIPT {
            return Err(VmError::ExceededMaximumOperationCount);
        }
        operation(state, vm)
    })
}

/// Apply the common resource limits after the wrapped operation.
fn check_limits(operation: Operation) -> Operation {
    Box::new(move |state: &mut ProgramState, vm: &BchVm| {
        operation(state, vm)?;
        enforce_limits(state)
    })
}

/// Operations that act (or fail) even inside inactive conditional branches.
fn is_transparent(opcode: u8) -> bool {
    matches!(
        opcode,
        op::OP_IF
            | op::OP_NOTIF
            | op::OP_ELSE
            | op::OP_ENDIF
            | op::OP_VERIF
            | op::OP_VERNOTIF
            | op::OP_INVERT
            | op::OP_2MUL
            | op::OP_2DIV
            | op::OP_MUL
            | op::OP_LSHIFT
            | op::OP_RSHIFT
    )
}

fn build_operations() -> Vec<Operation> {
    (0u16..=255)
        .map(|code| {
            let opcode = code as u8;
            let base = base_operation(opcode);
            let composed = if is_transparent(opcode) {
                check_limits(base)
            } else {
                conditionally_evaluate(check_limits(base))
            };
            if opcode > op::OP_16 {
                increment_operation_count(composed)
            } else {
                composed
            }
        })
        .collect()
}

fn base_operation(opcode: u8) -> Operation {
    match opcode {
        op::OP_1NEGATE => Box::new(|state: &mut ProgramState, _: &BchVm| {
            state.push(vec![0x81]);
            Ok(())
        }),
        op::OP_1..=op::OP_16 => Box::new(move |state: &mut ProgramState, _: &BchVm| {
            state.push(vec![opcode - op::OP_1 + 1]);
            Ok(())
        }),

        op::OP_NOP => Box::new(flow::op_nop),
        op::OP_RESERVED | op::OP_VER | op::OP_VERIF | op::OP_VERNOTIF => {
            Box::new(flow::op_reserved)
        }
        op::OP_RESERVED1 | op::OP_RESERVED2 => Box::new(flow::op_reserved),
        op::OP_IF => Box::new(flow::op_if),
        op::OP_NOTIF => Box::new(flow::op_notif),
        op::OP_ELSE => Box::new(flow::op_else),
        op::OP_ENDIF => Box::new(flow::op_endif),
        op::OP_VERIFY => Box::new(flow::op_verify),
        op::OP_RETURN => Box::new(flow::op_return),
        op::OP_NOP1 | op::OP_NOP4..=op::OP_NOP10 => Box::new(flow::op_upgradable_nop),

        op::OP_TOALTSTACK => Box::new(stack::op_toaltstack),
        op::OP_FROMALTSTACK => Box::new(stack::op_fromaltstack),
        op::OP_2DROP => Box::new(stack::op_2drop),
        op::OP_2DUP => Box::new(stack::op_2dup),
        op::OP_3DUP => Box::new(stack::op_3dup),
        op::OP_2OVER => Box::new(stack::op_2over),
        op::OP_2ROT => Box::new(stack::op_2rot),
        op::OP_2SWAP => Box::new(stack::op_2swap),
        op::OP_IFDUP => Box::new(stack::op_ifdup),
        op::OP_DEPTH => Box::new(stack::op_depth),
        op::OP_DROP => Box::new(stack::op_drop),
        op::OP_DUP => Box::new(stack::op_dup),
        op::OP_NIP => Box::new(stack::op_nip),
        op::OP_OVER => Box::new(stack::op_over),
        op::OP_PICK => Box::new(stack::op_pick),
        op::OP_ROLL => Box::new(stack::op_roll),
        op::OP_ROT => Box::new(stack::op_rot),
        op::OP_SWAP => Box::new(stack::op_swap),
        op::OP_TUCK => Box::new(stack::op_tuck),

        op::OP_CAT => Box::new(splice::op_cat),
        op::OP_SPLIT => Box::new(splice::op_split),
        op::OP_NUM2BIN => Box::new(splice::op_num2bin),
        op::OP_BIN2NUM => Box::new(splice::op_bin2num),
        op::OP_SIZE => Box::new(splice::op_size),

        op::OP_AND => Box::new(bitwise::op_and),
        op::OP_OR => Box::new(bitwise::op_or),
        op::OP_XOR => Box::new(bitwise::op_xor),
        op::OP_EQUAL => Box::new(bitwise::op_equal),
        op::OP_EQUALVERIFY => Box::new(bitwise::op_equalverify),

        op::OP_1ADD => Box::new(arithmetic::op_1add),
        op::OP_1SUB => Box::new(arithmetic::op_1sub),
        op::OP_NEGATE => Box::new(arithmetic::op_negate),
        op::OP_ABS => Box::new(arithmetic::op_abs),
        op::OP_NOT => Box::new(arithmetic::op_not),
        op::OP_0NOTEQUAL => Box::new(arithmetic::op_0notequal),
        op::OP_ADD => Box::new(arithmetic::op_add),
        op::OP_SUB => Box::new(arithmetic::op_sub),
        op::OP_DIV => Box::new(arithmetic::op_div),
        op::OP_MOD => Box::new(arithmetic::op_mod),
        op::OP_BOOLAND => Box::new(arithmetic::op_booland),
        op::OP_BOOLOR => Box::new(arithmetic::op_boolor),
        op::OP_NUMEQUAL => Box::new(arithmetic::op_numequal),
        op::OP_NUMEQUALVERIFY => Box::new(arithmetic::op_numequalverify),
        op::OP_NUMNOTEQUAL => Box::new(arithmetic::op_numnotequal),
        op::OP_LESSTHAN => Box::new(arithmetic::op_lessthan),
        op::OP_GREATERTHAN => Box::new(arithmetic::op_greaterthan),
        op::OP_LESSTHANOREQUAL => Box::new(arithmetic::op_lessthanorequal),
        op::OP_GREATERTHANOREQUAL => Box::new(arithmetic::op_greaterthanorequal),
        op::OP_MIN => Box::new(arithmetic::op_min),
        op::OP_MAX => Box::new(arithmetic::op_max),
        op::OP_WITHIN => Box::new(arithmetic::op_within),

        op::OP_INVERT
        | op::OP_2MUL
        | op::OP_2DIV
        | op::OP_MUL
        | op::OP_LSHIFT
        | op::OP_RSHIFT => Box::new(move |_: &mut ProgramState, _: &BchVm| {
            Err(VmError::OperationDisabled { opcode })
        }),

        op::OP_RIPEMD160 => Box::new(crypto_ops::op_ripemd160),
        op::OP_SHA1 => Box::new(crypto_ops::op_sha1),
        op::OP_SHA256 => Box::new(crypto_ops::op_sha256),
        op::OP_HASH160 => Box::new(crypto_ops::op_hash160),
        op::OP_HASH256 => Box::new(crypto_ops::op_hash256),
        op::OP_CODESEPARATOR => Box::new(crypto_ops::op_codeseparator),
        op::OP_CHECKSIG => Box::new(crypto_ops::op_checksig),
        op::OP_CHECKSIGVERIFY => Box::new(crypto_ops::op_checksigverify),
        op::OP_CHECKMULTISIG => Box::new(crypto_ops::op_checkmultisig),
        op::OP_CHECKMULTISIGVERIFY => Box::new(crypto_ops::op_checkmultisigverify),
        op::OP_CHECKDATASIG => Box::new(crypto_ops::op_checkdatasig),
        op::OP_CHECKDATASIGVERIFY => Box::new(crypto_ops::op_checkdatasigverify),

        op::OP_CHECKLOCKTIMEVERIFY => Box::new(time::op_checklocktimeverify),
        op::OP_CHECKSEQUENCEVERIFY => Box::new(time::op_checksequenceverify),

        // Push opcodes are dispatched from parsed instruction data and never
        // reach the table.
        _ if op::is_push(opcode) => Box::new(|_: &mut ProgramState, _: &BchVm| {
            Err(VmError::MalformedInstruction)
        }),
        _ => Box::new(move |_: &mut ProgramState, _: &BchVm| {
            Err(VmError::UnrecognizedOpcode { opcode })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::parse_bytecode;
    use crate::state::TransactionContext;

    fn run(bytecode: &[u8]) -> ProgramState {
        run_with_flags(bytecode, InstructionSetFlags::default())
    }

    fn run_with_flags(bytecode: &[u8], flags: InstructionSetFlags) -> ProgramState {
        let vm = BchVm::new(flags);
        vm.evaluate(ProgramState::new(
            parse_bytecode(bytecode),
            Vec::new(),
            TransactionContext::default(),
        ))
    }

    #[test]
    fn test_addition() {
        let state = run(&[op::OP_1, op::OP_2, op::OP_ADD]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![3]]);
    }

    #[test]
    fn test_constants() {
        let state = run(&[op::OP_0, op::OP_16, op::OP_1NEGATE]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![], vec![16], vec![0x81]]);
    }

    #[test]
    fn test_conditional_branches() {
        // 1 IF 2 ELSE 3 ENDIF
        let state = run(&[op::OP_1, op::OP_IF, op::OP_2, op::OP_ELSE, op::OP_3, op::OP_ENDIF]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![2]]);

        let state = run(&[op::OP_0, op::OP_IF, op::OP_2, op::OP_ELSE, op::OP_3, op::OP_ENDIF]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![3]]);
    }

    #[test]
    fn test_nested_conditionals_skip_inner() {
        // 0 IF 1 IF RETURN ENDIF ENDIF 7
        let state = run(&[
            op::OP_0,
            op::OP_IF,
            op::OP_1,
            op::OP_IF,
            op::OP_RETURN,
            op::OP_ENDIF,
            op::OP_ENDIF,
            op::OP_7,
        ]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![7]]);
    }

    #[test]
    fn test_unbalanced_conditionals() {
        let state = run(&[op::OP_ELSE]);
        assert_eq!(state.error, Some(VmError::UnexpectedElse));
        let state = run(&[op::OP_ENDIF]);
        assert_eq!(state.error, Some(VmError::UnexpectedEndIf));
    }

    #[test]
    fn test_disabled_opcodes_fail_in_skipped_branches() {
        let state = run(&[op::OP_0, op::OP_IF, op::OP_MUL, op::OP_ENDIF]);
        assert_eq!(
            state.error,
            Some(VmError::OperationDisabled { opcode: op::OP_MUL })
        );
    }

    #[test]
    fn test_unknown_opcodes_allowed_in_skipped_branches() {
        let state = run(&[op::OP_0, op::OP_IF, 0xfe, op::OP_ENDIF, op::OP_1]);
        assert_eq!(state.error, None);
        let state = run(&[0xfe]);
        assert_eq!(state.error, Some(VmError::UnrecognizedOpcode { opcode: 0xfe }));
    }

    #[test]
    fn test_operation_count_limit() {
        let mut bytecode = vec![op::OP_1];
        bytecode.extend(std::iter::repeat(op::OP_NOP).take(201));
        let state = run(&bytecode);
        assert_eq!(state.error, None);
        assert_eq!(state.operation_count, 201);

        bytecode.push(op::OP_NOP);
        let state = run(&bytecode);
        assert_eq!(state.error, Some(VmError::ExceededMaximumOperationCount));
    }

    #[test]
    fn test_stack_depth_limit() {
        // Pushes are not counted operations, so depth can be driven to the
        // limit without hitting the operation budget.
        let mut bytecode = Vec::new();
        for _ in 0..1000 {
            bytecode.extend_from_slice(&[0x01, 0xaa]);
        }
        let state = run(&bytecode);
        assert_eq!(state.error, None);
        assert_eq!(state.stack.len(), 1000);

        bytecode.extend_from_slice(&[0x01, 0xaa]);
        let state = run(&bytecode);
        assert_eq!(state.error, Some(VmError::ExceededMaximumStackDepth));
    }

    #[test]
    fn test_push_size_limit() {
        let mut bytecode = vec![op::OP_PUSHDATA2];
        bytecode.extend_from_slice(&520u16.to_le_bytes());
        bytecode.extend(std::iter::repeat(0xaa).take(520));
        let state = run(&bytecode);
        assert_eq!(state.error, None);

        let mut bytecode = vec![op::OP_PUSHDATA2];
        bytecode.extend_from_slice(&521u16.to_le_bytes());
        bytecode.extend(std::iter::repeat(0xaa).take(521));
        let state = run(&bytecode);
        assert_eq!(state.error, Some(VmError::ExceededMaximumStackItemLength));
    }

    #[test]
    fn test_minimal_encoding_flag() {
        let flags = InstructionSetFlags {
            require_minimal_encoding: true,
            ..InstructionSetFlags::default()
        };
        // OP_PUSHBYTES_1 0x01 should be OP_1 under minimal encoding.
        let state = run_with_flags(&[0x01, 0x01], flags);
        assert_eq!(state.error, Some(VmError::RequiresMinimalEncoding));
        let state = run_with_flags(&[0x01, 0x01], InstructionSetFlags::default());
        assert_eq!(state.error, None);
    }

    #[test]
    fn test_upgradable_nops() {
        let state = run(&[op::OP_NOP1, op::OP_NOP10, op::OP_1]);
        assert_eq!(state.error, None);
        let flags = InstructionSetFlags {
            disallow_upgradable_nops: true,
            ..InstructionSetFlags::default()
        };
        let state = run_with_flags(&[op::OP_NOP1], flags);
        assert_eq!(state.error, Some(VmError::CalledUpgradableNop));
    }

    #[test]
    fn test_splice_roundtrip() {
        // "abcd" SPLIT at 2, then CAT back together.
        let state = run(&[
            0x04, b'a', b'b', b'c', b'd',
            op::OP_2,
            op::OP_SPLIT,
            op::OP_CAT,
        ]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![b"abcd".to_vec()]);
    }

    #[test]
    fn test_num2bin_bin2num() {
        // 1 as a 4-byte value, then back to minimal.
        let state = run(&[op::OP_1, op::OP_4, op::OP_NUM2BIN, op::OP_BIN2NUM]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![1]]);
    }

    #[test]
    fn test_hash_opcodes() {
        let state = run(&[op::OP_0, op::OP_SHA256]);
        assert_eq!(state.error, None);
        assert_eq!(
            hex::encode(&state.stack[0]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_debug_samples_every_step() {
        let vm = BchVm::new(InstructionSetFlags::default());
        let samples = vm.debug(ProgramState::new(
            parse_bytecode(&[op::OP_1, op::OP_2, op::OP_ADD]),
            Vec::new(),
            TransactionContext::default(),
        ));
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].stack.len(), 0);
        assert_eq!(samples[3].stack, vec![vec![3]]);
    }

    #[test]
    fn test_checksig_empty_signature_is_false() {
        // <sig = empty> <valid pubkey> CHECKSIG
        let mut bytecode = vec![op::OP_0, 0x21];
        bytecode.extend(
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap(),
        );
        bytecode.push(op::OP_CHECKSIG);
        let state = run(&bytecode);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn test_checksig_invalid_pubkey_errors() {
        let state = run(&[op::OP_0, op::OP_1, op::OP_CHECKSIG]);
        assert_eq!(state.error, Some(VmError::InvalidPublicKeyEncoding));
    }

    #[test]
    fn test_checkmultisig_bug_value() {
        // <bug> 0-of-0 multisig: 0 0 0 CHECKMULTISIG
        let state = run(&[op::OP_0, op::OP_0, op::OP_0, op::OP_CHECKMULTISIG]);
        assert_eq!(state.error, None);
        assert_eq!(state.stack, vec![vec![1]]);

        let flags = InstructionSetFlags {
            require_bug_value_zero: true,
            ..InstructionSetFlags::default()
        };
        let state = run_with_flags(
            &[op::OP_1, op::OP_0, op::OP_0, op::OP_CHECKMULTISIG],
            flags,
        );
        assert_eq!(state.error, Some(VmError::InvalidProtocolBugValue));
    }
}
