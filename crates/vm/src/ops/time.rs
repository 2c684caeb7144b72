//! Locktime operations.
//!
//! Both operations keep their NOP stack behavior: the operand is inspected
//! but never popped.

use crate::error::{OpResult, VmError};
use crate::number::{decode_script_number, LOCKTIME_NUMBER_LENGTH};
use crate::state::ProgramState;
use crate::vm::BchVm;

/// Locktime values at or above this count are interpreted as timestamps.
const LOCKTIME_THRESHOLD: i64 = 500_000_000;

const SEQUENCE_LOCKTIME_DISABLE_FLAG: i64 = 1 << 31;
const SEQUENCE_LOCKTIME_TYPE_FLAG: i64 = 1 << 22;
const SEQUENCE_LOCKTIME_MASK: i64 = 0x0000_ffff;

pub(crate) fn op_checklocktimeverify(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.peek(0)?.to_vec();
    let required = decode_script_number(
        &item,
        vm.flags().require_minimal_encoding,
        LOCKTIME_NUMBER_LENGTH,
    )?;
    if required < 0 {
        return Err(VmError::NegativeLocktime);
    }
    let locktime = i64::from(state.context.locktime);
    if (required < LOCKTIME_THRESHOLD) != (locktime < LOCKTIME_THRESHOLD) {
        return Err(VmError::UnsatisfiedLocktime);
    }
    if required > locktime {
        return Err(VmError::UnsatisfiedLocktime);
    }
    // A final sequence number opts the input out of locktime enforcement.
    if state.context.sequence_number == u32::MAX {
        return Err(VmError::UnsatisfiedLocktime);
    }
    Ok(())
}

pub(crate) fn op_checksequenceverify(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.peek(0)?.to_vec();
    let required = decode_script_number(
        &item,
        vm.flags().require_minimal_encoding,
        LOCKTIME_NUMBER_LENGTH,
    )?;
    if required < 0 {
        return Err(VmError::NegativeLocktime);
    }
    if required & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
        return Ok(());
    }
    if state.context.version < 2 {
        return Err(VmError::UnsatisfiedLocktime);
    }
    let sequence = i64::from(state.context.sequence_number);
    if sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0 {
        return Err(VmError::UnsatisfiedLocktime);
    }
    let mask = SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK;
    let masked_required = required & mask;
    let masked_sequence = sequence & mask;
    if (masked_required < SEQUENCE_LOCKTIME_TYPE_FLAG)
        != (masked_sequence < SEQUENCE_LOCKTIME_TYPE_FLAG)
    {
        return Err(VmError::UnsatisfiedLocktime);
    }
    if masked_required > masked_sequence {
        return Err(VmError::UnsatisfiedLocktime);
    }
    Ok(())
}
