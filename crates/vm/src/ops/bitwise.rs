//! Bitwise and byte-equality operations.

use crate::error::{OpResult, VmError};
use crate::state::ProgramState;
use crate::vm::BchVm;

fn binary_bitwise(
    state: &mut ProgramState,
    combine: impl Fn(u8, u8) -> u8,
) -> OpResult {
    let b = state.pop()?;
    let a = state.pop()?;
    if a.len() != b.len() {
        return Err(VmError::MismatchedBitwiseOperandLength);
    }
    let combined = a
        .iter()
        .zip(b.iter())
        .map(|(left, right)| combine(*left, *right))
        .collect();
    state.push(combined);
    Ok(())
}

pub(crate) fn op_and(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    binary_bitwise(state, |a, b| a & b)
}

pub(crate) fn op_or(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    binary_bitwise(state, |a, b| a | b)
}

pub(crate) fn op_xor(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    binary_bitwise(state, |a, b| a ^ b)
}

pub(crate) fn op_equal(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let b = state.pop()?;
    let a = state.pop()?;
    state.push_bool(a == b);
    Ok(())
}

pub(crate) fn op_equalverify(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let b = state.pop()?;
    let a = state.pop()?;
    if a == b {
        Ok(())
    } else {
        Err(VmError::FailedVerify)
    }
}
