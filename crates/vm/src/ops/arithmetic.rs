//! Numeric operations.
//!
//! Operands are decoded with the 4-byte script-number limit, so `i64`
//! arithmetic cannot overflow. Results may legitimately encode to 5 bytes;
//! they only fail if a later operation re-reads them as numbers.

use crate::error::{OpResult, VmError};
use crate::number::encode_script_number;
use crate::state::ProgramState;
use crate::vm::BchVm;

fn unary(state: &mut ProgramState, vm: &BchVm, apply: impl Fn(i64) -> i64) -> OpResult {
    let a = state.pop_number(vm.flags().require_minimal_encoding)?;
    state.push(encode_script_number(apply(a)));
    Ok(())
}

fn binary(
    state: &mut ProgramState,
    vm: &BchVm,
    apply: impl Fn(i64, i64) -> Result<i64, VmError>,
) -> OpResult {
    let b = state.pop_number(vm.flags().require_minimal_encoding)?;
    let a = state.pop_number(vm.flags().require_minimal_encoding)?;
    state.push(encode_script_number(apply(a, b)?));
    Ok(())
}

fn comparison(
    state: &mut ProgramState,
    vm: &BchVm,
    apply: impl Fn(i64, i64) -> bool,
) -> OpResult {
    let b = state.pop_number(vm.flags().require_minimal_encoding)?;
    let a = state.pop_number(vm.flags().require_minimal_encoding)?;
    state.push_bool(apply(a, b));
    Ok(())
}

pub(crate) fn op_1add(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    unary(state, vm, |a| a + 1)
}

pub(crate) fn op_1sub(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    unary(state, vm, |a| a - 1)
}

pub(crate) fn op_negate(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    unary(state, vm, |a| -a)
}

pub(crate) fn op_abs(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    unary(state, vm, i64::abs)
}

pub(crate) fn op_not(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let a = state.pop_number(vm.flags().require_minimal_encoding)?;
    state.push_bool(a == 0);
    Ok(())
}

pub(crate) fn op_0notequal(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let a = state.pop_number(vm.flags().require_minimal_encoding)?;
    state.push_bool(a != 0);
    Ok(())
}

pub(crate) fn op_add(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    binary(state, vm, |a, b| Ok(a + b))
}

pub(crate) fn op_sub(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    binary(state, vm, |a, b| Ok(a - b))
}

pub(crate) fn op_div(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    binary(state, vm, |a, b| {
        if b == 0 {
            Err(VmError::DivisionByZero)
        } else {
            Ok(a / b)
        }
    })
}

pub(crate) fn op_mod(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    binary(state, vm, |a, b| {
        if b == 0 {
            Err(VmError::DivisionByZero)
        } else {
            Ok(a % b)
        }
    })
}

pub(crate) fn op_booland(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a != 0 && b != 0)
}

pub(crate) fn op_boolor(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a != 0 || b != 0)
}

pub(crate) fn op_numequal(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a == b)
}

pub(crate) fn op_numequalverify(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let b = state.pop_number(vm.flags().require_minimal_encoding)?;
    let a = state.pop_number(vm.flags().require_minimal_encoding)?;
    if a == b {
        Ok(())
    } else {
        Err(VmError::FailedVerify)
    }
}

pub(crate) fn op_numnotequal(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a != b)
}

pub(crate) fn op_lessthan(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a < b)
}

pub(crate) fn op_greaterthan(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a > b)
}

pub(crate) fn op_lessthanorequal(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a <= b)
}

pub(crate) fn op_greaterthanorequal(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    comparison(state, vm, |a, b| a >= b)
}

pub(crate) fn op_min(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    binary(state, vm, |a, b| Ok(a.min(b)))
}

pub(crate) fn op_max(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    binary(state, vm, |a, b| Ok(a.max(b)))
}

pub(crate) fn op_within(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let require_minimal = vm.flags().require_minimal_encoding;
    let maximum = state.pop_number(require_minimal)?;
    let minimum = state.pop_number(require_minimal)?;
    let value = state.pop_number(require_minimal)?;
    state.push_bool(minimum <= value && value < maximum);
    Ok(())
}
