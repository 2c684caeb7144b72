//! Control flow operations.
//!
//! IF/NOTIF/ELSE/ENDIF manipulate the execution stack whether or not the
//! current branch is executing; the VM dispatches them outside the
//! conditional-evaluation combinator.

use crate::error::{OpResult, VmError};
use crate::state::{stack_item_is_truthy, ProgramState};
use crate::vm::BchVm;

pub(crate) fn op_nop(_state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    Ok(())
}

pub(crate) fn op_if(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    if state.executing() {
        let item = state.pop()?;
        state.execution_stack.push(stack_item_is_truthy(&item));
    } else {
        state.execution_stack.push(false);
    }
    Ok(())
}

pub(crate) fn op_notif(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    if state.executing() {
        let item = state.pop()?;
        state.execution_stack.push(!stack_item_is_truthy(&item));
    } else {
        state.execution_stack.push(false);
    }
    Ok(())
}

pub(crate) fn op_else(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    match state.execution_stack.last_mut() {
        Some(branch) => {
            *branch = !*branch;
            Ok(())
        }
        None => Err(VmError::UnexpectedElse),
    }
}

pub(crate) fn op_endif(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    match state.execution_stack.pop() {
        Some(_) => Ok(()),
        None => Err(VmError::UnexpectedEndIf),
    }
}

pub(crate) fn op_verify(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    if stack_item_is_truthy(&item) {
        Ok(())
    } else {
        Err(VmError::FailedVerify)
    }
}

pub(crate) fn op_return(_state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    Err(VmError::CalledReturn)
}

/// NOP1 and NOP4-NOP10: no-ops unless the instruction set disallows them.
pub(crate) fn op_upgradable_nop(_state: &mut ProgramState, vm: &BchVm) -> OpResult {
    if vm.flags().disallow_upgradable_nops {
        Err(VmError::CalledUpgradableNop)
    } else {
        Ok(())
    }
}

/// OP_VER, OP_RESERVED, OP_RESERVED1, OP_RESERVED2: fail when executed.
pub(crate) fn op_reserved(_state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    Err(VmError::CalledReserved)
}
