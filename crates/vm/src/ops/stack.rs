//! Stack manipulation operations.

use crate::error::{OpResult, VmError};
use crate::number::encode_script_number;
use crate::state::{stack_item_is_truthy, ProgramState};
use crate::vm::BchVm;

pub(crate) fn op_toaltstack(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    state.alternate_stack.push(item);
    Ok(())
}

pub(crate) fn op_fromaltstack(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let item = state.pop_alternate()?;
    state.push(item);
    Ok(())
}

pub(crate) fn op_2drop(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    state.pop()?;
    state.pop()?;
    Ok(())
}

pub(crate) fn op_2dup(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let a = state.peek(1)?.to_vec();
    let b = state.peek(0)?.to_vec();
    state.push(a);
    state.push(b);
    Ok(())
}

pub(crate) fn op_3dup(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let a = state.peek(2)?.to_vec();
    let b = state.peek(1)?.to_vec();
    let c = state.peek(0)?.to_vec();
    state.push(a);
    state.push(b);
    state.push(c);
    Ok(())
}

pub(crate) fn op_2over(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let a = state.peek(3)?.to_vec();
    let b = state.peek(2)?.to_vec();
    state.push(a);
    state.push(b);
    Ok(())
}

pub(crate) fn op_2rot(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    if state.stack.len() < 6 {
        return Err(VmError::EmptyStack);
    }
    let index = state.stack.len() - 6;
    let a = state.stack.remove(index);
    let b = state.stack.remove(index);
    state.push(a);
    state.push(b);
    Ok(())
}

pub(crate) fn op_2swap(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let d = state.pop()?;
    let c = state.pop()?;
    let b = state.pop()?;
    let a = state.pop()?;
    state.push(c);
    state.push(d);
    state.push(a);
    state.push(b);
    Ok(())
}

pub(crate) fn op_ifdup(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let top = state.peek(0)?.to_vec();
    if stack_item_is_truthy(&top) {
        state.push(top);
    }
    Ok(())
}

pub(crate) fn op_depth(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let depth = state.stack.len();
    state.push(encode_script_number(depth as i64));
    Ok(())
}

pub(crate) fn op_drop(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    state.pop()?;
    Ok(())
}

pub(crate) fn op_dup(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let top = state.peek(0)?.to_vec();
    state.push(top);
    Ok(())
}

pub(crate) fn op_nip(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let top = state.pop()?;
    state.pop()?;
    state.push(top);
    Ok(())
}

pub(crate) fn op_over(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let item = state.peek(1)?.to_vec();
    state.push(item);
    Ok(())
}

pub(crate) fn op_pick(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let depth = index_from_top(state, vm)?;
    let item = state.stack[state.stack.len() - 1 - depth].clone();
    state.push(item);
    Ok(())
}

pub(crate) fn op_roll(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let depth = index_from_top(state, vm)?;
    let item = state.stack.remove(state.stack.len() - 1 - depth);
    state.push(item);
    Ok(())
}

pub(crate) fn op_rot(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let c = state.pop()?;
    let b = state.pop()?;
    let a = state.pop()?;
    state.push(b);
    state.push(c);
    state.push(a);
    Ok(())
}

pub(crate) fn op_swap(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let b = state.pop()?;
    let a = state.pop()?;
    state.push(b);
    state.push(a);
    Ok(())
}

pub(crate) fn op_tuck(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let b = state.pop()?;
    let a = state.pop()?;
    state.push(b.clone());
    state.push(a);
    state.push(b);
    Ok(())
}

fn index_from_top(state: &mut ProgramState, vm: &BchVm) -> Result<usize, VmError> {
    let depth = state.pop_number(vm.flags().require_minimal_encoding)?;
    let depth = usize::try_from(depth).map_err(|_| VmError::InvalidStackIndex)?;
    if depth >= state.stack.len() {
        return Err(VmError::InvalidStackIndex);
    }
    Ok(depth)
}
