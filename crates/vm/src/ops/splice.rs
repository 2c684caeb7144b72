//! Splice operations (re-enabled on BCH in 2018).

use crate::error::{OpResult, VmError};
use crate::number::{encode_script_number, minimize_number_bytes, MAX_SCRIPT_NUMBER_LENGTH};
use crate::state::{ProgramState, MAX_SCRIPT_ELEMENT_SIZE};
use crate::vm::BchVm;

pub(crate) fn op_cat(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let b = state.pop()?;
    let mut a = state.pop()?;
    a.extend_from_slice(&b);
    state.push(a);
    Ok(())
}

pub(crate) fn op_split(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let index = state.pop_number(vm.flags().require_minimal_encoding)?;
    let item = state.pop()?;
    let index = usize::try_from(index).map_err(|_| VmError::InvalidSplitIndex)?;
    if index > item.len() {
        return Err(VmError::InvalidSplitIndex);
    }
    let (left, right) = item.split_at(index);
    state.push(left.to_vec());
    state.push(right.to_vec());
    Ok(())
}

pub(crate) fn op_num2bin(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let length = state.pop_number(vm.flags().require_minimal_encoding)?;
    let length = usize::try_from(length).map_err(|_| VmError::ExceededMaximumStackItemLength)?;
    if length > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(VmError::ExceededMaximumStackItemLength);
    }
    let mut item = minimize_number_bytes(state.pop()?);
    if item.len() > length {
        return Err(VmError::ImpossibleEncoding);
    }
    if item.len() < length {
        // Zero-pad the magnitude and carry the sign to the new final byte.
        let sign = item.last().map_or(0, |byte| byte & 0x80);
        if let Some(last) = item.last_mut() {
            *last &= 0x7f;
        }
        item.resize(length - 1, 0);
        item.push(sign);
    }
    state.push(item);
    Ok(())
}

pub(crate) fn op_bin2num(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let item = minimize_number_bytes(state.pop()?);
    if item.len() > MAX_SCRIPT_NUMBER_LENGTH {
        return Err(VmError::ExceededMaximumScriptNumberLength);
    }
    state.push(item);
    Ok(())
}

pub(crate) fn op_size(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    let length = state.peek(0)?.len();
    state.push(encode_script_number(length as i64));
    Ok(())
}
