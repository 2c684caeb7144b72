//! Hashing and signature-checking operations.
//!
//! All digests and curve operations go through the [`crate::crypto::VmCrypto`]
//! collaborator. Transaction signature checks hash the caller-supplied
//! signing-serialization preimage; data signature checks hash the message
//! directly.

use crate::error::{OpResult, VmError};
use crate::instruction::serialize_instructions;
use crate::state::{
    stack_item_is_truthy, ProgramState, MAX_MULTISIG_PUBLIC_KEYS, MAX_OPERATIONS_PER_SCRIPT,
};
use crate::vm::BchVm;

pub(crate) fn op_ripemd160(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    state.push(vm.crypto().ripemd160(&item));
    Ok(())
}

pub(crate) fn op_sha1(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    state.push(vm.crypto().sha1(&item));
    Ok(())
}

pub(crate) fn op_sha256(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    state.push(vm.crypto().sha256(&item));
    Ok(())
}

pub(crate) fn op_hash160(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    state.push(vm.crypto().hash160(&item));
    Ok(())
}

pub(crate) fn op_hash256(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let item = state.pop()?;
    state.push(vm.crypto().hash256(&item));
    Ok(())
}

pub(crate) fn op_codeseparator(state: &mut ProgramState, _vm: &BchVm) -> OpResult {
    state.last_code_separator = Some(state.ip);
    Ok(())
}

pub(crate) fn op_checksig(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let public_key = state.pop()?;
    let signature = state.pop()?;
    if !vm.crypto().validate_public_key(&public_key) {
        return Err(VmError::InvalidPublicKeyEncoding);
    }
    let success = if signature.is_empty() {
        false
    } else {
        check_transaction_signature(state, vm, &signature, &public_key)?
    };
    if !success && vm.flags().require_null_signature_failures && !signature.is_empty() {
        return Err(VmError::NonNullSignatureFailure);
    }
    state.push_bool(success);
    Ok(())
}

pub(crate) fn op_checksigverify(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    op_checksig(state, vm)?;
    verify_top(state)
}

pub(crate) fn op_checkmultisig(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let require_minimal = vm.flags().require_minimal_encoding;
    let key_count = state.pop_number(require_minimal)?;
    if key_count < 0 || key_count as usize > MAX_MULTISIG_PUBLIC_KEYS {
        return Err(VmError::ExceededMaximumMultisigPublicKeyCount);
    }
    let key_count = key_count as usize;
    state.operation_count += key_count;
    if state.operation_count > MAX_OPERATIONS_PER_SCRIPT {
        return Err(VmError::ExceededMaximumOperationCount);
    }
    let mut public_keys = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        public_keys.push(state.pop()?);
    }
    public_keys.reverse();

    let signature_count = state.pop_number(require_minimal)?;
    if signature_count < 0 || signature_count as usize > key_count {
        return Err(VmError::InvalidMultisigSignatureCount);
    }
    let mut signatures = Vec::with_capacity(signature_count as usize);
    for _ in 0..signature_count {
        signatures.push(state.pop()?);
    }
    signatures.reverse();

    // The historic consensus bug: one extra value is consumed.
    let bug_value = state.pop()?;
    if vm.flags().require_bug_value_zero && !bug_value.is_empty() {
        return Err(VmError::InvalidProtocolBugValue);
    }
    if signatures.iter().any(|signature| signature.len() == 65) {
        return Err(VmError::SchnorrSizedSignatureInCheckMultisig);
    }

    // Signatures must match public keys in order; each key is tried once.
    let mut success = true;
    let mut signature_index = 0;
    let mut key_index = 0;
    while success && signature_index < signatures.len() {
        if signatures.len() - signature_index > public_keys.len() - key_index {
            success = false;
            break;
        }
        let signature = &signatures[signature_index];
        let public_key = &public_keys[key_index];
        if !vm.crypto().validate_public_key(public_key) {
            return Err(VmError::InvalidPublicKeyEncoding);
        }
        let matched = !signature.is_empty()
            && check_transaction_signature(state, vm, signature, public_key)?;
        if matched {
            signature_index += 1;
        }
        key_index += 1;
    }
    let success = success && signature_index == signatures.len();

    if !success
        && vm.flags().require_null_signature_failures
        && signatures.iter().any(|signature| !signature.is_empty())
    {
        return Err(VmError::NonNullSignatureFailure);
    }
    state.push_bool(success);
    Ok(())
}

pub(crate) fn op_checkmultisigverify(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    op_checkmultisig(state, vm)?;
    verify_top(state)
}

pub(crate) fn op_checkdatasig(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    let public_key = state.pop()?;
    let message = state.pop()?;
    let signature = state.pop()?;
    if !vm.crypto().validate_public_key(&public_key) {
        return Err(VmError::InvalidPublicKeyEncoding);
    }
    let success = if signature.is_empty() {
        false
    } else {
        let digest = digest32(vm.crypto().sha256(&message))?;
        if signature.len() == 64 {
            vm.crypto().verify_schnorr(&signature, &public_key, &digest)
        } else {
            if !is_valid_der_encoding(&signature) {
                return Err(VmError::InvalidSignatureEncoding);
            }
            vm.crypto().verify_ecdsa(&signature, &public_key, &digest)
        }
    };
    if !success && vm.flags().require_null_signature_failures && !signature.is_empty() {
        return Err(VmError::NonNullSignatureFailure);
    }
    state.push_bool(success);
    Ok(())
}

pub(crate) fn op_checkdatasigverify(state: &mut ProgramState, vm: &BchVm) -> OpResult {
    op_checkdatasig(state, vm)?;
    verify_top(state)
}

fn verify_top(state: &mut ProgramState) -> OpResult {
    let item = state.pop()?;
    if stack_item_is_truthy(&item) {
        Ok(())
    } else {
        Err(VmError::FailedVerify)
    }
}

/// Check a transaction signature (trailing sighash byte) against a key.
///
/// 65-byte signatures are Schnorr; anything else must be strictly DER
/// encoded. Returns the verification result; encoding violations error.
fn check_transaction_signature(
    state: &ProgramState,
    vm: &BchVm,
    signature: &[u8],
    public_key: &[u8],
) -> Result<bool, VmError> {
    let (sighash_type, body) = match signature.split_last() {
        Some((last, body)) => (*last, body),
        None => return Ok(false),
    };
    if !sighash_type_is_defined(sighash_type) {
        return Err(VmError::InvalidSignatureEncoding);
    }
    let covered = covered_bytecode(state);
    let preimage = state
        .context
        .signer
        .signing_serialization(&covered, sighash_type);
    let digest = digest32(vm.crypto().hash256(&preimage))?;
    if signature.len() == 65 {
        Ok(vm.crypto().verify_schnorr(body, public_key, &digest))
    } else {
        if !is_valid_der_encoding(body) {
            return Err(VmError::InvalidSignatureEncoding);
        }
        Ok(vm.crypto().verify_ecdsa(body, public_key, &digest))
    }
}

/// Bytecode covered by signature checks: everything after the most recently
/// executed `OP_CODESEPARATOR`, or the whole script.
fn covered_bytecode(state: &ProgramState) -> Vec<u8> {
    let start = state
        .last_code_separator
        .map_or(0, |separator| separator + 1);
    serialize_instructions(&state.instructions[start.min(state.instructions.len())..])
}

/// The sighash byte must name a base type and set the BCH fork id bit.
fn sighash_type_is_defined(sighash_type: u8) -> bool {
    let base = sighash_type & 0x3f;
    (1..=3).contains(&base) && sighash_type & 0x40 != 0
}

fn digest32(hashed: Vec<u8>) -> Result<[u8; 32], VmError> {
    <[u8; 32]>::try_from(hashed).map_err(|_| VmError::InvalidSignatureEncoding)
}

/// Strict DER validation (BIP66 shape checks; the curve math is left to the
/// collaborator).
fn is_valid_der_encoding(signature: &[u8]) -> bool {
    if signature.len() < 8 || signature.len() > 72 {
        return false;
    }
    if signature[0] != 0x30 {
        return false;
    }
    if usize::from(signature[1]) != signature.len() - 2 {
        return false;
    }
    let r_length = usize::from(signature[3]);
    if 5 + r_length >= signature.len() {
        return false;
    }
    let s_length = usize::from(signature[5 + r_length]);
    if r_length + s_length + 6 != signature.len() {
        return false;
    }
    if signature[2] != 0x02 || signature[4 + r_length] != 0x02 {
        return false;
    }
    if r_length == 0 || s_length == 0 {
        return false;
    }
    // Negative or padded integers are non-canonical.
    if signature[4] & 0x80 != 0 || signature[6 + r_length] & 0x80 != 0 {
        return false;
    }
    if r_length > 1 && signature[4] == 0x00 && signature[5] & 0x80 == 0 {
        return false;
    }
    if s_length > 1 && signature[6 + r_length] == 0x00 && signature[7 + r_length] & 0x80 == 0 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sighash_type_is_defined() {
        assert!(sighash_type_is_defined(0x41)); // ALL | FORKID
        assert!(sighash_type_is_defined(0x42)); // NONE | FORKID
        assert!(sighash_type_is_defined(0x43)); // SINGLE | FORKID
        assert!(sighash_type_is_defined(0xc1)); // ALL | FORKID | ANYONECANPAY
        assert!(!sighash_type_is_defined(0x01)); // missing FORKID
        assert!(!sighash_type_is_defined(0x40)); // no base type
        assert!(!sighash_type_is_defined(0x44));
    }

    #[test]
    fn test_der_validation() {
        // 0x30 len 0x02 rlen r 0x02 slen s
        let minimal = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01];
        assert!(is_valid_der_encoding(&minimal));

        assert!(!is_valid_der_encoding(&[]));
        assert!(!is_valid_der_encoding(&[0x30, 0x00]));
        // Wrong sequence tag.
        let mut bad = minimal;
        bad[0] = 0x31;
        assert!(!is_valid_der_encoding(&bad));
        // Negative r.
        let mut negative = minimal;
        negative[4] = 0x81;
        assert!(!is_valid_der_encoding(&negative));
        // Padded r.
        let padded = [0x30, 0x07, 0x02, 0x02, 0x00, 0x01, 0x02, 0x01, 0x01];
        assert!(!is_valid_der_encoding(&padded));
    }
}
