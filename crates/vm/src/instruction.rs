//! Bytecode instruction codec.
//!
//! Parsing never fails: a push whose declared length runs past the end of the
//! bytecode becomes a final [`Instruction::MalformedPush`], and well-formedness
//! is a property of the parsed list ([`instructions_are_malformed`]).

use serde::{Deserialize, Serialize};

use crate::opcodes;

/// A single parsed script instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// A non-push operation.
    Op { opcode: u8 },
    /// A push operation and its payload.
    Push { opcode: u8, data: Vec<u8> },
    /// A final, truncated push: the declared payload (or the PUSHDATA length
    /// field itself, when `expected` is `None`) exceeds the remaining bytes.
    MalformedPush {
        opcode: u8,
        expected: Option<usize>,
        data: Vec<u8>,
    },
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Op { opcode }
            | Instruction::Push { opcode, .. }
            | Instruction::MalformedPush { opcode, .. } => *opcode,
        }
    }
}

/// Parse bytecode into instructions.
///
/// Only the final instruction can be malformed; parsing stops there.
pub fn parse_bytecode(bytecode: &[u8]) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut cursor = 0;
    while cursor < bytecode.len() {
        let opcode = bytecode[cursor];
        cursor += 1;
        if !opcodes::is_push(opcode) {
            instructions.push(Instruction::Op { opcode });
            continue;
        }
        let length_bytes = push_length_field_size(opcode);
        if bytecode.len() - cursor < length_bytes {
            instructions.push(Instruction::MalformedPush {
                opcode,
                expected: None,
                data: bytecode[cursor..].to_vec(),
            });
            return instructions;
        }
        let expected = if length_bytes == 0 {
            usize::from(opcode)
        } else {
            read_le(&bytecode[cursor..cursor + length_bytes])
        };
        cursor += length_bytes;
        if bytecode.len() - cursor < expected {
            instructions.push(Instruction::MalformedPush {
                opcode,
                expected: Some(expected),
                data: bytecode[cursor..].to_vec(),
            });
            return instructions;
        }
        instructions.push(Instruction::Push {
            opcode,
            data: bytecode[cursor..cursor + expected].to_vec(),
        });
        cursor += expected;
    }
    instructions
}

/// Whether the parsed list ends in a truncated push.
pub fn instructions_are_malformed(instructions: &[Instruction]) -> bool {
    matches!(
        instructions.last(),
        Some(Instruction::MalformedPush { .. })
    )
}

/// Serialize instructions back to bytecode. Inverse of [`parse_bytecode`]
/// for well-formed lists; malformed pushes serialize best-effort.
pub fn serialize_instructions(instructions: &[Instruction]) -> Vec<u8> {
    let mut bytecode = Vec::new();
    for instruction in instructions {
        match instruction {
            Instruction::Op { opcode } => bytecode.push(*opcode),
            Instruction::Push { opcode, data } => {
                bytecode.push(*opcode);
                bytecode.extend_from_slice(&push_length_field(*opcode, data.len()));
                bytecode.extend_from_slice(data);
            }
            Instruction::MalformedPush {
                opcode,
                expected,
                data,
            } => {
                bytecode.push(*opcode);
                if let Some(expected) = expected {
                    bytecode.extend_from_slice(&push_length_field(*opcode, *expected));
                }
                bytecode.extend_from_slice(data);
            }
        }
    }
    bytecode
}

/// Encode a payload as the minimal data push.
///
/// The empty payload becomes `OP_0` and single bytes `1..=16` become the
/// matching `OP_N`; everything else uses the smallest direct or PUSHDATA form.
pub fn encode_data_push(data: &[u8]) -> Vec<u8> {
    match data.len() {
        0 => vec![opcodes::OP_0],
        1 if (1..=16).contains(&data[0]) => vec![opcodes::OP_1 + data[0] - 1],
        length @ 1..=75 => {
            let mut encoded = vec![length as u8];
            encoded.extend_from_slice(data);
            encoded
        }
        length @ 76..=255 => {
            let mut encoded = vec![opcodes::OP_PUSHDATA1, length as u8];
            encoded.extend_from_slice(data);
            encoded
        }
        length @ 256..=65535 => {
            let mut encoded = vec![opcodes::OP_PUSHDATA2];
            encoded.extend_from_slice(&(length as u16).to_le_bytes());
            encoded.extend_from_slice(data);
            encoded
        }
        length => {
            let mut encoded = vec![opcodes::OP_PUSHDATA4];
            encoded.extend_from_slice(&(length as u32).to_le_bytes());
            encoded.extend_from_slice(data);
            encoded
        }
    }
}

/// Whether a parsed push used the minimal opcode for its payload.
///
/// Unlike [`encode_data_push`], the consensus rule also admits `OP_1NEGATE`
/// for the single byte `0x81`.
pub fn push_is_minimal(opcode: u8, data: &[u8]) -> bool {
    match data.len() {
        0 => opcode == opcodes::OP_0,
        1 if (1..=16).contains(&data[0]) => opcode == opcodes::OP_1 + data[0] - 1,
        1 if data[0] == 0x81 => opcode == opcodes::OP_1NEGATE,
        length @ 1..=75 => opcode == length as u8,
        length @ 76..=255 => opcode == opcodes::OP_PUSHDATA1,
        length @ 256..=65535 => opcode == opcodes::OP_PUSHDATA2,
        _ => opcode == opcodes::OP_PUSHDATA4,
    }
}

/// Whether every instruction is below the push-only threshold (`OP_16`).
pub fn is_push_only(instructions: &[Instruction]) -> bool {
    instructions
        .iter()
        .all(|instruction| instruction.opcode() < opcodes::OP_16)
}

/// Render instructions in the conventional `OP_…`/hex notation.
pub fn disassemble_instructions(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(|instruction| match instruction {
            Instruction::Op { opcode } => opcode_name(*opcode),
            Instruction::Push { opcode, data } => {
                if data.is_empty() {
                    opcode_name(*opcode)
                } else {
                    format!("{} 0x{}", opcode_name(*opcode), hex::encode(data))
                }
            }
            Instruction::MalformedPush {
                opcode,
                expected,
                data,
            } => {
                let missing = expected
                    .map(|expected| expected - data.len())
                    .unwrap_or(push_length_field_size(*opcode));
                if data.is_empty() {
                    format!("{} [missing {} bytes]", opcode_name(*opcode), missing)
                } else {
                    format!(
                        "{} 0x{} [missing {} bytes]",
                        opcode_name(*opcode),
                        hex::encode(data),
                        missing
                    )
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render raw bytecode in the conventional `OP_…`/hex notation.
pub fn disassemble_bytecode(bytecode: &[u8]) -> String {
    disassemble_instructions(&parse_bytecode(bytecode))
}

fn opcode_name(opcode: u8) -> String {
    match opcodes::name(opcode) {
        Some(name) => name.to_string(),
        None => format!("OP_UNKNOWN_0x{opcode:02x}"),
    }
}

fn push_length_field_size(opcode: u8) -> usize {
    match opcode {
        opcodes::OP_PUSHDATA1 => 1,
        opcodes::OP_PUSHDATA2 => 2,
        opcodes::OP_PUSHDATA4 => 4,
        _ => 0,
    }
}

fn push_length_field(opcode: u8, length: usize) -> Vec<u8> {
    match opcode {
        opcodes::OP_PUSHDATA1 => vec![length as u8],
        opcodes::OP_PUSHDATA2 => (length as u16).to_le_bytes().to_vec(),
        opcodes::OP_PUSHDATA4 => (length as u32).to_le_bytes().to_vec(),
        _ => Vec::new(),
    }
}

fn read_le(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .enumerate()
        .fold(0usize, |accumulated, (index, byte)| {
            accumulated | (usize::from(*byte) << (8 * index))
        })
}
