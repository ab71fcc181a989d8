use super::{VerifierError, VerifierErrorKind};
use crate::jvm::opcodes::{opcode_descriptor, LocalIndex, OpcodeDescription, Operands};
use byteorder::{BigEndian, ByteOrder};
use std::collections::BTreeMap;

const IINC: u8 = 0x84;

/// One decoded instruction, borrowing its bytes from the code array
///
/// For `wide` instructions, `description` is the one of the modified opcode.
#[derive(Debug, Clone, Copy)]
pub struct Instruction<'c> {
    pub position: u32,
    pub description: &'static OpcodeDescription,
    pub is_wide: bool,

    /// Every byte of the instruction, starting with the opcode (or the `wide` prefix)
    bytes: &'c [u8],
}

impl<'c> Instruction<'c> {
    /// Decode the instruction starting at `position`
    pub fn decode(code: &'c [u8], position: u32) -> Result<Instruction<'c>, VerifierErrorKind> {
        let start = position as usize;
        let opcode = *code
            .get(start)
            .ok_or(VerifierErrorKind::TruncatedInstruction)?;
        let mut description =
            opcode_descriptor(opcode).ok_or(VerifierErrorKind::InvalidOpcode(opcode))?;
        let mut is_wide = false;

        let length = match description.operands {
            Operands::Fixed(operand_bytes) => 1 + operand_bytes as usize,
            Operands::Wide => {
                let modified = *code
                    .get(start + 1)
                    .ok_or(VerifierErrorKind::TruncatedInstruction)?;
                let modified_description = opcode_descriptor(modified)
                    .ok_or(VerifierErrorKind::InvalidOpcode(modified))?;
                if !modified_description.accepts_wide() {
                    return Err(VerifierErrorKind::InvalidWideTarget(modified));
                }
                description = modified_description;
                is_wide = true;
                if modified == IINC {
                    6
                } else {
                    4
                }
            }
            Operands::TableSwitch => {
                let table = start + 1 + switch_padding(position);
                let low = read_i32(code, table + 4)?;
                let high = read_i32(code, table + 8)?;
                if high < low {
                    return Err(VerifierErrorKind::MalformedSwitch);
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                table - start + 12 + 4 * count
            }
            Operands::LookupSwitch => {
                let table = start + 1 + switch_padding(position);
                let pairs = read_i32(code, table + 4)?;
                if pairs < 0 {
                    return Err(VerifierErrorKind::MalformedSwitch);
                }
                table - start + 8 + 8 * pairs as usize
            }
        };

        let bytes = code
            .get(start..start + length)
            .ok_or(VerifierErrorKind::TruncatedInstruction)?;
        Ok(Instruction {
            position,
            description,
            is_wide,
            bytes,
        })
    }

    /// Length in bytes, including the opcode and any `wide` prefix
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    /// Position of the instruction which follows in the code array
    pub fn next_position(&self) -> u32 {
        self.position + self.len()
    }

    pub fn mnemonic(&self) -> &'static str {
        self.description.mnemonic
    }

    /// Bytes after the opcode (after the modified opcode for `wide`)
    fn operands(&self) -> &'c [u8] {
        let skip = if self.is_wide { 2 } else { 1 };
        &self.bytes[skip..]
    }

    pub fn u8_operand(&self, offset: usize) -> u8 {
        self.operands()[offset]
    }

    pub fn u16_operand(&self, offset: usize) -> u16 {
        BigEndian::read_u16(&self.operands()[offset..])
    }

    /// Local variable touched by the instruction, if any
    pub fn local_index(&self) -> Option<u16> {
        let access = self.description.local?;
        Some(match access.index {
            LocalIndex::Fixed(index) => index as u16,
            LocalIndex::Operand if self.is_wide => self.u16_operand(0),
            LocalIndex::Operand => self.u8_operand(0) as u16,
        })
    }

    /// Signed offset of a jump, relative to the start of the instruction
    pub fn branch_offset(&self) -> i32 {
        if self.description.is_wide_branch() {
            BigEndian::read_i32(self.operands())
        } else {
            BigEndian::read_i16(self.operands()) as i32
        }
    }

    pub fn branch_target(&self) -> i64 {
        self.position as i64 + self.branch_offset() as i64
    }

    /// Default target followed by every other target of a `tableswitch` or `lookupswitch`
    ///
    /// Targets are absolute positions, but may not have been checked to be inside the code.
    pub fn switch_targets(&self) -> Vec<i64> {
        let table = &self.bytes[1 + switch_padding(self.position)..];
        let absolute = |offset: &[u8]| self.position as i64 + BigEndian::read_i32(offset) as i64;

        let mut targets = vec![absolute(table)];
        match self.description.operands {
            Operands::TableSwitch => {
                let offsets = &table[12..];
                targets.extend(offsets.chunks_exact(4).map(absolute));
            }
            Operands::LookupSwitch => {
                let pairs = &table[8..];
                targets.extend(pairs.chunks_exact(8).map(|pair| absolute(&pair[4..])));
            }
            Operands::Fixed(_) | Operands::Wide => (),
        }
        targets
    }
}

/// Bytes of padding after a switch opcode, so that the table starts on a multiple of 4
fn switch_padding(position: u32) -> usize {
    (4 - (position as usize + 1) % 4) % 4
}

fn read_i32(code: &[u8], at: usize) -> Result<i32, VerifierErrorKind> {
    code.get(at..at + 4)
        .map(BigEndian::read_i32)
        .ok_or(VerifierErrorKind::TruncatedInstruction)
}

/// Decode every instruction in the code array
///
/// The keys of the map are exactly the valid instruction boundaries.
pub fn decode_all(code: &[u8]) -> Result<BTreeMap<u32, Instruction<'_>>, VerifierError> {
    let mut instructions = BTreeMap::new();
    let mut position = 0;
    while (position as usize) < code.len() {
        let instruction = Instruction::decode(code, position).map_err(|kind| kind.at(position))?;
        position = instruction.next_position();
        instructions.insert(instruction.position, instruction);
    }
    Ok(instructions)
}
