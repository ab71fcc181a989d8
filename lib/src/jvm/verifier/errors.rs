use super::VerificationType;
use crate::jvm::opcodes::LocalKind;
use std::fmt;

/// Rejection of a method body, along with the offset of the instruction at fault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierError {
    pub position: u32,
    pub kind: VerifierErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    /// Popping from an empty stack
    StackUnderflow,

    /// Pushing onto a full stack
    StackOverflow { max_stack: u16 },

    /// Value on the stack does not have the kind the instruction expects
    StackTypeMismatch {
        expected: String,
        found: VerificationType,
    },

    LocalIndexOutOfRange { index: u16, max_locals: u16 },

    /// Local does not hold (or cannot be overwritten with) the instruction's kind of value
    LocalTypeMismatch {
        index: u16,
        expected: LocalKind,
        found: VerificationType,
    },

    /// Local has not been assigned on every path reaching the instruction
    UninitializedRead { index: u16 },

    /// Value is `top` (produced by an earlier failed join)
    UnreachableValueUse,

    /// Different stack heights reaching the same instruction
    HeightMismatchAtMerge { existing: u16, incoming: u16 },

    /// Slot types reaching the same instruction which have no common type
    IncompatibleMerge {
        slot: usize,
        existing: VerificationType,
        incoming: VerificationType,
    },

    /// Return instruction does not match the return type of the method
    ReturnTypeMismatch {
        declared: String,
        mnemonic: &'static str,
    },

    /// Byte which is not an assigned opcode
    InvalidOpcode(u8),

    /// Instruction extends past the end of the code
    TruncatedInstruction,

    /// `wide` applied to an opcode it can't modify
    InvalidWideTarget(u8),

    /// `tableswitch` with `high < low` or `lookupswitch` with a negative pair count
    MalformedSwitch,

    /// `jsr`, `jsr_w`, or `ret`
    UnsupportedOpcode(&'static str),

    /// Jump target which is not the start of an instruction
    InvalidBranchTarget(i64),

    /// Execution can run past the last instruction
    FallsOffCode,

    /// Constant pool operand is missing or has the wrong shape
    UnresolvableOperand { index: u16, reason: String },

    /// Method descriptor could not be parsed
    BadDescriptor(String),

    /// `Code` attribute could not be decoded
    MalformedCode(String),

    /// Stack effect string could not be parsed
    MalformedSignature(String),
}

impl VerifierErrorKind {
    pub fn at(self, position: u32) -> VerifierError {
        VerifierError {
            position,
            kind: self,
        }
    }
}

impl fmt::Display for VerifierErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierErrorKind::StackUnderflow => f.write_str("stack underflow"),
            VerifierErrorKind::StackOverflow { max_stack } => {
                write!(f, "stack overflow (max stack is {})", max_stack)
            }
            VerifierErrorKind::StackTypeMismatch { expected, found } => {
                write!(f, "expected {} on the stack, found {}", expected, found)
            }
            VerifierErrorKind::LocalIndexOutOfRange { index, max_locals } => {
                write!(f, "local {} is out of range (max locals is {})", index, max_locals)
            }
            VerifierErrorKind::LocalTypeMismatch {
                index,
                expected,
                found,
            } => write!(f, "expected {} in local {}, found {}", expected, index, found),
            VerifierErrorKind::UninitializedRead { index } => {
                write!(f, "local {} may be read before being assigned", index)
            }
            VerifierErrorKind::UnreachableValueUse => f.write_str("use of an unusable value"),
            VerifierErrorKind::HeightMismatchAtMerge { existing, incoming } => write!(
                f,
                "stack heights {} and {} meet at the same instruction",
                existing, incoming
            ),
            VerifierErrorKind::IncompatibleMerge {
                slot,
                existing,
                incoming,
            } => write!(
                f,
                "slot {} cannot be both {} and {}",
                slot, existing, incoming
            ),
            VerifierErrorKind::ReturnTypeMismatch { declared, mnemonic } => write!(
                f,
                "{} in a method returning {}",
                mnemonic, declared
            ),
            VerifierErrorKind::InvalidOpcode(opcode) => write!(f, "invalid opcode 0x{:02x}", opcode),
            VerifierErrorKind::TruncatedInstruction => {
                f.write_str("instruction runs past the end of the code")
            }
            VerifierErrorKind::InvalidWideTarget(opcode) => {
                write!(f, "wide cannot modify opcode 0x{:02x}", opcode)
            }
            VerifierErrorKind::MalformedSwitch => f.write_str("malformed switch"),
            VerifierErrorKind::UnsupportedOpcode(mnemonic) => {
                write!(f, "{} is not supported", mnemonic)
            }
            VerifierErrorKind::InvalidBranchTarget(target) => {
                write!(f, "branch target {} is not an instruction", target)
            }
            VerifierErrorKind::FallsOffCode => f.write_str("execution falls off the end of the code"),
            VerifierErrorKind::UnresolvableOperand { index, reason } => {
                write!(f, "cannot resolve operand #{}: {}", index, reason)
            }
            VerifierErrorKind::BadDescriptor(msg) => write!(f, "malformed descriptor: {}", msg),
            VerifierErrorKind::MalformedCode(msg) => write!(f, "malformed code: {}", msg),
            VerifierErrorKind::MalformedSignature(msg) => {
                write!(f, "malformed stack effect: {}", msg)
            }
        }
    }
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}: {}", self.position, self.kind)
    }
}

impl std::error::Error for VerifierError {}
