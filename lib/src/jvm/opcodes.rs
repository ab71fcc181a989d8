//! Static description of every JVM opcode
//!
//! The verifier never matches on opcode bytes: everything it needs to know about an instruction
//! (how long it is, what it does to the stack, where control goes next, which local it touches)
//! is looked up in [`OPCODES`].
//!
//! Stack effects are written as signature strings of the form `pops>pushes`, both sides in stack
//! order (deepest first):
//!
//!   - `I`, `F`, `J`, `D` are `int`, `float`, `long`, `double` (`B`, `C`, `S`, `Z` read as `I`)
//!   - `A` is any reference, `N` is `null`, `*` is any single slot
//!   - `L<name>;` and `[<component>` are reference types
//!   - `1`-`9` (pushes only) copy the n-th popped value
//!   - `E` (pushes only) is the component type of the first popped array
//!
//! Opcodes whose effect depends on the constant pool (field accesses, invocations, `new`, ...)
//! have a [`SymbolicOperand`] instead and get their signature rendered on demand.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

use crate::util::Width;
use std::fmt;
use LocalKind::{Double as D, Float as F, Int as I, Long as J, Reference as A};
use SymbolicOperand as Sym;

/// Layout of the bytes that follow the opcode
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Operands {
    /// Fixed number of operand bytes
    Fixed(u8),

    /// Padding to a 4-byte boundary, default, low, high, then `high - low + 1` offsets
    TableSwitch,

    /// Padding to a 4-byte boundary, default, count, then `count` match-offset pairs
    LookupSwitch,

    /// Modified opcode, then a 2-byte local index (and a 2-byte constant for `iinc`)
    Wide,
}

/// Where control can go after the instruction
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Flow {
    /// Only the next instruction
    Next,

    /// Next instruction or the branch target
    Branch,

    /// Only the branch target
    Goto,

    /// Leaves the method
    Return,

    /// Leaves the method (or goes to an exception handler)
    Throw,

    /// Every target of a `tableswitch` or `lookupswitch`
    Switch,

    /// `jsr`, `jsr_w`, and `ret`
    Subroutine,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LocalKind {
    Int,
    Float,
    Long,
    Double,
    Reference,
}

impl Width for LocalKind {
    fn width(&self) -> usize {
        match self {
            LocalKind::Long | LocalKind::Double => 2,
            LocalKind::Int | LocalKind::Float | LocalKind::Reference => 1,
        }
    }
}

impl fmt::Display for LocalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LocalKind::Int => "int",
            LocalKind::Float => "float",
            LocalKind::Long => "long",
            LocalKind::Double => "double",
            LocalKind::Reference => "reference",
        })
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LocalMode {
    Load,
    Store,
    Increment,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LocalIndex {
    /// Index is the first operand (one byte, or two bytes after `wide`)
    Operand,

    /// Index is part of the opcode (eg. `iload_2`)
    Fixed(u8),
}

/// Local variable read or written by an instruction
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LocalAccess {
    pub kind: LocalKind,
    pub mode: LocalMode,
    pub index: LocalIndex,
}

/// Operand which must be looked up (usually in the constant pool) to know the stack effect
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SymbolicOperand {
    /// `ldc`: one byte index of an int, float, string, class, method type/handle, or dynamic
    LoadConstant,

    /// `ldc_w`: same as `ldc`, but with a two byte index
    LoadConstantWideIndex,

    /// `ldc2_w`: two byte index of a long, double, or dynamic constant of those types
    LoadLongOrDouble,

    GetStatic,
    PutStatic,
    GetField,
    PutField,
    InvokeVirtual,
    InvokeSpecial,
    InvokeStatic,
    InvokeInterface,
    InvokeDynamic,
    New,

    /// `newarray`: the operand is an array type code, not a constant
    NewArray,
    ANewArray,
    CheckCast,
    InstanceOf,
    MultiANewArray,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct OpcodeDescription {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub operands: Operands,

    /// Stack effect (empty for instructions with a symbolic operand)
    pub signature: &'static str,
    pub flow: Flow,
    pub local: Option<LocalAccess>,
    pub symbolic: Option<SymbolicOperand>,
}

impl OpcodeDescription {
    /// Number of operand bytes, if that doesn't depend on the instruction's encoding
    pub fn inline_operand_length(&self) -> Option<usize> {
        match self.operands {
            Operands::Fixed(length) => Some(length as usize),
            Operands::TableSwitch | Operands::LookupSwitch | Operands::Wide => None,
        }
    }

    /// Conditional or unconditional jump with a single target
    pub fn is_branch(&self) -> bool {
        matches!(self.flow, Flow::Branch | Flow::Goto)
    }

    /// Jump whose target is encoded with four bytes instead of two
    pub fn is_wide_branch(&self) -> bool {
        matches!(self.flow, Flow::Branch | Flow::Goto | Flow::Subroutine)
            && self.operands == Operands::Fixed(4)
    }

    pub fn is_return(&self) -> bool {
        self.flow == Flow::Return
    }

    /// Can the `wide` prefix be applied to this opcode?
    pub fn accepts_wide(&self) -> bool {
        match self.local {
            Some(access) => access.index == LocalIndex::Operand,
            None => self.opcode == RET,
        }
    }

    const fn with_operands(mut self, operands: Operands) -> Self {
        self.operands = operands;
        self
    }

    const fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    const fn with_local(mut self, kind: LocalKind, mode: LocalMode, index: LocalIndex) -> Self {
        self.local = Some(LocalAccess { kind, mode, index });
        self
    }

    const fn with_symbolic(mut self, symbolic: SymbolicOperand, operand_bytes: u8) -> Self {
        self.symbolic = Some(symbolic);
        self.operands = Operands::Fixed(operand_bytes);
        self
    }
}

impl fmt::Display for OpcodeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)
    }
}

/// Look up the description of an opcode (`None` for the unassigned and reserved bytes)
pub fn opcode_descriptor(opcode: u8) -> Option<&'static OpcodeDescription> {
    OPCODES.get(opcode as usize)
}

pub const WIDE: u8 = 0xc4;
pub const RET: u8 = 0xa9;

const fn op(opcode: u8, mnemonic: &'static str, signature: &'static str) -> OpcodeDescription {
    OpcodeDescription {
        opcode,
        mnemonic,
        operands: Operands::Fixed(0),
        signature,
        flow: Flow::Next,
        local: None,
        symbolic: None,
    }
}

const fn load(
    opcode: u8,
    mnemonic: &'static str,
    signature: &'static str,
    kind: LocalKind,
    index: Option<u8>,
) -> OpcodeDescription {
    local(op(opcode, mnemonic, signature), kind, LocalMode::Load, index)
}

const fn store(
    opcode: u8,
    mnemonic: &'static str,
    signature: &'static str,
    kind: LocalKind,
    index: Option<u8>,
) -> OpcodeDescription {
    local(op(opcode, mnemonic, signature), kind, LocalMode::Store, index)
}

/// Local index is either fixed by the opcode or a one byte operand
const fn local(
    description: OpcodeDescription,
    kind: LocalKind,
    mode: LocalMode,
    index: Option<u8>,
) -> OpcodeDescription {
    match index {
        Some(n) => description.with_local(kind, mode, LocalIndex::Fixed(n)),
        None => description
            .with_operands(Operands::Fixed(1))
            .with_local(kind, mode, LocalIndex::Operand),
    }
}

const fn branch(opcode: u8, mnemonic: &'static str, signature: &'static str) -> OpcodeDescription {
    op(opcode, mnemonic, signature)
        .with_operands(Operands::Fixed(2))
        .with_flow(Flow::Branch)
}

const fn symbolic(
    opcode: u8,
    mnemonic: &'static str,
    symbolic: SymbolicOperand,
    operand_bytes: u8,
) -> OpcodeDescription {
    op(opcode, mnemonic, "").with_symbolic(symbolic, operand_bytes)
}

/// Every assigned opcode, indexed by opcode byte
#[rustfmt::skip]
pub static OPCODES: [OpcodeDescription; 202] = [
    op(0x00, "nop", ""),
    op(0x01, "aconst_null", ">N"),
    op(0x02, "iconst_m1", ">I"),
    op(0x03, "iconst_0", ">I"),
    op(0x04, "iconst_1", ">I"),
    op(0x05, "iconst_2", ">I"),
    op(0x06, "iconst_3", ">I"),
    op(0x07, "iconst_4", ">I"),
    op(0x08, "iconst_5", ">I"),
    op(0x09, "lconst_0", ">J"),
    op(0x0a, "lconst_1", ">J"),
    op(0x0b, "fconst_0", ">F"),
    op(0x0c, "fconst_1", ">F"),
    op(0x0d, "fconst_2", ">F"),
    op(0x0e, "dconst_0", ">D"),
    op(0x0f, "dconst_1", ">D"),
    op(0x10, "bipush", ">I").with_operands(Operands::Fixed(1)),
    op(0x11, "sipush", ">I").with_operands(Operands::Fixed(2)),
    symbolic(0x12, "ldc", Sym::LoadConstant, 1),
    symbolic(0x13, "ldc_w", Sym::LoadConstantWideIndex, 2),
    symbolic(0x14, "ldc2_w", Sym::LoadLongOrDouble, 2),
    load(0x15, "iload", ">I", I, None),
    load(0x16, "lload", ">J", J, None),
    load(0x17, "fload", ">F", F, None),
    load(0x18, "dload", ">D", D, None),
    load(0x19, "aload", ">A", A, None),
    load(0x1a, "iload_0", ">I", I, Some(0)),
    load(0x1b, "iload_1", ">I", I, Some(1)),
    load(0x1c, "iload_2", ">I", I, Some(2)),
    load(0x1d, "iload_3", ">I", I, Some(3)),
    load(0x1e, "lload_0", ">J", J, Some(0)),
    load(0x1f, "lload_1", ">J", J, Some(1)),
    load(0x20, "lload_2", ">J", J, Some(2)),
    load(0x21, "lload_3", ">J", J, Some(3)),
    load(0x22, "fload_0", ">F", F, Some(0)),
    load(0x23, "fload_1", ">F", F, Some(1)),
    load(0x24, "fload_2", ">F", F, Some(2)),
    load(0x25, "fload_3", ">F", F, Some(3)),
    load(0x26, "dload_0", ">D", D, Some(0)),
    load(0x27, "dload_1", ">D", D, Some(1)),
    load(0x28, "dload_2", ">D", D, Some(2)),
    load(0x29, "dload_3", ">D", D, Some(3)),
    load(0x2a, "aload_0", ">A", A, Some(0)),
    load(0x2b, "aload_1", ">A", A, Some(1)),
    load(0x2c, "aload_2", ">A", A, Some(2)),
    load(0x2d, "aload_3", ">A", A, Some(3)),
    op(0x2e, "iaload", "AI>I"),
    op(0x2f, "laload", "AI>J"),
    op(0x30, "faload", "AI>F"),
    op(0x31, "daload", "AI>D"),
    op(0x32, "aaload", "AI>E"),
    op(0x33, "baload", "AI>I"),
    op(0x34, "caload", "AI>I"),
    op(0x35, "saload", "AI>I"),
    store(0x36, "istore", "I>", I, None),
    store(0x37, "lstore", "J>", J, None),
    store(0x38, "fstore", "F>", F, None),
    store(0x39, "dstore", "D>", D, None),
    store(0x3a, "astore", "A>", A, None),
    store(0x3b, "istore_0", "I>", I, Some(0)),
    store(0x3c, "istore_1", "I>", I, Some(1)),
    store(0x3d, "istore_2", "I>", I, Some(2)),
    store(0x3e, "istore_3", "I>", I, Some(3)),
    store(0x3f, "lstore_0", "J>", J, Some(0)),
    store(0x40, "lstore_1", "J>", J, Some(1)),
    store(0x41, "lstore_2", "J>", J, Some(2)),
    store(0x42, "lstore_3", "J>", J, Some(3)),
    store(0x43, "fstore_0", "F>", F, Some(0)),
    store(0x44, "fstore_1", "F>", F, Some(1)),
    store(0x45, "fstore_2", "F>", F, Some(2)),
    store(0x46, "fstore_3", "F>", F, Some(3)),
    store(0x47, "dstore_0", "D>", D, Some(0)),
    store(0x48, "dstore_1", "D>", D, Some(1)),
    store(0x49, "dstore_2", "D>", D, Some(2)),
    store(0x4a, "dstore_3", "D>", D, Some(3)),
    store(0x4b, "astore_0", "A>", A, Some(0)),
    store(0x4c, "astore_1", "A>", A, Some(1)),
    store(0x4d, "astore_2", "A>", A, Some(2)),
    store(0x4e, "astore_3", "A>", A, Some(3)),
    op(0x4f, "iastore", "AII>"),
    op(0x50, "lastore", "AIJ>"),
    op(0x51, "fastore", "AIF>"),
    op(0x52, "dastore", "AID>"),
    op(0x53, "aastore", "AIA>"),
    op(0x54, "bastore", "AII>"),
    op(0x55, "castore", "AII>"),
    op(0x56, "sastore", "AII>"),
    op(0x57, "pop", "*>"),
    op(0x58, "pop2", "**>"),
    op(0x59, "dup", "*>11"),
    op(0x5a, "dup_x1", "**>212"),
    op(0x5b, "dup_x2", "***>3123"),
    op(0x5c, "dup2", "**>1212"),
    op(0x5d, "dup2_x1", "***>23123"),
    op(0x5e, "dup2_x2", "****>341234"),
    op(0x5f, "swap", "**>21"),
    op(0x60, "iadd", "II>I"),
    op(0x61, "ladd", "JJ>J"),
    op(0x62, "fadd", "FF>F"),
    op(0x63, "dadd", "DD>D"),
    op(0x64, "isub", "II>I"),
    op(0x65, "lsub", "JJ>J"),
    op(0x66, "fsub", "FF>F"),
    op(0x67, "dsub", "DD>D"),
    op(0x68, "imul", "II>I"),
    op(0x69, "lmul", "JJ>J"),
    op(0x6a, "fmul", "FF>F"),
    op(0x6b, "dmul", "DD>D"),
    op(0x6c, "idiv", "II>I"),
    op(0x6d, "ldiv", "JJ>J"),
    op(0x6e, "fdiv", "FF>F"),
    op(0x6f, "ddiv", "DD>D"),
    op(0x70, "irem", "II>I"),
    op(0x71, "lrem", "JJ>J"),
    op(0x72, "frem", "FF>F"),
    op(0x73, "drem", "DD>D"),
    op(0x74, "ineg", "I>I"),
    op(0x75, "lneg", "J>J"),
    op(0x76, "fneg", "F>F"),
    op(0x77, "dneg", "D>D"),
    op(0x78, "ishl", "II>I"),
    op(0x79, "lshl", "JI>J"),
    op(0x7a, "ishr", "II>I"),
    op(0x7b, "lshr", "JI>J"),
    op(0x7c, "iushr", "II>I"),
    op(0x7d, "lushr", "JI>J"),
    op(0x7e, "iand", "II>I"),
    op(0x7f, "land", "JJ>J"),
    op(0x80, "ior", "II>I"),
    op(0x81, "lor", "JJ>J"),
    op(0x82, "ixor", "II>I"),
    op(0x83, "lxor", "JJ>J"),
    op(0x84, "iinc", "").with_operands(Operands::Fixed(2)).with_local(I, LocalMode::Increment, LocalIndex::Operand),
    op(0x85, "i2l", "I>J"),
    op(0x86, "i2f", "I>F"),
    op(0x87, "i2d", "I>D"),
    op(0x88, "l2i", "J>I"),
    op(0x89, "l2f", "J>F"),
    op(0x8a, "l2d", "J>D"),
    op(0x8b, "f2i", "F>I"),
    op(0x8c, "f2l", "F>J"),
    op(0x8d, "f2d", "F>D"),
    op(0x8e, "d2i", "D>I"),
    op(0x8f, "d2l", "D>J"),
    op(0x90, "d2f", "D>F"),
    op(0x91, "i2b", "I>I"),
    op(0x92, "i2c", "I>I"),
    op(0x93, "i2s", "I>I"),
    op(0x94, "lcmp", "JJ>I"),
    op(0x95, "fcmpl", "FF>I"),
    op(0x96, "fcmpg", "FF>I"),
    op(0x97, "dcmpl", "DD>I"),
    op(0x98, "dcmpg", "DD>I"),
    branch(0x99, "ifeq", "I>"),
    branch(0x9a, "ifne", "I>"),
    branch(0x9b, "iflt", "I>"),
    branch(0x9c, "ifge", "I>"),
    branch(0x9d, "ifgt", "I>"),
    branch(0x9e, "ifle", "I>"),
    branch(0x9f, "if_icmpeq", "II>"),
    branch(0xa0, "if_icmpne", "II>"),
    branch(0xa1, "if_icmplt", "II>"),
    branch(0xa2, "if_icmpge", "II>"),
    branch(0xa3, "if_icmpgt", "II>"),
    branch(0xa4, "if_icmple", "II>"),
    branch(0xa5, "if_acmpeq", "AA>"),
    branch(0xa6, "if_acmpne", "AA>"),
    branch(0xa7, "goto", "").with_flow(Flow::Goto),
    branch(0xa8, "jsr", "").with_flow(Flow::Subroutine),
    op(0xa9, "ret", "").with_operands(Operands::Fixed(1)).with_flow(Flow::Subroutine),
    op(0xaa, "tableswitch", "I>").with_operands(Operands::TableSwitch).with_flow(Flow::Switch),
    op(0xab, "lookupswitch", "I>").with_operands(Operands::LookupSwitch).with_flow(Flow::Switch),
    op(0xac, "ireturn", "I>").with_flow(Flow::Return),
    op(0xad, "lreturn", "J>").with_flow(Flow::Return),
    op(0xae, "freturn", "F>").with_flow(Flow::Return),
    op(0xaf, "dreturn", "D>").with_flow(Flow::Return),
    op(0xb0, "areturn", "A>").with_flow(Flow::Return),
    op(0xb1, "return", "").with_flow(Flow::Return),
    symbolic(0xb2, "getstatic", Sym::GetStatic, 2),
    symbolic(0xb3, "putstatic", Sym::PutStatic, 2),
    symbolic(0xb4, "getfield", Sym::GetField, 2),
    symbolic(0xb5, "putfield", Sym::PutField, 2),
    symbolic(0xb6, "invokevirtual", Sym::InvokeVirtual, 2),
    symbolic(0xb7, "invokespecial", Sym::InvokeSpecial, 2),
    symbolic(0xb8, "invokestatic", Sym::InvokeStatic, 2),
    symbolic(0xb9, "invokeinterface", Sym::InvokeInterface, 4),
    symbolic(0xba, "invokedynamic", Sym::InvokeDynamic, 4),
    symbolic(0xbb, "new", Sym::New, 2),
    symbolic(0xbc, "newarray", Sym::NewArray, 1),
    symbolic(0xbd, "anewarray", Sym::ANewArray, 2),
    op(0xbe, "arraylength", "A>I"),
    op(0xbf, "athrow", "A>").with_flow(Flow::Throw),
    symbolic(0xc0, "checkcast", Sym::CheckCast, 2),
    symbolic(0xc1, "instanceof", Sym::InstanceOf, 2),
    op(0xc2, "monitorenter", "A>"),
    op(0xc3, "monitorexit", "A>"),
    op(WIDE, "wide", "").with_operands(Operands::Wide),
    symbolic(0xc5, "multianewarray", Sym::MultiANewArray, 3),
    branch(0xc6, "ifnull", "A>"),
    branch(0xc7, "ifnonnull", "A>"),
    branch(0xc8, "goto_w", "").with_operands(Operands::Fixed(4)).with_flow(Flow::Goto),
    branch(0xc9, "jsr_w", "").with_operands(Operands::Fixed(4)).with_flow(Flow::Subroutine),
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::verifier::Signature;

    #[test]
    fn table_is_indexed_by_opcode() {
        for (index, description) in OPCODES.iter().enumerate() {
            assert_eq!(
                description.opcode as usize, index,
                "{} is at the wrong index",
                description.mnemonic
            );
            assert!(
                Signature::parse(description.signature).is_ok(),
                "{} has a malformed signature {:?}",
                description.mnemonic,
                description.signature
            );
            if description.symbolic.is_some() {
                assert_eq!(description.signature, "", "{}", description.mnemonic);
            }
        }
        assert!(opcode_descriptor(0xc9).is_some());
        assert!(opcode_descriptor(0xca).is_none());
        assert!(opcode_descriptor(0xff).is_none());
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut mnemonics: Vec<&str> = OPCODES.iter().map(|op| op.mnemonic).collect();
        mnemonics.sort_unstable();
        mnemonics.dedup();
        assert_eq!(mnemonics.len(), OPCODES.len());
    }

    #[test]
    fn branch_classification() {
        let ifeq = opcode_descriptor(0x99).unwrap();
        assert!(ifeq.is_branch() && !ifeq.is_wide_branch() && !ifeq.is_return());
        assert_eq!(ifeq.inline_operand_length(), Some(2));

        let goto_w = opcode_descriptor(0xc8).unwrap();
        assert!(goto_w.is_branch() && goto_w.is_wide_branch());
        assert_eq!(goto_w.inline_operand_length(), Some(4));

        let ireturn = opcode_descriptor(0xac).unwrap();
        assert!(ireturn.is_return() && !ireturn.is_branch());

        let tableswitch = opcode_descriptor(0xaa).unwrap();
        assert_eq!(tableswitch.inline_operand_length(), None);
        assert!(!tableswitch.is_branch());
    }

    #[test]
    fn wide_targets() {
        let accepting: Vec<&str> = OPCODES
            .iter()
            .filter(|op| op.accepts_wide())
            .map(|op| op.mnemonic)
            .collect();
        assert_eq!(
            accepting,
            vec![
                "iload", "lload", "fload", "dload", "aload", "istore", "lstore", "fstore",
                "dstore", "astore", "iinc", "ret"
            ]
        );
    }

    #[test]
    fn local_access() {
        let lstore_2 = opcode_descriptor(0x41).unwrap();
        assert_eq!(
            lstore_2.local,
            Some(LocalAccess {
                kind: LocalKind::Long,
                mode: LocalMode::Store,
                index: LocalIndex::Fixed(2),
            })
        );
        assert_eq!(lstore_2.inline_operand_length(), Some(0));
        assert_eq!(LocalKind::Long.width(), 2);

        let aload = opcode_descriptor(0x19).unwrap();
        assert_eq!(aload.inline_operand_length(), Some(1));
        assert_eq!(aload.local.map(|access| access.index), Some(LocalIndex::Operand));
    }
}
