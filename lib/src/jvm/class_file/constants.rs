use crate::jvm::class_file::{read_bytes, Deserialize, Serialize};
use crate::jvm::verifier::ConstantResolver;
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType,
    UnqualifiedName,
};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Constant pool of a class file, indexed starting at 1
///
/// Lookups check both that the index is populated and that the entry has the expected kind, so
/// that callers can work with typed results.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
}

impl Default for ConstantsPool {
    fn default() -> ConstantsPool {
        ConstantsPool::new()
    }
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
        }
    }

    /// Append a constant, returning its index
    pub fn push(&mut self, constant: Constant) -> ConstantIndex {
        ConstantIndex(self.constants.push(constant).0 as u16)
    }

    /// Number of entries in the pool (wide entries count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn get(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok_or(Error::MissingConstant(index.0))
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(unexpected(index.0, "Utf8")),
        }
    }

    /// Raw name stored in a class constant (array classes are named by their descriptor)
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(unexpected(index.0, "Class")),
        }
    }

    /// Binary name of a class which cannot be an array (eg. `this_class`)
    pub fn class_binary_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        let name = self.class_name(index)?;
        BinaryName::from_string(name.to_owned()).map_err(Error::MalformedName)
    }

    pub fn class_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = self.class_name(index)?;
        RefType::from_class_name(name).map_err(|err| Error::BadDescriptor(err.to_string()))
    }

    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(unexpected(index.0, "NameAndType")),
        }
    }

    /// Type of the field referenced by a `Fieldref` constant
    pub fn field_ref_type(&self, index: ConstantIndex) -> Result<FieldType<BinaryName>, Error> {
        match self.get(index)? {
            Constant::FieldRef { name_and_type, .. } => {
                let (_, descriptor) = self.name_and_type(*name_and_type)?;
                parse_descriptor(descriptor)
            }
            _ => Err(unexpected(index, "Fieldref")),
        }
    }

    /// Descriptor of a method referenced by a `Methodref`, `InterfaceMethodref`, or
    /// `InvokeDynamic` constant
    pub fn method_ref_descriptor(
        &self,
        index: ConstantIndex,
    ) -> Result<(UnqualifiedName, MethodDescriptor<BinaryName>), Error> {
        let name_and_type = match self.get(index)? {
            Constant::MethodRef { name_and_type, .. } => *name_and_type,
            Constant::InvokeDynamic { name_and_type, .. } => *name_and_type,
            _ => return Err(unexpected(index, "Methodref")),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        let name = UnqualifiedName::from_method_name(name.to_owned()).map_err(Error::MalformedName)?;
        Ok((name, parse_descriptor(descriptor)?))
    }

    /// Type of the value pushed by `ldc`, `ldc_w`, or `ldc2_w` for this constant
    pub fn loadable_type(&self, index: ConstantIndex) -> Result<FieldType<BinaryName>, Error> {
        match self.get(index)? {
            Constant::Integer(_) => Ok(FieldType::int()),
            Constant::Float(_) => Ok(FieldType::float()),
            Constant::Long(_) => Ok(FieldType::long()),
            Constant::Double(_) => Ok(FieldType::double()),
            Constant::String(_) => Ok(FieldType::object(BinaryName::STRING)),
            Constant::Class(_) => Ok(FieldType::object(BinaryName::CLASS)),
            Constant::MethodType(_) => Ok(FieldType::object(BinaryName::METHODTYPE)),
            Constant::MethodHandle { .. } => Ok(FieldType::object(BinaryName::METHODHANDLE)),
            Constant::Dynamic { name_and_type, .. } => {
                let (_, descriptor) = self.name_and_type(*name_and_type)?;
                parse_descriptor(descriptor)
            }
            _ => Err(unexpected(index, "loadable constant")),
        }
    }
}

fn unexpected(index: ConstantIndex, expected: &'static str) -> Error {
    Error::UnexpectedConstant {
        index: index.0,
        expected,
    }
}

fn parse_descriptor<D: ParseDescriptor>(descriptor: &str) -> Result<D, Error> {
    D::parse(descriptor).map_err(|err| Error::BadDescriptor(format!("{}: {}", descriptor, err)))
}

impl ConstantResolver for ConstantsPool {
    fn field_type(&self, index: u16) -> Result<FieldType<BinaryName>, String> {
        self.field_ref_type(ConstantIndex(index))
            .map_err(|err| err.to_string())
    }

    fn method_descriptor(&self, index: u16) -> Result<MethodDescriptor<BinaryName>, String> {
        self.method_ref_descriptor(ConstantIndex(index))
            .map(|(_, descriptor)| descriptor)
            .map_err(|err| err.to_string())
    }

    fn class_type(&self, index: u16) -> Result<RefType<BinaryName>, String> {
        ConstantsPool::class_type(self, ClassConstantIndex(ConstantIndex(index)))
            .map_err(|err| err.to_string())
    }

    fn loadable_type(&self, index: u16) -> Result<FieldType<BinaryName>, String> {
        ConstantsPool::loadable_type(self, ConstantIndex(index)).map_err(|err| err.to_string())
    }
}

/// The pool count is one more than the largest index, so wide constants count twice
impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.constants.offset_len().0 as u16).serialize(writer)?;
        for (_, _, constant) in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantsPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut pool = ConstantsPool::new();
        while pool.constants.offset_len().0 < count {
            let index = pool.constants.offset_len().0 as u16;
            pool.push(Constant::deserialize_at(reader, index)?);
        }
        Ok(pool)
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the null character
    /// `\u{0000}` and the encoding of supplementary characters is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,
        member: ConstantIndex,
    },

    /// Method type
    MethodType(Utf8ConstantIndex),

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),

    Package(Utf8ConstantIndex),
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. From
/// the JVMS:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Constant {
    /// Read a constant, knowing which index it will occupy (for error messages)
    fn deserialize_at<R: ReadBytesExt>(reader: &mut R, index: u16) -> Result<Constant, Error> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                let string = decode_modified_utf8(&bytes).ok_or(Error::MalformedUtf8(index))?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType(Utf8ConstantIndex::deserialize(reader)?),
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => return Err(Error::UnknownConstantTag(other)),
        };
        Ok(constant)
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                std::io::Write::write_all(writer, &buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(utf8) => {
                8u8.serialize(writer)?;
                utf8.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType(descriptor) => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            if code != 0 && code < 0x80 {
                buffer.push(code as u8);
            } else if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Returns `None` on truncated sequences, on 4-byte forms, and on unpaired surrogates.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b1) = iter.next() {
        let unit = match b1 {
            0x01..=0x7F => b1 as u16,
            0xC0..=0xDF => {
                let b2 = continuation(iter.next()?)?;
                ((b1 as u16 & 0x1F) << 6) | b2
            }
            0xE0..=0xEF => {
                let b2 = continuation(iter.next()?)?;
                let b3 = continuation(iter.next()?)?;
                ((b1 as u16 & 0x0F) << 12) | (b2 << 6) | b3
            }
            _ => return None,
        };
        units.push(unit);
    }
    char::decode_utf16(units).collect::<Result<String, _>>().ok()
}

fn continuation(byte: u8) -> Option<u16> {
    if byte & 0b1100_0000 == 0b1000_0000 {
        Some((byte & 0x3F) as u16)
    } else {
        None
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

macro_rules! typed_constant_index {
    ($($index:ident),*) => {
        $(
            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $index {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($index(ConstantIndex::deserialize(reader)?))
                }
            }
        )*
    };
}

typed_constant_index!(Utf8ConstantIndex, NameAndTypeConstantIndex, ClassConstantIndex);

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-5.html#jvms-5.4.3.5
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => return Err(Error::BadHandleKind(other)),
        })
    }
}


#[cfg(test)]
mod pool_tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn wide_constants_take_two_indices() {
        let mut pool = ConstantsPool::new();
        let long = pool.push(Constant::Long(42));
        let utf8 = pool.push(Constant::Utf8(String::from("java/lang/String")));
        let class = pool.push(Constant::Class(Utf8ConstantIndex(utf8)));
        assert_eq!((long.0, utf8.0, class.0), (1, 3, 4));

        let mut bytes = vec![];
        pool.serialize(&mut bytes).unwrap();
        assert_eq!(&bytes[0..2], &[0, 5]);

        let read = ConstantsPool::deserialize(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(read.len(), 3);
        assert!(matches!(
            read.get(ConstantIndex(2)),
            Err(Error::MissingConstant(2))
        ));
        assert_eq!(
            read.class_binary_name(ClassConstantIndex(class)).unwrap(),
            BinaryName::STRING
        );
        assert_eq!(
            read.loadable_type(long).unwrap(),
            FieldType::<BinaryName>::long()
        );
    }

    #[test]
    fn typed_lookups_reject_other_kinds() {
        let mut pool = ConstantsPool::new();
        let integer = pool.push(Constant::Integer(7));
        assert!(matches!(
            pool.utf8(Utf8ConstantIndex(integer)),
            Err(Error::UnexpectedConstant { index: 1, .. })
        ));
        assert_eq!(pool.loadable_type(integer).unwrap(), FieldType::int());
    }

    #[test]
    fn resolves_member_descriptors() {
        let mut pool = ConstantsPool::new();
        let owner_name = pool.push(Constant::Utf8(String::from("Dog")));
        let owner = pool.push(Constant::Class(Utf8ConstantIndex(owner_name)));
        let name = pool.push(Constant::Utf8(String::from("bark")));
        let descriptor = pool.push(Constant::Utf8(String::from("(IJ)Ljava/lang/String;")));
        let name_and_type = pool.push(Constant::NameAndType {
            name: Utf8ConstantIndex(name),
            descriptor: Utf8ConstantIndex(descriptor),
        });
        let method = pool.push(Constant::MethodRef {
            class: ClassConstantIndex(owner),
            name_and_type: NameAndTypeConstantIndex(name_and_type),
            is_interface: false,
        });

        let (method_name, method_descriptor) = pool.method_ref_descriptor(method).unwrap();
        assert_eq!(method_name.as_str(), "bark");
        assert_eq!(
            method_descriptor,
            MethodDescriptor {
                parameters: vec![FieldType::int(), FieldType::long()],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            }
        );
        assert!(pool.field_ref_type(method).is_err());
    }
}
