use crate::jvm::class_file::{
    read_bytes, Attribute, Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::{
    BinaryName, ClassAccessFlags, ClassConstantIndex, ConstantIndex, ConstantsPool, Error,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file from its bytes
    ///
    /// Trailing bytes after the class attributes are ignored.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        ClassFile::deserialize(&mut Cursor::new(bytes))
    }

    /// Read and parse a class file from disk
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let bytes = fs::read(path)?;
        ClassFile::parse(&bytes)
    }

    pub fn class_name(&self) -> Result<BinaryName, Error> {
        self.constants.class_binary_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<BinaryName>, Error> {
        self.super_class
            .map(|super_class| self.constants.class_binary_name(super_class))
            .transpose()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let magic = read_bytes(reader, 4)?;
        if magic[..] != ClassFile::MAGIC {
            return Err(Error::BadMagic([magic[0], magic[1], magic[2], magic[3]]));
        }
        let version = Version::deserialize(reader)?;
        let constants = ConstantsPool::deserialize(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = match u16::deserialize(reader)? {
            0 => None,
            index => Some(ClassConstantIndex(ConstantIndex(index))),
        };
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{Constant, MethodAccessFlags, Name, Utf8ConstantIndex};

    fn utf8(constants: &mut ConstantsPool, value: &str) -> Utf8ConstantIndex {
        Utf8ConstantIndex(constants.push(Constant::Utf8(value.to_owned())))
    }

    fn class(constants: &mut ConstantsPool, name: &str) -> ClassConstantIndex {
        let name = utf8(constants, name);
        ClassConstantIndex(constants.push(Constant::Class(name)))
    }

    #[test]
    fn write_then_parse() {
        let mut constants = ConstantsPool::new();
        let this_class = class(&mut constants, "Dog");
        let super_class = class(&mut constants, "Animal");
        let name_index = utf8(&mut constants, "bark");
        let descriptor_index = utf8(&mut constants, "()V");

        let class_file = ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![],
            methods: vec![Method {
                access_flags: MethodAccessFlags::ABSTRACT,
                name_index,
                descriptor_index,
                attributes: vec![],
            }],
            attributes: vec![],
        };

        let mut bytes = vec![];
        class_file.serialize(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], &ClassFile::MAGIC);

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.version, Version::JAVA8);
        assert_eq!(parsed.class_name().unwrap().as_str(), "Dog");
        assert_eq!(
            parsed.super_class_name().unwrap().map(|name| name.to_string()),
            Some(String::from("Animal"))
        );
        assert!(!parsed.is_interface());
        assert_eq!(parsed.methods, class_file.methods);
        assert_eq!(parsed.methods[0].name(&parsed.constants).unwrap().as_str(), "bark");
        assert_eq!(parsed.methods[0].code(&parsed.constants).unwrap(), None);
    }

    #[test]
    fn bad_magic() {
        let bytes = [0xCA, 0xFE, 0xD0, 0x0D, 0, 0, 0, 52];
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(Error::BadMagic([0xCA, 0xFE, 0xD0, 0x0D]))
        ));
    }

    #[test]
    fn truncated_class() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0, 0];
        assert!(matches!(ClassFile::parse(&bytes), Err(Error::IoError(_))));
    }
}
