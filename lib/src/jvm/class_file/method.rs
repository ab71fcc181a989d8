use crate::jvm::class_file::{Attribute, Code, Deserialize, Serialize};
use crate::jvm::{
    BinaryName, ConstantsPool, Error, MethodAccessFlags, MethodDescriptor, ParseDescriptor,
    UnqualifiedName, Utf8ConstantIndex,
};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name(&self, constants: &ConstantsPool) -> Result<UnqualifiedName, Error> {
        let name = constants.utf8(self.name_index)?;
        UnqualifiedName::from_method_name(name.to_owned()).map_err(Error::MalformedName)
    }

    pub fn descriptor(
        &self,
        constants: &ConstantsPool,
    ) -> Result<MethodDescriptor<BinaryName>, Error> {
        let descriptor = constants.utf8(self.descriptor_index)?;
        MethodDescriptor::parse(descriptor)
            .map_err(|err| Error::BadDescriptor(format!("{}: {}", descriptor, err)))
    }

    /// Decoded `Code` attribute (abstract and native methods have none)
    pub fn code(&self, constants: &ConstantsPool) -> Result<Option<Code>, Error> {
        Attribute::find(&self.attributes, constants)
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}
