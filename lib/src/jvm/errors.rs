use std::fmt;

/// Problems with the class file itself, as opposed to problems with the bytecode in it (for
/// those, see [`crate::jvm::verifier::VerifierError`])
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class file does not start with `0xCAFEBABE`
    BadMagic([u8; 4]),

    /// Constant pool entry has a tag we don't know about
    UnknownConstantTag(u8),

    /// Constant pool index does not point at any entry
    MissingConstant(u16),

    /// Constant pool entry exists, but is not of the expected kind
    UnexpectedConstant { index: u16, expected: &'static str },

    /// String in the constant pool is not valid modified UTF-8
    MalformedUtf8(u16),

    /// Class, method, or field name is not valid
    MalformedName(String),

    /// Field or method descriptor could not be parsed
    BadDescriptor(String),

    /// Method handle constant with a reference kind outside `1..=9`
    BadHandleKind(u8),

    /// Attribute contents are shorter or longer than the attribute claimed
    BadAttributeLength { name: String, declared: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad magic number {:02X?}", magic),
            Error::UnknownConstantTag(tag) => write!(f, "unknown constant pool tag {}", tag),
            Error::MissingConstant(index) => write!(f, "no constant pool entry #{}", index),
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "constant pool entry #{} is not a {}", index, expected)
            }
            Error::MalformedUtf8(index) => {
                write!(f, "constant pool entry #{} is not modified UTF-8", index)
            }
            Error::MalformedName(msg) => write!(f, "malformed name: {}", msg),
            Error::BadDescriptor(msg) => write!(f, "malformed descriptor: {}", msg),
            Error::BadHandleKind(kind) => write!(f, "bad method handle kind {}", kind),
            Error::BadAttributeLength { name, declared } => {
                write!(f, "attribute '{}' does not have length {}", name, declared)
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
