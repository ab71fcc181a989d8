//! Dataflow verification of JVM bytecode
//!
//! The [`jvm`] module contains everything needed to read a class file and then check, method by
//! method, that its bytecode cannot misuse the operand stack or the local variables. The entry
//! points are [`jvm::class_file::ClassFile::parse`] followed by [`jvm::verifier::verify_class`].

pub mod jvm;
pub mod util;
