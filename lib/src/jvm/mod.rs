//! Read and verify JVM classes
//!
//! ### Simple example
//!
//! Consider the following method, compiled into a class file `Adder.class`:
//!
//! ```java,ignore,no_run
//! public class Adder {
//!     static int twice(int x) {
//!         return x + x;
//!     }
//! }
//! ```
//!
//! Verifying every method in that class can be done as follows:
//!
//! ```no_run
//! use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas, DeclaredClass};
//! use jverify::jvm::verifier::{verify_class, MethodOutcome, VerifierSettings};
//! use jverify::jvm::*;
//!
//! # fn verify() -> Result<(), Error> {
//! let class_file = ClassFile::load_from_path("Adder.class")?;
//!
//! // Setup the class graph, add in Java standard library types and the class itself
//! let class_graph_arenas = ClassGraphArenas::new();
//! let class_graph = ClassGraph::new(&class_graph_arenas);
//! class_graph.insert_java_library_types();
//! class_graph.insert_declared_classes(&[DeclaredClass::from_class_file(&class_file)?]);
//!
//! let verdict = verify_class(&class_file, &class_graph, &VerifierSettings::default())?;
//! for method in &verdict.methods {
//!     if let MethodOutcome::Rejected(err) = &method.outcome {
//!         println!("{}.{}{}: {}", verdict.class, method.name, method.descriptor, err);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod access_flags;
pub mod class_file;
pub mod class_graph;
mod descriptors;
mod errors;
mod names;
pub mod opcodes;
pub mod verifier;

pub use access_flags::*;
pub use class_file::{
    ClassConstantIndex, ClassFile, Constant, ConstantIndex, ConstantsPool, HandleKind,
    NameAndTypeConstantIndex, Utf8ConstantIndex,
};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
