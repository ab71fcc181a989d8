//! Bytecode verification by dataflow analysis
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other
//! words: although the values on the stack and in the locals may obviously be different, the
//! types and order of the stack and local variables cannot. This information is represented with
//! an [`AbstractState`] per instruction, whose slots hold [`VerificationType`]s.
//!
//! Rather than checking against stack map frames written in the class file, the verifier infers
//! those states itself, in the style of the [old type-inferring verifier][0]:
//!
//!   1. the state at offset 0 is seeded from the method descriptor (see [`initial_state`])
//!   2. a dirty state is taken off the [`StateStore`], and the instruction at its position is
//!      applied to a copy of it (see [`apply_effect`])
//!   3. the resulting state is either recorded for every successor position (see [`successors`])
//!      seen for the first time, or joined into the state already recorded there (see [`merge`]),
//!      which becomes dirty again if anything was widened
//!   4. once no state is dirty, the method is accepted
//!
//! Any problem along the way rejects the method with a [`VerifierError`]. Since every join only
//! ever moves slots up a lattice of finite height, the loop always terminates.
//!
//! What each instruction does to the stack is described by the signature strings of the opcode
//! table in [`crate::jvm::opcodes`] (see [`Signature`]), with the constant pool consulted through
//! [`ConstantResolver`] for field accesses, invocations, and the like.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.2

mod driver;
mod effect;
mod errors;
mod instruction;
mod merge;
mod operands;
mod settings;
mod signature;
mod state;
mod successors;
mod types;

pub use driver::*;
pub use effect::*;
pub use errors::*;
pub use instruction::*;
pub use merge::*;
pub use operands::*;
pub use settings::*;
pub use signature::*;
pub use state::*;
pub use successors::*;
pub use types::*;
