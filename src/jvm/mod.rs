//! JVM-level building blocks
//!
//! Everything in this module is about the classfile side of the assembler: internal names and
//! descriptors, the constant pool, concrete instructions with their exact encoded widths, and
//! the verification types that go into stack map frames. Nothing here knows about the
//! assembler's own instruction model; [`crate::assemble`] lowers that model into these types.
//!
//! The submodules mirror the layers of a `Code` attribute:
//!
//!   - [`class_file`] is the raw serialized layer (constants, attributes)
//!   - [`code`] is the instruction layer (instructions, basic blocks, jump widening)
//!   - [`verifier`] is the type layer (verification types, frames, frame compression)

mod access_flags;
mod binary_format;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use binary_format::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
