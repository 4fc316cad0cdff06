//! Verification types and stack map frames
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other
//! words: although the values on the stack and in the locals may obviously be different, the
//! types and order of the stack and local variables cannot. This information is referred to as
//! the _stack map frame_ (represented using [`Frame`]) and the set of stack map frames for all
//! possible jump targets in a method is the _stack map table_.
//!
//! Knowing the stack map frame at a point in the code makes it possible to check that the next
//! instruction makes sense (eg. `dadd` only makes sense if the top two elements on the stack
//! are of type `double`). The "types" used here (represented using [`VerificationType`]) are
//! slightly augmented to take into account initialization and null. Inferring the frame at
//! every point of a method is the fixpoint computation performed by
//! [`crate::assemble::Analyzer`]; this module holds the lattice it computes over, along with
//! the machinery for [merging](Frame::merge) frames where control flow joins and compressing
//! the results into a [`crate::jvm::class_file::StackMapTable`] attribute the way the JVM's own
//! [verification by type-checking][0] expects to find them.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.10.1

mod frame;
mod types;

pub use frame::*;
pub use types::*;
