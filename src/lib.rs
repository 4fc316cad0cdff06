//! Assemble JVM method bodies from an abstract instruction stream
//!
//! The input is a [`assemble::MethodDefinition`]: symbolic instructions with string labels,
//! declared exception handlers, and optional debug metadata. The output is everything a
//! classfile's `Code` attribute needs, with the bookkeeping the format demands handled here:
//!
//!   - verification by abstract interpretation, producing the stack map table
//!   - `max_stack` / `max_locals` computation
//!   - label resolution, switch alignment padding, and widening of jumps that overflow
//!     16-bit offsets
//!   - exception, line number, and local variable tables
//!
//! Class hierarchy questions (needed to merge reference types at control flow joins) go
//! through [`class_graph::InheritanceChecker`]; [`class_graph::ClassGraph`] is the built-in
//! implementation, pre-seeded with the `java.lang` types the verifier itself cares about.

pub mod assemble;
pub mod class_graph;
pub mod jvm;
pub mod util;
