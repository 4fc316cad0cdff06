//! Bytecode representation
//!
//! A compiled method body is an ordered sequence of [`BasicBlock`]s. Each block holds
//! straight-line [`Instruction`]s and ends in exactly one [`BranchInstruction`] (with an explicit
//! marker for plain fallthrough). Blocks are keyed by synthetic [`SynLabel`]s so they can be
//! reordered and spliced; [`jump_encoding`] uses that freedom to upgrade jumps whose 16-bit
//! offsets cannot reach their targets.
//!
//! The instruction listing follows [the JVM specification][0].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-6.html#jvms-6.5

mod basic_block;
mod instructions;
pub mod jump_encoding;
mod label;

pub use basic_block::*;
pub use instructions::*;
pub use label::*;
