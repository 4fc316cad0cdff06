//! Method body assembler
//!
//! This is the front half of the pipeline: an abstract instruction stream ([`ast`]) is split
//! into basic blocks ([`cfg`]), checked by abstract interpretation ([`analyzer`]), and lowered
//! into a finished `Code` attribute ([`compiler`]). The two free functions below run the
//! stages in order for callers that don't need to hold onto the intermediate control flow
//! graph:
//!
//! ```no_run
//! # use jasm2class::assemble::{analyze, compile, MethodDefinition};
//! # use jasm2class::class_graph::InheritanceChecker;
//! # use jasm2class::jvm::class_file::ConstantsPool;
//! # use jasm2class::jvm::BinaryName;
//! # fn example(
//! #     self_type: &BinaryName,
//! #     method: &MethodDefinition,
//! #     checker: &dyn InheritanceChecker,
//! # ) -> Result<(), jasm2class::assemble::Error> {
//! let frames = analyze(self_type, method, checker)?;
//! let mut constants = ConstantsPool::new();
//! let compiled = compile(self_type, method, &frames, &mut constants, true)?;
//! let attribute = compiled.code_attribute(&mut constants)?;
//! # Ok(())
//! # }
//! ```
//!
//! Analysis and compilation are pure functions of their inputs: no globals, no ambient state,
//! so arbitrarily many methods can be processed on different threads as long as each thread
//! owns its own `ConstantsPool` (or methods destined for one classfile are compiled in a
//! deterministic order on one thread).

pub mod analyzer;
pub mod ast;
pub mod cfg;
pub mod compiler;
mod errors;

pub use analyzer::{Analyzer, MethodFrames};
pub use ast::MethodDefinition;
pub use cfg::ControlFlowGraph;
pub use compiler::{CompiledMethod, MethodCompiler};
pub use errors::{
    AnalysisError, AnalysisErrorKind, Error, IllegalAstError, MethodCompileError,
};

use crate::class_graph::InheritanceChecker;
use crate::jvm::class_file::ConstantsPool;
use crate::jvm::BinaryName;

/// Verify a method body, producing the frame on entry to every instruction
pub fn analyze(
    self_type: &BinaryName,
    method: &MethodDefinition,
    checker: &dyn InheritanceChecker,
) -> Result<MethodFrames, Error> {
    let cfg = ControlFlowGraph::build(method)?;
    Ok(Analyzer::new(self_type, method, checker).analyze(&cfg)?)
}

/// Lower an analyzed method body into its `Code` artifacts
///
/// The `frames` must come from [`analyze`] over the same method.
pub fn compile(
    self_type: &BinaryName,
    method: &MethodDefinition,
    frames: &MethodFrames,
    constants: &mut ConstantsPool,
    debug_info: bool,
) -> Result<CompiledMethod, Error> {
    let cfg = ControlFlowGraph::build(method)?;
    Ok(MethodCompiler::new(self_type, constants)
        .debug_info(debug_info)
        .compile(method, &cfg, frames)?)
}
