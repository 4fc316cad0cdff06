//! Failure modes of the assembler pipeline
//!
//! Errors split along the three pipeline stages:
//!
//!   - [`IllegalAstError`] is an internal consistency breach in the instruction stream itself
//!     (labels, switch shapes, instructions with no encoding). A well-behaved frontend never
//!     produces these.
//!   - [`AnalysisError`] is a verification failure: the method body is structurally fine but its
//!     types do not line up. It always names the offending instruction and its source line.
//!   - [`MethodCompileError`] is a classfile format limit hit while emitting an analyzed method.
//!
//! [`Error`] is the union the public entry points return.

use crate::jvm::class_file::{Constant, ConstantPoolOverflow};
use crate::jvm::verifier::{AbstractValue, MergeConflict, VerificationType};
use crate::jvm::{self, BinaryName, FieldType, RenderDescriptor};
use std::fmt;

/// Instruction stream that no frontend should ever have produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IllegalAstError {
    /// Same label declared at two different instructions
    DuplicateLabel { label: String, line: u32 },

    /// Jump, switch, handler, or variable declaration names a label that is never declared
    UndeclaredLabel { label: String, line: u32 },

    /// `tableswitch` keys must be contiguous and ascending, and there must be at least one
    MalformedTableSwitch { line: u32 },

    /// Instruction has no bytecode encoding (eg. a `float` shift or an `int` `cmp`)
    UnencodableInstruction { instruction: String, line: u32 },
}

impl fmt::Display for IllegalAstError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IllegalAstError::DuplicateLabel { label, line } => {
                write!(f, "label '{}' is declared more than once (line {})", label, line)
            }
            IllegalAstError::UndeclaredLabel { label, line } => {
                write!(f, "reference to undeclared label '{}' (line {})", label, line)
            }
            IllegalAstError::MalformedTableSwitch { line } => {
                write!(f, "tableswitch keys are not contiguous and ascending (line {})", line)
            }
            IllegalAstError::UnencodableInstruction { instruction, line } => {
                write!(f, "'{}' has no bytecode encoding (line {})", instruction, line)
            }
        }
    }
}

/// Verification failure, pinned to the instruction that caused it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisError {
    /// Offending instruction, rendered back into assembler mnemonics
    pub instruction: String,

    /// 1-based source line of the offending instruction
    pub line: u32,

    pub kind: AnalysisErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    /// Instruction needs more values than the operand stack holds
    StackUnderflow,

    /// A popped value has the wrong type or category
    WrongType {
        expected: &'static str,
        found: AbstractValue,
    },

    /// Local slot lies beyond the 65536 addressable slots (a two-word value needs two)
    BadLocalSlot { slot: u16 },

    /// Local slot read before anything usable was stored in it
    UndefinedLocal { slot: u16 },

    /// Local slot holds a value of the wrong type
    WrongLocalType {
        slot: u16,
        expected: &'static str,
        found: AbstractValue,
    },

    /// Value is not assignable to the type the instruction declares
    NotAssignable {
        expected: FieldType<BinaryName>,
        found: AbstractValue,
    },

    /// Returned value does not match the method descriptor (`None` stands for `void`)
    WrongReturnType {
        expected: Option<FieldType<BinaryName>>,
        found: Option<AbstractValue>,
    },

    /// `athrow` operand is not assignable to `java/lang/Throwable`
    NotThrowable { found: AbstractValue },

    /// Control flow paths meet with irreconcilable frames
    FailedMerge(MergeConflict),

    /// Execution can run off the end of the method
    FallsOffMethod,

    /// Parameters alone need more local slots than the format allows
    TooManyLocals(usize),

    /// The cancellation flag was raised while the analysis worklist was still busy
    Cancelled,
}

/// Short human-readable rendering of an abstract value
fn render_value(value: &AbstractValue) -> String {
    match value {
        VerificationType::Top => "an unusable value".to_string(),
        VerificationType::Integer => "int".to_string(),
        VerificationType::Float => "float".to_string(),
        VerificationType::Double => "double".to_string(),
        VerificationType::Long => "long".to_string(),
        VerificationType::Null => "null".to_string(),
        VerificationType::Object(ref_type) => ref_type.render_internal(),
        VerificationType::Uninitialized(_) => "an uninitialized object".to_string(),
        VerificationType::ReturnAddress(_) => "a return address".to_string(),
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at '{}' on line {}", self.kind, self.instruction, self.line)
    }
}

impl fmt::Display for AnalysisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisErrorKind::StackUnderflow => {
                f.write_str("cannot pop from an empty operand stack")
            }
            AnalysisErrorKind::WrongType { expected, found } => {
                write!(f, "expected {} but found {}", expected, render_value(found))
            }
            AnalysisErrorKind::BadLocalSlot { slot } => {
                write!(f, "local slot {} is out of range", slot)
            }
            AnalysisErrorKind::UndefinedLocal { slot } => {
                write!(f, "local {} is read before anything is stored in it", slot)
            }
            AnalysisErrorKind::WrongLocalType { slot, expected, found } => {
                write!(
                    f,
                    "local {} holds {} where {} is needed",
                    slot,
                    render_value(found),
                    expected,
                )
            }
            AnalysisErrorKind::NotAssignable { expected, found } => {
                write!(
                    f,
                    "expected a value assignable to {} but found {}",
                    expected.render(),
                    render_value(found),
                )
            }
            AnalysisErrorKind::WrongReturnType { expected, found } => {
                let expected = match expected {
                    Some(field_type) => field_type.render(),
                    None => "void".to_string(),
                };
                let found = match found {
                    Some(value) => render_value(value),
                    None => "void".to_string(),
                };
                write!(f, "cannot return {} from a method returning {}", found, expected)
            }
            AnalysisErrorKind::NotThrowable { found } => {
                write!(
                    f,
                    "can only throw values assignable to java/lang/Throwable, found {}",
                    render_value(found),
                )
            }
            AnalysisErrorKind::FailedMerge(MergeConflict::MismatchedStackSizes {
                expected,
                found,
            }) => {
                write!(
                    f,
                    "operand stacks of different depths meet ({} vs {})",
                    expected, found,
                )
            }
            AnalysisErrorKind::FailedMerge(MergeConflict::IncompatibleTypes(conflict)) => {
                write!(
                    f,
                    "incompatible types meet where control flow merges: {} cannot merge with {}",
                    render_value(&conflict.left),
                    render_value(&conflict.right),
                )
            }
            AnalysisErrorKind::FallsOffMethod => {
                f.write_str("execution can run off the end of the method")
            }
            AnalysisErrorKind::TooManyLocals(count) => {
                write!(f, "method needs {} local slots but the limit is 65535", count)
            }
            AnalysisErrorKind::Cancelled => f.write_str("analysis was cancelled"),
        }
    }
}

/// Classfile format limit hit while emitting an analyzed method
///
/// These are about the *output*: the method body was already verified, but it does not fit the
/// fixed-width fields of the `Code` attribute or the constant pool.
#[derive(Debug)]
pub enum MethodCompileError {
    /// Method body is longer than the format's 65535 bytes
    CodeTooLarge(usize),

    /// Frames need more than 65535 operand stack slots
    MaxStackTooLarge(usize),

    /// Frames need more than 65535 local slots
    MaxLocalsTooLarge(usize),

    /// Constant pool ran out of its 65535 slots
    ConstantPoolOverflow { constant: Constant, offset: u16 },

    /// `BootstrapMethods` attribute ran out of its 65535 entries
    BootstrapMethodsOverflow,

    /// Method has no live instructions (the format forbids an empty code array)
    EmptyCode,

    /// Writing an attribute buffer failed
    IoError(std::io::Error),
}

impl fmt::Display for MethodCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodCompileError::CodeTooLarge(size) => {
                write!(f, "method body is {} bytes but the limit is 65535", size)
            }
            MethodCompileError::MaxStackTooLarge(size) => {
                write!(f, "method needs {} stack slots but the limit is 65535", size)
            }
            MethodCompileError::MaxLocalsTooLarge(size) => {
                write!(f, "method needs {} local slots but the limit is 65535", size)
            }
            MethodCompileError::ConstantPoolOverflow { constant, offset } => {
                write!(
                    f,
                    "constant pool overflow adding {:?} at offset {}",
                    constant, offset,
                )
            }
            MethodCompileError::BootstrapMethodsOverflow => {
                f.write_str("too many bootstrap methods")
            }
            MethodCompileError::EmptyCode => {
                f.write_str("method has no live instructions")
            }
            MethodCompileError::IoError(err) => write!(f, "{}", err),
        }
    }
}

impl From<jvm::Error> for MethodCompileError {
    fn from(err: jvm::Error) -> MethodCompileError {
        match err {
            jvm::Error::ConstantPoolOverflow { constant, offset } => {
                MethodCompileError::ConstantPoolOverflow { constant, offset }
            }
            jvm::Error::BootstrapMethodsOverflow => MethodCompileError::BootstrapMethodsOverflow,
            jvm::Error::IoError(err) => MethodCompileError::IoError(err),
        }
    }
}

impl From<ConstantPoolOverflow> for MethodCompileError {
    fn from(err: ConstantPoolOverflow) -> MethodCompileError {
        MethodCompileError::ConstantPoolOverflow {
            constant: err.constant,
            offset: err.offset,
        }
    }
}

impl From<std::io::Error> for MethodCompileError {
    fn from(err: std::io::Error) -> MethodCompileError {
        MethodCompileError::IoError(err)
    }
}

/// Any failure the assembler pipeline can produce
#[derive(Debug)]
pub enum Error {
    IllegalAst(IllegalAstError),
    Analysis(AnalysisError),
    MethodCompile(MethodCompileError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalAst(err) => write!(f, "{}", err),
            Error::Analysis(err) => write!(f, "{}", err),
            Error::MethodCompile(err) => write!(f, "{}", err),
        }
    }
}

impl From<IllegalAstError> for Error {
    fn from(err: IllegalAstError) -> Error {
        Error::IllegalAst(err)
    }
}

impl From<AnalysisError> for Error {
    fn from(err: AnalysisError) -> Error {
        Error::Analysis(err)
    }
}

impl From<MethodCompileError> for Error {
    fn from(err: MethodCompileError) -> Error {
        Error::MethodCompile(err)
    }
}
