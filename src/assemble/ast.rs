//! Input form of a method body
//!
//! A [`MethodDefinition`] is the parsed, name-resolved shape of one method: a flat instruction
//! list where jump targets are still string labels, plus declared exception handlers and local
//! variable metadata. Families of opcodes collapse into one [`Op`] variant with fields (every
//! load is [`Op::Var`] with [`VarKind::Load`], every `if*` is [`Op::Jump`]); the emitter picks
//! concrete encodings later, so `iconst_3` vs. `bipush` or `goto` vs. `goto_w` never shows up
//! here.
//!
//! Every instruction carries the 1-based source line it came from. Diagnostics render the
//! offending instruction back into assembler mnemonics via the [`Display`] implementation on
//! [`Op`].
//!
//! [`Display`]: std::fmt::Display

use crate::jvm::class_file::HandleKind;
use crate::jvm::code::{CompareMode, EqComparison, OrdComparison};
use crate::jvm::{
    BaseType, BinaryName, FieldType, MethodAccessFlags, MethodDescriptor, Name, RefType,
    RenderDescriptor, UnqualifiedName,
};
use std::fmt;

/// One method, ready for analysis and compilation
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    pub access: MethodAccessFlags,

    pub name: UnqualifiedName,

    pub descriptor: MethodDescriptor<BinaryName>,

    /// Generic signature, if the declaration had one
    pub signature: Option<String>,

    /// Flat body in source order
    pub instructions: Vec<Instruction>,

    /// Declared local variables (debug metadata only)
    pub locals: Vec<LocalVariableDecl>,

    /// Declared `try`/`catch` ranges, in the order they should appear in the exception table
    pub handlers: Vec<ExceptionHandler>,
}

impl MethodDefinition {
    /// Does the method have a `this` receiver?
    pub fn has_receiver(&self) -> bool {
        !self.access.contains(MethodAccessFlags::STATIC)
    }
}

/// Operation plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// 1-based source line, carried into diagnostics
    pub line: u32,

    pub op: Op,
}

impl Instruction {
    pub fn new(line: u32, op: Op) -> Instruction {
        Instruction { line, op }
    }
}

/// Operation performed by one instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Push a constant (the emitter picks the shortest encoding)
    Const(ConstValue),

    /// Load, store, or increment a local variable
    Var { kind: VarKind, ty: VarType, slot: u16 },

    /// Untyped operand stack manipulation
    Stack(StackOp),

    /// Arithmetic, shift, bitwise, or comparison operator
    Arith { op: ArithOp, ty: NumericType },

    /// Primitive conversion
    Convert(Conversion),

    /// Load an element out of an array
    ArrayLoad { ty: ArrayKind },

    /// Store an element into an array
    ArrayStore { ty: ArrayKind },

    ArrayLength,

    /// Conditional or unconditional jump to a declared label
    Jump { kind: JumpKind, target: String },

    /// `tableswitch` or `lookupswitch` over an `int` scrutinee
    Switch {
        kind: SwitchKind,
        cases: Vec<(i32, String)>,
        default: String,
    },

    /// Read or write a field
    Field {
        kind: FieldKind,
        is_static: bool,
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    },

    /// Call a method
    Invoke {
        kind: InvokeKind,
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    },

    /// Call through a call site computed by a bootstrap method
    InvokeDynamic {
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        bootstrap: HandleData,
        bootstrap_args: Vec<ConstValue>,
    },

    /// Allocate an object (uninitialized until its `<init>` runs)
    New { class: BinaryName },

    /// Allocate an array with the first `dims` dimensions filled in
    NewArray {
        element: FieldType<BinaryName>,
        dims: u8,
    },

    /// `checkcast` or `instanceof`
    TypeCheck {
        kind: CheckKind,
        ty: RefType<BinaryName>,
    },

    /// Enter or exit an object monitor
    Monitor { enter: bool },

    /// Return from the method (`None` is a `void` return)
    Return { ty: Option<VarType> },

    Throw,

    Nop,

    /// Zero-width jump target marker
    Label(String),
}

/// Constant operand of [`Op::Const`] or a bootstrap argument
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),

    /// Class literal (arrays included, eg. `[I.class`)
    Class(RefType<BinaryName>),

    MethodHandle(HandleData),
    MethodType(MethodDescriptor<BinaryName>),
    Null,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VarKind {
    Load,
    Store,

    /// `iinc` delta (`int` locals only)
    Increment(i16),
}

/// Computational category of a value in a local variable
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VarType {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StackOp {
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,

    /// `lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg` (the mode is ignored for `long`)
    Cmp(CompareMode),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Conversion {
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
}

/// Element category of an array load or store
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,

    /// `byte` and `boolean` arrays share `baload`/`bastore`
    Byte,
    Char,
    Short,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JumpKind {
    Goto,

    /// Compare the top `int` against zero
    If(OrdComparison),

    /// Compare the top two `int`s
    IfICmp(OrdComparison),

    /// Compare the top two references
    IfACmp(EqComparison),

    IfNull,
    IfNonNull,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SwitchKind {
    Table,
    Lookup,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Get,
    Put,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Static,
    Special,
    Interface,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CheckKind {
    Cast,
    InstanceOf,
}

/// Method handle literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleData {
    pub kind: HandleKind,
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MemberDescriptor,
}

/// Descriptor of the member a method handle references
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDescriptor {
    Field(FieldType<BinaryName>),
    Method(MethodDescriptor<BinaryName>),
}

/// Debug metadata for one declared local variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableDecl {
    pub slot: u16,
    pub name: String,
    pub descriptor: FieldType<BinaryName>,

    /// Generic signature (drives the `LocalVariableTypeTable`)
    pub signature: Option<String>,

    /// Label opening the variable's scope
    pub start: String,

    /// Label closing the variable's scope (exclusive)
    pub end: String,

    pub line: u32,
}

/// One declared `try`/`catch` range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub try_start: String,

    /// Exclusive end of the covered range
    pub try_end: String,

    /// Label of the first handler instruction
    pub handler: String,

    /// `None` catches every throwable
    pub catch_type: Option<BinaryName>,

    pub line: u32,
}

fn var_prefix(ty: VarType) -> char {
    match ty {
        VarType::Int => 'i',
        VarType::Long => 'l',
        VarType::Float => 'f',
        VarType::Double => 'd',
        VarType::Reference => 'a',
    }
}

fn numeric_prefix(ty: NumericType) -> char {
    match ty {
        NumericType::Int => 'i',
        NumericType::Long => 'l',
        NumericType::Float => 'f',
        NumericType::Double => 'd',
    }
}

fn array_prefix(ty: ArrayKind) -> char {
    match ty {
        ArrayKind::Int => 'i',
        ArrayKind::Long => 'l',
        ArrayKind::Float => 'f',
        ArrayKind::Double => 'd',
        ArrayKind::Reference => 'a',
        ArrayKind::Byte => 'b',
        ArrayKind::Char => 'c',
        ArrayKind::Short => 's',
    }
}

fn comparison_suffix(comparison: OrdComparison) -> &'static str {
    match comparison {
        OrdComparison::EQ => "eq",
        OrdComparison::NE => "ne",
        OrdComparison::LT => "lt",
        OrdComparison::GE => "ge",
        OrdComparison::GT => "gt",
        OrdComparison::LE => "le",
    }
}

fn handle_kind_name(kind: HandleKind) -> &'static str {
    match kind {
        HandleKind::GetField => "getfield",
        HandleKind::GetStatic => "getstatic",
        HandleKind::PutField => "putfield",
        HandleKind::PutStatic => "putstatic",
        HandleKind::InvokeVirtual => "invokevirtual",
        HandleKind::InvokeStatic => "invokestatic",
        HandleKind::InvokeSpecial => "invokespecial",
        HandleKind::NewInvokeSpecial => "newinvokespecial",
        HandleKind::InvokeInterface => "invokeinterface",
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(value) => write!(f, "{}", value),
            ConstValue::Long(value) => write!(f, "{}L", value),
            ConstValue::Float(value) => write!(f, "{:?}F", value),
            ConstValue::Double(value) => write!(f, "{:?}D", value),
            ConstValue::Str(value) => write!(f, "{:?}", value),
            ConstValue::Class(ref_type) => write!(f, "{}.class", ref_type.render_internal()),
            ConstValue::MethodHandle(handle) => write!(f, "{}", handle),
            ConstValue::MethodType(descriptor) => f.write_str(&descriptor.render()),
            ConstValue::Null => f.write_str("null"),
        }
    }
}

impl fmt::Display for HandleData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptor = match &self.descriptor {
            MemberDescriptor::Field(field) => field.render(),
            MemberDescriptor::Method(method) => method.render(),
        };
        write!(
            f,
            "{} {}.{} {}",
            handle_kind_name(self.kind),
            self.owner.as_str(),
            self.name.as_str(),
            descriptor,
        )
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Const(ConstValue::Null) => f.write_str("aconst_null"),
            Op::Const(value) => write!(f, "ldc {}", value),

            Op::Var { kind, ty, slot } => match kind {
                VarKind::Load => write!(f, "{}load {}", var_prefix(*ty), slot),
                VarKind::Store => write!(f, "{}store {}", var_prefix(*ty), slot),
                VarKind::Increment(delta) => write!(f, "iinc {} {}", slot, delta),
            },

            Op::Stack(op) => f.write_str(match op {
                StackOp::Pop => "pop",
                StackOp::Pop2 => "pop2",
                StackOp::Dup => "dup",
                StackOp::DupX1 => "dup_x1",
                StackOp::DupX2 => "dup_x2",
                StackOp::Dup2 => "dup2",
                StackOp::Dup2X1 => "dup2_x1",
                StackOp::Dup2X2 => "dup2_x2",
                StackOp::Swap => "swap",
            }),

            Op::Arith { op, ty } => {
                let prefix = numeric_prefix(*ty);
                match op {
                    ArithOp::Add => write!(f, "{}add", prefix),
                    ArithOp::Sub => write!(f, "{}sub", prefix),
                    ArithOp::Mul => write!(f, "{}mul", prefix),
                    ArithOp::Div => write!(f, "{}div", prefix),
                    ArithOp::Rem => write!(f, "{}rem", prefix),
                    ArithOp::Neg => write!(f, "{}neg", prefix),
                    ArithOp::Shl => write!(f, "{}shl", prefix),
                    ArithOp::Shr => write!(f, "{}shr", prefix),
                    ArithOp::Ushr => write!(f, "{}ushr", prefix),
                    ArithOp::And => write!(f, "{}and", prefix),
                    ArithOp::Or => write!(f, "{}or", prefix),
                    ArithOp::Xor => write!(f, "{}xor", prefix),
                    ArithOp::Cmp(_) if *ty == NumericType::Long => f.write_str("lcmp"),
                    ArithOp::Cmp(CompareMode::L) => write!(f, "{}cmpl", prefix),
                    ArithOp::Cmp(CompareMode::G) => write!(f, "{}cmpg", prefix),
                }
            }

            Op::Convert(conversion) => f.write_str(match conversion {
                Conversion::I2L => "i2l",
                Conversion::I2F => "i2f",
                Conversion::I2D => "i2d",
                Conversion::L2I => "l2i",
                Conversion::L2F => "l2f",
                Conversion::L2D => "l2d",
                Conversion::F2I => "f2i",
                Conversion::F2L => "f2l",
                Conversion::F2D => "f2d",
                Conversion::D2I => "d2i",
                Conversion::D2L => "d2l",
                Conversion::D2F => "d2f",
                Conversion::I2B => "i2b",
                Conversion::I2C => "i2c",
                Conversion::I2S => "i2s",
            }),

            Op::ArrayLoad { ty } => write!(f, "{}aload", array_prefix(*ty)),
            Op::ArrayStore { ty } => write!(f, "{}astore", array_prefix(*ty)),
            Op::ArrayLength => f.write_str("arraylength"),

            Op::Jump { kind, target } => match kind {
                JumpKind::Goto => write!(f, "goto {}", target),
                JumpKind::If(comparison) => {
                    write!(f, "if{} {}", comparison_suffix(*comparison), target)
                }
                JumpKind::IfICmp(comparison) => {
                    write!(f, "if_icmp{} {}", comparison_suffix(*comparison), target)
                }
                JumpKind::IfACmp(EqComparison::EQ) => write!(f, "if_acmpeq {}", target),
                JumpKind::IfACmp(EqComparison::NE) => write!(f, "if_acmpne {}", target),
                JumpKind::IfNull => write!(f, "ifnull {}", target),
                JumpKind::IfNonNull => write!(f, "ifnonnull {}", target),
            },

            Op::Switch { kind, cases, default } => {
                f.write_str(match kind {
                    SwitchKind::Table => "tableswitch",
                    SwitchKind::Lookup => "lookupswitch",
                })?;
                for (key, target) in cases {
                    write!(f, " {}:{}", key, target)?;
                }
                write!(f, " default:{}", default)
            }

            Op::Field {
                kind,
                is_static,
                owner,
                name,
                descriptor,
            } => {
                let mnemonic = match (kind, is_static) {
                    (FieldKind::Get, true) => "getstatic",
                    (FieldKind::Get, false) => "getfield",
                    (FieldKind::Put, true) => "putstatic",
                    (FieldKind::Put, false) => "putfield",
                };
                write!(
                    f,
                    "{} {}.{} {}",
                    mnemonic,
                    owner.as_str(),
                    name.as_str(),
                    descriptor.render(),
                )
            }

            Op::Invoke {
                kind,
                owner,
                name,
                descriptor,
            } => {
                let mnemonic = match kind {
                    InvokeKind::Virtual => "invokevirtual",
                    InvokeKind::Static => "invokestatic",
                    InvokeKind::Special => "invokespecial",
                    InvokeKind::Interface => "invokeinterface",
                };
                write!(
                    f,
                    "{} {}.{}{}",
                    mnemonic,
                    owner.as_str(),
                    name.as_str(),
                    descriptor.render(),
                )
            }

            Op::InvokeDynamic { name, descriptor, .. } => {
                write!(f, "invokedynamic {}{}", name.as_str(), descriptor.render())
            }

            Op::New { class } => write!(f, "new {}", class.as_str()),

            Op::NewArray { element, dims } => match element {
                _ if *dims != 1 => {
                    let mut array = FieldType::array(element.clone());
                    for _ in 1..*dims {
                        array = FieldType::array(array);
                    }
                    write!(f, "multianewarray {} {}", array.render(), dims)
                }
                FieldType::Base(base) => f.write_str(match base {
                    BaseType::Int => "newarray int",
                    BaseType::Long => "newarray long",
                    BaseType::Float => "newarray float",
                    BaseType::Double => "newarray double",
                    BaseType::Byte => "newarray byte",
                    BaseType::Char => "newarray char",
                    BaseType::Short => "newarray short",
                    BaseType::Boolean => "newarray boolean",
                }),
                FieldType::Ref(ref_type) => write!(f, "anewarray {}", ref_type.render_internal()),
            },

            Op::TypeCheck { kind, ty } => {
                let mnemonic = match kind {
                    CheckKind::Cast => "checkcast",
                    CheckKind::InstanceOf => "instanceof",
                };
                write!(f, "{} {}", mnemonic, ty.render_internal())
            }

            Op::Monitor { enter: true } => f.write_str("monitorenter"),
            Op::Monitor { enter: false } => f.write_str("monitorexit"),

            Op::Return { ty: None } => f.write_str("return"),
            Op::Return { ty: Some(ty) } => write!(f, "{}return", var_prefix(*ty)),

            Op::Throw => f.write_str("athrow"),
            Op::Nop => f.write_str("nop"),
            Op::Label(name) => write!(f, "{}:", name),
        }
    }
}
