//! Abstract interpretation of a method body
//!
//! [`Analyzer`] replays every reachable instruction over [`Frame`]s of verification types: each
//! instruction's transfer function pops what the real instruction would pop (checking types as
//! it goes) and pushes what it would push. Where control flow joins, the incoming frames are
//! merged through the lattice in [`crate::jvm::verifier`]; the worklist loops until nothing
//! changes. The result is the frame *on entry to* every instruction, which is exactly what the
//! compiler needs for max-stack/max-locals and stack map frames, or an [`AnalysisError`]
//! pinned to the instruction that broke.
//!
//! The fixpoint terminates because merges only ever widen and the lattice is finite: class
//! merges go through [`InheritanceChecker::common_type`], which is total (worst case
//! `java/lang/Object`), and local slots that cannot be reconciled fall to
//! [`VerificationType::Top`] instead of erroring.

use crate::assemble::ast::{
    ArithOp, ArrayKind, CheckKind, ConstValue, Conversion, FieldKind, InvokeKind, JumpKind,
    MethodDefinition, NumericType, Op, StackOp, VarKind, VarType,
};
use crate::assemble::cfg::{ControlFlowGraph, EdgeKind};
use crate::assemble::errors::{AnalysisError, AnalysisErrorKind};
use crate::class_graph::InheritanceChecker;
use crate::jvm::verifier::{AbstractValue, Frame, VerificationType};
use crate::jvm::{ArrayType, BaseType, BinaryName, FieldType, RefType};
use crate::util::{OffsetVec, Width};
use log::trace;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Frame on entry to each instruction; `None` marks instructions no path reaches
pub type MethodFrames = Vec<Option<Frame>>;

/// Forward dataflow pass over one method body
pub struct Analyzer<'a> {
    /// Internal name of the class declaring the method (types local 0 of instance methods)
    self_type: &'a BinaryName,

    method: &'a MethodDefinition,

    checker: &'a dyn InheritanceChecker,

    /// Checked once per worklist iteration; raising it aborts with
    /// [`AnalysisErrorKind::Cancelled`]
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        self_type: &'a BinaryName,
        method: &'a MethodDefinition,
        checker: &'a dyn InheritanceChecker,
    ) -> Analyzer<'a> {
        Analyzer {
            self_type,
            method,
            checker,
            cancel: None,
        }
    }

    /// Let a caller interrupt a long-running analysis from another thread
    pub fn cancel_flag(mut self, flag: &'a AtomicBool) -> Analyzer<'a> {
        self.cancel = Some(flag);
        self
    }

    /// Run the dataflow fixpoint to completion
    pub fn analyze(&self, cfg: &ControlFlowGraph) -> Result<MethodFrames, AnalysisError> {
        let instructions = &self.method.instructions;
        if cfg.blocks.is_empty() {
            return Err(AnalysisError {
                instruction: "<empty body>".to_string(),
                line: 0,
                kind: AnalysisErrorKind::FallsOffMethod,
            });
        }

        let receiver = if self.method.has_receiver() {
            Some(RefType::Object(self.self_type.clone()))
        } else {
            None
        };
        let entry = Frame::method_entry(receiver, &self.method.descriptor);
        if entry.locals.len() > u16::MAX as usize {
            return Err(self.error_at(0, AnalysisErrorKind::TooManyLocals(entry.locals.len())));
        }

        let mut insn_frames: MethodFrames = vec![None; instructions.len()];
        let mut block_entries: Vec<Option<Frame>> = vec![None; cfg.blocks.len()];
        let mut queued: Vec<bool> = vec![false; cfg.blocks.len()];
        let mut worklist: VecDeque<usize> = VecDeque::new();
        block_entries[0] = Some(entry);
        queued[0] = true;
        worklist.push_back(0);

        while let Some(block_index) = worklist.pop_front() {
            queued[block_index] = false;
            if self.cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
                let start = cfg.blocks[block_index].start as usize;
                return Err(self.error_at(start, AnalysisErrorKind::Cancelled));
            }

            let block = &cfg.blocks[block_index];
            trace!(
                "replaying block {} (instructions {}..{})",
                block_index,
                block.start,
                block.end,
            );
            let mut state = block_entries[block_index]
                .clone()
                .expect("worklist block has no entry frame");

            for index in block.start..block.end {
                insn_frames[index as usize] = Some(state.clone());

                // An exception can fly out of any covered instruction, so the handler sees the
                // locals as they are right here, under a stack holding only the caught value
                for handler in &cfg.handlers {
                    if handler.start <= index && index < handler.end {
                        let caught = match &handler.catch_type {
                            Some(name) => VerificationType::Object(RefType::Object(name.clone())),
                            None => VerificationType::Object(RefType::THROWABLE),
                        };
                        let mut stack = OffsetVec::new();
                        stack.push(caught);
                        let candidate = Frame {
                            locals: state.locals.clone(),
                            stack,
                        };
                        self.merge_into(
                            handler.handler_block,
                            &candidate,
                            cfg,
                            &mut block_entries,
                            &mut worklist,
                            &mut queued,
                        )?;
                    }
                }

                self.step(&mut state, index, &instructions[index as usize].op)
                    .map_err(|kind| self.error_at(index as usize, kind))?;
            }

            for edge in &block.edges {
                // Handler entries were merged per covered instruction above
                if edge.kind == EdgeKind::Handler {
                    continue;
                }
                self.merge_into(
                    edge.to,
                    &state,
                    cfg,
                    &mut block_entries,
                    &mut worklist,
                    &mut queued,
                )?;
            }
        }

        // Every block but the last falls into a successor; the last one must not fall anywhere
        let last_index = cfg.blocks.len() - 1;
        if block_entries[last_index].is_some() {
            let last_insn = (cfg.blocks[last_index].end - 1) as usize;
            let terminated = matches!(
                instructions[last_insn].op,
                Op::Return { .. }
                    | Op::Throw
                    | Op::Jump {
                        kind: JumpKind::Goto,
                        ..
                    }
                    | Op::Switch { .. },
            );
            if !terminated {
                return Err(self.error_at(last_insn, AnalysisErrorKind::FallsOffMethod));
            }
        }

        Ok(insn_frames)
    }

    fn error_at(&self, index: usize, kind: AnalysisErrorKind) -> AnalysisError {
        let instruction = &self.method.instructions[index];
        AnalysisError {
            instruction: instruction.op.to_string(),
            line: instruction.line,
            kind,
        }
    }

    /// Merge a candidate entry state into a block, queueing the block if anything widened
    fn merge_into(
        &self,
        target: usize,
        candidate: &Frame,
        cfg: &ControlFlowGraph,
        block_entries: &mut [Option<Frame>],
        worklist: &mut VecDeque<usize>,
        queued: &mut [bool],
    ) -> Result<(), AnalysisError> {
        let changed = match &mut block_entries[target] {
            Some(existing) => existing.merge(candidate, self.checker).map_err(|conflict| {
                let start = cfg.blocks[target].start as usize;
                self.error_at(start, AnalysisErrorKind::FailedMerge(conflict))
            })?,
            never_reached => {
                *never_reached = Some(candidate.clone());
                true
            }
        };
        if changed && !queued[target] {
            queued[target] = true;
            worklist.push_back(target);
        }
        Ok(())
    }

    /// Transfer function: simulate one instruction against the abstract state
    fn step(&self, state: &mut Frame, index: u32, op: &Op) -> Result<(), AnalysisErrorKind> {
        match op {
            Op::Const(value) => {
                state.stack.push(const_value_type(value));
            }

            Op::Var { kind, ty, slot } => match kind {
                VarKind::Load => {
                    let value = load_local(state, *slot, *ty)?;
                    state.stack.push(value);
                }
                VarKind::Store => {
                    let value = pop_var(state, *ty)?;
                    store_local(state, *slot, value)?;
                }
                VarKind::Increment(_) => match state.locals.get(*slot as usize) {
                    Some(VerificationType::Integer) => {}
                    Some(VerificationType::Top) | None => {
                        return Err(AnalysisErrorKind::UndefinedLocal { slot: *slot })
                    }
                    Some(other) => {
                        return Err(AnalysisErrorKind::WrongLocalType {
                            slot: *slot,
                            expected: "int",
                            found: other.clone(),
                        })
                    }
                },
            },

            Op::Stack(op) => stack_op(state, *op)?,

            Op::Arith { op, ty } => {
                let value = numeric_value(*ty);
                let name = numeric_name(*ty);
                match op {
                    ArithOp::Neg => {
                        pop_expecting(state, &value, name)?;
                        state.stack.push(value);
                    }
                    ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr => {
                        // Shift amount first (it is on top), then the shifted value
                        pop_expecting(state, &VerificationType::Integer, "int")?;
                        pop_expecting(state, &value, name)?;
                        state.stack.push(value);
                    }
                    ArithOp::Cmp(_) => {
                        pop_expecting(state, &value, name)?;
                        pop_expecting(state, &value, name)?;
                        state.stack.push(VerificationType::Integer);
                    }
                    _ => {
                        pop_expecting(state, &value, name)?;
                        pop_expecting(state, &value, name)?;
                        state.stack.push(value);
                    }
                }
            }

            Op::Convert(conversion) => {
                let (from, from_name, to) = conversion_types(*conversion);
                pop_expecting(state, &from, from_name)?;
                state.stack.push(to);
            }

            Op::ArrayLoad { ty } => {
                pop_expecting(state, &VerificationType::Integer, "int")?;
                let array = pop_reference(state, array_expectation(*ty))?;
                match array_component(&array, *ty) {
                    Some(component) => state.stack.push(component),
                    None => {
                        return Err(AnalysisErrorKind::WrongType {
                            expected: array_expectation(*ty),
                            found: array,
                        })
                    }
                };
            }

            Op::ArrayStore { ty } => {
                match ty {
                    ArrayKind::Reference => {
                        // Component compatibility is the runtime's problem (ArrayStoreException)
                        pop_reference(state, "a reference")?;
                    }
                    _ => {
                        let value = array_element_value(*ty);
                        pop_expecting(state, &value, array_element_name(*ty))?;
                    }
                }
                pop_expecting(state, &VerificationType::Integer, "int")?;
                let array = pop_reference(state, array_expectation(*ty))?;
                if array != VerificationType::Null && array_component(&array, *ty).is_none() {
                    return Err(AnalysisErrorKind::WrongType {
                        expected: array_expectation(*ty),
                        found: array,
                    });
                }
            }

            Op::ArrayLength => {
                let array = pop_reference(state, "an array")?;
                let is_array = matches!(
                    array,
                    VerificationType::Null
                        | VerificationType::Object(RefType::ObjectArray(_))
                        | VerificationType::Object(RefType::PrimitiveArray(_)),
                );
                if !is_array {
                    return Err(AnalysisErrorKind::WrongType {
                        expected: "an array",
                        found: array,
                    });
                }
                state.stack.push(VerificationType::Integer);
            }

            Op::Jump { kind, .. } => match kind {
                JumpKind::Goto => {}
                JumpKind::If(_) => {
                    pop_expecting(state, &VerificationType::Integer, "int")?;
                }
                JumpKind::IfICmp(_) => {
                    pop_expecting(state, &VerificationType::Integer, "int")?;
                    pop_expecting(state, &VerificationType::Integer, "int")?;
                }
                JumpKind::IfACmp(_) => {
                    pop_reference(state, "a reference")?;
                    pop_reference(state, "a reference")?;
                }
                JumpKind::IfNull | JumpKind::IfNonNull => {
                    pop_reference(state, "a reference")?;
                }
            },

            Op::Switch { .. } => {
                pop_expecting(state, &VerificationType::Integer, "int")?;
            }

            Op::Field {
                kind,
                is_static,
                owner,
                descriptor,
                ..
            } => {
                let field_value = AbstractValue::from(descriptor.clone());
                match kind {
                    FieldKind::Get => {
                        if !is_static {
                            self.pop_receiver(state, owner)?;
                        }
                        state.stack.push(field_value);
                    }
                    FieldKind::Put => {
                        let found = pop_any(state)?;
                        if !self.value_assignable(&found, descriptor) {
                            return Err(AnalysisErrorKind::NotAssignable {
                                expected: descriptor.clone(),
                                found,
                            });
                        }
                        if !is_static {
                            self.pop_receiver(state, owner)?;
                        }
                    }
                }
            }

            Op::Invoke {
                kind,
                owner,
                name,
                descriptor,
            } => {
                for parameter in descriptor.parameters.iter().rev() {
                    let found = pop_any(state)?;
                    if !self.value_assignable(&found, parameter) {
                        return Err(AnalysisErrorKind::NotAssignable {
                            expected: parameter.clone(),
                            found,
                        });
                    }
                }
                if *kind == InvokeKind::Special && name.is_initializer() {
                    self.invoke_initializer(state, owner)?;
                } else if *kind != InvokeKind::Static {
                    self.pop_receiver(state, owner)?;
                }
                if let Some(return_type) = &descriptor.return_type {
                    state.stack.push(AbstractValue::from(return_type.clone()));
                }
            }

            Op::InvokeDynamic { descriptor, .. } => {
                for parameter in descriptor.parameters.iter().rev() {
                    let found = pop_any(state)?;
                    if !self.value_assignable(&found, parameter) {
                        return Err(AnalysisErrorKind::NotAssignable {
                            expected: parameter.clone(),
                            found,
                        });
                    }
                }
                if let Some(return_type) = &descriptor.return_type {
                    state.stack.push(AbstractValue::from(return_type.clone()));
                }
            }

            Op::New { .. } => {
                state.stack.push(VerificationType::Uninitialized(index));
            }

            Op::NewArray { element, dims } => {
                for _ in 0..*dims {
                    pop_expecting(state, &VerificationType::Integer, "int")?;
                }
                let mut element_type = element.clone();
                for _ in 1..*dims {
                    element_type = FieldType::array(element_type);
                }
                state
                    .stack
                    .push(VerificationType::Object(RefType::array(element_type)));
            }

            Op::TypeCheck { kind, ty } => {
                let found = pop_any(state)?;
                let is_object = matches!(
                    found,
                    VerificationType::Null | VerificationType::Object(_),
                );
                if !is_object {
                    return Err(AnalysisErrorKind::WrongType {
                        expected: "an object reference",
                        found,
                    });
                }
                match kind {
                    CheckKind::Cast => {
                        state.stack.push(VerificationType::Object(ty.clone()))
                    }
                    CheckKind::InstanceOf => {
                        state.stack.push(VerificationType::Integer)
                    }
                };
            }

            Op::Monitor { .. } => {
                let found = pop_reference(state, "an object reference")?;
                if matches!(found, VerificationType::Uninitialized(_)) {
                    return Err(AnalysisErrorKind::WrongType {
                        expected: "an object reference",
                        found,
                    });
                }
            }

            Op::Return { ty } => {
                self.check_return(state, *ty)?;
            }

            Op::Throw => {
                let found = pop_any(state)?;
                let throwable = VerificationType::Object(RefType::THROWABLE);
                if !AbstractValue::is_assignable(&found, &throwable, self.checker) {
                    return Err(AnalysisErrorKind::NotThrowable { found });
                }
            }

            Op::Nop | Op::Label(_) => {}
        }
        Ok(())
    }

    /// Is the value usable where the descriptor type is expected?
    fn value_assignable(&self, found: &AbstractValue, target: &FieldType<BinaryName>) -> bool {
        AbstractValue::is_assignable(found, &AbstractValue::from(target.clone()), self.checker)
    }

    /// Pop the receiver of an instance field access or method call
    fn pop_receiver(
        &self,
        state: &mut Frame,
        owner: &BinaryName,
    ) -> Result<AbstractValue, AnalysisErrorKind> {
        let found = pop_reference(state, "an object reference")?;
        let target = VerificationType::Object(RefType::Object(owner.clone()));
        if AbstractValue::is_assignable(&found, &target, self.checker) {
            Ok(found)
        } else {
            Err(AnalysisErrorKind::NotAssignable {
                expected: FieldType::object(owner.clone()),
                found,
            })
        }
    }

    /// `invokespecial` of a constructor: promote the uninitialized receiver everywhere
    fn invoke_initializer(
        &self,
        state: &mut Frame,
        owner: &BinaryName,
    ) -> Result<(), AnalysisErrorKind> {
        let receiver = pop_any(state)?;
        match &receiver {
            VerificationType::Uninitialized(new_index) => {
                let class = match &self.method.instructions[*new_index as usize].op {
                    Op::New { class } => class.clone(),
                    _ => {
                        return Err(AnalysisErrorKind::WrongType {
                            expected: "an uninitialized object",
                            found: receiver,
                        })
                    }
                };
                if !self.checker.is_assignable(&class, owner) {
                    return Err(AnalysisErrorKind::NotAssignable {
                        expected: FieldType::object(owner.clone()),
                        found: receiver,
                    });
                }
                let initialized = VerificationType::Object(RefType::Object(class));
                state.replace_all(&receiver, &initialized);
                Ok(())
            }

            // Constructor delegation: `this` is already typed as the declaring class
            VerificationType::Object(_) => {
                let target = VerificationType::Object(RefType::Object(owner.clone()));
                if AbstractValue::is_assignable(&receiver, &target, self.checker) {
                    Ok(())
                } else {
                    Err(AnalysisErrorKind::NotAssignable {
                        expected: FieldType::object(owner.clone()),
                        found: receiver,
                    })
                }
            }

            _ => Err(AnalysisErrorKind::WrongType {
                expected: "an uninitialized object",
                found: receiver,
            }),
        }
    }

    fn check_return(
        &self,
        state: &mut Frame,
        ty: Option<VarType>,
    ) -> Result<(), AnalysisErrorKind> {
        match (ty, &self.method.descriptor.return_type) {
            (None, None) => Ok(()),
            (None, Some(expected)) => Err(AnalysisErrorKind::WrongReturnType {
                expected: Some(expected.clone()),
                found: None,
            }),
            (Some(_), None) => {
                let found = pop_any(state)?;
                Err(AnalysisErrorKind::WrongReturnType {
                    expected: None,
                    found: Some(found),
                })
            }
            (Some(ty), Some(expected)) => {
                let found = pop_any(state)?;
                let category_matches = match ty {
                    VarType::Int => found == VerificationType::Integer,
                    VarType::Long => found == VerificationType::Long,
                    VarType::Float => found == VerificationType::Float,
                    VarType::Double => found == VerificationType::Double,
                    VarType::Reference => found.is_reference(),
                };
                let expected_value = AbstractValue::from(expected.clone());
                if category_matches
                    && AbstractValue::is_assignable(&found, &expected_value, self.checker)
                {
                    Ok(())
                } else {
                    Err(AnalysisErrorKind::WrongReturnType {
                        expected: Some(expected.clone()),
                        found: Some(found),
                    })
                }
            }
        }
    }
}

fn pop_any(frame: &mut Frame) -> Result<AbstractValue, AnalysisErrorKind> {
    match frame.stack.pop() {
        Some((_, _, value)) => Ok(value),
        None => Err(AnalysisErrorKind::StackUnderflow),
    }
}

fn pop_expecting(
    frame: &mut Frame,
    expected: &AbstractValue,
    name: &'static str,
) -> Result<(), AnalysisErrorKind> {
    let found = pop_any(frame)?;
    if found == *expected {
        Ok(())
    } else {
        Err(AnalysisErrorKind::WrongType {
            expected: name,
            found,
        })
    }
}

fn pop_reference(
    frame: &mut Frame,
    name: &'static str,
) -> Result<AbstractValue, AnalysisErrorKind> {
    let found = pop_any(frame)?;
    if found.is_reference() {
        Ok(found)
    } else {
        Err(AnalysisErrorKind::WrongType {
            expected: name,
            found,
        })
    }
}

/// Pop an entry of width one (the `dup`/`swap` family must not split a two-word value)
fn pop_one_word(frame: &mut Frame) -> Result<AbstractValue, AnalysisErrorKind> {
    let found = pop_any(frame)?;
    if found.width() == 1 {
        Ok(found)
    } else {
        Err(AnalysisErrorKind::WrongType {
            expected: "a one-word value",
            found,
        })
    }
}

fn pop_var(frame: &mut Frame, ty: VarType) -> Result<AbstractValue, AnalysisErrorKind> {
    match ty {
        VarType::Int => {
            pop_expecting(frame, &VerificationType::Integer, "int")?;
            Ok(VerificationType::Integer)
        }
        VarType::Long => {
            pop_expecting(frame, &VerificationType::Long, "long")?;
            Ok(VerificationType::Long)
        }
        VarType::Float => {
            pop_expecting(frame, &VerificationType::Float, "float")?;
            Ok(VerificationType::Float)
        }
        VarType::Double => {
            pop_expecting(frame, &VerificationType::Double, "double")?;
            Ok(VerificationType::Double)
        }
        VarType::Reference => pop_reference(frame, "a reference"),
    }
}

fn load_local(
    frame: &Frame,
    slot: u16,
    ty: VarType,
) -> Result<AbstractValue, AnalysisErrorKind> {
    let found = match frame.locals.get(slot as usize) {
        Some(value) => value.clone(),
        None => return Err(AnalysisErrorKind::UndefinedLocal { slot }),
    };
    let matches = match ty {
        VarType::Int => found == VerificationType::Integer,
        VarType::Long => found == VerificationType::Long,
        VarType::Float => found == VerificationType::Float,
        VarType::Double => found == VerificationType::Double,
        VarType::Reference => found.is_reference(),
    };
    if matches {
        Ok(found)
    } else if found == VerificationType::Top {
        Err(AnalysisErrorKind::UndefinedLocal { slot })
    } else {
        Err(AnalysisErrorKind::WrongLocalType {
            slot,
            expected: var_type_name(ty),
            found,
        })
    }
}

fn store_local(
    frame: &mut Frame,
    slot: u16,
    value: AbstractValue,
) -> Result<(), AnalysisErrorKind> {
    let width = value.width();
    let slot = slot as usize;
    let last = slot + width - 1;
    if last >= u16::MAX as usize {
        return Err(AnalysisErrorKind::BadLocalSlot { slot: slot as u16 });
    }
    if frame.locals.len() <= last {
        frame.locals.resize(last + 1, VerificationType::Top);
    }
    // Overwriting the tail slot of a two-word value kills its head slot too
    if slot > 0 && frame.locals[slot - 1].width() == 2 {
        frame.locals[slot - 1] = VerificationType::Top;
    }
    frame.locals[slot] = value;
    if width == 2 {
        frame.locals[slot + 1] = VerificationType::Top;
    }
    Ok(())
}

/// Untyped stack shuffles, split by the width category of the entries they move
fn stack_op(frame: &mut Frame, op: StackOp) -> Result<(), AnalysisErrorKind> {
    match op {
        StackOp::Pop => {
            pop_one_word(frame)?;
        }
        StackOp::Pop2 => {
            let v1 = pop_any(frame)?;
            if v1.width() == 1 {
                pop_one_word(frame)?;
            }
        }
        StackOp::Dup => {
            let v1 = pop_one_word(frame)?;
            frame.stack.push(v1.clone());
            frame.stack.push(v1);
        }
        StackOp::DupX1 => {
            let v1 = pop_one_word(frame)?;
            let v2 = pop_one_word(frame)?;
            for value in [v1.clone(), v2, v1] {
                frame.stack.push(value);
            }
        }
        StackOp::DupX2 => {
            let v1 = pop_one_word(frame)?;
            let v2 = pop_any(frame)?;
            if v2.width() == 2 {
                for value in [v1.clone(), v2, v1] {
                    frame.stack.push(value);
                }
            } else {
                let v3 = pop_one_word(frame)?;
                for value in [v1.clone(), v3, v2, v1] {
                    frame.stack.push(value);
                }
            }
        }
        StackOp::Dup2 => {
            let v1 = pop_any(frame)?;
            if v1.width() == 2 {
                frame.stack.push(v1.clone());
                frame.stack.push(v1);
            } else {
                let v2 = pop_one_word(frame)?;
                for value in [v2.clone(), v1.clone(), v2, v1] {
                    frame.stack.push(value);
                }
            }
        }
        StackOp::Dup2X1 => {
            let v1 = pop_any(frame)?;
            if v1.width() == 2 {
                let v2 = pop_one_word(frame)?;
                for value in [v1.clone(), v2, v1] {
                    frame.stack.push(value);
                }
            } else {
                let v2 = pop_one_word(frame)?;
                let v3 = pop_one_word(frame)?;
                for value in [v2.clone(), v1.clone(), v3, v2, v1] {
                    frame.stack.push(value);
                }
            }
        }
        StackOp::Dup2X2 => {
            let v1 = pop_any(frame)?;
            if v1.width() == 2 {
                let v2 = pop_any(frame)?;
                if v2.width() == 2 {
                    for value in [v1.clone(), v2, v1] {
                        frame.stack.push(value);
                    }
                } else {
                    let v3 = pop_one_word(frame)?;
                    for value in [v1.clone(), v3, v2, v1] {
                        frame.stack.push(value);
                    }
                }
            } else {
                let v2 = pop_one_word(frame)?;
                let v3 = pop_any(frame)?;
                if v3.width() == 2 {
                    for value in [v2.clone(), v1.clone(), v3, v2, v1] {
                        frame.stack.push(value);
                    }
                } else {
                    let v4 = pop_one_word(frame)?;
                    for value in [v2.clone(), v1.clone(), v4, v3, v2, v1] {
                        frame.stack.push(value);
                    }
                }
            }
        }
        StackOp::Swap => {
            let v1 = pop_one_word(frame)?;
            let v2 = pop_one_word(frame)?;
            frame.stack.push(v1);
            frame.stack.push(v2);
        }
    }
    Ok(())
}

fn const_value_type(value: &ConstValue) -> AbstractValue {
    match value {
        ConstValue::Int(_) => VerificationType::Integer,
        ConstValue::Long(_) => VerificationType::Long,
        ConstValue::Float(_) => VerificationType::Float,
        ConstValue::Double(_) => VerificationType::Double,
        ConstValue::Str(_) => VerificationType::Object(RefType::Object(BinaryName::STRING)),
        ConstValue::Class(_) => VerificationType::Object(RefType::Object(BinaryName::CLASS)),
        ConstValue::MethodHandle(_) => {
            VerificationType::Object(RefType::Object(BinaryName::METHODHANDLE))
        }
        ConstValue::MethodType(_) => {
            VerificationType::Object(RefType::Object(BinaryName::METHODTYPE))
        }
        ConstValue::Null => VerificationType::Null,
    }
}

fn numeric_value(ty: NumericType) -> AbstractValue {
    match ty {
        NumericType::Int => VerificationType::Integer,
        NumericType::Long => VerificationType::Long,
        NumericType::Float => VerificationType::Float,
        NumericType::Double => VerificationType::Double,
    }
}

fn numeric_name(ty: NumericType) -> &'static str {
    match ty {
        NumericType::Int => "int",
        NumericType::Long => "long",
        NumericType::Float => "float",
        NumericType::Double => "double",
    }
}

fn var_type_name(ty: VarType) -> &'static str {
    match ty {
        VarType::Int => "int",
        VarType::Long => "long",
        VarType::Float => "float",
        VarType::Double => "double",
        VarType::Reference => "a reference",
    }
}

fn conversion_types(conversion: Conversion) -> (AbstractValue, &'static str, AbstractValue) {
    use VerificationType::{Double, Float, Integer, Long};
    match conversion {
        Conversion::I2L => (Integer, "int", Long),
        Conversion::I2F => (Integer, "int", Float),
        Conversion::I2D => (Integer, "int", Double),
        Conversion::L2I => (Long, "long", Integer),
        Conversion::L2F => (Long, "long", Float),
        Conversion::L2D => (Long, "long", Double),
        Conversion::F2I => (Float, "float", Integer),
        Conversion::F2L => (Float, "float", Long),
        Conversion::F2D => (Float, "float", Double),
        Conversion::D2I => (Double, "double", Integer),
        Conversion::D2L => (Double, "double", Long),
        Conversion::D2F => (Double, "double", Float),
        Conversion::I2B | Conversion::I2C | Conversion::I2S => (Integer, "int", Integer),
    }
}

fn array_expectation(kind: ArrayKind) -> &'static str {
    match kind {
        ArrayKind::Int => "an int array",
        ArrayKind::Long => "a long array",
        ArrayKind::Float => "a float array",
        ArrayKind::Double => "a double array",
        ArrayKind::Reference => "a reference array",
        ArrayKind::Byte => "a byte or boolean array",
        ArrayKind::Char => "a char array",
        ArrayKind::Short => "a short array",
    }
}

fn array_element_value(kind: ArrayKind) -> AbstractValue {
    match kind {
        ArrayKind::Long => VerificationType::Long,
        ArrayKind::Float => VerificationType::Float,
        ArrayKind::Double => VerificationType::Double,
        _ => VerificationType::Integer,
    }
}

fn array_element_name(kind: ArrayKind) -> &'static str {
    match kind {
        ArrayKind::Long => "long",
        ArrayKind::Float => "float",
        ArrayKind::Double => "double",
        _ => "int",
    }
}

/// Type an array load would push, or `None` if the receiver is not the right kind of array
///
/// A `null` receiver is fine (it throws at runtime); its element type is taken at face value.
fn array_component(value: &AbstractValue, kind: ArrayKind) -> Option<AbstractValue> {
    match value {
        VerificationType::Null => Some(match kind {
            ArrayKind::Reference => VerificationType::Null,
            _ => array_element_value(kind),
        }),

        VerificationType::Object(RefType::PrimitiveArray(array)) => {
            if array.additional_dimensions > 0 {
                // A multi-dimensional primitive array is itself a reference array
                if kind == ArrayKind::Reference {
                    Some(VerificationType::Object(RefType::PrimitiveArray(
                        ArrayType {
                            additional_dimensions: array.additional_dimensions - 1,
                            element_type: array.element_type,
                        },
                    )))
                } else {
                    None
                }
            } else {
                let matches = match kind {
                    ArrayKind::Int => array.element_type == BaseType::Int,
                    ArrayKind::Long => array.element_type == BaseType::Long,
                    ArrayKind::Float => array.element_type == BaseType::Float,
                    ArrayKind::Double => array.element_type == BaseType::Double,
                    ArrayKind::Char => array.element_type == BaseType::Char,
                    ArrayKind::Short => array.element_type == BaseType::Short,

                    // `baload`/`bastore` cover both byte and boolean arrays
                    ArrayKind::Byte => matches!(
                        array.element_type,
                        BaseType::Byte | BaseType::Boolean
                    ),
                    ArrayKind::Reference => false,
                };
                if matches {
                    Some(array_element_value(kind))
                } else {
                    None
                }
            }
        }

        VerificationType::Object(RefType::ObjectArray(array)) if kind == ArrayKind::Reference => {
            Some(if array.additional_dimensions == 0 {
                VerificationType::Object(RefType::Object(array.element_type.clone()))
            } else {
                VerificationType::Object(RefType::ObjectArray(ArrayType {
                    additional_dimensions: array.additional_dimensions - 1,
                    element_type: array.element_type.clone(),
                }))
            })
        }

        _ => None,
    }
}
