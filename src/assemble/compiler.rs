//! Lowering of an analyzed method body into a `Code` attribute
//!
//! [`MethodCompiler`] takes the instruction stream, its control flow graph, and the frames the
//! analyzer computed, and produces the final artifacts: the bytecode array, the exception
//! table, the stack map table, and (optionally) the debug tables. The pipeline is
//!
//!  1. lower every live abstract instruction into concrete [`Instruction`]s, grouped into
//!     [`BasicBlock`]s (instructions the analysis never reached emit nothing),
//!  2. fix the alignment padding of switch instructions,
//!  3. rewrite jumps whose final offsets would overflow 16 bits (see
//!     [`jump_encoding::widen_oversized_jumps`]),
//!  4. lay the blocks out, resolve every label to a byte offset, and serialize.
//!
//! Constants are interned into the [`ConstantsPool`] as they are first needed, so two
//! compilations of the same input against fresh pools produce byte-identical output.

use crate::assemble::analyzer::MethodFrames;
use crate::assemble::ast::{
    ArithOp, ArrayKind, CheckKind, ConstValue, Conversion, FieldKind, HandleData, InvokeKind,
    JumpKind, MemberDescriptor, MethodDefinition, NumericType, Op, StackOp, SwitchKind, VarKind,
    VarType,
};
use crate::assemble::cfg::ControlFlowGraph;
use crate::assemble::errors::MethodCompileError;
use crate::jvm::class_file::{
    Attribute, BytecodeArray, BytecodeIndex, ClassConstantIndex, Code, ConstantIndex,
    ConstantsPool, ExceptionHandler, HandleKind, LineNumber, LineNumberTable, LocalVariable,
    LocalVariableTable, LocalVariableType, LocalVariableTypeTable, StackMapFrame, StackMapTable,
};
use crate::jvm::code::{
    jump_encoding, BasicBlock, BranchInstruction, EqComparison, Instruction, InvokeType,
    LabelGenerator, ShiftType, SynLabel, SynLabelGenerator,
};
use crate::jvm::verifier::{Frame, SerializableFrame};
use crate::jvm::{BinaryName, FieldType, Name, RefType, RenderDescriptor, Serialize};
use crate::util::{Offset, OffsetVec, Width};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Block representation the compiler lowers into before serialization
type Block = BasicBlock<Frame, Instruction, BranchInstruction<SynLabel, SynLabel, SynLabel>>;

/// One-shot lowering of a verified method body
pub struct MethodCompiler<'a> {
    /// Internal name of the class declaring the method (types the implicit receiver frame)
    self_type: &'a BinaryName,

    constants: &'a mut ConstantsPool,

    /// Emit `LineNumberTable`, `LocalVariableTable`, and `LocalVariableTypeTable`
    debug_info: bool,
}

impl<'a> MethodCompiler<'a> {
    pub fn new(self_type: &'a BinaryName, constants: &'a mut ConstantsPool) -> MethodCompiler<'a> {
        MethodCompiler {
            self_type,
            constants,
            debug_info: false,
        }
    }

    pub fn debug_info(mut self, debug_info: bool) -> MethodCompiler<'a> {
        self.debug_info = debug_info;
        self
    }

    /// Lower the method into its final `Code` artifacts
    ///
    /// The `frames` must come from a successful analysis of the same `method` and `cfg`.
    pub fn compile(
        mut self,
        method: &MethodDefinition,
        cfg: &ControlFlowGraph,
        frames: &MethodFrames,
    ) -> Result<CompiledMethod, MethodCompileError> {
        let instructions = &method.instructions;

        let mut max_locals = Offset(0);
        let mut max_stack = Offset(0);
        for frame in frames.iter().flatten() {
            frame.update_maximums(&mut max_locals, &mut max_stack);
        }
        let max_locals = u16::try_from(max_locals.0)
            .map_err(|_| MethodCompileError::MaxLocalsTooLarge(max_locals.0))?;
        let max_stack = u16::try_from(max_stack.0)
            .map_err(|_| MethodCompileError::MaxStackTooLarge(max_stack.0))?;

        // Live blocks (those the analysis reached) each get a label; dead blocks emit nothing
        let mut label_generator = SynLabelGenerator::new(SynLabel::START);
        let labels: Vec<Option<SynLabel>> = cfg
            .blocks
            .iter()
            .map(|block| {
                frames[block.start as usize]
                    .as_ref()
                    .map(|_| label_generator.fresh_label())
            })
            .collect();
        let block_at_index: HashMap<u32, usize> = cfg
            .blocks
            .iter()
            .enumerate()
            .map(|(block_index, block)| (block.start, block_index))
            .collect();
        let resolve_target = |target: &str| -> SynLabel {
            let block_index = block_at_index[&cfg.labels[target]];
            labels[block_index].expect("live block jumps into a dead block")
        };

        let mut blocks: HashMap<SynLabel, Block> = HashMap::new();
        let mut block_order: Vec<SynLabel> = vec![];

        // Where each abstract instruction landed, for resolving handler and variable ranges
        let mut insn_positions: Vec<Option<(SynLabel, usize)>> = vec![None; instructions.len()];

        // Where each `new` landed, for serializing uninitialized verification types
        let mut new_sites: Vec<(u32, SynLabel, usize)> = vec![];

        // Source line of each position that emitted code, in layout order
        let mut line_marks: Vec<(SynLabel, usize, u32)> = vec![];

        for (block_index, block) in cfg.blocks.iter().enumerate() {
            let label = match labels[block_index] {
                Some(label) => label,
                None => continue,
            };
            let frame = frames[block.start as usize]
                .clone()
                .expect("live block has no entry frame");

            let mut body: OffsetVec<Instruction> = OffsetVec::new();
            let mut branch_end: Option<BranchInstruction<SynLabel, SynLabel, SynLabel>> = None;
            for index in block.start..block.end {
                let instruction = &instructions[index as usize];
                let position = body.offset_len().0;
                insn_positions[index as usize] = Some((label, position));
                if !matches!(instruction.op, Op::Label(_)) {
                    line_marks.push((label, position, instruction.line));
                }

                match &instruction.op {
                    Op::Label(_) => (),

                    Op::Jump { kind, target } => {
                        let taken = resolve_target(target);
                        let next = || {
                            labels
                                .get(block_index + 1)
                                .copied()
                                .flatten()
                                .expect("conditional jump falls off the last block")
                        };
                        branch_end = Some(match kind {
                            JumpKind::Goto => BranchInstruction::Goto(taken),
                            JumpKind::If(comparison) => {
                                BranchInstruction::If(*comparison, taken, next())
                            }
                            JumpKind::IfICmp(comparison) => {
                                BranchInstruction::IfICmp(*comparison, taken, next())
                            }
                            JumpKind::IfACmp(comparison) => {
                                BranchInstruction::IfACmp(*comparison, taken, next())
                            }
                            JumpKind::IfNull => {
                                BranchInstruction::IfNull(EqComparison::EQ, taken, next())
                            }
                            JumpKind::IfNonNull => {
                                BranchInstruction::IfNull(EqComparison::NE, taken, next())
                            }
                        });
                    }

                    Op::Switch {
                        kind,
                        cases,
                        default,
                    } => {
                        let default = resolve_target(default);
                        branch_end = Some(match kind {
                            SwitchKind::Table => BranchInstruction::TableSwitch {
                                padding: 0,
                                default,
                                low: cases[0].0,
                                targets: cases
                                    .iter()
                                    .map(|(_, target)| resolve_target(target))
                                    .collect(),
                            },
                            SwitchKind::Lookup => {
                                let mut targets: Vec<(i32, SynLabel)> = cases
                                    .iter()
                                    .map(|(key, target)| (*key, resolve_target(target)))
                                    .collect();
                                targets.sort_unstable_by_key(|(key, _)| *key);
                                BranchInstruction::LookupSwitch {
                                    padding: 0,
                                    default,
                                    targets,
                                }
                            }
                        });
                    }

                    Op::Return { ty } => {
                        branch_end = Some(match ty {
                            None => BranchInstruction::Return,
                            Some(VarType::Int) => BranchInstruction::IReturn,
                            Some(VarType::Long) => BranchInstruction::LReturn,
                            Some(VarType::Float) => BranchInstruction::FReturn,
                            Some(VarType::Double) => BranchInstruction::DReturn,
                            Some(VarType::Reference) => BranchInstruction::AReturn,
                        });
                    }

                    Op::Throw => branch_end = Some(BranchInstruction::AThrow),

                    op => {
                        if let Op::New { .. } = op {
                            new_sites.push((index, label, position));
                        }
                        body.push(self.lower(op)?);
                    }
                }
            }

            let branch_end = branch_end.unwrap_or_else(|| {
                let next = labels
                    .get(block_index + 1)
                    .copied()
                    .flatten()
                    .expect("execution falls off the last block");
                BranchInstruction::FallThrough(next)
            });

            blocks.insert(
                label,
                BasicBlock {
                    frame,
                    instructions: body,
                    branch_end,
                },
            );
            block_order.push(label);
        }

        if block_order.is_empty() {
            return Err(MethodCompileError::EmptyCode);
        }

        // Switch offsets must be 4-byte aligned from the start of the code array. Jump widening
        // only ever grows the code in multiples of four bytes, so padding fixed now stays valid.
        let mut offset = 0;
        for label in &block_order {
            let block = blocks.get_mut(label).expect("block order names a block");
            let opcode_offset = offset + block.instructions.offset_len().0;
            block
                .branch_end
                .set_padding(((4 - ((opcode_offset + 1) % 4)) % 4) as u8);
            offset += block.width();
        }

        jump_encoding::widen_oversized_jumps(
            &mut block_order,
            &mut blocks,
            &mut label_generator,
            &jump_encoding::SIGNED_16BIT_JUMP_RANGE,
        );

        let label_offsets = BasicBlock::compute_block_offsets(&block_order, &blocks);
        let code_length: usize = block_order.iter().map(|label| blocks[label].width()).sum();
        let end_of_code = u16::try_from(code_length)
            .map_err(|_| MethodCompileError::CodeTooLarge(code_length))?;

        let new_offsets: HashMap<u32, u16> = new_sites
            .into_iter()
            .map(|(index, label, position)| (index, (label_offsets[&label].0 + position) as u16))
            .collect();

        // Offsets that need a stack map frame: every jump target, plus every handler entry
        let mut frame_labels: HashSet<SynLabel> = HashSet::new();
        for label in &block_order {
            frame_labels.extend(
                blocks[label]
                    .branch_end
                    .jump_targets()
                    .targets()
                    .iter()
                    .copied(),
            );
        }
        for handler in &cfg.handlers {
            if let Some(label) = labels[handler.handler_block] {
                frame_labels.insert(label);
            }
        }

        let implicit_receiver = if method.has_receiver() {
            Some(RefType::Object(self.self_type.clone()))
        } else {
            None
        };
        let implicit_frame = Frame::method_entry(implicit_receiver, &method.descriptor)
            .into_serializable(self.constants, &new_offsets)?;

        let mut code: Vec<u8> = Vec::with_capacity(code_length);
        let mut raw_frames: Vec<(usize, SerializableFrame)> = vec![];
        for label in &block_order {
            let block = blocks.remove(label).expect("block order names a block");
            let block_offset = label_offsets[label].0;
            if frame_labels.contains(label) {
                raw_frames.push((
                    block_offset,
                    block.frame.into_serializable(self.constants, &new_offsets)?,
                ));
            }

            for (_, _, instruction) in block.instructions.iter() {
                instruction.serialize(&mut code)?;
            }
            let branch_offset = (block_offset + block.instructions.offset_len().0) as i64;
            let branch: BranchInstruction<i16, i32, ()> = block.branch_end.map_labels(
                |target| {
                    i16::try_from(label_offsets[target].0 as i64 - branch_offset)
                        .expect("16-bit jump offset overflow survived widening")
                },
                |target| (label_offsets[target].0 as i64 - branch_offset) as i32,
                |_| (),
            );
            branch.serialize(&mut code)?;
        }

        // Two frames can land on one offset when an empty block runs into its successor; the
        // later entry is the full merge of everything reaching that offset, so it wins
        let mut frames_at: Vec<(usize, SerializableFrame)> = vec![];
        for (offset, frame) in raw_frames {
            match frames_at.last_mut() {
                Some((last_offset, last_frame)) if *last_offset == offset => *last_frame = frame,
                _ => frames_at.push((offset, frame)),
            }
        }
        let mut stack_map_table: Vec<StackMapFrame> = vec![];
        let mut previous: Option<(usize, SerializableFrame)> = None;
        for (offset, frame) in frames_at {
            let (offset_delta, previous_frame) = match &previous {
                None => (offset as u16, &implicit_frame),
                Some((previous_offset, previous_frame)) => {
                    ((offset - previous_offset - 1) as u16, previous_frame)
                }
            };
            stack_map_table.push(frame.stack_map_frame(offset_delta, previous_frame));
            previous = Some((offset, frame));
        }

        // Ranges referring to labels inside dead stretches snap forward to the next live
        // position (or the end of the code)
        let resolve_offset = |index: u32| -> u16 {
            insn_positions[index as usize..]
                .iter()
                .find_map(|position| {
                    position.map(|(label, intra)| (label_offsets[&label].0 + intra) as u16)
                })
                .unwrap_or(end_of_code)
        };

        let mut exception_table: Vec<ExceptionHandler> = vec![];
        for handler in &cfg.handlers {
            let start_pc = resolve_offset(handler.start);
            let end_pc = resolve_offset(handler.end);
            let handler_label = match labels[handler.handler_block] {
                Some(label) => label,
                None => continue,
            };
            if start_pc >= end_pc {
                continue;
            }
            let catch_type = match &handler.catch_type {
                Some(name) => {
                    let name_utf8 = self.constants.get_utf8(name.as_str())?;
                    self.constants.get_class(name_utf8)?
                }
                None => ClassConstantIndex::CATCH_ALL,
            };
            exception_table.push(ExceptionHandler {
                start_pc: BytecodeIndex(start_pc),
                end_pc: BytecodeIndex(end_pc),
                handler_pc: BytecodeIndex(label_offsets[&handler_label].0 as u16),
                catch_type,
            });
        }

        let mut line_number_table: Vec<LineNumber> = vec![];
        let mut local_variable_table: Vec<LocalVariable> = vec![];
        let mut local_variable_type_table: Vec<LocalVariableType> = vec![];
        if self.debug_info {
            for (label, position, line) in line_marks {
                let line_number = line.min(u16::MAX as u32) as u16;
                if line_number_table
                    .last()
                    .map_or(true, |last: &LineNumber| last.line_number != line_number)
                {
                    line_number_table.push(LineNumber {
                        start_pc: BytecodeIndex((label_offsets[&label].0 + position) as u16),
                        line_number,
                    });
                }
            }

            for declaration in &method.locals {
                let start_pc = resolve_offset(cfg.labels[&declaration.start]);
                let end_pc = resolve_offset(cfg.labels[&declaration.end]);
                if start_pc >= end_pc {
                    continue;
                }
                let name_index = self.constants.get_utf8(declaration.name.as_str())?;
                let descriptor_index = self.constants.get_utf8(declaration.descriptor.render())?;
                local_variable_table.push(LocalVariable {
                    start_pc: BytecodeIndex(start_pc),
                    length: end_pc - start_pc,
                    name_index,
                    descriptor_index,
                    index: declaration.slot,
                });
                if let Some(signature) = &declaration.signature {
                    let signature_index = self.constants.get_utf8(signature.as_str())?;
                    local_variable_type_table.push(LocalVariableType {
                        start_pc: BytecodeIndex(start_pc),
                        length: end_pc - start_pc,
                        name_index,
                        signature_index,
                        index: declaration.slot,
                    });
                }
            }
        }

        debug!(
            "compiled '{}': {} bytes, max_stack {}, max_locals {}, {} stack map frames",
            method.name.as_str(),
            code.len(),
            max_stack,
            max_locals,
            stack_map_table.len(),
        );

        Ok(CompiledMethod {
            code,
            max_stack,
            max_locals,
            exception_table,
            stack_map_table,
            line_number_table,
            local_variable_table,
            local_variable_type_table,
        })
    }

    /// Lower one straight-line operation into its concrete instruction
    fn lower(&mut self, op: &Op) -> Result<Instruction, MethodCompileError> {
        use Instruction::*;

        Ok(match op {
            Op::Const(value) => self.lower_const(value)?,

            Op::Var { kind, ty, slot } => match (kind, ty) {
                (VarKind::Load, VarType::Int) => ILoad(*slot),
                (VarKind::Load, VarType::Long) => LLoad(*slot),
                (VarKind::Load, VarType::Float) => FLoad(*slot),
                (VarKind::Load, VarType::Double) => DLoad(*slot),
                (VarKind::Load, VarType::Reference) => ALoad(*slot),
                (VarKind::Store, VarType::Int) => IStore(*slot),
                (VarKind::Store, VarType::Long) => LStore(*slot),
                (VarKind::Store, VarType::Float) => FStore(*slot),
                (VarKind::Store, VarType::Double) => DStore(*slot),
                (VarKind::Store, VarType::Reference) => AStore(*slot),
                (VarKind::Increment(delta), _) => IInc(*slot, *delta),
            },

            Op::Stack(op) => match op {
                StackOp::Pop => Pop,
                StackOp::Pop2 => Pop2,
                StackOp::Dup => Dup,
                StackOp::DupX1 => DupX1,
                StackOp::DupX2 => DupX2,
                StackOp::Dup2 => Dup2,
                StackOp::Dup2X1 => Dup2X1,
                StackOp::Dup2X2 => Dup2X2,
                StackOp::Swap => Swap,
            },

            Op::Arith { op, ty } => match (op, ty) {
                (ArithOp::Add, NumericType::Int) => IAdd,
                (ArithOp::Add, NumericType::Long) => LAdd,
                (ArithOp::Add, NumericType::Float) => FAdd,
                (ArithOp::Add, NumericType::Double) => DAdd,
                (ArithOp::Sub, NumericType::Int) => ISub,
                (ArithOp::Sub, NumericType::Long) => LSub,
                (ArithOp::Sub, NumericType::Float) => FSub,
                (ArithOp::Sub, NumericType::Double) => DSub,
                (ArithOp::Mul, NumericType::Int) => IMul,
                (ArithOp::Mul, NumericType::Long) => LMul,
                (ArithOp::Mul, NumericType::Float) => FMul,
                (ArithOp::Mul, NumericType::Double) => DMul,
                (ArithOp::Div, NumericType::Int) => IDiv,
                (ArithOp::Div, NumericType::Long) => LDiv,
                (ArithOp::Div, NumericType::Float) => FDiv,
                (ArithOp::Div, NumericType::Double) => DDiv,
                (ArithOp::Rem, NumericType::Int) => IRem,
                (ArithOp::Rem, NumericType::Long) => LRem,
                (ArithOp::Rem, NumericType::Float) => FRem,
                (ArithOp::Rem, NumericType::Double) => DRem,
                (ArithOp::Neg, NumericType::Int) => INeg,
                (ArithOp::Neg, NumericType::Long) => LNeg,
                (ArithOp::Neg, NumericType::Float) => FNeg,
                (ArithOp::Neg, NumericType::Double) => DNeg,
                (ArithOp::Shl, NumericType::Int) => ISh(ShiftType::Left),
                (ArithOp::Shr, NumericType::Int) => ISh(ShiftType::ArithmeticRight),
                (ArithOp::Ushr, NumericType::Int) => ISh(ShiftType::LogicalRight),
                (ArithOp::Shl, NumericType::Long) => LSh(ShiftType::Left),
                (ArithOp::Shr, NumericType::Long) => LSh(ShiftType::ArithmeticRight),
                (ArithOp::Ushr, NumericType::Long) => LSh(ShiftType::LogicalRight),
                (ArithOp::And, NumericType::Int) => IAnd,
                (ArithOp::And, NumericType::Long) => LAnd,
                (ArithOp::Or, NumericType::Int) => IOr,
                (ArithOp::Or, NumericType::Long) => LOr,
                (ArithOp::Xor, NumericType::Int) => IXor,
                (ArithOp::Xor, NumericType::Long) => LXor,
                (ArithOp::Cmp(_), NumericType::Long) => LCmp,
                (ArithOp::Cmp(mode), NumericType::Float) => FCmp(*mode),
                (ArithOp::Cmp(mode), NumericType::Double) => DCmp(*mode),
                (op, ty) => unreachable!("no encoding for {:?} over {:?}", op, ty),
            },

            Op::Convert(conversion) => match conversion {
                Conversion::I2L => I2L,
                Conversion::I2F => I2F,
                Conversion::I2D => I2D,
                Conversion::L2I => L2I,
                Conversion::L2F => L2F,
                Conversion::L2D => L2D,
                Conversion::F2I => F2I,
                Conversion::F2L => F2L,
                Conversion::F2D => F2D,
                Conversion::D2I => D2I,
                Conversion::D2L => D2L,
                Conversion::D2F => D2F,
                Conversion::I2B => I2B,
                Conversion::I2C => I2C,
                Conversion::I2S => I2S,
            },

            Op::ArrayLoad { ty } => match ty {
                ArrayKind::Int => IALoad,
                ArrayKind::Long => LALoad,
                ArrayKind::Float => FALoad,
                ArrayKind::Double => DALoad,
                ArrayKind::Reference => AALoad,
                ArrayKind::Byte => BALoad,
                ArrayKind::Char => CALoad,
                ArrayKind::Short => SALoad,
            },

            Op::ArrayStore { ty } => match ty {
                ArrayKind::Int => IAStore,
                ArrayKind::Long => LAStore,
                ArrayKind::Float => FAStore,
                ArrayKind::Double => DAStore,
                ArrayKind::Reference => AAStore,
                ArrayKind::Byte => BAStore,
                ArrayKind::Char => CAStore,
                ArrayKind::Short => SAStore,
            },

            Op::ArrayLength => ArrayLength,

            Op::Field {
                kind,
                is_static,
                owner,
                name,
                descriptor,
            } => {
                let class = self.class_constant(owner)?;
                let name_utf8 = self.constants.get_utf8(name.as_str())?;
                let descriptor_utf8 = self.constants.get_utf8(descriptor.render())?;
                let name_and_type = self.constants.get_name_and_type(name_utf8, descriptor_utf8)?;
                let field = self.constants.get_field_ref(class, name_and_type)?;
                match (kind, is_static) {
                    (FieldKind::Get, true) => GetStatic(field),
                    (FieldKind::Get, false) => GetField(field),
                    (FieldKind::Put, true) => PutStatic(field),
                    (FieldKind::Put, false) => PutField(field),
                }
            }

            Op::Invoke {
                kind,
                owner,
                name,
                descriptor,
            } => {
                let class = self.class_constant(owner)?;
                let name_utf8 = self.constants.get_utf8(name.as_str())?;
                let descriptor_utf8 = self.constants.get_utf8(descriptor.render())?;
                let name_and_type = self.constants.get_name_and_type(name_utf8, descriptor_utf8)?;
                let method = self.constants.get_method_ref(
                    class,
                    name_and_type,
                    *kind == InvokeKind::Interface,
                )?;
                let invoke_type = match kind {
                    InvokeKind::Virtual => InvokeType::Virtual,
                    InvokeKind::Static => InvokeType::Static,
                    InvokeKind::Special => InvokeType::Special,
                    InvokeKind::Interface => {
                        InvokeType::Interface(descriptor.parameter_length(true) as u8)
                    }
                };
                Invoke(invoke_type, method)
            }

            Op::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
                bootstrap_args,
            } => {
                let bootstrap_handle = self.handle_constant(bootstrap)?;
                let arguments = bootstrap_args
                    .iter()
                    .map(|argument| self.loadable_constant(argument))
                    .collect::<Result<Vec<ConstantIndex>, MethodCompileError>>()?;
                let bootstrap_index = self
                    .constants
                    .get_bootstrap_method(bootstrap_handle, arguments)?;
                let name_utf8 = self.constants.get_utf8(name.as_str())?;
                let descriptor_utf8 = self.constants.get_utf8(descriptor.render())?;
                let name_and_type = self.constants.get_name_and_type(name_utf8, descriptor_utf8)?;
                InvokeDynamic(
                    self.constants
                        .get_invoke_dynamic(bootstrap_index, name_and_type)?,
                )
            }

            Op::New { class } => New(self.class_constant(class)?),

            Op::NewArray { element, dims } => {
                if *dims == 1 {
                    match element {
                        FieldType::Base(base) => NewArray(*base),
                        FieldType::Ref(ref_type) => ANewArray(self.ref_type_constant(ref_type)?),
                    }
                } else {
                    // The class constant names the full array type, every dimension included
                    let mut element_type = element.clone();
                    for _ in 1..*dims {
                        element_type = FieldType::array(element_type);
                    }
                    let array = RefType::array(element_type);
                    MultiANewArray(self.ref_type_constant(&array)?, *dims)
                }
            }

            Op::TypeCheck { kind, ty } => {
                let class = self.ref_type_constant(ty)?;
                match kind {
                    CheckKind::Cast => CheckCast(class),
                    CheckKind::InstanceOf => InstanceOf(class),
                }
            }

            Op::Monitor { enter: true } => MonitorEnter,
            Op::Monitor { enter: false } => MonitorExit,

            Op::Nop => Nop,

            Op::Label(_) | Op::Jump { .. } | Op::Switch { .. } | Op::Return { .. } | Op::Throw => {
                unreachable!("branching operations close a block")
            }
        })
    }

    /// Pick the shortest encoding of a constant push
    fn lower_const(&mut self, value: &ConstValue) -> Result<Instruction, MethodCompileError> {
        use Instruction::*;

        Ok(match value {
            ConstValue::Int(-1) => IConstM1,
            ConstValue::Int(0) => IConst0,
            ConstValue::Int(1) => IConst1,
            ConstValue::Int(2) => IConst2,
            ConstValue::Int(3) => IConst3,
            ConstValue::Int(4) => IConst4,
            ConstValue::Int(5) => IConst5,
            ConstValue::Int(int) => {
                if let Ok(byte) = i8::try_from(*int) {
                    BiPush(byte)
                } else if let Ok(short) = i16::try_from(*int) {
                    SiPush(short)
                } else {
                    Ldc(self.constants.get_integer(*int)?)
                }
            }
            ConstValue::Long(0) => LConst0,
            ConstValue::Long(1) => LConst1,
            ConstValue::Long(long) => Ldc2(self.constants.get_long(*long)?),
            ConstValue::Float(float) if float.to_bits() == 0.0f32.to_bits() => FConst0,
            ConstValue::Float(float) if float.to_bits() == 1.0f32.to_bits() => FConst1,
            ConstValue::Float(float) if float.to_bits() == 2.0f32.to_bits() => FConst2,
            ConstValue::Float(float) => Ldc(self.constants.get_float(*float)?),
            ConstValue::Double(double) if double.to_bits() == 0.0f64.to_bits() => DConst0,
            ConstValue::Double(double) if double.to_bits() == 1.0f64.to_bits() => DConst1,
            ConstValue::Double(double) => Ldc2(self.constants.get_double(*double)?),
            ConstValue::Str(string) => {
                let string_utf8 = self.constants.get_utf8(string.as_str())?;
                Ldc(self.constants.get_string(string_utf8)?.into())
            }
            ConstValue::Class(ref_type) => Ldc(self.ref_type_constant(ref_type)?.into()),
            ConstValue::MethodHandle(handle) => Ldc(self.handle_constant(handle)?),
            ConstValue::MethodType(descriptor) => {
                let descriptor_utf8 = self.constants.get_utf8(descriptor.render())?;
                Ldc(self.constants.get_method_type(descriptor_utf8)?)
            }
            ConstValue::Null => AConstNull,
        })
    }

    fn class_constant(
        &mut self,
        class: &BinaryName,
    ) -> Result<ClassConstantIndex, MethodCompileError> {
        let class_utf8 = self.constants.get_utf8(class.as_str())?;
        Ok(self.constants.get_class(class_utf8)?)
    }

    /// Class constant for a reference type: a plain internal name or an array descriptor
    fn ref_type_constant(
        &mut self,
        ref_type: &RefType<BinaryName>,
    ) -> Result<ClassConstantIndex, MethodCompileError> {
        let rendered_utf8 = self.constants.get_utf8(ref_type.render_internal())?;
        Ok(self.constants.get_class(rendered_utf8)?)
    }

    fn handle_constant(&mut self, handle: &HandleData) -> Result<ConstantIndex, MethodCompileError> {
        let class = self.class_constant(&handle.owner)?;
        let name_utf8 = self.constants.get_utf8(handle.name.as_str())?;
        let member: ConstantIndex = match &handle.descriptor {
            MemberDescriptor::Field(field) => {
                let descriptor_utf8 = self.constants.get_utf8(field.render())?;
                let name_and_type = self.constants.get_name_and_type(name_utf8, descriptor_utf8)?;
                self.constants.get_field_ref(class, name_and_type)?.into()
            }
            MemberDescriptor::Method(descriptor) => {
                let descriptor_utf8 = self.constants.get_utf8(descriptor.render())?;
                let name_and_type = self.constants.get_name_and_type(name_utf8, descriptor_utf8)?;
                self.constants
                    .get_method_ref(
                        class,
                        name_and_type,
                        handle.kind == HandleKind::InvokeInterface,
                    )?
                    .into()
            }
        };
        Ok(self.constants.get_method_handle(handle.kind, member)?)
    }

    /// Constant pool entry for a bootstrap method argument
    fn loadable_constant(
        &mut self,
        value: &ConstValue,
    ) -> Result<ConstantIndex, MethodCompileError> {
        Ok(match value {
            ConstValue::Int(int) => self.constants.get_integer(*int)?,
            ConstValue::Long(long) => self.constants.get_long(*long)?,
            ConstValue::Float(float) => self.constants.get_float(*float)?,
            ConstValue::Double(double) => self.constants.get_double(*double)?,
            ConstValue::Str(string) => {
                let string_utf8 = self.constants.get_utf8(string.as_str())?;
                self.constants.get_string(string_utf8)?.into()
            }
            ConstValue::Class(ref_type) => self.ref_type_constant(ref_type)?.into(),
            ConstValue::MethodHandle(handle) => self.handle_constant(handle)?,
            ConstValue::MethodType(descriptor) => {
                let descriptor_utf8 = self.constants.get_utf8(descriptor.render())?;
                self.constants.get_method_type(descriptor_utf8)?
            }
            ConstValue::Null => unreachable!("null is never a constant pool entry"),
        })
    }
}

/// Everything `compile` produces for one method
///
/// The pieces are public so a caller can inspect them (or splice them into its own classfile
/// writer); [`CompiledMethod::code_attribute`] assembles them into a ready `Code` attribute.
#[derive(Debug)]
pub struct CompiledMethod {
    /// Serialized bytecode
    pub code: Vec<u8>,

    pub max_stack: u16,

    pub max_locals: u16,

    /// Handlers in declaration order, empty and dead ranges dropped
    pub exception_table: Vec<ExceptionHandler>,

    /// Compressed frames for every jump target and handler entry, in offset order
    pub stack_map_table: Vec<StackMapFrame>,

    /// Empty unless the compiler was built with `debug_info(true)`
    pub line_number_table: Vec<LineNumber>,

    /// Empty unless the compiler was built with `debug_info(true)`
    pub local_variable_table: Vec<LocalVariable>,

    /// Empty unless the compiler was built with `debug_info(true)`
    pub local_variable_type_table: Vec<LocalVariableType>,
}

impl CompiledMethod {
    /// Assemble the final `Code` attribute, nesting the table attributes inside it
    pub fn code_attribute(
        self,
        constants: &mut ConstantsPool,
    ) -> Result<Attribute, MethodCompileError> {
        let mut attributes: Vec<Attribute> = vec![];
        if !self.stack_map_table.is_empty() {
            attributes.push(constants.get_attribute(StackMapTable(self.stack_map_table))?);
        }
        if !self.line_number_table.is_empty() {
            attributes.push(constants.get_attribute(LineNumberTable(self.line_number_table))?);
        }
        if !self.local_variable_table.is_empty() {
            attributes.push(constants.get_attribute(LocalVariableTable(self.local_variable_table))?);
        }
        if !self.local_variable_type_table.is_empty() {
            attributes.push(constants.get_attribute(LocalVariableTypeTable(
                self.local_variable_type_table,
            ))?);
        }
        Ok(constants.get_attribute(Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code_array: BytecodeArray(self.code),
            exception_table: self.exception_table,
            attributes,
        })?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assemble::analyzer::Analyzer;
    use crate::assemble::ast::{Instruction as AbstractInstruction, LocalVariableDecl};
    use crate::class_graph::InheritanceChecker;
    use crate::jvm::code::OrdComparison;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, ParseDescriptor, UnqualifiedName};

    /// Hierarchy that only knows `java/lang/Object` sits on top
    struct FlatChecker;

    impl InheritanceChecker for FlatChecker {
        fn common_type(&self, class1: &BinaryName, class2: &BinaryName) -> BinaryName {
            if class1 == class2 {
                class1.clone()
            } else {
                BinaryName::OBJECT
            }
        }

        fn is_assignable(&self, sub_class: &BinaryName, super_class: &BinaryName) -> bool {
            sub_class == super_class || super_class == &BinaryName::OBJECT
        }
    }

    fn method(descriptor: &str, ops: Vec<Op>) -> MethodDefinition {
        MethodDefinition {
            access: MethodAccessFlags::STATIC,
            name: UnqualifiedName::from_string("test".to_string()).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            signature: None,
            instructions: ops
                .into_iter()
                .enumerate()
                .map(|(index, op)| AbstractInstruction::new(index as u32 + 1, op))
                .collect(),
            locals: vec![],
            handlers: vec![],
        }
    }

    fn compile(method: &MethodDefinition, debug_info: bool) -> CompiledMethod {
        let cfg = ControlFlowGraph::build(method).unwrap();
        let frames = Analyzer::new(&BinaryName::OBJECT, method, &FlatChecker)
            .analyze(&cfg)
            .unwrap();
        let mut constants = ConstantsPool::new();
        MethodCompiler::new(&BinaryName::OBJECT, &mut constants)
            .debug_info(debug_info)
            .compile(method, &cfg, &frames)
            .unwrap()
    }

    fn read_i32(code: &[u8], at: usize) -> i32 {
        i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]])
    }

    fn load_int(slot: u16) -> Op {
        Op::Var {
            kind: VarKind::Load,
            ty: VarType::Int,
            slot,
        }
    }

    fn store_int(slot: u16) -> Op {
        Op::Var {
            kind: VarKind::Store,
            ty: VarType::Int,
            slot,
        }
    }

    #[test]
    fn two_paths_into_a_join() {
        let method = method(
            "(Z)I",
            vec![
                load_int(0),
                Op::Jump {
                    kind: JumpKind::If(OrdComparison::EQ),
                    target: "else".to_string(),
                },
                Op::Const(ConstValue::Int(2)),
                store_int(1),
                Op::Jump {
                    kind: JumpKind::Goto,
                    target: "end".to_string(),
                },
                Op::Label("else".to_string()),
                Op::Const(ConstValue::Int(3)),
                store_int(1),
                Op::Label("end".to_string()),
                load_int(1),
                Op::Return {
                    ty: Some(VarType::Int),
                },
            ],
        );
        let compiled = compile(&method, false);

        assert_eq!(
            compiled.code,
            vec![
                0x1a, // iload_0
                0x99, 0x00, 0x08, // ifeq +8 (to "else")
                0x05, // iconst_2
                0x3c, // istore_1
                0xa7, 0x00, 0x05, // goto +5 (to "end")
                0x06, // iconst_3 ("else", offset 9)
                0x3c, // istore_1
                0x1b, // iload_1 ("end", offset 11)
                0xac, // ireturn
            ],
        );
        assert_eq!(compiled.max_stack, 1);
        assert_eq!(compiled.max_locals, 2);
        assert!(compiled.exception_table.is_empty());

        // One frame per jump target, compressed against the method entry frame
        assert_eq!(compiled.stack_map_table.len(), 2);
        assert!(matches!(
            compiled.stack_map_table[0],
            StackMapFrame::Same { offset_delta: 9 },
        ));

        // Nothing requested the debug tables
        assert!(compiled.line_number_table.is_empty());
        assert!(compiled.local_variable_table.is_empty());
    }

    #[test]
    fn unreached_instructions_emit_nothing() {
        let method = method(
            "()I",
            vec![
                Op::Const(ConstValue::Int(0)),
                store_int(1),
                Op::Jump {
                    kind: JumpKind::Goto,
                    target: "end".to_string(),
                },
                Op::Const(ConstValue::Int(1)),
                store_int(1),
                Op::Label("end".to_string()),
                load_int(1),
                Op::Return {
                    ty: Some(VarType::Int),
                },
            ],
        );
        let compiled = compile(&method, false);

        assert_eq!(
            compiled.code,
            vec![
                0x03, // iconst_0
                0x3c, // istore_1
                0xa7, 0x00, 0x03, // goto +3, skipping the dead block entirely
                0x1b, // iload_1 ("end", offset 5)
                0xac, // ireturn
            ],
        );
        assert_eq!(compiled.max_locals, 2);
        assert_eq!(compiled.stack_map_table.len(), 1);
    }

    #[test]
    fn oversized_backward_goto_becomes_goto_w() {
        let mut ops = vec![Op::Label("start".to_string())];
        for _ in 0..20_000 {
            ops.push(Op::Const(ConstValue::Int(0)));
            ops.push(Op::Stack(StackOp::Pop));
        }
        ops.push(Op::Jump {
            kind: JumpKind::Goto,
            target: "start".to_string(),
        });
        let method = method("()V", ops);
        let compiled = compile(&method, false);

        // The 3-byte goto is relocated past two no-ops into a 5-byte goto_w
        assert_eq!(compiled.code.len(), 40_007);
        assert_eq!(&compiled.code[40_000..40_003], &[0x00, 0x00, 0xc8]);
        assert_eq!(read_i32(&compiled.code, 40_003), -40_002);

        // The loop header still gets its frame, at offset zero
        assert_eq!(compiled.stack_map_table.len(), 1);
        assert!(matches!(
            compiled.stack_map_table[0],
            StackMapFrame::Same { offset_delta: 0 },
        ));
    }

    #[test]
    fn lookup_switch_is_padded_and_sorted() {
        let method = method(
            "(I)I",
            vec![
                load_int(0),
                Op::Switch {
                    kind: SwitchKind::Lookup,
                    cases: vec![(10, "ten".to_string()), (-5, "minus".to_string())],
                    default: "other".to_string(),
                },
                Op::Label("minus".to_string()),
                Op::Const(ConstValue::Int(1)),
                Op::Return {
                    ty: Some(VarType::Int),
                },
                Op::Label("ten".to_string()),
                Op::Const(ConstValue::Int(2)),
                Op::Return {
                    ty: Some(VarType::Int),
                },
                Op::Label("other".to_string()),
                Op::Const(ConstValue::Int(0)),
                Op::Return {
                    ty: Some(VarType::Int),
                },
            ],
        );
        let compiled = compile(&method, false);

        let code = &compiled.code;
        assert_eq!(code[1], 0xab); // lookupswitch at offset 1
        assert_eq!(&code[2..4], &[0x00, 0x00]); // two padding bytes align the operands
        assert_eq!(read_i32(code, 4), 31); // default -> "other" at offset 32
        assert_eq!(read_i32(code, 8), 2); // npairs

        // Pairs come out sorted by key regardless of declaration order
        assert_eq!(read_i32(code, 12), -5);
        assert_eq!(read_i32(code, 16), 27); // "minus" at offset 28
        assert_eq!(read_i32(code, 20), 10);
        assert_eq!(read_i32(code, 24), 29); // "ten" at offset 30
    }

    #[test]
    fn exception_table_entries() {
        let make = |catch_type: Option<BinaryName>| {
            let mut method = method(
                "()V",
                vec![
                    Op::Label("try_start".to_string()),
                    Op::Const(ConstValue::Int(0)),
                    store_int(0),
                    Op::Label("try_end".to_string()),
                    Op::Return { ty: None },
                    Op::Label("handler".to_string()),
                    Op::Stack(StackOp::Pop),
                    Op::Return { ty: None },
                ],
            );
            method.handlers.push(crate::assemble::ast::ExceptionHandler {
                try_start: "try_start".to_string(),
                try_end: "try_end".to_string(),
                handler: "handler".to_string(),
                catch_type,
                line: 1,
            });
            method
        };

        let caught = compile(
            &make(Some(BinaryName::from_string("java/lang/Exception".to_string()).unwrap())),
            false,
        );
        assert_eq!(caught.exception_table.len(), 1);
        let entry = &caught.exception_table[0];
        assert_eq!(entry.start_pc, BytecodeIndex(0));
        assert_eq!(entry.end_pc, BytecodeIndex(2));
        assert_eq!(entry.handler_pc, BytecodeIndex(3));
        assert_ne!(entry.catch_type, ClassConstantIndex::CATCH_ALL);

        let catch_all = compile(&make(None), false);
        assert_eq!(catch_all.exception_table[0].catch_type, ClassConstantIndex::CATCH_ALL);

        // The handler entry point needs a stack map frame
        assert_eq!(caught.stack_map_table.len(), 1);
    }

    #[test]
    fn debug_tables_cover_live_ranges() {
        let mut method = method(
            "()I",
            vec![
                Op::Label("start".to_string()),
                Op::Const(ConstValue::Int(7)),
                store_int(0),
                load_int(0),
                Op::Label("end".to_string()),
                Op::Return {
                    ty: Some(VarType::Int),
                },
            ],
        );
        method.locals.push(LocalVariableDecl {
            slot: 0,
            name: "x".to_string(),
            descriptor: FieldType::INT,
            signature: None,
            start: "start".to_string(),
            end: "end".to_string(),
            line: 1,
        });
        let compiled = compile(&method, true);

        assert_eq!(compiled.local_variable_table.len(), 1);
        let variable = &compiled.local_variable_table[0];
        assert_eq!(variable.start_pc, BytecodeIndex(0));
        // bipush + istore_0 + iload_0 span offsets 0 to 3; the range ends at the return
        assert_eq!(variable.length, 4);
        assert_eq!(variable.index, 0);
        assert!(compiled.local_variable_type_table.is_empty());

        // One line number entry per distinct source line that emitted code
        assert_eq!(compiled.line_number_table.len(), 4);
        assert_eq!(compiled.line_number_table[0].start_pc, BytecodeIndex(0));
        assert_eq!(compiled.line_number_table[0].line_number, 2);
    }

    #[test]
    fn compilation_is_deterministic() {
        let method = method(
            "(Z)Ljava/lang/String;",
            vec![
                load_int(0),
                Op::Jump {
                    kind: JumpKind::If(OrdComparison::EQ),
                    target: "else".to_string(),
                },
                Op::Const(ConstValue::Str("yes".to_string())),
                Op::Return {
                    ty: Some(VarType::Reference),
                },
                Op::Label("else".to_string()),
                Op::Const(ConstValue::Str("no".to_string())),
                Op::Return {
                    ty: Some(VarType::Reference),
                },
            ],
        );

        let first = compile(&method, false);
        let second = compile(&method, false);
        assert_eq!(first.code, second.code);
        assert_eq!(first.stack_map_table, second.stack_map_table);
    }
}
