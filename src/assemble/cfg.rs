//! Control flow discovery over the flat instruction list
//!
//! [`ControlFlowGraph::build`] slices a method body into maximal straight-line [`Block`]s and
//! records every way execution can move between them, including transfers to exception handlers.
//! The pass is purely structural: no type information is involved, so it doubles as the place
//! where the instruction stream's internal consistency is checked (label declarations, switch
//! shapes, ops with no bytecode encoding). Anything caught here is an [`IllegalAstError`] that a
//! well-behaved frontend should never have produced.

use crate::assemble::ast::{
    ArithOp, ConstValue, HandleData, Instruction, JumpKind, MemberDescriptor, MethodDefinition,
    NumericType, Op, SwitchKind, VarKind, VarType,
};
use crate::assemble::errors::IllegalAstError;
use crate::jvm::BinaryName;
use std::collections::{BTreeSet, HashMap};

/// Basic blocks and edges of one method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFlowGraph {
    /// Blocks in instruction order (block 0 starts at instruction 0)
    pub blocks: Vec<Block>,

    /// Declared labels, resolved to the index of the declaring [`Op::Label`] instruction
    pub labels: HashMap<String, u32>,

    /// Declared handlers with their ranges resolved to instruction indices
    pub handlers: Vec<ResolvedHandler>,
}

/// Maximal run of instructions with one entry point and one exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Index of the first instruction in the block
    pub start: u32,

    /// Index one past the last instruction in the block
    pub end: u32,

    /// Successor edges
    pub edges: Vec<Edge>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Index of the successor block
    pub to: usize,

    pub kind: EdgeKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// Execution runs into the next block (also set for the not-taken side of a conditional)
    FallThrough,

    /// Taken side of a jump
    Jump,

    /// One of a switch's case or default targets
    Switch,

    /// Any instruction in the block may transfer to an exception handler
    Handler,
}

/// Exception handler with labels resolved to instruction indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandler {
    /// First covered instruction
    pub start: u32,

    /// One past the last covered instruction
    pub end: u32,

    /// Block whose first instruction is the handler's entry point
    pub handler_block: usize,

    /// `None` catches every throwable
    pub catch_type: Option<BinaryName>,

    /// Position in the declared handler list (this is the exception table order)
    pub handler_index: usize,
}

impl ControlFlowGraph {
    /// Validate the instruction stream and slice it into basic blocks
    ///
    /// Blocks begin at instruction 0, at every jump or switch target, at every handler's entry
    /// point, and right after any instruction that transfers control. A conditional jump gets
    /// both its taken edge and a fallthrough edge; switch targets are deduplicated; every block
    /// overlapping a handler's covered range gets an edge to the handler's block.
    pub fn build(method: &MethodDefinition) -> Result<ControlFlowGraph, IllegalAstError> {
        let instructions = &method.instructions;

        let mut labels: HashMap<String, u32> = HashMap::new();
        for (index, instruction) in instructions.iter().enumerate() {
            if let Op::Label(name) = &instruction.op {
                if labels.insert(name.clone(), index as u32).is_some() {
                    return Err(IllegalAstError::DuplicateLabel {
                        label: name.clone(),
                        line: instruction.line,
                    });
                }
            }
        }

        let resolve = |label: &str, line: u32| -> Result<u32, IllegalAstError> {
            match labels.get(label) {
                Some(index) => Ok(*index),
                None => Err(IllegalAstError::UndeclaredLabel {
                    label: label.to_string(),
                    line,
                }),
            }
        };

        let mut boundaries: BTreeSet<u32> = BTreeSet::new();
        if !instructions.is_empty() {
            boundaries.insert(0);
        }
        for (index, instruction) in instructions.iter().enumerate() {
            check_encodable(instruction)?;
            match &instruction.op {
                Op::Jump { target, .. } => {
                    boundaries.insert(resolve(target, instruction.line)?);
                    boundaries.insert(index as u32 + 1);
                }
                Op::Switch { kind, cases, default } => {
                    if *kind == SwitchKind::Table {
                        let contiguous = !cases.is_empty()
                            && cases
                                .windows(2)
                                .all(|pair| pair[1].0 as i64 == pair[0].0 as i64 + 1);
                        if !contiguous {
                            return Err(IllegalAstError::MalformedTableSwitch {
                                line: instruction.line,
                            });
                        }
                    }
                    for (_, target) in cases {
                        boundaries.insert(resolve(target, instruction.line)?);
                    }
                    boundaries.insert(resolve(default, instruction.line)?);
                    boundaries.insert(index as u32 + 1);
                }
                Op::Return { .. } | Op::Throw => {
                    boundaries.insert(index as u32 + 1);
                }
                _ => {}
            }
        }

        let mut raw_handlers = Vec::with_capacity(method.handlers.len());
        for (handler_index, handler) in method.handlers.iter().enumerate() {
            let start = resolve(&handler.try_start, handler.line)?;
            let end = resolve(&handler.try_end, handler.line)?;
            let handler_start = resolve(&handler.handler, handler.line)?;
            boundaries.insert(handler_start);
            raw_handlers.push((handler_index, start, end, handler_start));
        }

        // Variable declarations don't affect control flow but their labels must exist
        for declaration in &method.locals {
            resolve(&declaration.start, declaration.line)?;
            resolve(&declaration.end, declaration.line)?;
        }

        let len = instructions.len() as u32;
        let starts: Vec<u32> = boundaries.into_iter().filter(|start| *start < len).collect();
        let mut blocks: Vec<Block> = starts
            .iter()
            .enumerate()
            .map(|(index, start)| Block {
                start: *start,
                end: starts.get(index + 1).copied().unwrap_or(len),
                edges: vec![],
            })
            .collect();

        // Every jump target is a boundary, so targets always resolve to a block start
        let block_of = |index: u32| -> usize { starts.partition_point(|start| *start <= index) - 1 };

        for block_index in 0..blocks.len() {
            let last = &instructions[(blocks[block_index].end - 1) as usize];
            let mut edges = vec![];
            match &last.op {
                Op::Jump { kind: JumpKind::Goto, target } => {
                    edges.push(Edge {
                        to: block_of(labels[target.as_str()]),
                        kind: EdgeKind::Jump,
                    });
                }
                Op::Jump { target, .. } => {
                    edges.push(Edge {
                        to: block_of(labels[target.as_str()]),
                        kind: EdgeKind::Jump,
                    });
                    if block_index + 1 < blocks.len() {
                        edges.push(Edge {
                            to: block_index + 1,
                            kind: EdgeKind::FallThrough,
                        });
                    }
                }
                Op::Switch { cases, default, .. } => {
                    let mut targets: BTreeSet<usize> = BTreeSet::new();
                    for (_, target) in cases {
                        targets.insert(block_of(labels[target.as_str()]));
                    }
                    targets.insert(block_of(labels[default.as_str()]));
                    edges.extend(targets.into_iter().map(|to| Edge {
                        to,
                        kind: EdgeKind::Switch,
                    }));
                }
                Op::Return { .. } | Op::Throw => {}
                _ => {
                    if block_index + 1 < blocks.len() {
                        edges.push(Edge {
                            to: block_index + 1,
                            kind: EdgeKind::FallThrough,
                        });
                    }
                }
            }
            blocks[block_index].edges = edges;
        }

        let handlers: Vec<ResolvedHandler> = raw_handlers
            .into_iter()
            .map(|(handler_index, start, end, handler_start)| ResolvedHandler {
                start,
                end,
                handler_block: block_of(handler_start),
                catch_type: method.handlers[handler_index].catch_type.clone(),
                handler_index,
            })
            .collect();

        for handler in &handlers {
            for block in blocks.iter_mut() {
                if block.start < handler.end && handler.start < block.end {
                    block.edges.push(Edge {
                        to: handler.handler_block,
                        kind: EdgeKind::Handler,
                    });
                }
            }
        }

        Ok(ControlFlowGraph {
            blocks,
            labels,
            handlers,
        })
    }
}

/// Reject ops that exist in the vocabulary but have no bytecode encoding
fn check_encodable(instruction: &Instruction) -> Result<(), IllegalAstError> {
    let encodable = match &instruction.op {
        Op::Arith {
            op:
                ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr | ArithOp::And | ArithOp::Or | ArithOp::Xor,
            ty,
        } => matches!(ty, NumericType::Int | NumericType::Long),
        Op::Arith { op: ArithOp::Cmp(_), ty } => *ty != NumericType::Int,
        Op::Var { kind: VarKind::Increment(_), ty, .. } => *ty == VarType::Int,
        Op::NewArray { dims, .. } => *dims != 0,
        Op::Const(value) => const_encodable(value, false),
        Op::InvokeDynamic { bootstrap, bootstrap_args, .. } => {
            handle_encodable(bootstrap)
                && bootstrap_args
                    .iter()
                    .all(|argument| const_encodable(argument, true))
        }
        _ => true,
    };
    if encodable {
        Ok(())
    } else {
        Err(IllegalAstError::UnencodableInstruction {
            instruction: instruction.op.to_string(),
            line: instruction.line,
        })
    }
}

fn const_encodable(value: &ConstValue, as_bootstrap_argument: bool) -> bool {
    match value {
        ConstValue::MethodHandle(handle) => handle_encodable(handle),
        // There is no constant pool entry for `null`
        ConstValue::Null => !as_bootstrap_argument,
        _ => true,
    }
}

/// A handle's kind and its member descriptor must agree on field vs. method
fn handle_encodable(handle: &HandleData) -> bool {
    handle.kind.is_field_access() == matches!(handle.descriptor, MemberDescriptor::Field(_))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::assemble::ast::{ExceptionHandler, StackOp};
    use crate::jvm::code::OrdComparison;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, UnqualifiedName};

    fn method(ops: Vec<Op>) -> MethodDefinition {
        MethodDefinition {
            access: MethodAccessFlags::STATIC,
            name: UnqualifiedName::from_string("test".to_string()).unwrap(),
            descriptor: MethodDescriptor::parse("()V").unwrap(),
            signature: None,
            instructions: ops
                .into_iter()
                .enumerate()
                .map(|(index, op)| Instruction::new(index as u32 + 1, op))
                .collect(),
            locals: vec![],
            handlers: vec![],
        }
    }

    #[test]
    fn straight_line_is_one_block() {
        let method = method(vec![
            Op::Const(ConstValue::Int(1)),
            Op::Stack(StackOp::Pop),
            Op::Return { ty: None },
        ]);
        let cfg = ControlFlowGraph::build(&method).unwrap();

        assert_eq!(cfg.blocks.len(), 1);
        assert_eq!(cfg.blocks[0].start, 0);
        assert_eq!(cfg.blocks[0].end, 3);
        assert!(cfg.blocks[0].edges.is_empty());
    }

    #[test]
    fn conditional_jump_falls_through() {
        let method = method(vec![
            Op::Const(ConstValue::Int(0)),
            Op::Jump {
                kind: JumpKind::If(OrdComparison::EQ),
                target: "end".to_string(),
            },
            Op::Nop,
            Op::Label("end".to_string()),
            Op::Return { ty: None },
        ]);
        let cfg = ControlFlowGraph::build(&method).unwrap();

        assert_eq!(cfg.blocks.len(), 3);
        assert_eq!(
            cfg.blocks[0].edges,
            vec![
                Edge { to: 2, kind: EdgeKind::Jump },
                Edge { to: 1, kind: EdgeKind::FallThrough },
            ],
        );
        assert_eq!(
            cfg.blocks[1].edges,
            vec![Edge { to: 2, kind: EdgeKind::FallThrough }],
        );
        assert!(cfg.blocks[2].edges.is_empty());
    }

    #[test]
    fn switch_targets_are_deduplicated() {
        let method = method(vec![
            Op::Const(ConstValue::Int(0)),
            Op::Switch {
                kind: SwitchKind::Lookup,
                cases: vec![(1, "out".to_string()), (5, "out".to_string())],
                default: "out".to_string(),
            },
            Op::Label("out".to_string()),
            Op::Return { ty: None },
        ]);
        let cfg = ControlFlowGraph::build(&method).unwrap();

        assert_eq!(
            cfg.blocks[0].edges,
            vec![Edge { to: 1, kind: EdgeKind::Switch }],
        );
    }

    #[test]
    fn handler_edges_cover_overlapping_blocks() {
        let mut method = method(vec![
            Op::Label("try".to_string()),
            Op::Const(ConstValue::Int(1)),
            Op::Stack(StackOp::Pop),
            Op::Label("end".to_string()),
            Op::Return { ty: None },
            Op::Label("handler".to_string()),
            Op::Throw,
        ]);
        method.handlers.push(ExceptionHandler {
            try_start: "try".to_string(),
            try_end: "end".to_string(),
            handler: "handler".to_string(),
            catch_type: None,
            line: 1,
        });
        let cfg = ControlFlowGraph::build(&method).unwrap();

        assert_eq!(cfg.blocks.len(), 2);
        assert_eq!(cfg.handlers.len(), 1);
        assert_eq!(cfg.handlers[0].start, 0);
        assert_eq!(cfg.handlers[0].end, 3);
        assert_eq!(cfg.handlers[0].handler_block, 1);
        assert!(cfg.blocks[0]
            .edges
            .contains(&Edge { to: 1, kind: EdgeKind::Handler }));
        assert!(!cfg.blocks[1]
            .edges
            .iter()
            .any(|edge| edge.kind == EdgeKind::Handler));
    }

    #[test]
    fn empty_try_range_gets_no_edges() {
        let mut method = method(vec![
            Op::Label("mark".to_string()),
            Op::Return { ty: None },
            Op::Label("handler".to_string()),
            Op::Throw,
        ]);
        method.handlers.push(ExceptionHandler {
            try_start: "mark".to_string(),
            try_end: "mark".to_string(),
            handler: "handler".to_string(),
            catch_type: None,
            line: 1,
        });
        let cfg = ControlFlowGraph::build(&method).unwrap();

        assert!(cfg
            .blocks
            .iter()
            .all(|block| block.edges.iter().all(|edge| edge.kind != EdgeKind::Handler)));
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let method = method(vec![
            Op::Label("here".to_string()),
            Op::Label("here".to_string()),
            Op::Return { ty: None },
        ]);
        assert!(matches!(
            ControlFlowGraph::build(&method),
            Err(IllegalAstError::DuplicateLabel { .. }),
        ));
    }

    #[test]
    fn undeclared_target_is_rejected() {
        let method = method(vec![
            Op::Jump {
                kind: JumpKind::Goto,
                target: "nowhere".to_string(),
            },
        ]);
        assert!(matches!(
            ControlFlowGraph::build(&method),
            Err(IllegalAstError::UndeclaredLabel { .. }),
        ));
    }

    #[test]
    fn table_switch_keys_must_be_contiguous() {
        let method = method(vec![
            Op::Const(ConstValue::Int(0)),
            Op::Switch {
                kind: SwitchKind::Table,
                cases: vec![(0, "out".to_string()), (2, "out".to_string())],
                default: "out".to_string(),
            },
            Op::Label("out".to_string()),
            Op::Return { ty: None },
        ]);
        assert!(matches!(
            ControlFlowGraph::build(&method),
            Err(IllegalAstError::MalformedTableSwitch { .. }),
        ));
    }

    #[test]
    fn unencodable_arithmetic_is_rejected() {
        let method = method(vec![
            Op::Arith {
                op: ArithOp::Shl,
                ty: NumericType::Float,
            },
            Op::Return { ty: None },
        ]);
        let err = ControlFlowGraph::build(&method).unwrap_err();
        assert_eq!(
            err,
            IllegalAstError::UnencodableInstruction {
                instruction: "fshl".to_string(),
                line: 1,
            },
        );
    }
}
