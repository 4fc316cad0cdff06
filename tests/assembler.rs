//! End to end runs of the public `analyze`/`compile` pipeline against a real class graph
//!
//! The unit tests inside `assemble` use a flat hierarchy stub; these tests check what only a
//! populated [`ClassGraph`] can answer, like merging sibling exception types into their common
//! superclass, plus the shape of the final `Code` artifacts.

use jasm2class::assemble::ast::{
    ConstValue, ExceptionHandler, Instruction, InvokeKind, JumpKind, LocalVariableDecl,
    MethodDefinition, Op, StackOp, VarKind, VarType,
};
use jasm2class::assemble::{analyze, compile, AnalysisErrorKind, CompiledMethod, Error};
use jasm2class::class_graph::{ClassGraph, ClassGraphArenas};
use jasm2class::jvm::class_file::{
    BytecodeIndex, ClassConstantIndex, ConstantsPool, StackMapFrame,
};
use jasm2class::jvm::code::OrdComparison;
use jasm2class::jvm::verifier::{MergeConflict, VerificationType};
use jasm2class::jvm::{
    BinaryName, FieldType, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor, RefType,
    UnqualifiedName,
};

fn method(descriptor: &str, ops: Vec<Op>) -> MethodDefinition {
    MethodDefinition {
        access: MethodAccessFlags::STATIC,
        name: UnqualifiedName::from_string("test".to_string()).unwrap(),
        descriptor: MethodDescriptor::parse(descriptor).unwrap(),
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

/// Run the whole pipeline with the standard library registered in the class graph
fn assemble(method: &MethodDefinition, debug_info: bool) -> Result<CompiledMethod, Error> {
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    graph.insert_java_library_types();

    let frames = analyze(&BinaryName::OBJECT, method, &graph)?;
    let mut constants = ConstantsPool::new();
    compile(&BinaryName::OBJECT, method, &frames, &mut constants, debug_info)
}

fn construct(class: BinaryName) -> Vec<Op> {
    vec![
        Op::New {
            class: class.clone(),
        },
        Op::Stack(StackOp::Dup),
        Op::Invoke {
            kind: InvokeKind::Special,
            owner: class,
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor::parse("()V").unwrap(),
        },
    ]
}

#[test]
fn sibling_exceptions_merge_into_their_common_superclass() {
    let mut ops = vec![
        Op::Var {
            kind: VarKind::Load,
            ty: VarType::Int,
            slot: 0,
        },
        Op::Jump {
            kind: JumpKind::If(OrdComparison::EQ),
            target: "else".to_string(),
        },
    ];
    ops.extend(construct(BinaryName::ILLEGALARGUMENTEXCEPTION));
    ops.push(Op::Jump {
        kind: JumpKind::Goto,
        target: "join".to_string(),
    });
    ops.push(Op::Label("else".to_string()));
    ops.extend(construct(BinaryName::ILLEGALSTATEEXCEPTION));
    ops.push(Op::Label("join".to_string()));
    ops.push(Op::Return {
        ty: Some(VarType::Reference),
    });
    let method = method("(Z)Ljava/lang/RuntimeException;", ops);

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    graph.insert_java_library_types();
    let frames = analyze(&BinaryName::OBJECT, &method, &graph).unwrap();

    // Both arms reach `areturn` holding the nearest shared ancestor
    let before_return = frames[11].as_ref().unwrap();
    let stack: Vec<_> = before_return.stack.iter().map(|(_, _, v)| v.clone()).collect();
    assert_eq!(
        stack,
        vec![VerificationType::Object(RefType::Object(
            BinaryName::RUNTIMEEXCEPTION
        ))],
    );

    let mut constants = ConstantsPool::new();
    let compiled = compile(&BinaryName::OBJECT, &method, &frames, &mut constants, false).unwrap();

    assert_eq!(compiled.code.len(), 22);
    assert_eq!(compiled.code[0], 0x1a); // iload_0
    assert_eq!(compiled.max_stack, 2);
    assert_eq!(compiled.max_locals, 1);

    // Frames at the `else` target (offset 14) and the join (offset 21)
    assert_eq!(compiled.stack_map_table.len(), 2);
    assert_eq!(
        compiled.stack_map_table[0],
        StackMapFrame::Same { offset_delta: 14 },
    );
    assert!(matches!(
        compiled.stack_map_table[1],
        StackMapFrame::SameOneStackItem { offset_delta: 6, .. },
    ));
}

#[test]
fn unrelated_stack_values_fail_to_merge() {
    let method = method(
        "(Z)I",
        vec![
            Op::Var {
                kind: VarKind::Load,
                ty: VarType::Int,
                slot: 0,
            },
            Op::Jump {
                kind: JumpKind::If(OrdComparison::EQ),
                target: "else".to_string(),
            },
            Op::Const(ConstValue::Int(1)),
            Op::Jump {
                kind: JumpKind::Goto,
                target: "join".to_string(),
            },
            Op::Label("else".to_string()),
            Op::Const(ConstValue::Str("oops".to_string())),
            Op::Label("join".to_string()),
            Op::Return {
                ty: Some(VarType::Int),
            },
        ],
    );

    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    graph.insert_java_library_types();

    let err = match analyze(&BinaryName::OBJECT, &method, &graph) {
        Err(Error::Analysis(err)) => err,
        other => panic!("expected an analysis error, got {:?}", other),
    };
    assert!(matches!(
        err.kind,
        AnalysisErrorKind::FailedMerge(MergeConflict::IncompatibleTypes(_)),
    ));
}

#[test]
fn caught_exception_enters_the_handler() {
    let mut method = method(
        "()V",
        vec![
            Op::Label("try_start".to_string()),
            Op::Const(ConstValue::Int(0)),
            Op::Stack(StackOp::Pop),
            Op::Label("try_end".to_string()),
            Op::Return { ty: None },
            Op::Label("handler".to_string()),
            Op::Stack(StackOp::Pop),
            Op::Return { ty: None },
        ],
    );
    method.handlers.push(ExceptionHandler {
        try_start: "try_start".to_string(),
        try_end: "try_end".to_string(),
        handler: "handler".to_string(),
        catch_type: Some(BinaryName::ILLEGALSTATEEXCEPTION),
        line: 1,
    });

    let compiled = assemble(&method, false).unwrap();

    // iconst_0, pop, return, pop, return
    assert_eq!(compiled.code.len(), 5);
    assert_eq!(compiled.exception_table.len(), 1);
    let entry = &compiled.exception_table[0];
    assert_eq!(entry.start_pc, BytecodeIndex(0));
    assert_eq!(entry.end_pc, BytecodeIndex(2));
    assert_eq!(entry.handler_pc, BytecodeIndex(3));
    assert_ne!(entry.catch_type, ClassConstantIndex::CATCH_ALL);

    // The handler entry is the only stack map frame and carries the caught value
    assert_eq!(compiled.stack_map_table.len(), 1);
    assert!(matches!(
        compiled.stack_map_table[0],
        StackMapFrame::SameOneStackItem { offset_delta: 3, .. },
    ));
}

#[test]
fn throw_accepts_registered_throwable_subclasses() {
    let mut ops = construct(BinaryName::ARITHMETICEXCEPTION);
    ops.push(Op::Throw);
    let method = method("()V", ops);

    assert!(assemble(&method, false).is_ok());
}

#[test]
fn assembles_identically_across_runs() {
    let mut ops = construct(BinaryName::ILLEGALARGUMENTEXCEPTION);
    ops.push(Op::Throw);
    let method = method("()V", ops);

    let first = assemble(&method, true).unwrap();
    let second = assemble(&method, true).unwrap();
    assert_eq!(first.code, second.code);
    assert_eq!(first.max_stack, second.max_stack);
    assert_eq!(first.max_locals, second.max_locals);
    assert_eq!(first.stack_map_table, second.stack_map_table);
    assert_eq!(first.line_number_table, second.line_number_table);

    // The `Code` attribute built from the compiling pool serializes cleanly
    let arenas = ClassGraphArenas::new();
    let graph = ClassGraph::new(&arenas);
    graph.insert_java_library_types();
    let frames = analyze(&BinaryName::OBJECT, &method, &graph).unwrap();
    let mut constants = ConstantsPool::new();
    let compiled =
        compile(&BinaryName::OBJECT, &method, &frames, &mut constants, true).unwrap();
    let attribute = compiled.code_attribute(&mut constants).unwrap();
    assert!(!attribute.info.is_empty());
}

#[test]
fn debug_tables_follow_declared_scopes() {
    let mut method = method(
        "(I)I",
        vec![
            Op::Label("start".to_string()),
            Op::Var {
                kind: VarKind::Load,
                ty: VarType::Int,
                slot: 0,
            },
            Op::Return {
                ty: Some(VarType::Int),
            },
            Op::Label("end".to_string()),
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

    let compiled = assemble(&method, true).unwrap();

    assert_eq!(compiled.local_variable_table.len(), 1);
    let var = &compiled.local_variable_table[0];
    assert_eq!(var.start_pc, BytecodeIndex(0));
    assert_eq!(var.length, 2);
    assert_eq!(var.index, 0);
    assert!(compiled.local_variable_type_table.is_empty());

    assert_eq!(compiled.line_number_table.len(), 2);
    assert_eq!(compiled.line_number_table[0].start_pc, BytecodeIndex(0));
    assert_eq!(compiled.line_number_table[0].line_number, 2);
    assert_eq!(compiled.line_number_table[1].line_number, 3);

    // Without debug info the same method carries none of the tables
    let plain = assemble(&method, false).unwrap();
    assert!(plain.line_number_table.is_empty());
    assert!(plain.local_variable_table.is_empty());
}
