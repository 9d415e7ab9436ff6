use std::sync::Arc;

use ember_core::{BuildConfig, ExternTable, FsSourceLoader, Program};
use ember_error::{diagnostic::Category, error::CompileError, warning::Warning};
use ember_ir::{
    package_to_string, BinaryOpKind, Block, ConstantValue, Context, Function, Instruction,
    Package, UndefineKind, Value, ValueDatum,
};
use rustc_hash::FxHashSet;
use ember_parse::ScriptFrontEnd;
use pretty_assertions::assert_eq;

fn externs() -> ExternTable {
    ExternTable::default()
        .with_value("println", "fn(...any)")
        .with_value("func2", "fn() -> (number, number)")
}

fn compile_with(src: &str, config: &BuildConfig, root: &std::path::Path) -> (Program, Package) {
    let mut program = Program::new(ScriptFrontEnd, FsSourceLoader::new(root));
    let package = program
        .compile_source("test", Arc::from(src), config)
        .unwrap()
        .expect("the source parses");
    (program, package)
}

fn compile(src: &str) -> (Program, Package) {
    compile_with(
        src,
        &BuildConfig::default().with_externs(externs()),
        std::path::Path::new("."),
    )
}

fn constant_number(context: &Context, value: &Value) -> Option<i64> {
    match value.get_datum(context) {
        ValueDatum::Constant(c) => match c.value {
            ConstantValue::Number(n) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

/// The arguments of every call to the extern `name` in the package's main function.
fn extern_call_args(context: &Context, package: Package, name: &str) -> Vec<Vec<Value>> {
    let main = package.get_main(context).unwrap();
    main.instruction_iter(context)
        .into_iter()
        .filter_map(|(_, value)| match value.get_instruction(context) {
            Some(Instruction::Call { callee, args, .. }) => match callee.get_datum(context) {
                ValueDatum::Extern { name: callee } if callee == name => Some(args.clone()),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// The blocks reachable from the entry of `function`, in depth first order.
fn reachable_blocks(context: &Context, function: Function) -> Vec<Block> {
    let mut seen = FxHashSet::default();
    let mut order = Vec::new();
    let mut stack = vec![function.get_entry_block(context)];
    while let Some(block) = stack.pop() {
        if seen.insert(block) {
            order.push(block);
            stack.extend(block.succ_iter(context).copied());
        }
    }
    order
}

/// The block holding the call to the extern `name` in the package's main function.
fn extern_call_block(context: &Context, package: Package, name: &str) -> Block {
    let main = package.get_main(context).unwrap();
    main.instruction_iter(context)
        .into_iter()
        .find_map(|(block, value)| match value.get_instruction(context) {
            Some(Instruction::Call { callee, .. }) => match callee.get_datum(context) {
                ValueDatum::Extern { name: callee } if callee == name => Some(block),
                _ => None,
            },
            _ => None,
        })
        .expect("the extern is called")
}

#[test]
fn loop_invariant_reads_see_the_definition_before_the_loop() {
    let (program, package) = compile("a = 1; for i=0; i<10; i++ { b = a }; println(a)");
    let context = program.context();
    assert!(!program.handler().has_errors(), "{:?}", program.diagnostics());

    let calls = extern_call_args(context, package, "println");
    assert_eq!(calls.len(), 1);
    assert_eq!(constant_number(context, &calls[0][0]), Some(1));
    assert!(!package_to_string(context, package).contains("phi a"));
}

#[test]
fn conditional_write_merges_with_a_phi() {
    let (program, package) = compile("a = 1; if c { a = 2 }; println(a)");
    let context = program.context();

    let calls = extern_call_args(context, package, "println");
    let Some(Instruction::Phi { name, edges }) = calls[0][0].get_instruction(context) else {
        panic!("expected a phi");
    };
    assert_eq!(name, "a");
    let edges = edges
        .iter()
        .map(|edge| constant_number(context, edge))
        .collect::<Vec<_>>();
    assert_eq!(edges, vec![Some(2), Some(1)]);

    let errors = program.handler().errors();
    assert!(
        matches!(errors.as_slice(), [CompileError::ValueUndefined { name, .. }] if name == "c"),
        "{errors:?}"
    );
}

#[test]
fn unbound_free_value_is_reported_at_the_closure_and_the_call() {
    let (program, _) = compile("f = () => { b = a }");
    let errors = program.handler().errors();
    assert!(
        matches!(errors.as_slice(), [CompileError::BindingNotFound { name, .. }] if name == "a"),
        "{errors:?}"
    );

    let (program, _) = compile("f = () => { b = a }\nf()");
    let errors = program.handler().errors();
    assert!(
        matches!(
            errors.as_slice(),
            [
                CompileError::BindingNotFound { name: first, .. },
                CompileError::BindingNotFoundInCall { name: second, .. },
            ] if first == "a" && second == "a"
        ),
        "{errors:?}"
    );
}

#[test]
fn late_bound_free_value_is_bound_at_the_call() {
    let (program, package) = compile("f = () => { println(a) }\na = 1\nf()");
    assert!(!program.handler().has_errors(), "{:?}", program.diagnostics());

    let context = program.context();
    let main = package.get_main(context).unwrap();
    let binding = main
        .instruction_iter(context)
        .into_iter()
        .find_map(|(_, value)| match value.get_instruction(context) {
            Some(Instruction::Call { binding, .. }) if !binding.is_empty() => Some(binding.clone()),
            _ => None,
        })
        .expect("the call binds the free value");
    assert_eq!(binding.len(), 1);
    assert_eq!(constant_number(context, &binding["a"]), Some(1));
}

#[test]
fn single_target_for_two_results_is_a_mismatch() {
    let (program, _) = compile("a = func2()\nprintln(a)");
    let errors = program.handler().errors();
    assert!(
        matches!(
            errors.as_slice(),
            [CompileError::CallAssignmentMismatch { left: 1, right: 2, .. }]
        ),
        "{errors:?}"
    );

    let (program, _) = compile("a, b := func2()\nprintln(a, b)");
    assert!(!program.handler().has_errors(), "{:?}", program.diagnostics());
}

#[test]
fn switch_without_default_merges_an_undefined_value() {
    let (program, package) = compile("switch x { case 1: a=1 case 2: a=2 }; println(a)");
    let context = program.context();

    let calls = extern_call_args(context, package, "println");
    let Some(Instruction::Phi { name, edges }) = calls[0][0].get_instruction(context) else {
        panic!("expected a phi");
    };
    assert_eq!(name, "a");
    assert_eq!(edges.len(), 3);
    assert_eq!(constant_number(context, &edges[0]), Some(1));
    assert_eq!(constant_number(context, &edges[1]), Some(2));
    assert!(matches!(
        edges[2].get_instruction(context),
        Some(Instruction::Undefine {
            kind: UndefineKind::Declared,
            ..
        })
    ));
}

#[test]
fn misplaced_jumps_are_reported() {
    let (program, _) = compile("break\ncontinue\nfallthrough");
    let errors = program.handler().errors();
    assert!(
        matches!(
            errors.as_slice(),
            [
                CompileError::BreakOutsideLoop { .. },
                CompileError::ContinueOutsideLoop { .. },
                CompileError::MisplacedFallthrough { .. },
            ]
        ),
        "{errors:?}"
    );

    let (program, _) = compile("switch { case true: break }\nfor { break }");
    assert!(!program.handler().has_errors(), "{:?}", program.diagnostics());
}

#[test]
fn mismatched_assignment_counts_are_reported() {
    let (program, _) = compile("a, b = 1, 2, 3");
    let errors = program.handler().errors();
    assert!(
        matches!(
            errors.as_slice(),
            [CompileError::MultipleAssignFailed { left: 2, right: 3, .. }]
        ),
        "{errors:?}"
    );
}

#[test]
fn assigning_an_extern_is_a_warning() {
    let (program, _) = compile("println = 1");
    assert!(!program.handler().has_errors());
    let warnings = program.handler().warnings();
    assert!(
        warnings.iter().any(|warning| matches!(
            &warning.warning_content,
            Warning::AssignToExtern { name } if name == "println"
        )),
        "{warnings:?}"
    );
}

#[test]
fn includes_are_built_in_place_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.em"), "x = 1\n").unwrap();

    let config = BuildConfig::default().with_externs(externs());
    let (program, package) = compile_with(
        "include \"lib.em\"\ninclude \"lib.em\"\nprintln(x)",
        &config,
        dir.path(),
    );
    assert!(!program.handler().has_errors(), "{:?}", program.diagnostics());
    let context = program.context();
    let calls = extern_call_args(context, package, "println");
    assert_eq!(constant_number(context, &calls[0][0]), Some(1));
}

#[test]
fn missing_include_is_an_include_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let config = BuildConfig::default().with_externs(externs());
    let (program, _) = compile_with("include \"missing.em\"", &config, dir.path());

    let diagnostics = program.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].is_error());
    assert_eq!(diagnostics[0].category, Category::Include);
}

#[test]
fn unchanged_files_are_not_built_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.em");
    std::fs::write(&path, "println(1)\n").unwrap();

    let mut program = Program::new(ScriptFrontEnd, FsSourceLoader::new(dir.path()));
    let config = BuildConfig::default().with_externs(externs());
    assert!(program.compile_file(&path, &config).unwrap().is_some());
    assert!(program.compile_file(&path, &config).unwrap().is_none());

    std::fs::write(&path, "println(2)\n").unwrap();
    assert!(program.compile_file(&path, &config).unwrap().is_some());
}

#[test]
fn built_ir_verifies_after_every_construct() {
    let src = r#"
        var total
        total = 0
        for k, v in make(map[string]number) {
            if k == "skip" {
                continue
            } else if v > 10 {
                break
            }
            total += v
        }
        switch total {
        case 0:
            fallthrough
        case 1, 2:
            total++
        default:
            total--
        }
        try {
            defer println("done")
            go println(total)
        } catch err {
            println(err)
        } finally {
            println("finally")
        }
        xs := [1, 2, 3]
        xs[0] = 4
        m := {"a": 1}
        m.a = fn { return 2 }
        println(xs, m)
    "#;
    let (program, _) = compile(src);
    program.context().verify().unwrap();
}

#[test]
fn every_reachable_block_gets_a_condition() {
    let src = r#"
        total := 0
        for i = 0; i < 10; i++ {
            for j = 0; j < i; j++ {
                if j == 3 {
                    continue
                }
                if j > 5 {
                    break
                }
                total += j
            }
        }
        for k, v in {"a": 1} {
            switch v {
            case 1:
                total++
                fallthrough
            case 2:
                continue
            default:
                break
            }
        }
        try {
            total--
        } catch err {
            println(err)
        } finally {
            println(total)
        }
        f = () => { if total > 1 { return 1 }; return 2 }
        println(f())
    "#;
    let (program, package) = compile(src);
    let context = program.context();
    for function in package.function_iter(context) {
        for block in reachable_blocks(context, function) {
            assert!(
                block.get_condition(context).is_some(),
                "{} in {} has no condition",
                block.get_label(context),
                function.get_name(context)
            );
        }
    }
}

#[test]
fn loop_whose_condition_fails_on_entry_is_unreachable() {
    let (program, package) = compile("for i = 10; i < 5; i++ { println(i) }");
    let warnings = program.handler().warnings();
    assert!(
        warnings
            .iter()
            .any(|warning| matches!(warning.warning_content, Warning::BlockUnreachable)),
        "{warnings:?}"
    );

    let context = program.context();
    let body = extern_call_block(context, package, "println");
    assert_eq!(
        body.get_condition(context)
            .and_then(|cond| cond.get_bool_constant(context)),
        Some(false)
    );
}

#[test]
fn building_is_deterministic() {
    let src = r#"
        a = 1
        f = () => { b = a; c = d; return b + c }
        if x { a = 2 } else { e := 3; println(e) }
        for k, v in {"p": 1, "q": 2} { a += v }
        println(a, f())
    "#;
    let (first, first_package) = compile(src);
    let (second, second_package) = compile(src);
    assert_eq!(
        package_to_string(first.context(), first_package),
        package_to_string(second.context(), second_package)
    );
    assert_eq!(
        format!("{:?}", first.diagnostics()),
        format!("{:?}", second.diagnostics())
    );
}

#[test]
fn declaring_in_a_block_shadows_without_touching_the_outer_binding() {
    let (program, package) = compile(
        r#"
a = 1
if c {
    a := 2
    println(a)
}
if d {
    var a = 3
    println(a)
}
println(a)
"#,
    );
    let context = program.context();
    let calls = extern_call_args(context, package, "println");
    let args = calls
        .iter()
        .map(|args| constant_number(context, &args[0]))
        .collect::<Vec<_>>();
    assert_eq!(args, vec![Some(2), Some(3), Some(1)]);
}

#[test]
fn assigning_in_a_block_binds_in_the_function_scope() {
    let (program, package) = compile("if c { b = 1 }\nprintln(b)");
    let context = program.context();
    let calls = extern_call_args(context, package, "println");
    let Some(Instruction::Phi { name, edges }) = calls[0][0].get_instruction(context) else {
        panic!("expected a phi");
    };
    assert_eq!(name, "b");
    assert_eq!(edges.len(), 2);
    assert!(edges
        .iter()
        .any(|edge| constant_number(context, edge) == Some(1)));
    assert!(edges.iter().any(|edge| matches!(
        edge.get_instruction(context),
        Some(Instruction::Undefine {
            kind: UndefineKind::Declared,
            ..
        })
    )));

    let errors = program.handler().errors();
    assert!(
        !errors.iter().any(
            |error| matches!(error, CompileError::ValueUndefined { name, .. } if name == "b")
        ),
        "{errors:?}"
    );
}

#[test]
fn short_circuit_evaluates_the_right_side_conditionally() {
    let (program, package) = compile("r = c && println(1)\nprintln(r)");
    let context = program.context();
    let main = package.get_main(context).unwrap();
    let rhs_block = extern_call_block(context, package, "println");
    assert_ne!(rhs_block, main.get_entry_block(context));

    let calls = extern_call_args(context, package, "println");
    let Some(Instruction::Phi { name, edges }) = calls[1][0].get_instruction(context) else {
        panic!("expected a phi");
    };
    assert_eq!(name, "&&");
    assert_eq!(edges.len(), 2);
}

#[test]
fn ternary_merges_both_arms() {
    let (program, package) = compile("x = c ? 1 : 2\nprintln(x)");
    let context = program.context();
    let calls = extern_call_args(context, package, "println");
    let Some(Instruction::Phi { edges, .. }) = calls[0][0].get_instruction(context) else {
        panic!("expected a phi");
    };
    let mut edges = edges
        .iter()
        .map(|edge| constant_number(context, edge))
        .collect::<Vec<_>>();
    edges.sort();
    assert_eq!(edges, vec![Some(1), Some(2)]);
}

#[test]
fn membership_channels_and_panics_build() {
    let src = r#"
        m := {"k": 1}
        println("k" in m, "j" not in m)
        xs := [1, 2, 3]
        println(xs[1:], xs[:2:3])
        ch := make(chan number)
        ch <- 1
        assert xs != nil, "empty"
        r := recover()
        println(r)
        panic("boom")
    "#;
    let (program, package) = compile(src);
    let context = program.context();
    context.verify().unwrap();

    let calls = extern_call_args(context, package, "println");
    assert!(matches!(
        calls[0][0].get_instruction(context),
        Some(Instruction::BinaryOp {
            op: BinaryOpKind::In,
            ..
        })
    ));
    assert!(matches!(
        calls[1][1].get_instruction(context),
        Some(Instruction::Slice {
            low: None,
            high: Some(_),
            max: Some(_),
            ..
        })
    ));

    let main = package.get_main(context).unwrap();
    let instructions = main
        .instruction_iter(context)
        .into_iter()
        .filter_map(|(_, value)| value.get_instruction(context).cloned())
        .collect::<Vec<_>>();
    assert!(instructions
        .iter()
        .any(|ins| matches!(ins, Instruction::Send { .. })));
    assert!(instructions
        .iter()
        .any(|ins| matches!(ins, Instruction::Assert { msg: Some(_), .. })));
    assert!(instructions
        .iter()
        .any(|ins| matches!(ins, Instruction::Recover)));
    assert!(instructions
        .iter()
        .any(|ins| matches!(ins, Instruction::Panic(_))));
}
