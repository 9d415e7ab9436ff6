use std::{path::PathBuf, sync::Arc};

use ember_core::{BuildConfig, ExternTable, FsSourceLoader, Program};
use ember_ir::package_to_string;
use ember_parse::ScriptFrontEnd;

// -------------------------------------------------------------------------------------------------
// Builds every source file in a directory and runs FileCheck over the printed IR.

fn externs() -> ExternTable {
    ExternTable::default()
        .with_value("println", "fn(...any)")
        .with_value("flag", "bool")
        .with_value("items", "[]string")
}

fn run_tests(sub_dir: &str, config: &BuildConfig) {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let dir: PathBuf = format!("{manifest_dir}/tests/{sub_dir}").into();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let input = std::fs::read_to_string(&path).unwrap();

        let mut program = Program::new(ScriptFrontEnd, FsSourceLoader::new(manifest_dir));
        let package = program
            .compile_source("test", Arc::from(input.as_str()), config)
            .unwrap_or_else(|err| panic!("{}: {err}", path.display()))
            .unwrap_or_else(|| {
                for diagnostic in program.diagnostics() {
                    println!("{diagnostic}");
                }
                panic!("{} did not parse", path.display())
            });
        let output = package_to_string(program.context(), package);

        let chkr = filecheck::CheckerBuilder::new()
            .text(&input)
            .unwrap()
            .finish();
        if chkr.is_empty() {
            println!("{output}");
            panic!("No filecheck directives found in test: {}", path.display());
        }

        match chkr.explain(&output, filecheck::NO_VARIABLES) {
            Ok((success, report)) if !success => {
                println!("--- FILECHECK FAILED FOR {}", path.display());
                println!("{report}");
                for diagnostic in program.diagnostics() {
                    println!("{diagnostic}");
                }
                panic!()
            }
            Err(e) => {
                panic!("filecheck directive error while checking: {e}");
            }
            _ => (),
        }
    }
}

#[test]
fn ir_generation() {
    run_tests(
        "ir_generation",
        &BuildConfig::default()
            .with_externs(externs())
            .with_passes(Vec::<String>::new()),
    );
}

#[test]
fn ir_generation_with_analyses() {
    run_tests(
        "ir_generation",
        &BuildConfig::default().with_externs(externs()),
    );
}
