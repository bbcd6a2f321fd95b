//! End-to-end tests over the rendered MASM text.
//!
//! These check the textual contract: the import preamble, procedure naming,
//! definition-before-use ordering, and byte-for-byte determinism.

use anyhow::{Context, Result};
use wasmden::compile;

fn compile_wat(wat_source: &str) -> Result<String> {
    let wasm_bytes = wat::parse_str(wat_source).context("failed to parse WAT")?;
    compile(&wasm_bytes)
}

#[test]
fn test_minimal_main() -> Result<()> {
    let wat = r#"
        (module
            (func (export "main")
                i32.const 42
                drop
            )
        )
    "#;

    let masm = compile_wat(wat)?;

    println!("Generated MASM:\n{masm}");

    assert!(masm.starts_with("use.std::sys\nuse.std::math::u64\n"));
    assert!(masm.contains("proc.f0\n    push.42\n    drop\nend\n"));
    assert!(masm.trim_end().ends_with("begin\n    exec.f0\nend"));

    Ok(())
}

#[test]
fn test_arithmetic_mnemonics() -> Result<()> {
    let wat = r#"
        (module
            (func (export "main") (result i32)
                i32.const 10
                i32.const 20
                i32.add
            )
        )
    "#;

    let masm = compile_wat(wat)?;
    assert!(masm.contains("u32wrapping_add"));

    Ok(())
}

#[test]
fn test_i64_ops_go_through_the_u64_module() -> Result<()> {
    let wat = r#"
        (module
            (func (export "main") (result i64)
                i64.const 1
                i64.const 2
                i64.add
            )
        )
    "#;

    let masm = compile_wat(wat)?;
    assert!(masm.contains("exec.u64::wrapping_add"));

    Ok(())
}

#[test]
fn test_procedures_are_defined_before_use() -> Result<()> {
    let wat = r#"
        (module
            (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
            (func (export "main")
                call 2
                i32.const 0
                call 0)
            (func
                call 3)
            (func)
        )
    "#;

    let masm = compile_wat(wat)?;

    // Every exec.fN must appear after the line defining proc.fN.
    let lines: Vec<&str> = masm.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        let Some(name) = line.trim().strip_prefix("exec.f") else {
            continue;
        };
        let def = format!("proc.f{name}");
        let defined_at = lines
            .iter()
            .position(|l| l.starts_with(&def))
            .unwrap_or_else(|| panic!("exec.f{name} has no definition"));
        assert!(
            defined_at < i,
            "exec.f{name} on line {i} precedes its definition on line {defined_at}"
        );
    }

    Ok(())
}

#[test]
fn test_translation_is_deterministic() -> Result<()> {
    let wat = r#"
        (module
            (memory 1)
            (global (mut i32) (i32.const 3))
            (data (i32.const 0) "hello world")
            (func (export "main") (result i32)
                (local i32)
                (block
                    (loop
                        local.get 0
                        i32.const 10
                        i32.ge_u
                        br_if 1
                        local.get 0
                        i32.const 1
                        i32.add
                        local.set 0
                        br 0))
                local.get 0
            )
        )
    "#;

    let wasm_bytes = wat::parse_str(wat)?;
    let first = compile(&wasm_bytes)?;
    let second = compile(&wasm_bytes)?;
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn test_control_flow_renders_structurally() -> Result<()> {
    let wat = r#"
        (module
            (func (export "main") (result i32)
                i32.const 1
                (if (result i32)
                    (then i32.const 10)
                    (else i32.const 20))
            )
        )
    "#;

    let masm = compile_wat(wat)?;
    assert!(masm.contains("neq.0"));
    assert!(masm.contains("if.true"));
    assert!(masm.contains("else"));

    let wat_loop = r#"
        (module
            (func (export "main")
                (loop nop)
            )
        )
    "#;
    let masm = compile_wat(wat_loop)?;
    assert!(masm.contains("push.1\n    while.true"));

    Ok(())
}

#[test]
fn test_error_report_lists_every_failure() {
    let wat = r#"
        (module
            (func (export "main") call 1 call 2)
            (func f32.const 1 drop)
            (func (param i32) f64.const 1 drop)
        )
    "#;

    let wasm_bytes = wat::parse_str(wat).unwrap();
    let err = compile(&wasm_bytes).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("F32Const"));
    assert!(msg.contains("F64Const"));
}

#[test]
fn test_missing_entry_is_an_error() {
    let wat = r#"(module (func i32.const 1 drop))"#;
    let wasm_bytes = wat::parse_str(wat).unwrap();
    let err = compile(&wasm_bytes).unwrap_err();
    assert!(format!("{err:#}").contains("no start or main function"));
}
