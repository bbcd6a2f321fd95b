//! wasmden — WebAssembly to Miden Assembly compiler.
//!
//! This crate compiles the integer subset of WebAssembly 1.0 (as produced
//! by clang/rustc for `wasm32`) into Miden Assembly: a flat, word-addressed,
//! 32-bit stack machine. The pipeline plans entry points and a callee-first
//! procedure order, lays out globals and linear memory over word addresses,
//! then translates each function while simulating the Wasm operand stack.

pub mod errors;
pub mod layout;
pub mod masm;
pub mod parser;
pub mod planner;
pub mod translate;
pub mod wasi;
pub mod wasm;

pub use anyhow::{Context, Result};
pub use errors::{CompileErrors, ValidationError};
pub use translate::to_masm;

use parser::parse_wasm;

/// Compile a WebAssembly binary to Miden Assembly text.
///
/// This is the main entry point: it parses the binary, translates it, and
/// renders the resulting module.
///
/// # Example
/// ```no_run
/// let wasm_bytes = std::fs::read("input.wasm").unwrap();
/// let masm_text = wasmden::compile(&wasm_bytes).unwrap();
/// std::fs::write("output.masm", masm_text).unwrap();
/// ```
pub fn compile(wasm_bytes: &[u8]) -> Result<String> {
    let module = parse_wasm(wasm_bytes).context("failed to parse WebAssembly module")?;
    let masm = to_masm(&module).context("translation failed")?;
    Ok(masm.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_renders_text() {
        let wasm = wat::parse_str(r#"(module (func (export "main") (i32.const 42) drop))"#)
            .unwrap();
        let text = compile(&wasm).unwrap();
        assert!(text.starts_with("use.std::sys\nuse.std::math::u64\n"));
        assert!(text.contains("proc.f0\n    push.42\n    drop\nend\n"));
        assert!(text.ends_with("begin\n    exec.f0\nend\n"));
    }

    #[test]
    fn compile_reports_all_errors() {
        let wasm = wat::parse_str(r#"(module (func (result f32) f32.const 1.5))"#).unwrap();
        let err = compile(&wasm).unwrap_err();
        assert!(format!("{err:#}").contains("no start or main function"));
    }
}
