//! Validation errors of the translation pipeline.
//!
//! Errors are accumulated where possible — a module with three bad functions
//! reports all three — and returned together as [`CompileErrors`]. Stack
//! discipline and instruction-support errors carry a breadcrumb of the
//! control context they occurred in.

use crate::wasm::ValueType;
use std::fmt;
use thiserror::Error;

/// One element of a control-context breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrailFrame {
    /// Translating function `f{idx}`.
    Function(u32),
    Block,
    Loop,
    If,
    GlobalsInit,
    DatasInit,
    /// Translating the registry body of an imported method.
    Import(String),
}

impl fmt::Display for TrailFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailFrame::Function(idx) => write!(f, "function f{idx}"),
            TrailFrame::Block => write!(f, "block"),
            TrailFrame::Loop => write!(f, "loop"),
            TrailFrame::If => write!(f, "if"),
            TrailFrame::GlobalsInit => write!(f, "globals init"),
            TrailFrame::DatasInit => write!(f, "data init"),
            TrailFrame::Import(name) => write!(f, "import {name}"),
        }
    }
}

/// Control-context breadcrumb, outermost frame first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trail(pub Vec<TrailFrame>);

impl fmt::Display for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, " (in ")?;
        for (i, frame) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " > ")?;
            }
            write!(f, "{frame}")?;
        }
        write!(f, ")")
    }
}

/// Everything the translator can reject a module for.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("no start or main function")]
    NoEntry,

    #[error("import {module}::{name} is not a known host function")]
    BadImport { module: String, name: String },

    #[error("reference to unknown named global `{0}`")]
    BadNamedGlobalRef(String),

    #[error("data segment targets memory index {0}; only memory 0 is supported")]
    BadNoMultipleMem(u32),

    #[error("unsupported value type {0} in signature or global")]
    UnsupportedArgType(ValueType),

    #[error("unsupported instruction {instr}{trail}")]
    UnsupportedInstruction { instr: String, trail: Trail },

    #[error("64-bit {op} has no target equivalent{trail}")]
    Unsupported64Bits { op: String, trail: Trail },

    #[error("operand stack mismatch, expected prefix {expected:?}{trail}")]
    ExpectedStack {
        expected: Vec<ValueType>,
        trail: Trail,
    },

    #[error("drop from an empty operand stack{trail}")]
    EmptyStack { trail: Trail },

    #[error("branch target result width {0} reaches the accessible stack depth")]
    BlockResultTooLarge(usize),

    #[error("64-bit memory access with misaligned offset {0}")]
    BadMisalignedI64(u32),
}

/// The accumulated failure of a whole-module translation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileErrors(pub Vec<ValidationError>);

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} error(s):", self.0.len())?;
        for err in &self.0 {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_renders_outermost_first() {
        let trail = Trail(vec![
            TrailFrame::Function(3),
            TrailFrame::Block,
            TrailFrame::Loop,
        ]);
        assert_eq!(trail.to_string(), " (in function f3 > block > loop)");
    }

    #[test]
    fn empty_trail_renders_nothing() {
        assert_eq!(Trail::default().to_string(), "");
    }

    #[test]
    fn error_messages_carry_context() {
        let err = ValidationError::ExpectedStack {
            expected: vec![ValueType::I32, ValueType::I32],
            trail: Trail(vec![TrailFrame::Function(0), TrailFrame::If]),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected prefix [I32, I32]"));
        assert!(msg.contains("function f0 > if"));
    }

    #[test]
    fn compile_errors_list_every_entry() {
        let errs = CompileErrors(vec![
            ValidationError::NoEntry,
            ValidationError::BadNoMultipleMem(1),
        ]);
        let msg = errs.to_string();
        assert!(msg.starts_with("2 error(s):"));
        assert!(msg.contains("no start or main function"));
        assert!(msg.contains("memory index 1"));
    }
}
