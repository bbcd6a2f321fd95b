//! Miden Assembly AST and text emission.
//!
//! The translator produces this in-memory form; rendering to `.masm` text is
//! a mechanical tree walk via `Display`. The instruction set is the fixed
//! subset the translator targets, not all of Miden.
//!
//! Stack conventions baked into this AST (and honored by the reference
//! interpreter in `wasmden-interp`):
//! - 64-bit values are two 32-bit words with the **high word on top**.
//! - `MemStore`/`LocStore` copy the value without consuming it; an explicit
//!   `Drop` follows wherever the value is no longer needed.
//! - `If` consumes a strict boolean (0 or 1); `While` pops a fresh boolean
//!   before every iteration, including the first.

use std::fmt;

/// A complete MASM program: import preamble, procedures, entry block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Import paths emitted verbatim as `use.<path>` lines.
    pub imports: Vec<String>,
    /// Procedures in definition order. Every `Exec` refers to an earlier
    /// entry of this list.
    pub procedures: Vec<(String, Proc)>,
    /// Body of the `begin … end` entry block.
    pub program: Vec<Instr>,
}

/// A single procedure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Proc {
    /// Number of local 32-bit cells addressed by `LocLoad`/`LocStore`.
    pub n_locals: u32,
    pub body: Vec<Instr>,
}

/// The MASM instruction subset emitted by the translator.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Push(u32),
    Drop,
    /// Copy the k-th element (0 = top) to the top.
    Dup(u32),
    /// Exchange the top with the k-th element (k >= 1).
    Swap(u32),
    /// Move the k-th element (k >= 2) to the top.
    MoveUp(u32),

    /// Load a word; immediate address, or popped from the top when `None`.
    MemLoad(Option<u32>),
    /// Store the top-of-stack word without consuming it; immediate address,
    /// or popped from the top when `None`.
    MemStore(Option<u32>),
    LocLoad(u32),
    LocStore(u32),

    Exec(String),
    If {
        then_body: Vec<Instr>,
        else_body: Vec<Instr>,
    },
    While(Vec<Instr>),

    // 32-bit arithmetic (wrapping)
    IAdd,
    ISub,
    IMul,
    IDiv,
    IMod,
    /// Quotient then remainder (remainder on top); immediate divisor or
    /// popped from the top when `None`.
    IDivMod(Option<u32>),
    IShL,
    IShR,
    IAnd,
    IOr,
    IXor,
    INot,

    // 32-bit relational
    IEq(Option<u32>),
    INeq(Option<u32>),
    ILt,
    IGt,
    ILte,
    IGte,
    IEqz,

    // 64-bit counterparts; every operand is a two-word pair, high on top.
    IAdd64,
    ISub64,
    IMul64,
    IShL64,
    IShR64,
    IAnd64,
    IOr64,
    IXor64,
    IEq64,
    INeq64,
    ILt64,
    IGt64,
    ILte64,
    IGte64,
    IEqz64,

    /// `[c, b, a, …] -> [a, …]` when c is 1, `[b, …]` when c is 0.
    CDrop,
    /// Trap unless the top of the stack is 1.
    Assert,
}

// ─── Text emission ──────────────────────────────────────────────────────────

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        write!(f, "    ")?;
    }
    Ok(())
}

fn write_instr(f: &mut fmt::Formatter<'_>, instr: &Instr, depth: usize) -> fmt::Result {
    use Instr::*;

    match instr {
        If {
            then_body,
            else_body,
        } => {
            write_indent(f, depth)?;
            writeln!(f, "if.true")?;
            write_instrs(f, then_body, depth + 1)?;
            if !else_body.is_empty() {
                write_indent(f, depth)?;
                writeln!(f, "else")?;
                write_instrs(f, else_body, depth + 1)?;
            }
            write_indent(f, depth)?;
            writeln!(f, "end")
        }
        While(body) => {
            write_indent(f, depth)?;
            writeln!(f, "while.true")?;
            write_instrs(f, body, depth + 1)?;
            write_indent(f, depth)?;
            writeln!(f, "end")
        }
        other => {
            write_indent(f, depth)?;
            writeln!(f, "{}", flat_mnemonic(other))
        }
    }
}

fn write_instrs(f: &mut fmt::Formatter<'_>, instrs: &[Instr], depth: usize) -> fmt::Result {
    for instr in instrs {
        write_instr(f, instr, depth)?;
    }
    Ok(())
}

/// Mnemonic of a non-nesting instruction.
fn flat_mnemonic(instr: &Instr) -> String {
    use Instr::*;

    match instr {
        Push(w) => format!("push.{w}"),
        Drop => "drop".to_string(),
        Dup(k) => format!("dup.{k}"),
        Swap(1) => "swap".to_string(),
        Swap(k) => format!("swap.{k}"),
        MoveUp(k) => format!("movup.{k}"),
        MemLoad(None) => "mem_load".to_string(),
        MemLoad(Some(a)) => format!("mem_load.{a}"),
        MemStore(None) => "mem_store".to_string(),
        MemStore(Some(a)) => format!("mem_store.{a}"),
        LocLoad(k) => format!("loc_load.{k}"),
        LocStore(k) => format!("loc_store.{k}"),
        Exec(name) => format!("exec.{name}"),

        IAdd => "u32wrapping_add".to_string(),
        ISub => "u32wrapping_sub".to_string(),
        IMul => "u32wrapping_mul".to_string(),
        IDiv => "u32div".to_string(),
        IMod => "u32mod".to_string(),
        IDivMod(None) => "u32divmod".to_string(),
        IDivMod(Some(d)) => format!("u32divmod.{d}"),
        IShL => "u32shl".to_string(),
        IShR => "u32shr".to_string(),
        IAnd => "u32and".to_string(),
        IOr => "u32or".to_string(),
        IXor => "u32xor".to_string(),
        INot => "u32not".to_string(),

        IEq(None) => "eq".to_string(),
        IEq(Some(c)) => format!("eq.{c}"),
        INeq(None) => "neq".to_string(),
        INeq(Some(c)) => format!("neq.{c}"),
        ILt => "u32lt".to_string(),
        IGt => "u32gt".to_string(),
        ILte => "u32lte".to_string(),
        IGte => "u32gte".to_string(),
        IEqz => "eq.0".to_string(),

        IAdd64 => "exec.u64::wrapping_add".to_string(),
        ISub64 => "exec.u64::wrapping_sub".to_string(),
        IMul64 => "exec.u64::wrapping_mul".to_string(),
        IShL64 => "exec.u64::shl".to_string(),
        IShR64 => "exec.u64::shr".to_string(),
        IAnd64 => "exec.u64::and".to_string(),
        IOr64 => "exec.u64::or".to_string(),
        IXor64 => "exec.u64::xor".to_string(),
        IEq64 => "exec.u64::eq".to_string(),
        INeq64 => "exec.u64::neq".to_string(),
        ILt64 => "exec.u64::lt".to_string(),
        IGt64 => "exec.u64::gt".to_string(),
        ILte64 => "exec.u64::lte".to_string(),
        IGte64 => "exec.u64::gte".to_string(),
        IEqz64 => "exec.u64::eqz".to_string(),

        CDrop => "cdrop".to_string(),
        Assert => "assert".to_string(),

        If { .. } | While(_) => unreachable!("nesting instructions are rendered structurally"),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for path in &self.imports {
            writeln!(f, "use.{path}")?;
        }
        if !self.imports.is_empty() {
            writeln!(f)?;
        }

        for (name, proc) in &self.procedures {
            if proc.n_locals == 0 {
                writeln!(f, "proc.{name}")?;
            } else {
                writeln!(f, "proc.{name}.{}", proc.n_locals)?;
            }
            write_instrs(f, &proc.body, 1)?;
            writeln!(f, "end")?;
            writeln!(f)?;
        }

        writeln!(f, "begin")?;
        write_instrs(f, &self.program, 1)?;
        writeln!(f, "end")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_mnemonics() {
        assert_eq!(flat_mnemonic(&Instr::Push(42)), "push.42");
        assert_eq!(flat_mnemonic(&Instr::Swap(1)), "swap");
        assert_eq!(flat_mnemonic(&Instr::Swap(3)), "swap.3");
        assert_eq!(flat_mnemonic(&Instr::MoveUp(2)), "movup.2");
        assert_eq!(flat_mnemonic(&Instr::MemLoad(None)), "mem_load");
        assert_eq!(flat_mnemonic(&Instr::MemStore(Some(0))), "mem_store.0");
        assert_eq!(flat_mnemonic(&Instr::IEq(Some(1))), "eq.1");
        assert_eq!(flat_mnemonic(&Instr::IDivMod(Some(4))), "u32divmod.4");
        assert_eq!(
            flat_mnemonic(&Instr::IAdd64),
            "exec.u64::wrapping_add"
        );
    }

    #[test]
    fn renders_module_with_proc_and_program() {
        let module = Module {
            imports: vec!["std::sys".to_string(), "std::math::u64".to_string()],
            procedures: vec![(
                "f0".to_string(),
                Proc {
                    n_locals: 0,
                    body: vec![Instr::Push(42), Instr::Drop],
                },
            )],
            program: vec![Instr::Exec("f0".to_string())],
        };

        let text = module.to_string();
        assert_eq!(
            text,
            "use.std::sys\n\
             use.std::math::u64\n\
             \n\
             proc.f0\n    push.42\n    drop\nend\n\
             \n\
             begin\n    exec.f0\nend\n"
        );
    }

    #[test]
    fn renders_locals_count_and_nesting() {
        let module = Module {
            imports: vec![],
            procedures: vec![(
                "f1".to_string(),
                Proc {
                    n_locals: 2,
                    body: vec![Instr::If {
                        then_body: vec![Instr::Push(1)],
                        else_body: vec![Instr::Push(0)],
                    }],
                },
            )],
            program: vec![],
        };

        let text = module.to_string();
        assert!(text.contains("proc.f1.2\n"));
        assert!(text.contains("    if.true\n        push.1\n    else\n        push.0\n    end\n"));
    }

    #[test]
    fn empty_else_is_omitted() {
        let module = Module {
            imports: vec![],
            procedures: vec![],
            program: vec![Instr::While(vec![Instr::If {
                then_body: vec![Instr::Drop],
                else_body: vec![],
            }])],
        };

        let text = module.to_string();
        assert!(text.contains("while.true\n        if.true\n            drop\n        end\n    end\n"));
        assert!(!text.contains("else"));
    }
}
