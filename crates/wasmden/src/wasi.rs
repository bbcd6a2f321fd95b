//! Host function registry.
//!
//! Imported functions are resolved against this fixed table instead of being
//! linked: each entry carries a hand-written MASM body (and optionally an
//! initialization sequence run once before the entry functions). Bodies are
//! expressed in pseudo-instructions so they can refer to named globals whose
//! word addresses are only known after layout.

use crate::masm;

/// One pseudo-instruction of a registry method body.
#[derive(Debug, Clone, PartialEq)]
pub enum WasiInstr {
    /// Emit the wrapped instruction verbatim.
    M(masm::Instr),
    /// Load the named global (resolved to `mem_load.<addr>`).
    Load(&'static str),
    /// Store the top of stack into the named global and drop it
    /// (resolved to `mem_store.<addr>` followed by `drop`).
    Store(&'static str),
}

/// A host-provided method.
#[derive(Debug, Clone, PartialEq)]
pub struct WasiMethod {
    /// Local cells of the emitted procedure.
    pub locals: u32,
    /// Named globals the method owns. Every name used by `Load`/`Store`
    /// in `init` or `body` must appear here.
    pub globals: &'static [&'static str],
    /// Run once in the program entry block, before the entries.
    pub init: Vec<WasiInstr>,
    /// The procedure body. Arguments arrive on the operand stack with the
    /// last argument on top; the body must consume them and leave exactly
    /// the declared results.
    pub body: Vec<WasiInstr>,
}

/// Look up an import by `(module, name)`.
pub fn lookup(module: &str, name: &str) -> Option<WasiMethod> {
    use crate::masm::Instr::{Drop, IAdd, Push};
    use WasiInstr::{Load, Store, M};

    if module != "wasi_snapshot_preview1" {
        return None;
    }

    match name {
        // proc_exit(code). There is no process to tear down; the exit code
        // is discarded and the program runs to the end of the entry block.
        "proc_exit" => Some(WasiMethod {
            locals: 0,
            globals: &[],
            init: vec![],
            body: vec![M(Drop)],
        }),

        // fd_write(fd, iovs, iovs_len, nwritten) -> errno. No output device
        // exists on the target; the call succeeds without writing and the
        // running total stays in `bytes_written` for inspection.
        "fd_write" => Some(WasiMethod {
            locals: 0,
            globals: &["bytes_written"],
            init: vec![M(Push(0)), Store("bytes_written")],
            body: vec![M(Drop), M(Drop), M(Drop), M(Drop), M(Push(0))],
        }),

        // random_get(buf, buf_len) -> errno. Deterministic by construction:
        // the buffer is left untouched and `rng_state` counts how far the
        // stream has advanced.
        "random_get" => Some(WasiMethod {
            locals: 0,
            globals: &["rng_state"],
            init: vec![M(Push(0x5EED)), Store("rng_state")],
            body: vec![
                M(Drop),
                M(Drop),
                Load("rng_state"),
                M(Push(1)),
                M(IAdd),
                Store("rng_state"),
                M(Push(0)),
            ],
        }),

        _ => None,
    }
}
