//! Translator state: symbolic operand stack, control context, local frames.
//!
//! One `Translator` instance exists per translated function (or per program
//! init section). It simulates the Wasm operand stack as a list of value
//! types, checked against each instruction's declared signature before code
//! is emitted, and keeps a stack of control frames used both for branch
//! resolution and for error breadcrumbs.

use crate::errors::{Trail, TrailFrame, ValidationError};
use crate::layout::{Layout, BRANCH_COUNTER};
use crate::masm;
use crate::wasm::{self, FuncType, ValueType};

/// How deep into the operand stack a single instruction may address
/// (the maximum operand of `dup`/`swap`/`movup`).
pub(crate) const ACCESSIBLE_STACK_DEPTH: usize = 16;

/// Kind of a structured control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Block,
    Loop,
    If,
}

/// One entry of the control context.
#[derive(Debug, Clone)]
pub(crate) enum Frame {
    /// The function being translated (always the bottom frame).
    Function { idx: u32, results: Vec<ValueType> },
    /// A structured block. `entering` is the operand stack of the parent at
    /// entry (after the block parameters were moved into the block).
    Block {
        kind: BlockKind,
        params: Vec<ValueType>,
        results: Vec<ValueType>,
        entering: Vec<ValueType>,
    },
    GlobalsInit,
    DatasInit,
    Import(String),
}

/// One Wasm local mapped onto consecutive 32-bit cells (low word first).
#[derive(Debug, Clone)]
pub(crate) struct LocalSlot {
    pub ty: ValueType,
    pub cells: Vec<u32>,
}

pub(crate) struct Translator<'a> {
    pub module: &'a wasm::Module,
    pub layout: &'a Layout,
    /// Symbolic operand stack, top at the end.
    pub stack: Vec<ValueType>,
    pub frames: Vec<Frame>,
    pub locals: Vec<LocalSlot>,
    /// Whether any branch targeted the function level; controls the
    /// counter-clearing epilogue.
    pub function_branched: bool,
}

impl<'a> Translator<'a> {
    pub fn new(module: &'a wasm::Module, layout: &'a Layout, root: Frame) -> Self {
        Translator {
            module,
            layout,
            stack: Vec::new(),
            frames: vec![root],
            locals: Vec::new(),
            function_branched: false,
        }
    }

    // ─── Diagnostics ────────────────────────────────────────────────────────

    pub fn trail(&self) -> Trail {
        Trail(
            self.frames
                .iter()
                .map(|frame| match frame {
                    Frame::Function { idx, .. } => TrailFrame::Function(*idx),
                    Frame::Block { kind, .. } => match kind {
                        BlockKind::Block => TrailFrame::Block,
                        BlockKind::Loop => TrailFrame::Loop,
                        BlockKind::If => TrailFrame::If,
                    },
                    Frame::GlobalsInit => TrailFrame::GlobalsInit,
                    Frame::DatasInit => TrailFrame::DatasInit,
                    Frame::Import(name) => TrailFrame::Import(name.clone()),
                })
                .collect(),
        )
    }

    pub fn unsupported(&self, name: impl Into<String>) -> ValidationError {
        ValidationError::UnsupportedInstruction {
            instr: name.into(),
            trail: self.trail(),
        }
    }

    // ─── Symbolic stack discipline ──────────────────────────────────────────

    /// Check that the stack ends with `params` and pop them.
    pub fn pop_expect(&mut self, params: &[ValueType]) -> Result<(), ValidationError> {
        let n = params.len();
        if self.stack.len() < n || self.stack[self.stack.len() - n..] != *params {
            return Err(ValidationError::ExpectedStack {
                expected: params.to_vec(),
                trail: self.trail(),
            });
        }
        self.stack.truncate(self.stack.len() - n);
        Ok(())
    }

    /// Pop the top entry whatever its type (polymorphic `drop`).
    pub fn pop_any(&mut self) -> Result<ValueType, ValidationError> {
        self.stack.pop().ok_or_else(|| ValidationError::EmptyStack {
            trail: self.trail(),
        })
    }

    pub fn push_types(&mut self, results: &[ValueType]) {
        self.stack.extend_from_slice(results);
    }

    /// Current stack width in 32-bit words.
    pub fn stack_words(&self) -> usize {
        type_words(&self.stack)
    }
}

/// Width of a type list in 32-bit words.
pub(crate) fn type_words(types: &[ValueType]) -> usize {
    types.iter().map(|t| t.cells() as usize).sum()
}

// ─── Locals and the function frame ──────────────────────────────────────────

/// Assign local cells: parameters first, then declared locals; i64 takes a
/// (low, high) cell pair.
pub(crate) fn build_locals(params: &[ValueType], locals: &[ValueType]) -> (Vec<LocalSlot>, u32) {
    let mut slots = Vec::with_capacity(params.len() + locals.len());
    let mut next = 0u32;
    for &ty in params.iter().chain(locals.iter()) {
        let cells = (next..next + ty.cells()).collect();
        next += ty.cells();
        slots.push(LocalSlot { ty, cells });
    }
    (slots, next)
}

fn check_integer_signature(sig: &FuncType, locals: &[ValueType]) -> Result<(), ValidationError> {
    for &ty in sig.params.iter().chain(sig.results.iter()).chain(locals) {
        if !ty.is_integer() {
            return Err(ValidationError::UnsupportedArgType(ty));
        }
    }
    Ok(())
}

/// Translate one defined function into a procedure.
pub(crate) fn translate_function(
    module: &wasm::Module,
    layout: &Layout,
    func_idx: u32,
) -> Result<masm::Proc, ValidationError> {
    let func = module
        .defined(func_idx)
        .expect("translate_function is only called for defined functions");
    let sig = module
        .types
        .get(func.type_idx as usize)
        .cloned()
        .unwrap_or_default();
    check_integer_signature(&sig, &func.locals)?;

    let (locals, n_cells) = build_locals(&sig.params, &func.locals);
    let mut tr = Translator::new(
        module,
        layout,
        Frame::Function {
            idx: func_idx,
            results: sig.results.clone(),
        },
    );
    tr.locals = locals;

    log::trace!("translating f{func_idx} ({} local cells)", n_cells);

    // Prelude: move arguments off the operand stack into local cells. The
    // last argument is on top, and within an i64 argument the high word is
    // on top, so both parameters and cells are walked in reverse.
    let mut body = Vec::new();
    for slot in tr.locals[..sig.params.len()].iter().rev() {
        for &cell in slot.cells.iter().rev() {
            body.push(masm::Instr::LocStore(cell));
            body.push(masm::Instr::Drop);
        }
    }

    body.extend(tr.translate_instrs(&func.body)?);

    if tr.function_branched {
        body.extend(function_epilogue());
    }

    Ok(masm::Proc {
        n_locals: n_cells,
        body,
    })
}

// ─── Branch counter plumbing ────────────────────────────────────────────────

/// Clear a counter value of 1 at the function's natural exit, so a `return`
/// does not leak a live counter into the caller.
pub(crate) fn function_epilogue() -> Vec<masm::Instr> {
    use crate::masm::Instr::*;
    vec![
        MemLoad(Some(BRANCH_COUNTER)),
        IEq(Some(1)),
        If {
            then_body: vec![Push(0), MemStore(Some(BRANCH_COUNTER)), Drop],
            else_body: vec![],
        },
    ]
}

/// Wrap the instructions following a block exit in a continue guard.
///
/// The guard consumes one counter level per exiting frame: a counter of 1
/// means this exit is the branch target (clear and resume), 0 means no
/// branch is in flight (resume), anything else belongs to an outer frame
/// (decrement and skip). The guarded code is emitted exactly once, behind
/// a computed 0/1 run flag.
pub(crate) fn continue_guard(rest: Vec<masm::Instr>) -> Vec<masm::Instr> {
    use crate::masm::Instr::*;
    let mut out = vec![
        MemLoad(Some(BRANCH_COUNTER)),
        IEqz,
        If {
            then_body: vec![Push(1)],
            else_body: vec![
                MemLoad(Some(BRANCH_COUNTER)),
                IEq(Some(1)),
                If {
                    then_body: vec![
                        Push(0),
                        MemStore(Some(BRANCH_COUNTER)),
                        Drop,
                        Push(1),
                    ],
                    else_body: vec![
                        MemLoad(Some(BRANCH_COUNTER)),
                        Push(1),
                        ISub,
                        MemStore(Some(BRANCH_COUNTER)),
                        Drop,
                        Push(0),
                    ],
                },
            ],
        },
    ];
    if rest.is_empty() {
        out.push(Drop);
    } else {
        out.push(If {
            then_body: rest,
            else_body: vec![],
        });
    }
    out
}
