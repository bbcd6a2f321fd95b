//! Control-flow lowering.
//!
//! The target has no labels and no multi-level break; structured control is
//! rebuilt from `if`/`while` plus a branch counter word in memory. After a
//! branch of depth `n` fires the counter holds `n + 1`; every frame exit
//! consumes one level through its continue guard, and the guard at the
//! target frame's natural exit clears the counter and resumes execution.

use super::core::{type_words, BlockKind, Frame, Translator, ACCESSIBLE_STACK_DEPTH};
use crate::errors::ValidationError;
use crate::layout::BRANCH_COUNTER;
use crate::masm;
use crate::wasm::{self, BlockType, ValueType};

impl Translator<'_> {
    /// Lower a `block`, `loop` or `if` construct (the caller wraps whatever
    /// follows it in a continue guard).
    pub(crate) fn lower_block_like(
        &mut self,
        instr: &wasm::Instr,
    ) -> Result<Vec<masm::Instr>, ValidationError> {
        use crate::masm::Instr as M;

        match instr {
            wasm::Instr::Block { ty, body } => {
                self.enter_frame(BlockKind::Block, ty)?;
                let code = self.translate_instrs(body)?;
                self.exit_frame(ty);
                Ok(code)
            }

            wasm::Instr::Loop { ty, body } => {
                self.enter_frame(BlockKind::Loop, ty)?;
                let mut code = self.translate_instrs(body)?;
                code.extend(loop_continue());
                self.exit_frame(ty);
                Ok(vec![M::Push(1), M::While(code)])
            }

            wasm::Instr::If {
                ty,
                then_body,
                else_body,
            } => {
                self.pop_expect(&[ValueType::I32])?;
                self.enter_frame(BlockKind::If, ty)?;
                let then_code = self.translate_instrs(then_body)?;
                // Both branches start from the block parameters.
                self.stack = ty.params.clone();
                let else_code = self.translate_instrs(else_body)?;
                self.exit_frame(ty);

                Ok(match (then_code.is_empty(), else_code.is_empty()) {
                    // Nothing to run either way; the condition still has to go.
                    (true, true) => vec![M::Drop],
                    (true, false) => vec![
                        M::IEq(Some(0)),
                        M::If {
                            then_body: else_code,
                            else_body: vec![],
                        },
                    ],
                    _ => vec![
                        M::INeq(Some(0)),
                        M::If {
                            then_body: then_code,
                            else_body: else_code,
                        },
                    ],
                })
            }

            other => unreachable!("not a structured instruction: {}", other.opname()),
        }
    }

    fn enter_frame(&mut self, kind: BlockKind, ty: &BlockType) -> Result<(), ValidationError> {
        self.pop_expect(&ty.params)?;
        let entering = std::mem::replace(&mut self.stack, ty.params.clone());
        self.frames.push(Frame::Block {
            kind,
            params: ty.params.clone(),
            results: ty.results.clone(),
            entering,
        });
        Ok(())
    }

    fn exit_frame(&mut self, ty: &BlockType) {
        let Some(Frame::Block { entering, .. }) = self.frames.pop() else {
            unreachable!("exit_frame without a matching enter_frame");
        };
        self.stack = entering;
        self.stack.extend_from_slice(&ty.results);
    }

    /// Lower `br n`: clean the operand stack down to the target's expected
    /// prefix, then arm the branch counter.
    pub(crate) fn lower_br(&mut self, n: u32) -> Result<Vec<masm::Instr>, ValidationError> {
        use crate::masm::Instr as M;
        let n = n as usize;

        // Words sitting between the current stack and the target's entering
        // stack: the entering snapshots of every frame inside the target.
        let blocks: Vec<(BlockKind, Vec<ValueType>, Vec<ValueType>, usize)> = self
            .frames
            .iter()
            .rev()
            .filter_map(|f| match f {
                Frame::Block {
                    kind,
                    params,
                    results,
                    entering,
                } => Some((*kind, params.clone(), results.clone(), type_words(entering))),
                _ => None,
            })
            .collect();

        let (target_types, intervening): (Vec<ValueType>, usize) = if n < blocks.len() {
            let (kind, params, results, _) = &blocks[n];
            // A branch to a loop restarts it, so the loop's parameters are
            // what survives; any other target receives its results.
            let tys = match kind {
                BlockKind::Loop => params.clone(),
                _ => results.clone(),
            };
            (tys, blocks[..n].iter().map(|b| b.3).sum())
        } else if n == blocks.len() {
            let results = match self.frames.first() {
                Some(Frame::Function { results, .. }) => results.clone(),
                _ => return Err(self.unsupported(format!("Br({n})"))),
            };
            self.function_branched = true;
            (results, blocks.iter().map(|b| b.3).sum())
        } else {
            return Err(self.unsupported(format!("Br({n})")));
        };

        let result_words = type_words(&target_types);
        if result_words >= ACCESSIBLE_STACK_DEPTH {
            return Err(ValidationError::BlockResultTooLarge(result_words));
        }

        self.pop_expect(&target_types)?;
        let drops = self.stack_words() + intervening;

        let mut code = Vec::new();
        for _ in 0..drops {
            match result_words {
                0 => code.push(M::Drop),
                1 => {
                    code.push(M::Swap(1));
                    code.push(M::Drop);
                }
                w => {
                    code.push(M::MoveUp(w as u32));
                    code.push(M::Drop);
                }
            }
        }
        code.push(M::Push(n as u32 + 1));
        code.push(M::MemStore(Some(BRANCH_COUNTER)));
        code.push(M::Drop);

        // The path past a taken branch is dead; leave the stack as the
        // target will see it.
        self.stack.clear();
        self.push_types(&target_types);

        Ok(code)
    }

    /// Lower `return` as a branch past every enclosing block.
    pub(crate) fn lower_return(&mut self) -> Result<Vec<masm::Instr>, ValidationError> {
        let depth = self
            .frames
            .iter()
            .filter(|f| matches!(f, Frame::Block { .. }))
            .count();
        self.lower_br(depth as u32)
    }

    /// Lower `br_table` into a chain of selector comparisons. Every arm
    /// discards the selector before branching.
    pub(crate) fn lower_br_table(
        &mut self,
        cases: &[u32],
        default: u32,
    ) -> Result<Vec<masm::Instr>, ValidationError> {
        use crate::masm::Instr as M;

        self.pop_expect(&[ValueType::I32])?;
        let saved = self.stack.clone();

        let mut arms = Vec::with_capacity(cases.len());
        for &case in cases {
            let code = self.lower_br(case)?;
            self.stack = saved.clone();
            arms.push(code);
        }
        let default_code = self.lower_br(default)?;

        let mut chain = vec![M::Drop];
        chain.extend(default_code);
        for (i, arm) in arms.into_iter().enumerate().rev() {
            let mut taken = vec![M::Drop];
            taken.extend(arm);
            chain = vec![
                M::Dup(0),
                M::IEq(Some(i as u32)),
                M::If {
                    then_body: taken,
                    else_body: chain,
                },
            ];
        }
        Ok(chain)
    }
}

/// Trailer of a lowered loop body, deciding whether the `while` repeats.
///
/// Counter 0: natural fall-through, the loop exits. Counter 1: a branch
/// targeted this loop, clear it and repeat. Anything larger belongs to an
/// outer frame: exit and let the guard after the loop do the decrement.
fn loop_continue() -> Vec<masm::Instr> {
    use crate::masm::Instr::*;
    vec![
        MemLoad(Some(BRANCH_COUNTER)),
        IEqz,
        If {
            then_body: vec![Push(0)],
            else_body: vec![
                MemLoad(Some(BRANCH_COUNTER)),
                IEq(Some(1)),
                If {
                    then_body: vec![Push(0), MemStore(Some(BRANCH_COUNTER)), Drop, Push(1)],
                    else_body: vec![Push(0)],
                },
            ],
        },
    ]
}
