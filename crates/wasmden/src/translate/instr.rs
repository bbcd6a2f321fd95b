//! Instruction dispatch: Wasm instruction sequences to MASM sequences.
//!
//! Sequences are translated head-first: structured blocks and conditional
//! branches capture the remainder of their sequence (the continue guard and
//! the `br_if` else-branch respectively), and anything following an
//! unconditional transfer (`br`, `br_table`, `return`, `unreachable`) is
//! unreachable by construction and not emitted.

use super::core::{continue_guard, Translator};
use crate::errors::ValidationError;
use crate::masm;
use crate::wasm::{self, ValueType};

impl Translator<'_> {
    pub(crate) fn translate_instrs(
        &mut self,
        instrs: &[wasm::Instr],
    ) -> Result<Vec<masm::Instr>, ValidationError> {
        let mut out = Vec::new();
        for (i, instr) in instrs.iter().enumerate() {
            match instr {
                wasm::Instr::Block { .. } | wasm::Instr::Loop { .. } | wasm::Instr::If { .. } => {
                    out.extend(self.lower_block_like(instr)?);
                    let rest = self.translate_instrs(&instrs[i + 1..])?;
                    out.extend(continue_guard(rest));
                    return Ok(out);
                }

                wasm::Instr::BrIf(n) => {
                    self.pop_expect(&[ValueType::I32])?;
                    let saved = self.stack.clone();
                    let br_code = self.lower_br(*n)?;
                    self.stack = saved;
                    let rest = self.translate_instrs(&instrs[i + 1..])?;
                    out.push(masm::Instr::INeq(Some(0)));
                    out.push(masm::Instr::If {
                        then_body: br_code,
                        else_body: rest,
                    });
                    return Ok(out);
                }

                wasm::Instr::Br(n) => {
                    out.extend(self.lower_br(*n)?);
                    return Ok(out);
                }

                wasm::Instr::BrTable { cases, default } => {
                    out.extend(self.lower_br_table(cases, *default)?);
                    return Ok(out);
                }

                wasm::Instr::Return => {
                    out.extend(self.lower_return()?);
                    return Ok(out);
                }

                wasm::Instr::Unreachable => {
                    out.push(masm::Instr::Push(0));
                    out.push(masm::Instr::Assert);
                    return Ok(out);
                }

                simple => out.extend(self.translate_simple(simple)?),
            }
        }
        Ok(out)
    }

    /// Straight-line instructions (no influence on the rest of the sequence).
    fn translate_simple(
        &mut self,
        instr: &wasm::Instr,
    ) -> Result<Vec<masm::Instr>, ValidationError> {
        use crate::masm::Instr as M;
        use crate::wasm::Instr as W;
        use ValueType::{I32, I64};

        match instr {
            W::I32Const(w) => {
                self.push_types(&[I32]);
                Ok(vec![M::Push(*w)])
            }
            W::I64Const(w) => {
                self.push_types(&[I64]);
                Ok(vec![M::Push(*w as u32), M::Push((*w >> 32) as u32)])
            }

            W::IBinOp(bits, op) => self.lower_binop(*bits, *op),
            W::IRelOp(bits, op) => self.lower_relop(*bits, *op),

            W::I32Eqz => {
                self.pop_expect(&[I32])?;
                self.push_types(&[I32]);
                Ok(vec![M::IEq(Some(0))])
            }
            W::I64Eqz => {
                self.pop_expect(&[I64])?;
                self.push_types(&[I32]);
                Ok(vec![M::IEqz64])
            }

            W::I32WrapI64 => {
                self.pop_expect(&[I64])?;
                self.push_types(&[I32]);
                Ok(vec![M::Drop])
            }
            W::I64ExtendUI32 => {
                self.pop_expect(&[I32])?;
                self.push_types(&[I64]);
                Ok(vec![M::Push(0)])
            }
            W::I64ExtendSI32 => {
                self.pop_expect(&[I32])?;
                self.push_types(&[I64]);
                Ok(vec![
                    M::Dup(0),
                    M::Push(0x7FFF_FFFF),
                    M::IGt,
                    M::If {
                        then_body: vec![M::Push(0xFFFF_FFFF)],
                        else_body: vec![M::Push(0)],
                    },
                ])
            }

            W::I32Load(_)
            | W::I64Load(_)
            | W::I32Load8U(_)
            | W::I32Load8S(_)
            | W::I32Load16U(_)
            | W::I32Load16S(_)
            | W::I32Store(_)
            | W::I64Store(_)
            | W::I32Store8(_)
            | W::I32Store16(_)
            | W::I64Store8(_) => self.lower_memory(instr),

            W::LocalGet(k) => {
                let slot = self.local_slot(*k, "LocalGet")?;
                self.push_types(&[slot.ty]);
                Ok(slot.cells.iter().map(|&c| M::LocLoad(c)).collect())
            }
            W::LocalSet(k) => {
                let slot = self.local_slot(*k, "LocalSet")?;
                let ty = slot.ty;
                let code = local_store_code(&slot.cells);
                self.pop_expect(&[ty])?;
                Ok(code)
            }
            W::LocalTee(k) => {
                let slot = self.local_slot(*k, "LocalTee")?;
                let ty = slot.ty;
                let mut code = local_store_code(&slot.cells);
                code.extend(slot.cells.iter().map(|&c| M::LocLoad(c)));
                self.pop_expect(&[ty])?;
                self.push_types(&[ty]);
                Ok(code)
            }

            W::GlobalGet(k) => {
                let (ty, addr) = self
                    .layout
                    .global(*k)
                    .ok_or_else(|| self.unsupported(format!("GlobalGet({k})")))?;
                self.push_types(&[ty]);
                Ok((0..ty.cells()).map(|i| M::MemLoad(Some(addr + i))).collect())
            }
            W::GlobalSet(k) => self.lower_global_set(*k),

            W::Call(idx) => self.lower_call(*idx),

            W::Drop => {
                let ty = self.pop_any()?;
                Ok(vec![M::Drop; ty.cells() as usize])
            }

            W::Select => {
                self.pop_expect(&[I32])?;
                let ty = self.pop_any()?;
                self.pop_expect(&[ty])?;
                self.push_types(&[ty]);
                match ty {
                    I32 => Ok(vec![M::CDrop]),
                    I64 => Ok(vec![
                        M::INeq(Some(0)),
                        M::If {
                            then_body: vec![M::Drop, M::Drop],
                            else_body: vec![M::MoveUp(3), M::Drop, M::MoveUp(2), M::Drop],
                        },
                    ]),
                    other => Err(ValidationError::UnsupportedArgType(other)),
                }
            }

            W::Nop => Ok(vec![]),

            W::Unsupported(name) => Err(self.unsupported(name.clone())),

            W::Block { .. }
            | W::Loop { .. }
            | W::If { .. }
            | W::Br(_)
            | W::BrIf(_)
            | W::BrTable { .. }
            | W::Return
            | W::Unreachable => {
                unreachable!("sequence-level instructions are handled by translate_instrs")
            }
        }
    }

    fn local_slot(&self, k: u32, what: &str) -> Result<super::core::LocalSlot, ValidationError> {
        self.locals
            .get(k as usize)
            .cloned()
            .ok_or_else(|| self.unsupported(format!("{what}({k})")))
    }

    /// Store the top of stack into a global's cells (high word first).
    pub(crate) fn lower_global_set(&mut self, k: u32) -> Result<Vec<masm::Instr>, ValidationError> {
        use crate::masm::Instr as M;
        let (ty, addr) = self
            .layout
            .global(k)
            .ok_or_else(|| self.unsupported(format!("GlobalSet({k})")))?;
        self.pop_expect(&[ty])?;
        let mut code = Vec::new();
        for i in (0..ty.cells()).rev() {
            code.push(M::MemStore(Some(addr + i)));
            code.push(M::Drop);
        }
        Ok(code)
    }

    fn lower_call(&mut self, idx: u32) -> Result<Vec<masm::Instr>, ValidationError> {
        use crate::masm::Instr as M;
        let sig = self
            .module
            .func_type(idx)
            .cloned()
            .ok_or_else(|| self.unsupported(format!("Call({idx})")))?;
        self.pop_expect(&sig.params)?;

        // A defined function with an empty body is never emitted; the call
        // reduces to discarding the argument cells. The symbolic stack still
        // follows the declared signature.
        let elided = self.module.defined(idx).is_some_and(|f| f.body.is_empty());
        let code = if elided {
            let cells: u32 = sig.params.iter().map(|t| t.cells()).sum();
            vec![M::Drop; cells as usize]
        } else {
            vec![M::Exec(format!("f{idx}"))]
        };

        self.push_types(&sig.results);
        Ok(code)
    }
}

/// `LocStore; Drop` per cell, high cell first (the value's high word is on
/// top of the stack).
fn local_store_code(cells: &[u32]) -> Vec<masm::Instr> {
    let mut code = Vec::new();
    for &cell in cells.iter().rev() {
        code.push(masm::Instr::LocStore(cell));
        code.push(masm::Instr::Drop);
    }
    code
}
