//! Memory access lowering.
//!
//! Wasm addresses bytes; the target addresses 32-bit words. A byte address
//! `a` with static offset `o` lands in word `a/4 + o/4 + mem_beginning`.
//! Word-sized accesses assume 4-byte alignment: a misaligned i32 address is
//! silently truncated to its containing word (`a/4` discards `a mod 4`),
//! while a misaligned static offset on an i64 access is rejected outright.
//! Sub-word accesses are synthesized with mask/shift arithmetic on the
//! containing word.

use super::core::Translator;
use crate::errors::ValidationError;
use crate::masm::Instr as M;
use crate::wasm::{self, MemArg, ValueType};

const BYTE_MASK: u32 = 0xFF;
const HALF_MASK: u32 = 0xFFFF;

impl Translator<'_> {
    pub(crate) fn lower_memory(
        &mut self,
        instr: &wasm::Instr,
    ) -> Result<Vec<M>, ValidationError> {
        use ValueType::{I32, I64};
        use crate::wasm::Instr as W;

        match instr {
            W::I32Load(m) => {
                self.pop_expect(&[I32])?;
                self.push_types(&[I32]);
                let mut code = self.word_addr_code(m.offset);
                code.push(M::MemLoad(None));
                Ok(code)
            }

            W::I32Store(m) => {
                self.pop_expect(&[I32, I32])?;
                let mut code = vec![M::Swap(1)];
                code.extend(self.word_addr_code(m.offset));
                code.push(M::MemStore(None));
                code.push(M::Drop);
                Ok(code)
            }

            W::I64Load(m) => {
                self.check_i64_offset(m)?;
                self.pop_expect(&[I32])?;
                self.push_types(&[I64]);
                let mut code = self.word_addr_code(m.offset);
                // Low word at the address, high word one above; high ends on top.
                code.extend([
                    M::Dup(0),
                    M::MemLoad(None),
                    M::Swap(1),
                    M::Push(1),
                    M::IAdd,
                    M::MemLoad(None),
                ]);
                Ok(code)
            }

            W::I64Store(m) => {
                self.check_i64_offset(m)?;
                self.pop_expect(&[I32, I64])?;
                // [addr, lo, hi] — bring the address up, store hi at +1 then
                // lo at the base.
                let mut code = vec![M::MoveUp(2)];
                code.extend(self.word_addr_code(m.offset));
                code.extend([
                    M::Swap(1),
                    M::Dup(1),
                    M::Push(1),
                    M::IAdd,
                    M::MemStore(None),
                    M::Drop,
                    M::MemStore(None),
                    M::Drop,
                ]);
                Ok(code)
            }

            W::I32Load8U(m) => self.subword_load(m, BYTE_MASK, None),
            W::I32Load8S(m) => self.subword_load(m, BYTE_MASK, Some((0x7F, 0x100))),
            W::I32Load16U(m) => self.subword_load(m, HALF_MASK, None),
            W::I32Load16S(m) => self.subword_load(m, HALF_MASK, Some((0x7FFF, 0x1_0000))),

            W::I32Store8(m) => {
                self.pop_expect(&[I32, I32])?;
                Ok(self.subword_store_code(m.offset, BYTE_MASK))
            }
            W::I32Store16(m) => {
                self.pop_expect(&[I32, I32])?;
                Ok(self.subword_store_code(m.offset, HALF_MASK))
            }
            W::I64Store8(m) => {
                self.pop_expect(&[I32, I64])?;
                // Only the low byte of the value reaches memory; the high
                // word never can (an 8-bit field stays inside one word).
                let mut code = vec![M::Drop];
                code.extend(self.subword_store_code(m.offset, BYTE_MASK));
                Ok(code)
            }

            other => unreachable!("not a memory instruction: {}", other.opname()),
        }
    }

    fn check_i64_offset(&self, m: &MemArg) -> Result<(), ValidationError> {
        if m.offset % 4 != 0 {
            return Err(ValidationError::BadMisalignedI64(m.offset));
        }
        Ok(())
    }

    /// `[byte_addr] -> [word_addr]`.
    fn word_addr_code(&self, offset: u32) -> Vec<M> {
        vec![
            M::Push(4),
            M::IDiv,
            M::Push(offset / 4 + self.layout.mem_beginning),
            M::IAdd,
        ]
    }

    /// Unsigned sub-word load; `sign` carries `(threshold, span)` when the
    /// loaded field must be sign-extended through two's complement.
    fn subword_load(
        &mut self,
        m: &MemArg,
        mask: u32,
        sign: Option<(u32, u32)>,
    ) -> Result<Vec<M>, ValidationError> {
        self.pop_expect(&[ValueType::I32])?;
        self.push_types(&[ValueType::I32]);

        // byte_addr = 4q + r; field = (mem[q'] AND (mask << 8r)) SHR 8r
        let mut code = vec![
            M::Push(m.offset),
            M::IAdd,
            M::IDivMod(Some(4)),
            M::Push(8),
            M::IMul,
            M::Swap(1),
            M::Push(self.layout.mem_beginning),
            M::IAdd,
            M::MemLoad(None),
            M::Push(mask),
            M::Dup(2),
            M::IShL,
            M::IAnd,
            M::Swap(1),
            M::IShR,
        ];

        if let Some((threshold, span)) = sign {
            // value > threshold means the sign bit is set: replace v with
            // 2^32 - (span - v), computed with wrapping arithmetic.
            code.extend([
                M::Dup(0),
                M::Push(threshold),
                M::IGt,
                M::If {
                    then_body: vec![
                        M::Push(span),
                        M::Swap(1),
                        M::ISub,
                        M::Push(u32::MAX),
                        M::Swap(1),
                        M::ISub,
                        M::Push(1),
                        M::IAdd,
                    ],
                    else_body: vec![],
                },
            ]);
        }
        Ok(code)
    }

    /// Read-modify-write of a sub-word field: clear the field with
    /// `NOT (mask << 8r)`, OR in the masked value shifted into place.
    fn subword_store_code(&self, offset: u32, mask: u32) -> Vec<M> {
        vec![
            // [addr, val] -> [val, 8r, word_addr]
            M::Swap(1),
            M::Push(offset),
            M::IAdd,
            M::IDivMod(Some(4)),
            M::Push(8),
            M::IMul,
            M::Swap(1),
            M::Push(self.layout.mem_beginning),
            M::IAdd,
            // current word with the field cleared
            M::Dup(0),
            M::MemLoad(None),
            M::Push(mask),
            M::Dup(3),
            M::IShL,
            M::INot,
            M::IAnd,
            // insert the masked value
            M::MoveUp(3),
            M::Push(mask),
            M::IAnd,
            M::MoveUp(3),
            M::IShL,
            M::IOr,
            // write back
            M::Swap(1),
            M::MemStore(None),
            M::Drop,
        ]
    }
}
