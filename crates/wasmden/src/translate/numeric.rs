//! Integer arithmetic, comparisons and their signed lowerings.
//!
//! The target machine only has unsigned 32-bit primitives (and procedure
//! calls for the 64-bit pairs), so signed operations are built from two's
//! complement identities:
//!
//! - `is_negative(x)` is `x > 0x7FFF_FFFF` (the boundary value `2^31`
//!   counts as negative),
//! - `negate(x)` is `(0xFFFF_FFFF - x) + 1` with wrapping arithmetic,
//! - signed comparisons test the sign of a wrapping subtraction, which is
//!   correct whenever `a - b` does not overflow — the behavior expected of
//!   compiler-emitted comparisons on values of like magnitude.

use super::core::Translator;
use crate::errors::ValidationError;
use crate::masm::Instr as M;
use crate::wasm::{BitSize, IBinOp, IRelOp, ValueType};

/// Largest non-negative value in the two's-complement reading.
const SIGN_THRESHOLD: u32 = 0x7FFF_FFFF;

impl Translator<'_> {
    pub(crate) fn lower_binop(
        &mut self,
        bits: BitSize,
        op: IBinOp,
    ) -> Result<Vec<M>, ValidationError> {
        let ty = operand_type(bits);
        self.pop_expect(&[ty, ty])?;
        self.push_types(&[ty]);
        match bits {
            BitSize::B32 => Ok(binop32(op)),
            BitSize::B64 => binop64(op).ok_or_else(|| ValidationError::Unsupported64Bits {
                op: format!("{op:?}"),
                trail: self.trail(),
            }),
        }
    }

    pub(crate) fn lower_relop(
        &mut self,
        bits: BitSize,
        op: IRelOp,
    ) -> Result<Vec<M>, ValidationError> {
        let ty = operand_type(bits);
        self.pop_expect(&[ty, ty])?;
        self.push_types(&[ValueType::I32]);
        match bits {
            BitSize::B32 => Ok(relop32(op)),
            BitSize::B64 => relop64(op).ok_or_else(|| ValidationError::Unsupported64Bits {
                op: format!("{op:?}"),
                trail: self.trail(),
            }),
        }
    }
}

fn operand_type(bits: BitSize) -> ValueType {
    match bits {
        BitSize::B32 => ValueType::I32,
        BitSize::B64 => ValueType::I64,
    }
}

// ─── 32-bit lowerings ───────────────────────────────────────────────────────

fn binop32(op: IBinOp) -> Vec<M> {
    match op {
        IBinOp::Add => vec![M::IAdd],
        IBinOp::Sub => vec![M::ISub],
        IBinOp::Mul => vec![M::IMul],
        IBinOp::DivU => vec![M::IDiv],
        IBinOp::RemU => vec![M::IMod],
        IBinOp::And => vec![M::IAnd],
        IBinOp::Or => vec![M::IOr],
        IBinOp::Xor => vec![M::IXor],
        IBinOp::Shl => vec![M::IShL],
        IBinOp::ShrU => vec![M::IShR],
        IBinOp::DivS => div_s_code(),
        IBinOp::RemS => rem_s_code(),
        IBinOp::ShrS => shr_s_code(),
        IBinOp::Rotl => rot_code(M::IShL, M::IShR),
        IBinOp::Rotr => rot_code(M::IShR, M::IShL),
    }
}

fn relop32(op: IRelOp) -> Vec<M> {
    match op {
        IRelOp::Eq => vec![M::IEq(None)],
        IRelOp::Ne => vec![M::INeq(None)],
        IRelOp::LtU => vec![M::ILt],
        IRelOp::GtU => vec![M::IGt],
        IRelOp::LeU => vec![M::ILte],
        IRelOp::GeU => vec![M::IGte],
        // sign of a - b
        IRelOp::LtS => vec![M::ISub, M::Push(SIGN_THRESHOLD), M::IGt],
        // sign of b - a
        IRelOp::GtS => vec![M::Swap(1), M::ISub, M::Push(SIGN_THRESHOLD), M::IGt],
        IRelOp::GeS => eq_or_sign_code(true),
        IRelOp::LeS => eq_or_sign_code(false),
    }
}

/// `(a == b) OR is_negative(b - a)` for ge_s, `… (a - b)` for le_s.
fn eq_or_sign_code(ge: bool) -> Vec<M> {
    let mut code = vec![
        M::Dup(1),
        M::Dup(1),
        M::IEq(None),
        M::MoveUp(2),
        M::MoveUp(2),
    ];
    if ge {
        code.push(M::Swap(1));
    }
    code.extend([M::ISub, M::Push(SIGN_THRESHOLD), M::IGt, M::IOr]);
    code
}

/// `is_negative` applied to the top of the stack.
fn is_negative_code() -> Vec<M> {
    vec![M::Push(SIGN_THRESHOLD), M::IGt]
}

/// Two's-complement negation of the top of the stack.
fn negate_code() -> Vec<M> {
    vec![M::Push(u32::MAX), M::Swap(1), M::ISub, M::Push(1), M::IAdd]
}

/// Absolute value of the top of the stack.
fn abs_code() -> Vec<M> {
    let mut code = vec![M::Dup(0)];
    code.extend(is_negative_code());
    code.push(M::If {
        then_body: negate_code(),
        else_body: vec![],
    });
    code
}

/// `a / b` on signs: `abs(a) / abs(b)`, negated when the signs differ.
fn div_s_code() -> Vec<M> {
    let mut code = vec![M::Dup(1)];
    code.extend(is_negative_code());
    code.push(M::Dup(1));
    code.extend(is_negative_code());
    code.push(M::IXor); // [a, b, sign]
    code.push(M::MoveUp(2));
    code.extend(abs_code()); // [b, sign, |a|]
    code.push(M::MoveUp(2));
    code.extend(abs_code()); // [sign, |a|, |b|]
    code.push(M::IDiv);
    code.push(M::Swap(1));
    code.push(M::If {
        then_body: negate_code(),
        else_body: vec![],
    });
    code
}

/// `a % b` on signs: the remainder carries the dividend's sign.
fn rem_s_code() -> Vec<M> {
    let mut code = vec![M::Dup(1)];
    code.extend(is_negative_code()); // [a, b, sign(a)]
    code.push(M::MoveUp(2));
    code.extend(abs_code()); // [b, sign, |a|]
    code.push(M::MoveUp(2));
    code.extend(abs_code()); // [sign, |a|, |b|]
    code.push(M::IMod);
    code.push(M::Swap(1));
    code.push(M::If {
        then_body: negate_code(),
        else_body: vec![],
    });
    code
}

/// Arithmetic shift right: `NOT ((NOT a) SHR b)` for negative `a`.
fn shr_s_code() -> Vec<M> {
    let mut code = vec![M::Dup(1)];
    code.extend(is_negative_code());
    code.push(M::If {
        then_body: vec![M::Swap(1), M::INot, M::Swap(1), M::IShR, M::INot],
        else_body: vec![M::IShR],
    });
    code
}

/// Rotation out of two opposed shifts: `(a FWD b') OR (a BACK (32-b') & 31)`.
fn rot_code(forward: M, backward: M) -> Vec<M> {
    vec![
        M::Push(31),
        M::IAnd, // [a, b']
        M::Dup(1),
        M::Dup(1),
        forward, // [a, b', a fwd b']
        M::MoveUp(2),
        M::MoveUp(2), // [fwd, a, b']
        M::Push(32),
        M::Swap(1),
        M::ISub,
        M::Push(31),
        M::IAnd, // [fwd, a, (32-b') & 31]
        backward,
        M::IOr,
    ]
}

// ─── 64-bit lowerings ───────────────────────────────────────────────────────

fn binop64(op: IBinOp) -> Option<Vec<M>> {
    let instr = match op {
        IBinOp::Add => M::IAdd64,
        IBinOp::Sub => M::ISub64,
        IBinOp::Mul => M::IMul64,
        IBinOp::And => M::IAnd64,
        IBinOp::Or => M::IOr64,
        IBinOp::Xor => M::IXor64,
        IBinOp::Shl => M::IShL64,
        IBinOp::ShrU => M::IShR64,
        IBinOp::DivU
        | IBinOp::DivS
        | IBinOp::RemU
        | IBinOp::RemS
        | IBinOp::ShrS
        | IBinOp::Rotl
        | IBinOp::Rotr => return None,
    };
    Some(vec![instr])
}

fn relop64(op: IRelOp) -> Option<Vec<M>> {
    let instr = match op {
        IRelOp::Eq => M::IEq64,
        IRelOp::Ne => M::INeq64,
        IRelOp::LtU => M::ILt64,
        IRelOp::GtU => M::IGt64,
        IRelOp::LeU => M::ILte64,
        IRelOp::GeU => M::IGte64,
        IRelOp::LtS | IRelOp::GtS | IRelOp::LeS | IRelOp::GeS => return None,
    };
    Some(vec![instr])
}
