//! WebAssembly module parser.
//!
//! This module wraps the `wasmparser` crate to decode a `.wasm` binary into
//! the [`crate::wasm`] AST. Flat operator streams are rebuilt into nested
//! `block`/`loop`/`if` bodies here, so the translator works on structured
//! instructions.
//!
//! Operators outside the translatable subset are preserved as
//! [`Instr::Unsupported`] rather than rejected — unsupported-instruction
//! reporting (with control context) is the translator's job.

use crate::wasm::{
    BitSize, BlockType, DataSegment, Export, ExportKind, FuncType, Function, Global, IBinOp,
    IRelOp, Import, ImportDesc, Instr, MemArg, Module, ValueType,
};
use anyhow::{bail, Context, Result};
use wasmparser::{ExternalKind, Operator, Parser, Payload, TypeRef, ValType};

fn value_type(vt: ValType) -> Result<ValueType> {
    match vt {
        ValType::I32 => Ok(ValueType::I32),
        ValType::I64 => Ok(ValueType::I64),
        ValType::F32 => Ok(ValueType::F32),
        ValType::F64 => Ok(ValueType::F64),
        other => bail!("unsupported value type {other:?}"),
    }
}

fn func_type(ft: &wasmparser::FuncType) -> Result<FuncType> {
    Ok(FuncType {
        params: ft
            .params()
            .iter()
            .map(|&vt| value_type(vt))
            .collect::<Result<_>>()?,
        results: ft
            .results()
            .iter()
            .map(|&vt| value_type(vt))
            .collect::<Result<_>>()?,
    })
}

fn mem_arg(arg: &wasmparser::MemArg) -> MemArg {
    MemArg {
        offset: arg.offset as u32,
        align: arg.align as u32,
    }
}

fn block_type(bt: wasmparser::BlockType, types: &[FuncType]) -> Result<BlockType> {
    match bt {
        wasmparser::BlockType::Empty => Ok(BlockType::default()),
        wasmparser::BlockType::Type(vt) => Ok(BlockType {
            params: vec![],
            results: vec![value_type(vt)?],
        }),
        wasmparser::BlockType::FuncType(idx) => {
            let ft = types
                .get(idx as usize)
                .with_context(|| format!("block type index {idx} out of range"))?;
            Ok(BlockType {
                params: ft.params.clone(),
                results: ft.results.clone(),
            })
        }
    }
}

/// Name under which an out-of-subset operator is preserved.
fn operator_name(op: &Operator) -> String {
    let dbg = format!("{op:?}");
    dbg.split(['(', ' ', '{'])
        .next()
        .unwrap_or("?")
        .to_string()
}

/// Convert one non-structural operator.
fn convert_operator(op: &Operator) -> Instr {
    use {BitSize::*, IBinOp::*, IRelOp::*};

    match op {
        Operator::I32Const { value } => Instr::I32Const(*value as u32),
        Operator::I64Const { value } => Instr::I64Const(*value as u64),

        Operator::I32Add => Instr::IBinOp(B32, Add),
        Operator::I32Sub => Instr::IBinOp(B32, Sub),
        Operator::I32Mul => Instr::IBinOp(B32, Mul),
        Operator::I32DivU => Instr::IBinOp(B32, DivU),
        Operator::I32DivS => Instr::IBinOp(B32, DivS),
        Operator::I32RemU => Instr::IBinOp(B32, RemU),
        Operator::I32RemS => Instr::IBinOp(B32, RemS),
        Operator::I32And => Instr::IBinOp(B32, And),
        Operator::I32Or => Instr::IBinOp(B32, Or),
        Operator::I32Xor => Instr::IBinOp(B32, Xor),
        Operator::I32Shl => Instr::IBinOp(B32, Shl),
        Operator::I32ShrU => Instr::IBinOp(B32, ShrU),
        Operator::I32ShrS => Instr::IBinOp(B32, ShrS),
        Operator::I32Rotl => Instr::IBinOp(B32, Rotl),
        Operator::I32Rotr => Instr::IBinOp(B32, Rotr),

        Operator::I64Add => Instr::IBinOp(B64, Add),
        Operator::I64Sub => Instr::IBinOp(B64, Sub),
        Operator::I64Mul => Instr::IBinOp(B64, Mul),
        Operator::I64DivU => Instr::IBinOp(B64, DivU),
        Operator::I64DivS => Instr::IBinOp(B64, DivS),
        Operator::I64RemU => Instr::IBinOp(B64, RemU),
        Operator::I64RemS => Instr::IBinOp(B64, RemS),
        Operator::I64And => Instr::IBinOp(B64, And),
        Operator::I64Or => Instr::IBinOp(B64, Or),
        Operator::I64Xor => Instr::IBinOp(B64, Xor),
        Operator::I64Shl => Instr::IBinOp(B64, Shl),
        Operator::I64ShrU => Instr::IBinOp(B64, ShrU),
        Operator::I64ShrS => Instr::IBinOp(B64, ShrS),
        Operator::I64Rotl => Instr::IBinOp(B64, Rotl),
        Operator::I64Rotr => Instr::IBinOp(B64, Rotr),

        Operator::I32Eq => Instr::IRelOp(B32, Eq),
        Operator::I32Ne => Instr::IRelOp(B32, Ne),
        Operator::I32LtU => Instr::IRelOp(B32, LtU),
        Operator::I32LtS => Instr::IRelOp(B32, LtS),
        Operator::I32GtU => Instr::IRelOp(B32, GtU),
        Operator::I32GtS => Instr::IRelOp(B32, GtS),
        Operator::I32LeU => Instr::IRelOp(B32, LeU),
        Operator::I32LeS => Instr::IRelOp(B32, LeS),
        Operator::I32GeU => Instr::IRelOp(B32, GeU),
        Operator::I32GeS => Instr::IRelOp(B32, GeS),

        Operator::I64Eq => Instr::IRelOp(B64, Eq),
        Operator::I64Ne => Instr::IRelOp(B64, Ne),
        Operator::I64LtU => Instr::IRelOp(B64, LtU),
        Operator::I64LtS => Instr::IRelOp(B64, LtS),
        Operator::I64GtU => Instr::IRelOp(B64, GtU),
        Operator::I64GtS => Instr::IRelOp(B64, GtS),
        Operator::I64LeU => Instr::IRelOp(B64, LeU),
        Operator::I64LeS => Instr::IRelOp(B64, LeS),
        Operator::I64GeU => Instr::IRelOp(B64, GeU),
        Operator::I64GeS => Instr::IRelOp(B64, GeS),

        Operator::I32Eqz => Instr::I32Eqz,
        Operator::I64Eqz => Instr::I64Eqz,

        Operator::I32WrapI64 => Instr::I32WrapI64,
        Operator::I64ExtendI32S => Instr::I64ExtendSI32,
        Operator::I64ExtendI32U => Instr::I64ExtendUI32,

        Operator::I32Load { memarg } => Instr::I32Load(mem_arg(memarg)),
        Operator::I64Load { memarg } => Instr::I64Load(mem_arg(memarg)),
        Operator::I32Load8U { memarg } => Instr::I32Load8U(mem_arg(memarg)),
        Operator::I32Load8S { memarg } => Instr::I32Load8S(mem_arg(memarg)),
        Operator::I32Load16U { memarg } => Instr::I32Load16U(mem_arg(memarg)),
        Operator::I32Load16S { memarg } => Instr::I32Load16S(mem_arg(memarg)),
        Operator::I32Store { memarg } => Instr::I32Store(mem_arg(memarg)),
        Operator::I64Store { memarg } => Instr::I64Store(mem_arg(memarg)),
        Operator::I32Store8 { memarg } => Instr::I32Store8(mem_arg(memarg)),
        Operator::I32Store16 { memarg } => Instr::I32Store16(mem_arg(memarg)),
        Operator::I64Store8 { memarg } => Instr::I64Store8(mem_arg(memarg)),

        Operator::Br { relative_depth } => Instr::Br(*relative_depth),
        Operator::BrIf { relative_depth } => Instr::BrIf(*relative_depth),
        Operator::Return => Instr::Return,
        Operator::Call { function_index } => Instr::Call(*function_index),

        Operator::LocalGet { local_index } => Instr::LocalGet(*local_index),
        Operator::LocalSet { local_index } => Instr::LocalSet(*local_index),
        Operator::LocalTee { local_index } => Instr::LocalTee(*local_index),
        Operator::GlobalGet { global_index } => Instr::GlobalGet(*global_index),
        Operator::GlobalSet { global_index } => Instr::GlobalSet(*global_index),

        Operator::Drop => Instr::Drop,
        Operator::Select => Instr::Select,
        Operator::Nop => Instr::Nop,
        Operator::Unreachable => Instr::Unreachable,

        other => Instr::Unsupported(operator_name(other)),
    }
}

// ─── Body structuring ───────────────────────────────────────────────────────

enum FrameKind {
    Func,
    Block,
    Loop,
    If,
}

struct BodyFrame {
    kind: FrameKind,
    ty: BlockType,
    instrs: Vec<Instr>,
    /// Completed then-branch once `else` has been seen.
    then_taken: Option<Vec<Instr>>,
}

impl BodyFrame {
    fn close(self) -> Result<Instr> {
        match self.kind {
            FrameKind::Func => bail!("unbalanced end in function body"),
            FrameKind::Block => Ok(Instr::Block {
                ty: self.ty,
                body: self.instrs,
            }),
            FrameKind::Loop => Ok(Instr::Loop {
                ty: self.ty,
                body: self.instrs,
            }),
            FrameKind::If => match self.then_taken {
                Some(then_body) => Ok(Instr::If {
                    ty: self.ty,
                    then_body,
                    else_body: self.instrs,
                }),
                None => Ok(Instr::If {
                    ty: self.ty,
                    then_body: self.instrs,
                    else_body: vec![],
                }),
            },
        }
    }
}

/// Rebuild a flat operator stream into a structured body.
fn build_body<'a>(
    ops: impl IntoIterator<Item = wasmparser::Result<Operator<'a>>>,
    types: &[FuncType],
) -> Result<Vec<Instr>> {
    let mut stack = vec![BodyFrame {
        kind: FrameKind::Func,
        ty: BlockType::default(),
        instrs: Vec::new(),
        then_taken: None,
    }];

    for op in ops {
        let op = op.context("reading operator")?;
        match op {
            Operator::Block { blockty } => stack.push(BodyFrame {
                kind: FrameKind::Block,
                ty: block_type(blockty, types)?,
                instrs: Vec::new(),
                then_taken: None,
            }),
            Operator::Loop { blockty } => stack.push(BodyFrame {
                kind: FrameKind::Loop,
                ty: block_type(blockty, types)?,
                instrs: Vec::new(),
                then_taken: None,
            }),
            Operator::If { blockty } => stack.push(BodyFrame {
                kind: FrameKind::If,
                ty: block_type(blockty, types)?,
                instrs: Vec::new(),
                then_taken: None,
            }),
            Operator::Else => {
                let top = stack.last_mut().expect("frame stack is never empty");
                if !matches!(top.kind, FrameKind::If) || top.then_taken.is_some() {
                    bail!("else outside of an if body");
                }
                top.then_taken = Some(std::mem::take(&mut top.instrs));
            }
            Operator::End => {
                let frame = stack.pop().expect("frame stack is never empty");
                if stack.is_empty() {
                    // Function-level end; the operator stream is exhausted
                    // here for well-formed bodies.
                    return Ok(frame.instrs);
                }
                let instr = frame.close()?;
                stack
                    .last_mut()
                    .expect("parent frame exists")
                    .instrs
                    .push(instr);
            }
            Operator::BrTable { targets } => {
                let cases = targets
                    .targets()
                    .collect::<wasmparser::Result<Vec<u32>>>()
                    .context("reading br_table targets")?;
                let default = targets.default();
                stack
                    .last_mut()
                    .expect("frame stack is never empty")
                    .instrs
                    .push(Instr::BrTable { cases, default });
            }
            other => {
                stack
                    .last_mut()
                    .expect("frame stack is never empty")
                    .instrs
                    .push(convert_operator(&other));
            }
        }
    }

    bail!("function body ended without a closing end")
}

/// Decode a constant expression (global initializers, segment offsets).
fn const_expr(expr: &wasmparser::ConstExpr, types: &[FuncType]) -> Result<Vec<Instr>> {
    build_body(expr.get_operators_reader().into_iter(), types)
}

/// Parse a function code section entry, extracting locals and the body.
fn parse_code_entry(
    body: wasmparser::FunctionBody,
    type_idx: u32,
    types: &[FuncType],
) -> Result<Function> {
    let mut locals = Vec::new();
    let locals_reader = body.get_locals_reader().context("getting locals reader")?;
    for local in locals_reader {
        let (count, vt) = local.context("reading local")?;
        let ty = value_type(vt)?;
        for _ in 0..count {
            locals.push(ty);
        }
    }

    let ops = body
        .get_operators_reader()
        .context("getting operators reader")?;
    let instrs = build_body(ops.into_iter(), types).context("structuring function body")?;

    Ok(Function {
        type_idx,
        locals,
        body: instrs,
    })
}

/// Parse a WebAssembly binary into a structured module.
pub fn parse_wasm(wasm_bytes: &[u8]) -> Result<Module> {
    let parser = Parser::new(0);

    let mut types: Vec<FuncType> = Vec::new();
    let mut function_types: Vec<u32> = Vec::new();
    let mut functions = Vec::new();
    let mut globals = Vec::new();
    let mut datas = Vec::new();
    let mut exports = Vec::new();
    let mut imports = Vec::new();
    let mut start = None;

    for payload in parser.parse_all(wasm_bytes) {
        let payload = payload.context("parsing wasm payload")?;

        match payload {
            Payload::TypeSection(reader) => {
                for rec_group in reader {
                    let rec_group = rec_group.context("reading rec group")?;
                    for sub_type in rec_group.types() {
                        match &sub_type.composite_type.inner {
                            wasmparser::CompositeInnerType::Func(ft) => {
                                types.push(func_type(ft)?);
                            }
                            // GC-proposal types never occur in the 1.0
                            // modules this pipeline accepts.
                            _ => {}
                        }
                    }
                }
            }

            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.context("reading import")?;
                    let desc = match import.ty {
                        TypeRef::Func(type_idx) => ImportDesc::Func(type_idx),
                        TypeRef::Table(_) => ImportDesc::Table,
                        TypeRef::Memory(_) => ImportDesc::Memory,
                        TypeRef::Global(_) => ImportDesc::Global,
                        _ => continue,
                    };
                    imports.push(Import {
                        module: import.module.to_string(),
                        name: import.name.to_string(),
                        desc,
                    });
                }
            }

            Payload::FunctionSection(reader) => {
                for type_idx in reader {
                    function_types.push(type_idx.context("reading function type index")?);
                }
            }

            Payload::CodeSectionEntry(body) => {
                let type_idx = function_types[functions.len()];
                functions.push(parse_code_entry(body, type_idx, &types)?);
            }

            Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global.context("reading global")?;
                    globals.push(Global {
                        ty: value_type(global.ty.content_type)?,
                        mutable: global.ty.mutable,
                        init: const_expr(&global.init_expr, &types)?,
                    });
                }
            }

            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.context("reading export")?;
                    let kind = match export.kind {
                        ExternalKind::Func => ExportKind::Func,
                        ExternalKind::Table => ExportKind::Table,
                        ExternalKind::Memory => ExportKind::Memory,
                        ExternalKind::Global => ExportKind::Global,
                        ExternalKind::Tag => continue,
                    };
                    exports.push(Export {
                        name: export.name.to_string(),
                        kind,
                        index: export.index,
                    });
                }
            }

            Payload::DataSection(reader) => {
                for data in reader {
                    let data = data.context("reading data segment")?;
                    match data.kind {
                        wasmparser::DataKind::Active {
                            memory_index,
                            offset_expr,
                        } => {
                            datas.push(DataSegment {
                                mem_idx: memory_index,
                                offset: const_expr(&offset_expr, &types)?,
                                bytes: data.data.to_vec(),
                            });
                        }
                        // Passive segments only matter with memory.init,
                        // which is outside the accepted subset.
                        wasmparser::DataKind::Passive => {}
                    }
                }
            }

            Payload::StartSection { func, .. } => {
                start = Some(func);
            }

            _ => {}
        }
    }

    Ok(Module {
        types,
        imports,
        functions,
        globals,
        datas,
        exports,
        start,
    })
}
