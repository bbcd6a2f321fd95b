//! # Translator
//!
//! Turns a parsed Wasm module into a complete MASM module.
//!
//! ```text
//! wasm::Module
//!      │
//!      ├─[planner]───────► entries + callee-first emission order
//!      ├─[wasi]──────────► registry methods for used imports
//!      ├─[layout]────────► word addresses (counter, named globals,
//!      │                   Wasm globals, mem_beginning)
//!      │
//!      └─[per function]──► Translator::translate_instrs
//!            ├── instr     straight-line dispatch
//!            ├── control   blocks, branch counter, continue guards
//!            ├── memory    byte ↔ word address lowering
//!            └── numeric   signed arithmetic lowerings
//!
//!  ──► masm::Module { use-imports, procedures, begin…end program }
//! ```
//!
//! The program block runs globals initializers, data-segment writes and
//! host-method init sequences before `exec`-ing each entry function.

mod control;
mod core;
mod instr;
mod memory;
mod numeric;

use self::core::{Frame, Translator};
use crate::errors::{CompileErrors, ValidationError};
use crate::layout::Layout;
use crate::masm;
use crate::planner;
use crate::wasi;
use crate::wasm::{self, ValueType};

/// Compile a parsed module to MASM. Errors are accumulated across
/// functions and init sections where possible.
pub fn to_masm(module: &wasm::Module) -> Result<masm::Module, CompileErrors> {
    let plan = planner::plan(module).map_err(|e| CompileErrors(vec![e]))?;
    let mut errors: Vec<ValidationError> = Vec::new();
    let n_imports = module.num_imported_functions();

    // Every function import must resolve against the host registry.
    let mut methods: Vec<Option<(String, wasi::WasiMethod)>> = Vec::new();
    for import in module.func_imports() {
        match wasi::lookup(&import.module, &import.name) {
            Some(method) => methods.push(Some((import.name.clone(), method))),
            None => {
                errors.push(ValidationError::BadImport {
                    module: import.module.clone(),
                    name: import.name.clone(),
                });
                methods.push(None);
            }
        }
    }

    // Imports actually reached from the entries, in emission order.
    let used: Vec<(u32, &String, &wasi::WasiMethod)> = plan
        .order
        .iter()
        .filter(|&&idx| idx < n_imports)
        .filter_map(|&idx| {
            methods[idx as usize]
                .as_ref()
                .map(|(name, method)| (idx, name, method))
        })
        .collect();

    // Named globals of used methods, in discovery order.
    let mut wasi_names: Vec<String> = Vec::new();
    for (_, _, method) in &used {
        for wi in method.init.iter().chain(method.body.iter()) {
            if let wasi::WasiInstr::Load(name) | wasi::WasiInstr::Store(name) = wi {
                if !wasi_names.iter().any(|n| n == name) {
                    wasi_names.push(name.to_string());
                }
            }
        }
    }

    let layout = match Layout::build(&wasi_names, &module.globals) {
        Ok(layout) => layout,
        Err(e) => {
            // Without addresses nothing downstream can be translated.
            errors.push(e);
            return Err(CompileErrors(errors));
        }
    };

    let mut procedures: Vec<(String, masm::Proc)> = Vec::new();
    for &idx in &plan.order {
        if idx < n_imports {
            if let Some((_, method)) = &methods[idx as usize] {
                match resolve_wasi_instrs(&layout, &method.body) {
                    Ok(body) => procedures.push((
                        format!("f{idx}"),
                        masm::Proc {
                            n_locals: method.locals,
                            body,
                        },
                    )),
                    Err(e) => errors.push(e),
                }
            }
        } else if let Some(func) = module.defined(idx) {
            if func.body.is_empty() {
                // Elided: calls compile to argument drops instead.
                continue;
            }
            match self::core::translate_function(module, &layout, idx) {
                Ok(proc) => procedures.push((format!("f{idx}"), proc)),
                Err(e) => errors.push(e),
            }
        }
    }

    let mut program: Vec<masm::Instr> = Vec::new();

    let mut tr = Translator::new(module, &layout, Frame::GlobalsInit);
    for (k, global) in module.globals.iter().enumerate() {
        match init_global(&mut tr, k as u32, global) {
            Ok(code) => program.extend(code),
            Err(e) => errors.push(e),
        }
        tr.stack.clear();
    }

    let mut tr = Translator::new(module, &layout, Frame::DatasInit);
    for segment in &module.datas {
        match init_data(&mut tr, segment) {
            Ok(code) => program.extend(code),
            Err(e) => errors.push(e),
        }
        tr.stack.clear();
    }

    for (_, _, method) in &used {
        match resolve_wasi_instrs(&layout, &method.init) {
            Ok(code) => program.extend(code),
            Err(e) => errors.push(e),
        }
    }

    for &entry in &plan.entries {
        if module.defined(entry).is_some_and(|f| f.body.is_empty()) {
            continue;
        }
        program.push(masm::Instr::Exec(format!("f{entry}")));
    }

    if !errors.is_empty() {
        return Err(CompileErrors(errors));
    }

    Ok(masm::Module {
        imports: vec!["std::sys".to_string(), "std::math::u64".to_string()],
        procedures,
        program,
    })
}

/// Initializer expression followed by a synthetic global store.
fn init_global(
    tr: &mut Translator,
    idx: u32,
    global: &wasm::Global,
) -> Result<Vec<masm::Instr>, ValidationError> {
    let mut code = tr.translate_instrs(&global.init)?;
    code.extend(tr.lower_global_set(idx)?);
    Ok(code)
}

/// Offset expression, word-address conversion, then one store per 4-byte
/// little-endian chunk at consecutive addresses (tail zero-padded).
fn init_data(
    tr: &mut Translator,
    segment: &wasm::DataSegment,
) -> Result<Vec<masm::Instr>, ValidationError> {
    use crate::masm::Instr as M;

    if segment.mem_idx != 0 {
        return Err(ValidationError::BadNoMultipleMem(segment.mem_idx));
    }

    let mut code = tr.translate_instrs(&segment.offset)?;
    tr.pop_expect(&[ValueType::I32])?;
    code.extend([
        M::Push(4),
        M::IDiv,
        M::Push(tr.layout.mem_beginning),
        M::IAdd,
    ]);
    for chunk in segment.bytes.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        code.extend([
            M::Push(u32::from_le_bytes(word)),
            M::Dup(1),
            M::MemStore(None),
            M::Drop,
            M::Push(1),
            M::IAdd,
        ]);
    }
    code.push(M::Drop);
    Ok(code)
}

/// Resolve registry pseudo-instructions against the layout.
fn resolve_wasi_instrs(
    layout: &Layout,
    instrs: &[wasi::WasiInstr],
) -> Result<Vec<masm::Instr>, ValidationError> {
    let mut out = Vec::new();
    for wi in instrs {
        match wi {
            wasi::WasiInstr::M(instr) => out.push(instr.clone()),
            wasi::WasiInstr::Load(name) => {
                let addr = layout
                    .wasi_global(name)
                    .ok_or_else(|| ValidationError::BadNamedGlobalRef(name.to_string()))?;
                out.push(masm::Instr::MemLoad(Some(addr)));
            }
            wasi::WasiInstr::Store(name) => {
                let addr = layout
                    .wasi_global(name)
                    .ok_or_else(|| ValidationError::BadNamedGlobalRef(name.to_string()))?;
                out.push(masm::Instr::MemStore(Some(addr)));
                out.push(masm::Instr::Drop);
            }
        }
    }
    Ok(out)
}
