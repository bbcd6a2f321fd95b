//! WebAssembly module AST.
//!
//! This is the input of the translation pipeline: a structured view of a
//! Wasm 1.0 module with nested control instructions, produced by
//! [`crate::parser::parse_wasm`]. Only the integer subset is translatable;
//! float-typed items survive parsing so the translator can report them
//! with proper context instead of failing at decode time.

use std::fmt;

/// WebAssembly value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
}

impl ValueType {
    /// Number of 32-bit cells a value of this type occupies on the target
    /// machine (i64 is emulated as a low/high word pair).
    pub fn cells(&self) -> u32 {
        match self {
            ValueType::I32 | ValueType::F32 => 1,
            ValueType::I64 | ValueType::F64 => 2,
        }
    }

    /// Whether the translator accepts this type at all.
    pub fn is_integer(&self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
        }
    }
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FuncType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

/// Declared type of a `block`/`loop`/`if`.
///
/// Wasm 1.0 block types are `[] -> []` or `[] -> [t]`; signatures referring
/// to the type section (multi-value proposal) are resolved by the parser so
/// the translator only ever sees plain parameter/result lists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockType {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
}

/// Operand width of an integer instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitSize {
    B32,
    B64,
}

/// Integer binary operations (shared between the 32- and 64-bit variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IBinOp {
    Add,
    Sub,
    Mul,
    DivU,
    DivS,
    RemU,
    RemS,
    And,
    Or,
    Xor,
    Shl,
    ShrU,
    ShrS,
    Rotl,
    Rotr,
}

/// Integer comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IRelOp {
    Eq,
    Ne,
    LtU,
    LtS,
    GtU,
    GtS,
    LeU,
    LeS,
    GeU,
    GeS,
}

/// Immediate of a memory access instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemArg {
    /// Static byte offset added to the dynamic address.
    pub offset: u32,
    /// Alignment hint (log2). Ignored by the translator.
    pub align: u32,
}

/// A single structured Wasm instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    I32Const(u32),
    I64Const(u64),

    IBinOp(BitSize, IBinOp),
    IRelOp(BitSize, IRelOp),
    I32Eqz,
    I64Eqz,

    I32WrapI64,
    I64ExtendSI32,
    I64ExtendUI32,

    I32Load(MemArg),
    I64Load(MemArg),
    I32Load8U(MemArg),
    I32Load8S(MemArg),
    I32Load16U(MemArg),
    I32Load16S(MemArg),
    I32Store(MemArg),
    I64Store(MemArg),
    I32Store8(MemArg),
    I32Store16(MemArg),
    I64Store8(MemArg),

    Block {
        ty: BlockType,
        body: Vec<Instr>,
    },
    Loop {
        ty: BlockType,
        body: Vec<Instr>,
    },
    If {
        ty: BlockType,
        then_body: Vec<Instr>,
        else_body: Vec<Instr>,
    },
    Br(u32),
    BrIf(u32),
    BrTable {
        cases: Vec<u32>,
        default: u32,
    },
    Return,
    Call(u32),

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    Drop,
    Select,
    Nop,
    Unreachable,

    /// An operator outside the supported subset, kept by name so the
    /// translator can report it with its surrounding context.
    Unsupported(String),
}

impl Instr {
    /// Short name used in diagnostics (block bodies are not dumped).
    pub fn opname(&self) -> String {
        match self {
            Instr::Block { .. } => "block".to_string(),
            Instr::Loop { .. } => "loop".to_string(),
            Instr::If { .. } => "if".to_string(),
            Instr::Unsupported(name) => name.clone(),
            other => {
                let dbg = format!("{other:?}");
                // Strip any payload: `Br(2)` -> `Br`, `I32Load(MemArg ..)` -> `I32Load`
                dbg.split(['(', ' ', '{']).next().unwrap_or("?").to_string()
            }
        }
    }
}

/// Kind of an imported item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDesc {
    /// Imported function (index into the type section).
    Func(u32),
    Table,
    Memory,
    Global,
}

/// An import from the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

/// Kind of an exported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
}

/// An export from the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

/// A global variable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub ty: ValueType,
    pub mutable: bool,
    /// Constant initializer expression.
    pub init: Vec<Instr>,
}

/// An active data segment.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSegment {
    /// Target memory index. Anything other than 0 is rejected by the
    /// translator, not the parser.
    pub mem_idx: u32,
    /// Byte-offset expression (a constant expression in Wasm 1.0).
    pub offset: Vec<Instr>,
    pub bytes: Vec<u8>,
}

/// A defined (non-imported) function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub type_idx: u32,
    pub locals: Vec<ValueType>,
    pub body: Vec<Instr>,
}

/// A parsed WebAssembly module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub datas: Vec<DataSegment>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
}

impl Module {
    /// Number of imported functions. These occupy indices
    /// `0..num_imported_functions()` in the function index space, before
    /// defined functions.
    pub fn num_imported_functions(&self) -> u32 {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Func(_)))
            .count() as u32
    }

    /// Function imports in declaration order.
    pub fn func_imports(&self) -> impl Iterator<Item = &Import> {
        self.imports
            .iter()
            .filter(|i| matches!(i.desc, ImportDesc::Func(_)))
    }

    /// Resolve a function index (import space first) to its signature.
    pub fn func_type(&self, func_idx: u32) -> Option<&FuncType> {
        let n_imports = self.num_imported_functions();
        let type_idx = if func_idx < n_imports {
            match self.func_imports().nth(func_idx as usize)?.desc {
                ImportDesc::Func(t) => t,
                _ => unreachable!("func_imports yields function imports only"),
            }
        } else {
            self.functions.get((func_idx - n_imports) as usize)?.type_idx
        };
        self.types.get(type_idx as usize)
    }

    /// Get a defined function by its index in the global function index
    /// space, or None if the index refers to an import.
    pub fn defined(&self, func_idx: u32) -> Option<&Function> {
        let n_imports = self.num_imported_functions();
        if func_idx < n_imports {
            return None;
        }
        self.functions.get((func_idx - n_imports) as usize)
    }

    /// Look up a function export by name.
    pub fn func_export(&self, name: &str) -> Option<u32> {
        self.exports
            .iter()
            .find(|e| e.kind == ExportKind::Func && e.name == name)
            .map(|e| e.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_cells() {
        assert_eq!(ValueType::I32.cells(), 1);
        assert_eq!(ValueType::I64.cells(), 2);
    }

    #[test]
    fn value_type_integer_check() {
        assert!(ValueType::I32.is_integer());
        assert!(ValueType::I64.is_integer());
        assert!(!ValueType::F32.is_integer());
        assert!(!ValueType::F64.is_integer());
    }

    #[test]
    fn opname_strips_payload() {
        assert_eq!(Instr::Br(2).opname(), "Br");
        assert_eq!(Instr::I32Load(MemArg::default()).opname(), "I32Load");
        assert_eq!(
            Instr::Block {
                ty: BlockType::default(),
                body: vec![Instr::Nop]
            }
            .opname(),
            "block"
        );
    }

    #[test]
    fn function_index_space_spans_imports_and_definitions() {
        let module = Module {
            types: vec![
                FuncType {
                    params: vec![ValueType::I32],
                    results: vec![],
                },
                FuncType {
                    params: vec![],
                    results: vec![ValueType::I32],
                },
            ],
            imports: vec![Import {
                module: "wasi_snapshot_preview1".to_string(),
                name: "proc_exit".to_string(),
                desc: ImportDesc::Func(0),
            }],
            functions: vec![Function {
                type_idx: 1,
                locals: vec![],
                body: vec![],
            }],
            ..Default::default()
        };

        assert_eq!(module.num_imported_functions(), 1);
        assert_eq!(module.func_type(0).unwrap().params, vec![ValueType::I32]);
        assert_eq!(module.func_type(1).unwrap().results, vec![ValueType::I32]);
        assert!(module.defined(0).is_none());
        assert!(module.defined(1).is_some());
        assert!(module.func_type(2).is_none());
    }
}
