//! Word-address layout of the target memory.
//!
//! Target memory is word-addressed (one 32-bit word per address). The layout
//! is computed once per module and consulted read-only by every function
//! translator:
//!
//! ```text
//! 0                     branch counter
//! 1 ..                  named globals of used host methods, discovery order
//! ..                    Wasm globals (1 word for i32, 2 for i64, low first)
//! mem_beginning ..      Wasm linear memory, 4 bytes per word
//! ```

use crate::errors::ValidationError;
use crate::wasm::{Global, ValueType};

/// Word address of the branch counter used by the control-flow lowering.
pub const BRANCH_COUNTER: u32 = 0;

/// Immutable address map for one module.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Named host-method globals in discovery order.
    wasi_globals: Vec<(String, u32)>,
    /// Low-word address and type per Wasm global index.
    globals: Vec<(ValueType, u32)>,
    /// First word of Wasm linear memory.
    pub mem_beginning: u32,
}

impl Layout {
    /// Assign addresses for the given host-method global names (discovery
    /// order) and Wasm globals (index order).
    pub fn build(wasi_names: &[String], globals: &[Global]) -> Result<Self, ValidationError> {
        let mut next = BRANCH_COUNTER + 1;

        let mut wasi_globals = Vec::with_capacity(wasi_names.len());
        for name in wasi_names {
            wasi_globals.push((name.clone(), next));
            next += 1;
        }

        let mut global_addrs = Vec::with_capacity(globals.len());
        for global in globals {
            if !global.ty.is_integer() {
                return Err(ValidationError::UnsupportedArgType(global.ty));
            }
            global_addrs.push((global.ty, next));
            next += global.ty.cells();
        }

        Ok(Layout {
            wasi_globals,
            globals: global_addrs,
            mem_beginning: next,
        })
    }

    /// Address of a named host-method global.
    pub fn wasi_global(&self, name: &str) -> Option<u32> {
        self.wasi_globals
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, addr)| addr)
    }

    /// Type and low-word address of a Wasm global.
    pub fn global(&self, idx: u32) -> Option<(ValueType, u32)> {
        self.globals.get(idx as usize).copied()
    }
}
