//! Module planning: entry discovery and procedure emission order.
//!
//! The target language resolves `exec` references against procedures defined
//! earlier in the file, so the planner orders functions callee-first: a
//! depth-first post-order walk of the call graph from each entry point,
//! concatenated and deduplicated keeping first occurrences. Imports are part
//! of the function index space and appear in the order like any callee.

use crate::errors::ValidationError;
use crate::wasm::{Instr, Module};
use std::collections::HashSet;

/// Export names probed for an entry point, in priority order.
const ENTRY_EXPORTS: [&str; 3] = ["main", "_start", ""];

/// The planned shape of the output module.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Function indices in emission order; every callee precedes its callers.
    pub order: Vec<u32>,
    /// Entry function indices in execution order (start section first).
    pub entries: Vec<u32>,
}

/// Discover entries and compute the emission order.
pub fn plan(module: &Module) -> Result<Plan, ValidationError> {
    let entries = entry_points(module);
    if entries.is_empty() {
        return Err(ValidationError::NoEntry);
    }

    let mut order: Vec<u32> = Vec::new();
    let mut emitted: HashSet<u32> = HashSet::new();
    for &entry in &entries {
        let mut visited = HashSet::new();
        let mut post = Vec::new();
        dfs_post(module, entry, &mut visited, &mut post);
        for idx in post {
            if emitted.insert(idx) {
                order.push(idx);
            }
        }
    }

    log::debug!(
        "planned {} function(s), entries {:?}",
        order.len(),
        entries
    );
    Ok(Plan { order, entries })
}

/// Entry points: the start section, then the first matching entry export.
fn entry_points(module: &Module) -> Vec<u32> {
    let mut entries = Vec::new();
    if let Some(start) = module.start {
        entries.push(start);
    }
    if let Some(main) = ENTRY_EXPORTS
        .iter()
        .find_map(|name| module.func_export(name))
    {
        if !entries.contains(&main) {
            entries.push(main);
        }
    }
    entries
}

fn dfs_post(module: &Module, idx: u32, visited: &mut HashSet<u32>, out: &mut Vec<u32>) {
    if !visited.insert(idx) {
        return;
    }
    if let Some(func) = module.defined(idx) {
        for callee in collect_calls(&func.body) {
            dfs_post(module, callee, visited, out);
        }
    }
    out.push(idx);
}

/// All `call` targets in a body, in source order, including duplicates.
fn collect_calls(body: &[Instr]) -> Vec<u32> {
    let mut calls = Vec::new();
    walk_calls(body, &mut calls);
    calls
}

fn walk_calls(body: &[Instr], out: &mut Vec<u32>) {
    for instr in body {
        match instr {
            Instr::Call(idx) => out.push(*idx),
            Instr::Block { body, .. } | Instr::Loop { body, .. } => walk_calls(body, out),
            Instr::If {
                then_body,
                else_body,
                ..
            } => {
                walk_calls(then_body, out);
                walk_calls(else_body, out);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_wasm;

    fn module(wat: &str) -> Module {
        parse_wasm(&wat::parse_str(wat).unwrap()).unwrap()
    }

    #[test]
    fn no_entry_is_fatal() {
        let m = module("(module (func (result i32) i32.const 1))");
        assert_eq!(plan(&m).unwrap_err(), ValidationError::NoEntry);
    }

    #[test]
    fn routes_to_underscore_start() {
        let m = module(r#"(module (func (export "_start")))"#);
        let plan = plan(&m).unwrap();
        assert_eq!(plan.entries, vec![0]);
        assert_eq!(plan.order, vec![0]);
    }

    #[test]
    fn main_export_takes_priority_over_underscore_start() {
        let m = module(
            r#"
            (module
                (func (export "_start"))
                (func (export "main"))
            )
        "#,
        );
        assert_eq!(plan(&m).unwrap().entries, vec![1]);
    }

    #[test]
    fn start_section_precedes_main_export() {
        let m = module(
            r#"
            (module
                (func (export "main"))
                (func)
                (start 1)
            )
        "#,
        );
        let plan = plan(&m).unwrap();
        assert_eq!(plan.entries, vec![1, 0]);
    }

    #[test]
    fn callees_precede_callers() {
        let m = module(
            r#"
            (module
                (func (export "main") call 1 call 2)
                (func call 2)
                (func)
            )
        "#,
        );
        let plan = plan(&m).unwrap();
        // main(0) calls 1 and 2; 1 calls 2 — post-order puts 2 first.
        assert_eq!(plan.order, vec![2, 1, 0]);
    }

    #[test]
    fn shared_callee_is_emitted_once_before_both_callers() {
        // 0 calls 1 then 2; 2 also calls 1.
        let m = module(
            r#"
            (module
                (func (export "main") call 1 call 2)
                (func)
                (func call 1)
            )
        "#,
        );
        let plan = plan(&m).unwrap();
        assert_eq!(plan.order, vec![1, 2, 0]);
    }

    #[test]
    fn recursion_does_not_loop() {
        let m = module(r#"(module (func (export "main") call 0))"#);
        assert_eq!(plan(&m).unwrap().order, vec![0]);
    }

    #[test]
    fn calls_inside_nested_blocks_are_found() {
        let m = module(
            r#"
            (module
                (func (export "main")
                    (block
                        (loop
                            (if (i32.const 1) (then call 1))
                        )
                    )
                )
                (func)
            )
        "#,
        );
        assert_eq!(plan(&m).unwrap().order, vec![1, 0]);
    }

    #[test]
    fn imported_callees_appear_in_the_order() {
        let m = module(
            r#"
            (module
                (import "wasi_snapshot_preview1" "proc_exit" (func (param i32)))
                (func (export "main") i32.const 0 call 0)
            )
        "#,
        );
        assert_eq!(plan(&m).unwrap().order, vec![0, 1]);
    }
}
