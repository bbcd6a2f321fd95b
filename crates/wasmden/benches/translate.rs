//! Translation throughput over a representative loop-heavy module.

use criterion::{criterion_group, criterion_main, Criterion};
use wasmden::parser::parse_wasm;
use wasmden::to_masm;

const FIB_WAT: &str = r#"
    (module
        (memory 1)
        (global (mut i32) (i32.const 0))
        (func (export "main") (result i32)
            (local i32 i32 i32 i32)
            i32.const 30
            local.set 0
            i32.const 0
            local.set 1
            i32.const 1
            local.set 2
            (block
                (loop
                    local.get 0
                    i32.eqz
                    br_if 1
                    local.get 1
                    local.get 2
                    i32.add
                    local.set 3
                    local.get 2
                    local.set 1
                    local.get 3
                    local.set 2
                    local.get 0
                    i32.const 1
                    i32.sub
                    local.set 0
                    br 0)))
            local.get 1
            global.set 0
            global.get 0)
    )
"#;

fn bench_translate(c: &mut Criterion) {
    let wasm_bytes = wat::parse_str(FIB_WAT).expect("valid WAT");
    let module = parse_wasm(&wasm_bytes).expect("parse failed");

    c.bench_function("to_masm/fib_loop", |b| {
        b.iter(|| to_masm(&module).expect("translation failed"))
    });

    c.bench_function("parse_and_translate/fib_loop", |b| {
        b.iter(|| {
            let module = parse_wasm(&wasm_bytes).expect("parse failed");
            to_masm(&module).expect("translation failed")
        })
    });
}

criterion_group!(benches, bench_translate);
criterion_main!(benches);
