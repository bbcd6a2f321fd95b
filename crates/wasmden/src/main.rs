use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use wasmden::compile;

/// wasmden — WebAssembly to Miden Assembly compiler.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input WebAssembly binary (.wasm)
    input: PathBuf,

    /// Output Miden Assembly file
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    log::info!("compiling {}", cli.input.display());

    let wasm_bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;

    let masm_text = compile(&wasm_bytes).context("compilation failed")?;

    if let Some(output_path) = cli.output {
        fs::write(&output_path, &masm_text)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        log::info!("wrote {}", output_path.display());
    } else {
        print!("{masm_text}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_defaults() {
        let cli = Cli::parse_from(["wasmden", "input.wasm"]);
        assert_eq!(cli.input, PathBuf::from("input.wasm"));
        assert!(cli.output.is_none());
    }

    #[test]
    fn cli_parses_output_flag() {
        let cli = Cli::parse_from(["wasmden", "input.wasm", "-o", "out.masm"]);
        assert_eq!(cli.output, Some(PathBuf::from("out.masm")));
    }
}
