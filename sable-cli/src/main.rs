use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sable_compiler::Compiler;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod manifest;

#[derive(Parser)]
#[command(name = "sable")]
#[command(version = "0.2.0")]
#[command(about = "Sable Programming Language Compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Sable source file to an object file
    Compile {
        /// Input .sb file, or a directory with a sable.json manifest
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Emit the compiler's own IR
        #[arg(long)]
        emit_ir: bool,

        /// Emit LLVM IR
        #[arg(long)]
        emit_llvm: bool,
    },

    /// Run a Sable source file (compile and JIT-execute `main`)
    Run {
        /// Input .sb file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Parse and typecheck without generating code
    Check {
        /// Input .sb file
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            emit_ir,
            emit_llvm,
        } => compile(&input, output.as_deref(), emit_ir, emit_llvm),
        Commands::Run { input } => run(&input),
        Commands::Check { input } => check(&input),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

/// Resolves the input to a source file, consulting `sable.json` when the
/// input is a directory.
fn resolve_input(input: &Path) -> Result<PathBuf> {
    if input.is_dir() {
        match manifest::Manifest::discover(input)? {
            Some((manifest, main)) => {
                log::debug!("using manifest package `{}`", manifest.name);
                Ok(main)
            }
            None => bail!(
                "{} is a directory without a {}",
                input.display(),
                manifest::MANIFEST_FILE_NAME
            ),
        }
    } else {
        Ok(input.to_path_buf())
    }
}

struct CheckedInput {
    compiler: Compiler,
    module: sable_ast::ModuleRef,
    source: String,
}

fn parse_and_check(input: &Path) -> Result<CheckedInput> {
    let input = resolve_input(input)?;
    let source = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let mut compiler = Compiler::new().map_err(|e| anyhow::anyhow!("{}", e))?;
    let module = match compiler.compile_source(&source, &input.display().to_string()) {
        Ok(module) => module,
        Err(error) => {
            compiler.diagnostics.emit(error.into_diagnostic());
            print_diagnostics(&compiler, &source);
            bail!("compilation failed");
        }
    };

    Ok(CheckedInput {
        compiler,
        module,
        source,
    })
}

fn print_diagnostics(compiler: &Compiler, fallback_source: &str) {
    let module = compiler.registry.get("main");
    for diagnostic in compiler.diagnostics.diagnostics() {
        let text = module
            .as_ref()
            .and_then(|m| {
                m.borrow()
                    .source_text_for(&diagnostic.span.file)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fallback_source.to_string());
        eprintln!("{}", diagnostic.format(&text));
    }
    compiler.diagnostics.print_summary();
}

fn check(input: &Path) -> Result<ExitCode> {
    let checked = parse_and_check(input)?;
    print_diagnostics(&checked.compiler, &checked.source);
    if checked.compiler.has_errors() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn compile(
    input: &Path,
    output: Option<&Path>,
    emit_ir: bool,
    emit_llvm: bool,
) -> Result<ExitCode> {
    let mut checked = parse_and_check(input)?;
    print_diagnostics(&checked.compiler, &checked.source);
    if checked.compiler.has_errors() {
        return Ok(ExitCode::FAILURE);
    }

    let module = checked.module.clone();
    let ir = checked
        .compiler
        .generate_ir(&module)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if emit_ir {
        print!("{}", ir);
        return Ok(ExitCode::SUCCESS);
    }

    let context = inkwell::context::Context::create();
    let compiled = checked
        .compiler
        .compile_to_llvm(&context, &ir)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if emit_llvm {
        print!("{}", compiled.print_llvm_ir());
        return Ok(ExitCode::SUCCESS);
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_object_path(input));
    compiled
        .write_object_file(&output)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    log::info!("wrote {}", output.display());
    Ok(ExitCode::SUCCESS)
}

fn default_object_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "out".to_string());
    PathBuf::from(format!("{}.o", stem))
}

fn run(input: &Path) -> Result<ExitCode> {
    let mut checked = parse_and_check(input)?;
    print_diagnostics(&checked.compiler, &checked.source);
    if checked.compiler.has_errors() {
        return Ok(ExitCode::FAILURE);
    }

    let module = checked.module.clone();
    let ir = checked
        .compiler
        .generate_ir(&module)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let context = inkwell::context::Context::create();
    let mut compiled = checked
        .compiler
        .compile_to_llvm(&context, &ir)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let status = compiled.run_main().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(ExitCode::from(status as u8))
}
