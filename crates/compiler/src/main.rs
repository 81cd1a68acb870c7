//! Transit Compiler CLI
//!
//! Thin command-line wrapper around [`transit::compile_ast_file`]. Exit
//! codes and flag names are this binary's own concern -- the generator
//! itself (§6) takes no opinion on either.

use clap::{CommandFactory, Parser as ClapParser, Subcommand, ValueEnum};
use clap_complete::{generate as generate_completions, Shell};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use transit::{EmitMode, GeneratorConfig, Target};

#[derive(ClapParser)]
#[command(name = "transitc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Transit compiler - type-infer and emit TL from a parsed AST", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Script,
    Module,
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    Native,
    WasmBrowser,
    WasmEdge,
    LinuxX64,
    LinuxArm64,
    MacosX64,
    MacosArm64,
    WindowsX64,
}

impl From<TargetArg> for Target {
    fn from(value: TargetArg) -> Self {
        match value {
            TargetArg::Native => Target::Native,
            TargetArg::WasmBrowser => Target::WasmBrowser,
            TargetArg::WasmEdge => Target::WasmEdge,
            TargetArg::LinuxX64 => Target::LinuxX64,
            TargetArg::LinuxArm64 => Target::LinuxArm64,
            TargetArg::MacosX64 => Target::MacosX64,
            TargetArg::MacosArm64 => Target::MacosArm64,
            TargetArg::WindowsX64 => Target::WindowsX64,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate TL source from a JSON-encoded AST
    Build {
        /// Input AST file (JSON, produced by the external frontend)
        input: PathBuf,

        /// Output TL source path (defaults to input filename with a .tl extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// `script` emits an entry function; `module` publishes exports
        #[arg(long, value_enum, default_value_t = ModeArg::Script)]
        mode: ModeArg,

        /// Chooses optimisation flags and target triple
        #[arg(long, value_enum, default_value_t = TargetArg::Native)]
        target: TargetArg,

        /// Emit source-line -> emitted-line debug info alongside the output
        #[arg(long)]
        debug: bool,

        /// Divert output to a serialised bytecode writer instead of TL text
        #[arg(long)]
        emit_bytecode: bool,

        /// Skip cache lookup in the surrounding build system
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl std::fmt::Display for ModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeArg::Script => write!(f, "script"),
            ModeArg::Module => write!(f, "module"),
        }
    }
}

impl std::fmt::Display for TargetArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetArg::Native => write!(f, "native"),
            TargetArg::WasmBrowser => write!(f, "wasm-browser"),
            TargetArg::WasmEdge => write!(f, "wasm-edge"),
            TargetArg::LinuxX64 => write!(f, "linux-x64"),
            TargetArg::LinuxArm64 => write!(f, "linux-arm64"),
            TargetArg::MacosX64 => write!(f, "macos-x64"),
            TargetArg::MacosArm64 => write!(f, "macos-arm64"),
            TargetArg::WindowsX64 => write!(f, "windows-x64"),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            mode,
            target,
            debug,
            emit_bytecode,
            force,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("tl"));
            run_build(&input, &output, mode, target, debug, emit_bytecode, force);
        }
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate_completions(shell, &mut cmd, "transitc", &mut io::stdout());
}

#[allow(clippy::too_many_arguments)]
fn run_build(
    input: &std::path::Path,
    output: &std::path::Path,
    mode: ModeArg,
    target: TargetArg,
    debug: bool,
    emit_bytecode: bool,
    force: bool,
) {
    let mut config = GeneratorConfig::new()
        .with_mode(match mode {
            ModeArg::Script => EmitMode::Script,
            ModeArg::Module => EmitMode::Module,
        })
        .with_target(target.into())
        .with_debug(debug)
        .with_emit_bytecode(emit_bytecode)
        .with_force(force);

    if let Some(dir) = input.parent() {
        config = config.with_source_dir(dir);
    }

    match transit::compile_ast_file(input, &config) {
        Ok(program) => {
            if let Err(e) = fs::write(output, &program.source) {
                eprintln!("Error writing output: {e}");
                process::exit(1);
            }
            tracing::info!(
                input = %input.display(),
                output = %output.display(),
                "compiled"
            );
            println!("Compiled {} -> {}", input.display(), output.display());

            if !program.import_plan.skipped_modules.is_empty() {
                eprintln!("Warning: unresolved imports were skipped:");
                for (name, reason) in &program.import_plan.skipped_modules {
                    eprintln!("  {name}: {reason}");
                }
            }
            if !program.import_plan.link_libraries.is_empty() {
                println!("Link against: {}", program.import_plan.link_libraries.join(", "));
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
