//! tau CLI: run, disassemble and inspect compiled tau units.

use clap::{Parser as ClapParser, Subcommand};
use std::path::{Path, PathBuf};
use tau_core::opcode::disassemble;
use tau_core::{decode, Bytecode, CodecError, Object};
use tau_rt::{ConfigError, VmConfig, Vm};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

#[derive(ClapParser)]
#[command(name = "tau", version, about = "The tau virtual machine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a compiled unit
    Run {
        /// Path to the compiled unit
        #[arg()]
        file: PathBuf,

        /// Config file (default: nearest tau.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Operand stack capacity, in slots
        #[arg(long)]
        stack_size: Option<usize>,

        /// Maximum call depth
        #[arg(long)]
        max_frames: Option<usize>,

        /// Initial GC registry capacity
        #[arg(long)]
        heap_capacity: Option<usize>,
    },
    /// Print the instructions of a compiled unit and of its functions
    Dis {
        /// Path to the compiled unit
        #[arg()]
        file: PathBuf,
    },
    /// Summarize a compiled unit
    Info {
        /// Path to the compiled unit
        #[arg()]
        file: PathBuf,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid bytecode in '{path}': {source}")]
    Decode { path: PathBuf, source: CodecError },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot determine current directory: {0}")]
    Cwd(std::io::Error),
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TAU_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            file,
            config,
            stack_size,
            max_frames,
            heap_capacity,
        } => cmd_run(&file, config, stack_size, max_frames, heap_capacity),
        Commands::Dis { file } => cmd_dis(&file),
        Commands::Info { file } => cmd_info(&file),
    };
    if let Err(e) = result {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(1);
    }
}

fn read_unit(path: &Path) -> Result<Bytecode, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes).map_err(|source| CliError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn load_config(explicit: Option<PathBuf>) -> Result<VmConfig, CliError> {
    if let Some(path) = explicit {
        return Ok(VmConfig::load_from(&path)?);
    }
    let cwd = std::env::current_dir().map_err(CliError::Cwd)?;
    let (found, config) = VmConfig::discover(&cwd)?;
    if let Some(path) = found {
        debug!(path = %path.display(), "using config file");
    }
    Ok(config)
}

fn cmd_run(
    file: &Path,
    config: Option<PathBuf>,
    stack_size: Option<usize>,
    max_frames: Option<usize>,
    heap_capacity: Option<usize>,
) -> Result<(), CliError> {
    let bytecode = read_unit(file)?;
    let mut config = load_config(config)?.with_file(file.display().to_string());
    if let Some(n) = stack_size {
        config = config.with_stack_size(n);
    }
    if let Some(n) = max_frames {
        config = config.with_max_frames(n);
    }
    if let Some(n) = heap_capacity {
        config = config.with_heap_capacity(n);
    }

    let mut vm = Vm::with_config(bytecode, config);
    if let Err(fatal) = vm.run() {
        eprintln!("{fatal}");
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_dis(file: &Path) -> Result<(), CliError> {
    let bytecode = read_unit(file)?;
    println!("{}", bold("main:"));
    print!("{}", disassemble(&bytecode.instructions));
    for (i, c) in bytecode.constants.iter().enumerate() {
        if let Object::Function(f) = c {
            println!();
            println!(
                "{}",
                bold(&format!(
                    "constant {i}: function (params {}, locals {}):",
                    f.num_params, f.num_locals
                ))
            );
            print!("{}", disassemble(&f.instructions));
        }
    }
    Ok(())
}

fn cmd_info(file: &Path) -> Result<(), CliError> {
    let bytecode = read_unit(file)?;
    println!("{:<14}{}", "file:", file.display());
    println!("{:<14}{}", "definitions:", bytecode.ndefs);
    println!("{:<14}{} bytes", "instructions:", bytecode.instructions.len());
    println!("{:<14}{}", "bookmarks:", bytecode.bookmarks.len());
    println!("{:<14}{}", "constants:", bytecode.constants.len());
    for (i, c) in bytecode.constants.iter().enumerate() {
        match c {
            Object::Function(f) => println!(
                "  {i:>4}  function  params={} locals={} code={}B",
                f.num_params,
                f.num_locals,
                f.instructions.len()
            ),
            other => println!("  {i:>4}  {:<8}  {}", other.type_name(), other),
        }
    }
    Ok(())
}
