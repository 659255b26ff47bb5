//! rasm CLI.
//!
//! `rasm <file>` assembles a source file and writes the configured
//! output. Everything else — output format and name, listing, CPU
//! options — is driven by `OPTION` directives in the source or by an
//! optional `rasm.toml` defaults file.

use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use rasm::{Assembler, Defaults};

#[derive(Parser)]
#[command(name = "rasm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-pass assembler for retro 8/16-bit CPUs", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input source file
    input: Option<PathBuf>,

    /// Defaults file (default: ./rasm.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => run_completions(shell),
        None => {
            let Some(input) = cli.input else {
                eprintln!("usage: rasm <file>");
                process::exit(1);
            };
            run_assemble(&input, cli.config.as_deref());
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "rasm", &mut io::stdout());
}

fn run_assemble(input: &Path, config: Option<&Path>) {
    let defaults = match config {
        Some(path) => Defaults::load(path),
        None => Defaults::discover(),
    };

    let defaults = match defaults {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let mut asm = Assembler::new();

    if let Err(e) = defaults.apply(&mut asm) {
        eprintln!("{e}");
        process::exit(1);
    }

    if let Err(e) = asm.assemble(input) {
        eprintln!("{e}");
        process::exit(1);
    }

    if let Err(e) = asm.write_output() {
        eprintln!("{e}");
        process::exit(1);
    }
}
