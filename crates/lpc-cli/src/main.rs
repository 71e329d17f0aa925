//! lpcdump
//!
//! Inspect compiled LPC programs: symbol tables, disassembly, line-number
//! tables and structural verification.
//!
//! Set `LPCDUMP_LOG` (e.g. `LPCDUMP_LOG=debug`) for diagnostics on stderr.

use clap::{Parser, Subcommand};
use lpc_cli::commands::{self, parse_address};
use lpc_cli::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lpcdump")]
#[command(about = "Dump and disassemble compiled LPC programs", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print symbol tables, optionally with disassembly and line numbers
    Dump {
        /// Program document (JSON)
        file: PathBuf,
        /// Include the disassembly
        #[arg(short, long)]
        disassemble: bool,
        /// Include the line-number tables
        #[arg(short, long)]
        lines: bool,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Disassemble an address range
    Disasm {
        /// Program document (JSON)
        file: PathBuf,
        /// First address (decimal or 0x hex)
        #[arg(long, value_parser = parse_address)]
        start: Option<usize>,
        /// End address, exclusive
        #[arg(long, value_parser = parse_address)]
        end: Option<usize>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the decoded line-number tables
    Lines {
        /// Program document (JSON)
        file: PathBuf,
    },

    /// Check a program document for structural errors
    Verify {
        /// Program document (JSON)
        file: PathBuf,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("LPCDUMP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Dump {
            file,
            disassemble,
            lines,
            output,
        } => commands::dump::execute(&file, disassemble, lines, output.as_deref(), &config),

        Commands::Disasm {
            file,
            start,
            end,
            output,
        } => commands::disasm::execute(&file, start, end, output.as_deref(), &config),

        Commands::Lines { file } => commands::lines::execute(&file, &config),

        Commands::Verify { file } => commands::verify::execute(&file),
    }
}
