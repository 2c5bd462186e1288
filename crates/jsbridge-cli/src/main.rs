//! jsbridge command-line host
//!
//! Runs a script file or an inline snippet through the bridge and prints
//! the completion value.

mod commands;

use clap::{Parser, Subcommand};
use jsbridge_core::RuntimeOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "JSBRIDGE_LOG";

#[derive(Parser)]
#[command(name = "jsbridge")]
#[command(about = "Run JavaScript through the jsbridge host", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine heap limit in bytes
    #[arg(long, global = true)]
    memory_limit: Option<usize>,

    /// Engine stack limit in bytes
    #[arg(long, global = true)]
    max_stack_size: Option<usize>,

    /// Allocation threshold that triggers a collection
    #[arg(long, global = true)]
    gc_threshold: Option<usize>,

    /// Log bridge activity to stderr
    #[arg(long, global = true)]
    trace: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script file
    Run {
        /// Input file
        file: PathBuf,
    },

    /// Evaluate inline source
    Eval {
        /// Source to evaluate
        code: String,
    },
}

impl Cli {
    fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            memory_limit: self.memory_limit,
            max_stack_size: self.max_stack_size,
            gc_threshold: self.gc_threshold,
        }
    }
}

fn init_tracing(trace: bool) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) if trace => EnvFilter::new("jsbridge_core=trace"),
        Err(_) => return,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.trace);

    let options = match RuntimeOptions::from_env() {
        Ok(env) => env.merge(cli.runtime_options()),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Run { file } => commands::run::execute(&file, options),
        Commands::Eval { code } => commands::eval::execute(&code, options),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
