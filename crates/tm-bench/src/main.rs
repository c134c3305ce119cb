mod adapter;
mod cache;
mod cmd_run;
mod plan;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use tm_config::LoggingConfig;
use tm_runtime::tracing_init::init_tracing;

#[derive(Parser)]
#[command(name = "tm-bench", about = "tempomon benchmark harness")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate (or reuse) every dataset in the plan and time the monitor on it
    Run {
        /// Path to bench.toml
        #[arg(long)]
        plan: PathBuf,
        /// Log filter for harness and monitor output
        #[arg(long, default_value = "warn")]
        log_level: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { plan, log_level } => {
            let logging = LoggingConfig {
                level: log_level,
                ..LoggingConfig::default()
            };
            let _guard = init_tracing(&logging, std::path::Path::new("."))?;
            cmd_run::run(plan)?;
        }
    }

    Ok(())
}
