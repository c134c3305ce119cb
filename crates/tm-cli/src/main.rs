mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use tm_config::MonitorConfig;
use tm_core::output::open_sink;
use tm_lang::plan::Plan;
use tm_runtime::tracing_init::init_tracing;
use tm_runtime::{InputSource, Monitor, RunReport, wait_for_signal};

use args::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.resolve_config()?;
    let formula = cli.formula_text()?;
    let plan = tm_lang::compile_formula(&formula).context("invalid formula")?;
    if cli.explain {
        print!("{}", tm_lang::explain_plan(&plan));
        return Ok(());
    }

    let _guard = init_tracing(&config.logging, &cli.base_dir())?;

    // one runtime thread per dataflow worker
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.workers)
        .thread_name("tempomon-worker")
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    let source = InputSource::from_arg(cli.input.as_deref());
    runtime.block_on(run(config, plan, source))?;
    Ok(())
}

async fn run(config: MonitorConfig, plan: Plan, source: InputSource) -> Result<RunReport> {
    let sink = open_sink(&config.output).map_err(|e| anyhow::anyhow!("{e}"))?;
    let monitor = Monitor::start(&config, Arc::new(plan), source, sink)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    tokio::spawn(wait_for_signal(monitor.cancel_token()));

    let report = monitor.wait().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::info!(
        domain = "res",
        verdicts = report.verdicts,
        bindings = report.bindings,
        malformed = report.malformed,
        late_drops = report.late_drops,
        "run complete"
    );
    Ok(report)
}
