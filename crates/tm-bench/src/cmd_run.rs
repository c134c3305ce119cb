use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use tm_config::{MonitorConfig, OutputMode};
use tm_core::output::DiscardSink;
use tm_runtime::{InputSource, RunReport, run_monitor};

use crate::adapter::{CommandAdapter, ProcessAdapter};
use crate::cache::ArtifactCache;
use crate::plan::BenchPlan;

/// One timed monitor run.
#[derive(Debug)]
pub struct Sample {
    pub dataset: String,
    pub workers: usize,
    pub repetition: u32,
    pub elapsed: Duration,
    pub report: RunReport,
}

impl Sample {
    pub fn line(&self) -> String {
        format!(
            "dataset={} workers={} rep={} elapsed_ms={:.3} events={} verdicts={} bindings={}",
            self.dataset,
            self.workers,
            self.repetition,
            self.elapsed.as_secs_f64() * 1000.0,
            self.report.events,
            self.report.verdicts,
            self.report.bindings
        )
    }
}

pub(crate) fn run(plan_path: PathBuf) -> Result<()> {
    let plan = BenchPlan::load(&plan_path)?;
    execute(&plan, &CommandAdapter, |sample| println!("{}", sample.line()))
}

/// Materialize every dataset, then time each (dataset, workers, repetition)
/// with verdicts discarded.
pub fn execute(
    plan: &BenchPlan,
    adapter: &dyn ProcessAdapter,
    mut on_sample: impl FnMut(&Sample),
) -> Result<()> {
    let cache = ArtifactCache::new(&plan.cache_dir);
    let logs: Vec<PathBuf> = plan
        .datasets
        .iter()
        .map(|ds| cache.materialize(ds, adapter))
        .collect::<Result<_>>()?;

    for &workers in &plan.workers {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .enable_all()
            .build()
            .context("building async runtime")?;
        let mut config = MonitorConfig::default();
        config.runtime.workers = workers;
        config.output.mode = OutputMode::Discard;

        for (ds, log) in plan.datasets.iter().zip(&logs) {
            for repetition in 0..plan.repetitions {
                let (elapsed, report) =
                    runtime.block_on(time_once(&config, &ds.formula, log))?;
                on_sample(&Sample {
                    dataset: ds.name.clone(),
                    workers,
                    repetition,
                    elapsed,
                    report,
                });
            }
        }
    }
    Ok(())
}

async fn time_once(
    config: &MonitorConfig,
    formula: &str,
    log: &Path,
) -> Result<(Duration, RunReport)> {
    let started = Instant::now();
    let report = run_monitor(
        config,
        formula,
        InputSource::File(log.to_path_buf()),
        Box::new(DiscardSink::default()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok((started.elapsed(), report))
}
