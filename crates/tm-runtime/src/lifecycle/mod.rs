mod signal;
mod spawn;
mod types;

use std::sync::Arc;

use orion_error::op_context;
use orion_error::prelude::*;
use tokio_util::sync::CancellationToken;

use tm_config::MonitorConfig;
use tm_core::output::ResultSink;
use tm_lang::plan::Plan;

use crate::error::{RuntimeReason, RuntimeResult};
use crate::metrics::{RunReport, RunStats};
use crate::source::InputSource;

pub use signal::wait_for_signal;

use spawn::{spawn_emitter, spawn_ingest, spawn_workers};
use types::TaskGroup;

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

/// One monitoring run: ingest task, `W` worker shards and the emitter.
///
/// The run ends on its own when the input is exhausted. [`shutdown`]
/// stops reading early; what was read is still drained to the sink.
///
/// [`shutdown`]: Self::shutdown
pub struct Monitor {
    cancel: CancellationToken,
    abort: CancellationToken,
    groups: Vec<TaskGroup>,
    stats: Arc<RunStats>,
}

impl Monitor {
    /// Open the input and spawn every task on the current runtime.
    #[tracing::instrument(name = "monitor.start", skip_all, fields(workers = config.runtime.workers))]
    pub async fn start(
        config: &MonitorConfig,
        plan: Arc<Plan>,
        source: InputSource,
        sink: Box<dyn ResultSink>,
    ) -> RuntimeResult<Self> {
        let mut op = op_context!("monitor-start").with_auto_log();
        op.record("source", format!("{source:?}").as_str());

        if config.runtime.workers == 0 {
            return Err(StructError::from(RuntimeReason::Bootstrap)
                .with_detail("at least one worker is required"));
        }
        let reader = source.open().await?;

        let cancel = CancellationToken::new();
        let abort = CancellationToken::new();
        let stats = Arc::new(RunStats::new());

        // start order: emitter → workers → ingest
        let mut groups = Vec::with_capacity(3);
        let (results_tx, emitter) = spawn_emitter(sink, &plan, config, &stats, &abort);
        groups.push(emitter);
        let (inputs, workers) = spawn_workers(&plan, config, results_tx, &stats, &abort);
        groups.push(workers);
        groups.push(spawn_ingest(reader, inputs, config, &stats, &cancel, &abort));

        tm_info!(
            sys,
            workers = config.runtime.workers,
            columns = ?plan.output_columns(),
            look_ahead = plan.future_horizon(),
            "monitor started"
        );
        op.mark_suc();
        Ok(Self {
            cancel,
            abort,
            groups,
            stats,
        })
    }

    /// Stop reading input and drain.
    pub fn shutdown(&self) {
        tm_info!(sys, "initiating graceful shutdown");
        self.cancel.cancel();
    }

    /// Token that triggers [`shutdown`](Self::shutdown), for signal handling.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Join every task group (ingest → workers → emitter) and return the
    /// run totals.
    pub async fn wait(mut self) -> RuntimeResult<RunReport> {
        let mut first_err = None;
        while let Some(group) = self.groups.pop() {
            let name = group.name;
            tm_debug!(sys, task_group = name, "waiting for task group to finish");
            if let Err(e) = group.wait().await {
                first_err.get_or_insert(e);
            }
            tm_debug!(sys, task_group = name, "task group finished");
        }
        // the signal listener, if any, waits on this token
        self.cancel.cancel();
        if let Some(e) = first_err {
            return Err(e);
        }
        if self.abort.is_cancelled() {
            return Err(StructError::from(RuntimeReason::Aborted));
        }

        let report = self.stats.snapshot();
        tm_info!(sys, %report, "monitor finished");
        Ok(report)
    }
}

/// Compile `formula`, run it over `source` to completion and return the
/// totals.
pub async fn run_monitor(
    config: &MonitorConfig,
    formula: &str,
    source: InputSource,
    sink: Box<dyn ResultSink>,
) -> RuntimeResult<RunReport> {
    let plan = tm_lang::compile_formula(formula).map_err(|e| {
        StructError::from(RuntimeReason::Formula).with_detail(e.to_string())
    })?;
    Monitor::start(config, Arc::new(plan), source, sink)
        .await?
        .wait()
        .await
}
