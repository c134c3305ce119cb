use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tm_config::MonitorConfig;
use tm_core::graph::OperatorGraph;
use tm_core::output::ResultSink;
use tm_core::window::WindowBuffer;
use tm_lang::plan::Plan;

use crate::emitter_task::{EmitterTask, run_emitter};
use crate::ingest_task::{IngestTask, run_ingest};
use crate::metrics::RunStats;
use crate::source::LineReader;
use crate::worker::{WorkerMsg, WorkerReport, WorkerTask, exchange_mesh, run_worker};

use super::types::TaskGroup;

/// Spawn the result emitter. Returns the report sender for the workers.
pub(super) fn spawn_emitter(
    sink: Box<dyn ResultSink>,
    plan: &Plan,
    config: &MonitorConfig,
    stats: &Arc<RunStats>,
    abort: &CancellationToken,
) -> (mpsc::Sender<WorkerReport>, TaskGroup) {
    let (tx, rx) = mpsc::channel(config.runtime.channel_capacity);
    let task = EmitterTask {
        rx,
        sink,
        columns: plan.output_columns().to_vec(),
        workers: config.runtime.workers,
        stats: Arc::clone(stats),
        abort: abort.clone(),
    };
    let mut group = TaskGroup::new("emitter");
    group.push(tokio::spawn(run_emitter(task)));
    (tx, group)
}

/// Spawn one task per shard, each with its own graph instance over the
/// shared plan. Returns the per-worker input senders.
pub(super) fn spawn_workers(
    plan: &Arc<Plan>,
    config: &MonitorConfig,
    results: mpsc::Sender<WorkerReport>,
    stats: &Arc<RunStats>,
    abort: &CancellationToken,
) -> (Vec<mpsc::Sender<WorkerMsg>>, TaskGroup) {
    let workers = config.runtime.workers;
    let exchanges = exchange_mesh(
        workers,
        config.runtime.channel_capacity,
        config.runtime.shuffle_timeout.as_duration(),
        abort,
    );
    let mut inputs = Vec::with_capacity(workers);
    let mut group = TaskGroup::new("workers");
    for (id, exchange) in exchanges.into_iter().enumerate() {
        let (tx, inbox) = mpsc::channel(config.runtime.channel_capacity);
        inputs.push(tx);
        let task = WorkerTask {
            id,
            graph: OperatorGraph::for_shard(Arc::clone(plan), id),
            buffer: WindowBuffer::new(),
            inbox,
            exchange,
            results: results.clone(),
            stats: Arc::clone(stats),
            abort: abort.clone(),
        };
        group.push(tokio::spawn(run_worker(task)));
    }
    // The emitter's channel closes once every worker has dropped its clone.
    drop(results);
    (inputs, group)
}

pub(super) fn spawn_ingest(
    reader: LineReader,
    workers: Vec<mpsc::Sender<WorkerMsg>>,
    config: &MonitorConfig,
    stats: &Arc<RunStats>,
    cancel: &CancellationToken,
    abort: &CancellationToken,
) -> TaskGroup {
    let task = IngestTask {
        reader,
        workers,
        max_delay: config.ingest.max_delay,
        stats: Arc::clone(stats),
        cancel: cancel.clone(),
        abort: abort.clone(),
    };
    let mut group = TaskGroup::new("ingest");
    group.push(tokio::spawn(run_ingest(task)));
    group
}
