use std::collections::BTreeMap;
use std::sync::Arc;

use orion_error::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tm_core::event::{Stamp, TimePoint, TpBatch, Tuple, Verdict};
use tm_core::output::ResultSink;

use crate::error::RuntimeResult;
use crate::metrics::RunStats;
use crate::worker::WorkerReport;

// ---------------------------------------------------------------------------
// Collator
// ---------------------------------------------------------------------------

/// Joins per-worker root output. A time-point is ready once every worker has
/// reported it; the global frontier is the minimum of the worker frontiers.
pub(crate) struct Collator {
    frontiers: Vec<Option<TimePoint>>,
    pending: BTreeMap<TimePoint, (Stamp, Vec<Tuple>)>,
}

impl Collator {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            frontiers: vec![None; workers],
            pending: BTreeMap::new(),
        }
    }

    pub(crate) fn report(&mut self, worker: usize, batches: Vec<TpBatch>) {
        for batch in batches {
            self.frontiers[worker] = Some(batch.tp);
            let stamp = batch.stamp();
            self.pending
                .entry(batch.tp)
                .or_insert_with(|| (stamp, Vec::new()))
                .1
                .extend(batch.rows);
        }
    }

    /// Remove and return every time-point all workers have passed, in order.
    pub(crate) fn take_ready(&mut self) -> Vec<(Stamp, Vec<Tuple>)> {
        let Some(frontier) = self.frontiers.iter().copied().min().flatten() else {
            return Vec::new();
        };
        let rest = match frontier.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.pending, rest)
            .into_values()
            .collect()
    }

    pub(crate) fn frontier(&self) -> Option<TimePoint> {
        self.frontiers.iter().copied().min().flatten()
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Emitter task
// ---------------------------------------------------------------------------

pub(crate) struct EmitterTask {
    pub rx: mpsc::Receiver<WorkerReport>,
    pub sink: Box<dyn ResultSink>,
    pub columns: Vec<String>,
    pub workers: usize,
    pub stats: Arc<RunStats>,
    pub abort: CancellationToken,
}

/// Write verdicts in time-point order until every worker has hung up, then
/// flush the sink. Time-points without bindings are not written.
#[tracing::instrument(name = "emitter", skip_all)]
pub(crate) async fn run_emitter(mut task: EmitterTask) -> RuntimeResult<()> {
    let result = emit_all(&mut task).await;
    if let Err(e) = &result {
        tm_error!(res, error = %e, "result sink failed, aborting run");
        task.abort.cancel();
    }
    result
}

async fn emit_all(task: &mut EmitterTask) -> RuntimeResult<()> {
    let mut collator = Collator::new(task.workers);
    while let Some(report) = task.rx.recv().await {
        collator.report(report.worker, report.batches);
        for (stamp, rows) in collator.take_ready() {
            if rows.is_empty() {
                continue;
            }
            let verdict = Verdict::new(stamp, task.columns.clone(), rows);
            task.sink.emit(&verdict).err_conv()?;
            task.stats.add_verdict(verdict.rows.len());
        }
    }
    task.sink.flush().err_conv()?;
    if collator.pending() > 0 {
        tm_debug!(
            res,
            pending = collator.pending(),
            frontier = ?collator.frontier(),
            "partial time points discarded at shutdown"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::event::Value;

    fn batch(tp: u64, vals: &[i64]) -> TpBatch {
        TpBatch::new(
            Stamp::new(tp, tp),
            vals.iter().map(|v| vec![Value::Int(*v)]).collect(),
        )
    }

    #[test]
    fn waits_for_every_worker() {
        let mut c = Collator::new(2);
        c.report(0, vec![batch(1, &[1]), batch(2, &[2])]);
        assert!(c.take_ready().is_empty());
        c.report(1, vec![batch(1, &[3])]);
        let ready = c.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0.tp, 1);
        assert_eq!(ready[0].1.len(), 2);
        assert_eq!(c.pending(), 1);
        assert_eq!(c.frontier(), Some(1));

        c.report(1, vec![batch(2, &[])]);
        let ready = c.take_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1, vec![vec![Value::Int(2)]]);
    }

    #[test]
    fn ready_points_come_out_in_order() {
        let mut c = Collator::new(1);
        c.report(0, vec![batch(3, &[1]), batch(5, &[1]), batch(8, &[])]);
        let tps: Vec<u64> = c.take_ready().iter().map(|(s, _)| s.tp).collect();
        assert_eq!(tps, vec![3, 5, 8]);
        assert_eq!(c.pending(), 0);
    }
}
