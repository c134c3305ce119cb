use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use orion_error::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tm_core::event::{Event, Stamp, TimePoint, TpBatch};
use tm_core::graph::{OperatorGraph, Outbound, merge, partition};
use tm_core::window::{AdmitOutcome, SealedPoint, WindowBuffer};

use crate::error::{RuntimeReason, RuntimeResult};
use crate::metrics::RunStats;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Input of one worker, in the order the ingest task produced it.
#[derive(Debug)]
pub(crate) enum WorkerMsg {
    Event(Event),
    /// Seal everything up to `upto`. `stamps` lists every time-point being
    /// sealed, so shards without tuples for it still step it.
    Seal {
        upto: TimePoint,
        stamps: Arc<Vec<Stamp>>,
    },
    /// The input has ended; release every time-point still held.
    Close,
}

/// One shard's partition of a node output, sent to the owning peer.
#[derive(Debug)]
pub(crate) struct ShufflePiece {
    /// Exchange round; identical on every worker since all shards run the
    /// same sequence of exchanges.
    round: u64,
    from: usize,
    batches: Vec<TpBatch>,
}

/// Root batches released by one worker's step.
#[derive(Debug)]
pub(crate) struct WorkerReport {
    pub worker: usize,
    pub batches: Vec<TpBatch>,
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// This worker's end of the all-to-all shuffle.
pub(crate) struct Exchange {
    id: usize,
    peers: Vec<mpsc::Sender<ShufflePiece>>,
    rx: mpsc::Receiver<ShufflePiece>,
    /// Pieces that arrived for a later round than the one in progress.
    early: HashMap<u64, Vec<ShufflePiece>>,
    round: u64,
    send_timeout: Duration,
    abort: CancellationToken,
}

/// Build the exchange endpoints of `workers` shards.
///
/// A peer is never more than one round ahead of any other, so every inbox
/// holds at most `2 * (workers - 1)` pieces and a capacity of that size
/// never blocks a healthy run.
pub(crate) fn exchange_mesh(
    workers: usize,
    capacity: usize,
    send_timeout: Duration,
    abort: &CancellationToken,
) -> Vec<Exchange> {
    let capacity = capacity.max(2 * workers);
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..workers).map(|_| mpsc::channel(capacity)).unzip();
    receivers
        .into_iter()
        .enumerate()
        .map(|(id, rx)| Exchange {
            id,
            peers: senders.clone(),
            rx,
            early: HashMap::new(),
            round: 0,
            send_timeout,
            abort: abort.clone(),
        })
        .collect()
}

impl Exchange {
    fn workers(&self) -> usize {
        self.peers.len()
    }

    /// Partition `out` across all shards and collect this shard's share from
    /// every peer. `None` when the run was aborted meanwhile.
    async fn swap(&mut self, out: Outbound) -> RuntimeResult<Option<Vec<TpBatch>>> {
        let round = self.round;
        self.round += 1;
        let workers = self.workers();
        if workers == 1 {
            return Ok(Some(out.batches));
        }

        let mut received: Vec<Option<Vec<TpBatch>>> = (0..workers).map(|_| None).collect();
        for (dst, batches) in partition(out.batches, &out.key, workers)
            .into_iter()
            .enumerate()
        {
            if dst == self.id {
                received[dst] = Some(batches);
                continue;
            }
            let piece = ShufflePiece {
                round,
                from: self.id,
                batches,
            };
            if !self.send(dst, piece).await? {
                return Ok(None);
            }
        }

        let mut missing = workers - 1;
        for piece in self.early.remove(&round).unwrap_or_default() {
            received[piece.from] = Some(piece.batches);
            missing -= 1;
        }
        while missing > 0 {
            let piece = tokio::select! {
                _ = self.abort.cancelled() => return Ok(None),
                piece = self.rx.recv() => piece,
            };
            let Some(piece) = piece else {
                return Err(StructError::from(RuntimeReason::Shutdown)
                    .with_detail(format!("worker {}: exchange closed mid-round", self.id)));
            };
            if piece.round == round {
                received[piece.from] = Some(piece.batches);
                missing -= 1;
            } else {
                self.early.entry(piece.round).or_default().push(piece);
            }
        }

        let merged = merge(received.into_iter().flatten().collect()).err_conv()?;
        Ok(Some(merged))
    }

    /// `false` when the run was aborted while sending.
    async fn send(&self, dst: usize, piece: ShufflePiece) -> RuntimeResult<bool> {
        let tx = &self.peers[dst];
        tokio::select! {
            _ = self.abort.cancelled() => Ok(false),
            sent = tokio::time::timeout(self.send_timeout, tx.send(piece)) => match sent {
                Ok(Ok(())) => Ok(true),
                Ok(Err(_)) if self.abort.is_cancelled() => Ok(false),
                Ok(Err(_)) => Err(StructError::from(RuntimeReason::Shutdown)
                    .with_detail(format!("worker {dst} left the exchange"))),
                Err(_) => Err(StructError::from(RuntimeReason::ShuffleBackpressure).with_detail(
                    format!(
                        "worker {} blocked sending to worker {dst} for {:?}",
                        self.id, self.send_timeout
                    ),
                )),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerTask
// ---------------------------------------------------------------------------

pub(crate) struct WorkerTask {
    pub id: usize,
    pub graph: OperatorGraph,
    pub buffer: WindowBuffer,
    pub inbox: mpsc::Receiver<WorkerMsg>,
    pub exchange: Exchange,
    pub results: mpsc::Sender<WorkerReport>,
    pub stats: Arc<RunStats>,
    pub abort: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Drained,
    Aborted,
}

/// Drive one dataflow shard until its inbox closes.
///
/// On failure the shared abort token is cancelled so peers blocked on the
/// exchange stop. A worker stopped by someone else's abort returns `Ok`; the
/// failing task reports the error.
#[tracing::instrument(name = "worker", skip_all, fields(worker = task.id))]
pub(crate) async fn run_worker(mut task: WorkerTask) -> RuntimeResult<()> {
    match task.drive().await {
        Ok(Exit::Drained) => {
            task.finish();
            Ok(())
        }
        Ok(Exit::Aborted) => {
            tm_debug!(pipe, worker = task.id, "worker stopped by abort");
            Ok(())
        }
        Err(e) => {
            tm_error!(pipe, worker = task.id, error = %e, "worker failed, aborting run");
            task.abort.cancel();
            Err(e)
        }
    }
}

impl WorkerTask {
    async fn drive(&mut self) -> RuntimeResult<Exit> {
        loop {
            let msg = tokio::select! {
                _ = self.abort.cancelled() => return Ok(Exit::Aborted),
                msg = self.inbox.recv() => msg,
            };
            match msg {
                None => return Ok(Exit::Drained),
                Some(WorkerMsg::Event(event)) => {
                    if let AdmitOutcome::DroppedLate(w) = self.buffer.admit(event) {
                        tm_warn!(data, worker = self.id, %w, "late event dropped");
                    }
                }
                Some(WorkerMsg::Seal { upto, stamps }) => {
                    for stamp in stamps.iter() {
                        self.buffer.register(*stamp);
                    }
                    for point in self.buffer.advance(upto) {
                        if self.step(Some(point)).await? == Exit::Aborted {
                            return Ok(Exit::Aborted);
                        }
                    }
                }
                Some(WorkerMsg::Close) => {
                    if self.step(None).await? == Exit::Aborted {
                        return Ok(Exit::Aborted);
                    }
                }
            }
        }
    }

    /// Evaluate one sealed time-point, or the final close step when `point`
    /// is `None`.
    async fn step(&mut self, point: Option<SealedPoint>) -> RuntimeResult<Exit> {
        let closing = point.is_none();
        let mut step = match point {
            Some(point) => self.graph.begin_step(point),
            None => self.graph.begin_close(),
        };
        while let Some(out) = step.poll_outbound() {
            let node = out.node;
            match self.exchange.swap(out).await? {
                Some(batches) => step.deliver(node, batches),
                None => return Ok(Exit::Aborted),
            }
        }
        let released = step.finish();
        if closing && self.id == 0 {
            self.stats.add_closed_at_end(released.len() as u64);
            tm_info!(
                res,
                points = released.len(),
                "input closed, open future intervals judged on the trace seen"
            );
        }
        if released.is_empty() {
            return Ok(Exit::Drained);
        }
        tm_trace!(
            pipe,
            worker = self.id,
            released = released.len(),
            "verdicts released"
        );
        let report = WorkerReport {
            worker: self.id,
            batches: released,
        };
        tokio::select! {
            _ = self.abort.cancelled() => Ok(Exit::Aborted),
            sent = self.results.send(report) => match sent {
                Ok(()) => Ok(Exit::Drained),
                Err(_) if self.abort.is_cancelled() => Ok(Exit::Aborted),
                Err(_) => Err(StructError::from(RuntimeReason::Shutdown)
                    .with_detail("result emitter stopped")),
            },
        }
    }

    fn finish(&self) {
        let late = self.buffer.late_drops();
        self.stats.add_late_drops(late);
        let unresolved = self.graph.unresolved();
        if self.id == 0 {
            self.stats.set_unresolved(unresolved);
            if unresolved > 0 {
                tm_info!(
                    res,
                    unresolved,
                    "time points never released, input did not close"
                );
            }
        }
        tm_debug!(
            pipe,
            worker = self.id,
            late_drops = late,
            state = self.graph.state_size(),
            "worker drained"
        );
    }
}
