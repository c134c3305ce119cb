use std::collections::BTreeMap;
use std::sync::Arc;

use orion_error::prelude::*;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tm_core::event::{Event, Record, Stamp, TimePoint, Timestamp};
use tm_core::graph::route_event;
use tm_core::ingest::parse_record;

use crate::error::{RuntimeReason, RuntimeResult};
use crate::metrics::RunStats;
use crate::source::LineReader;
use crate::worker::WorkerMsg;

// ---------------------------------------------------------------------------
// TimeClock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observed {
    Fresh,
    Known,
    /// The time-point already has a different timestamp, which is kept.
    Conflict { kept: Timestamp },
    /// The time-point is sealed.
    Late,
}

/// A timestamp raised to keep timestamps non-decreasing in time-point order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Clamp {
    pub tp: TimePoint,
    pub from: Timestamp,
    pub to: Timestamp,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Sealed {
    pub upto: TimePoint,
    pub stamps: Vec<Stamp>,
    pub clamps: Vec<Clamp>,
}

/// Authoritative timestamp of every unsealed time-point. The first timestamp
/// seen for a time-point wins.
#[derive(Debug, Default)]
pub(crate) struct TimeClock {
    pending: BTreeMap<TimePoint, Timestamp>,
    sealed_upto: Option<TimePoint>,
    last_ts: Option<Timestamp>,
}

impl TimeClock {
    pub(crate) fn observe(&mut self, tp: TimePoint, ts: Timestamp) -> Observed {
        if self.sealed_upto.is_some_and(|sealed| tp <= sealed) {
            return Observed::Late;
        }
        match self.pending.get(&tp) {
            None => {
                self.pending.insert(tp, ts);
                Observed::Fresh
            }
            Some(kept) if *kept == ts => Observed::Known,
            Some(kept) => Observed::Conflict { kept: *kept },
        }
    }

    /// Seal every time-point `<= upto`. `None` when `upto` does not move the
    /// frontier.
    pub(crate) fn seal(&mut self, upto: TimePoint) -> Option<Sealed> {
        if self.sealed_upto.is_some_and(|sealed| upto <= sealed) {
            return None;
        }
        self.sealed_upto = Some(upto);
        let rest = match upto.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.pending, rest);

        let mut stamps = Vec::with_capacity(due.len());
        let mut clamps = Vec::new();
        for (tp, ts) in due {
            let fixed = self.last_ts.map_or(ts, |last| ts.max(last));
            if fixed != ts {
                clamps.push(Clamp {
                    tp,
                    from: ts,
                    to: fixed,
                });
            }
            self.last_ts = Some(fixed);
            stamps.push(Stamp::new(tp, fixed));
        }
        Some(Sealed {
            upto,
            stamps,
            clamps,
        })
    }

    /// Largest time-point not yet sealed.
    pub(crate) fn latest(&self) -> Option<TimePoint> {
        self.pending.keys().next_back().copied()
    }
}

// ---------------------------------------------------------------------------
// IngestTask
// ---------------------------------------------------------------------------

pub(crate) struct IngestTask {
    pub reader: LineReader,
    pub workers: Vec<mpsc::Sender<WorkerMsg>>,
    pub max_delay: Option<u64>,
    pub stats: Arc<RunStats>,
    /// Stop reading and drain what has been read.
    pub cancel: CancellationToken,
    /// A downstream task failed; stop immediately.
    pub abort: CancellationToken,
}

/// Read the log, route events to their shard and broadcast seals.
///
/// At end of input (or on shutdown) every time-point seen is sealed and the
/// workers are told the input is closed, then the worker channels close by
/// dropping the senders.
#[tracing::instrument(name = "ingest", skip_all, fields(workers = task.workers.len()))]
pub(crate) async fn run_ingest(task: IngestTask) -> RuntimeResult<()> {
    let abort = task.abort.clone();
    let mut driver = Driver {
        clock: TimeClock::default(),
        task,
    };
    match driver.run().await {
        Err(_) if abort.is_cancelled() => {
            tm_debug!(data, "ingest stopped by abort");
            Ok(())
        }
        other => other,
    }
}

struct Driver {
    clock: TimeClock,
    task: IngestTask,
}

impl Driver {
    async fn run(&mut self) -> RuntimeResult<()> {
        let mut buf = Vec::new();
        let mut line_no = 0u64;
        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = self.task.abort.cancelled() => {
                    return Err(StructError::from(RuntimeReason::Aborted));
                }
                _ = self.task.cancel.cancelled() => {
                    tm_info!(data, line = line_no, "input interrupted, draining");
                    break;
                }
                read = self.task.reader.read_until(b'\n', &mut buf) => read,
            };
            let n = read.map_err(|e| {
                StructError::from(RuntimeReason::Input)
                    .with_detail(format!("read failed after line {line_no}: {e}"))
            })?;
            if n == 0 {
                break;
            }
            line_no += 1;

            let text = String::from_utf8_lossy(&buf);
            match parse_record(line_no, &text) {
                Ok(None) => {}
                Ok(Some(Record::Event(event))) => self.on_event(event).await?,
                Ok(Some(Record::Watermark(w))) => self.seal(w, true).await?,
                Err(e) => {
                    self.task.stats.inc_malformed();
                    tm_warn!(data, line = e.line, reason = %e.reason, "skipping malformed record");
                }
            }
        }

        if let Some(last) = self.clock.latest() {
            self.seal(last, false).await?;
        }
        for shard in 0..self.task.workers.len() {
            self.send(shard, WorkerMsg::Close).await?;
        }
        tm_info!(data, lines = line_no, "end of input");
        Ok(())
    }

    async fn on_event(&mut self, event: Event) -> RuntimeResult<()> {
        self.task.stats.inc_events();
        let tp = event.tp;
        if let Observed::Conflict { kept } = self.clock.observe(tp, event.ts) {
            tm_warn!(
                data,
                tp,
                ts = event.ts,
                kept,
                "conflicting timestamp for time point, keeping the first"
            );
        }
        let shard = route_event(&event.predicate, &event.args, self.task.workers.len());
        self.send(shard, WorkerMsg::Event(event)).await?;

        if let Some(delay) = self.task.max_delay {
            if let Some(upto) = tp.checked_sub(delay.saturating_add(1)) {
                self.seal(upto, false).await?;
            }
        }
        Ok(())
    }

    async fn seal(&mut self, upto: TimePoint, explicit: bool) -> RuntimeResult<()> {
        let Some(sealed) = self.clock.seal(upto) else {
            if explicit {
                self.task.stats.inc_duplicate_watermarks();
                tm_debug!(data, watermark = upto, "watermark does not advance, ignored");
            }
            return Ok(());
        };
        for c in &sealed.clamps {
            self.task.stats.inc_clamped_timestamps();
            tm_warn!(
                data,
                tp = c.tp,
                ts = c.from,
                clamped = c.to,
                "timestamp decreases, clamped to previous"
            );
        }
        self.task.stats.inc_watermarks();
        self.task.stats.add_sealed_points(sealed.stamps.len() as u64);

        let stamps = Arc::new(sealed.stamps);
        for shard in 0..self.task.workers.len() {
            let msg = WorkerMsg::Seal {
                upto: sealed.upto,
                stamps: Arc::clone(&stamps),
            };
            self.send(shard, msg).await?;
        }
        Ok(())
    }

    async fn send(&mut self, shard: usize, msg: WorkerMsg) -> RuntimeResult<()> {
        let tx = &self.task.workers[shard];
        tokio::select! {
            _ = self.task.abort.cancelled() => Err(StructError::from(RuntimeReason::Aborted)),
            sent = tx.send(msg) => sent.map_err(|_| {
                StructError::from(RuntimeReason::Shutdown)
                    .with_detail(format!("worker {shard} stopped accepting input"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(log: &str, workers: usize) -> (IngestTask, Vec<mpsc::Receiver<WorkerMsg>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..workers).map(|_| mpsc::channel(64)).unzip();
        let task = IngestTask {
            reader: Box::new(tokio::io::BufReader::new(std::io::Cursor::new(
                log.as_bytes().to_vec(),
            ))),
            workers: senders,
            max_delay: None,
            stats: Arc::new(RunStats::new()),
            cancel: CancellationToken::new(),
            abort: CancellationToken::new(),
        };
        (task, receivers)
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn ingest_future_can_be_spawned() {
        let (task, _rx) = task("", 1);
        let fut = run_ingest(task);
        assert_send(&fut);
    }

    #[tokio::test]
    async fn every_worker_sees_final_seal_then_close() {
        let (task, mut receivers) = task("A(1), tp=0, ts=0\nB(2), tp=1, ts=2\n", 2);
        run_ingest(task).await.unwrap();
        for rx in &mut receivers {
            let mut tail = Vec::new();
            while let Some(msg) = rx.recv().await {
                if !matches!(msg, WorkerMsg::Event(_)) {
                    tail.push(msg);
                }
            }
            assert!(matches!(
                tail.as_slice(),
                [WorkerMsg::Seal { upto: 1, stamps }, WorkerMsg::Close] if stamps.len() == 2
            ));
        }
    }

    #[test]
    fn first_timestamp_wins() {
        let mut clock = TimeClock::default();
        assert_eq!(clock.observe(1, 10), Observed::Fresh);
        assert_eq!(clock.observe(1, 10), Observed::Known);
        assert_eq!(clock.observe(1, 12), Observed::Conflict { kept: 10 });
        let sealed = clock.seal(1).unwrap();
        assert_eq!(sealed.stamps, vec![Stamp::new(1, 10)]);
    }

    #[test]
    fn sealed_time_points_are_late() {
        let mut clock = TimeClock::default();
        clock.observe(3, 3);
        clock.seal(3);
        assert_eq!(clock.observe(2, 2), Observed::Late);
        assert_eq!(clock.observe(3, 3), Observed::Late);
        assert_eq!(clock.observe(4, 4), Observed::Fresh);
    }

    #[test]
    fn duplicate_seal_is_ignored() {
        let mut clock = TimeClock::default();
        clock.observe(0, 0);
        assert!(clock.seal(2).is_some());
        assert!(clock.seal(2).is_none());
        assert!(clock.seal(1).is_none());
        let empty = clock.seal(5).unwrap();
        assert!(empty.stamps.is_empty());
    }

    #[test]
    fn decreasing_timestamps_are_clamped() {
        let mut clock = TimeClock::default();
        clock.observe(0, 10);
        clock.observe(2, 7);
        clock.observe(1, 12);
        let sealed = clock.seal(2).unwrap();
        assert_eq!(
            sealed.stamps,
            vec![Stamp::new(0, 10), Stamp::new(1, 12), Stamp::new(2, 12)]
        );
        assert_eq!(
            sealed.clamps,
            vec![Clamp {
                tp: 2,
                from: 7,
                to: 12
            }]
        );
        // the clamp floor carries over to later seals
        clock.observe(3, 11);
        assert_eq!(clock.seal(3).unwrap().stamps, vec![Stamp::new(3, 12)]);
    }

    #[test]
    fn latest_tracks_unsealed_points() {
        let mut clock = TimeClock::default();
        assert_eq!(clock.latest(), None);
        clock.observe(4, 4);
        clock.observe(9, 9);
        assert_eq!(clock.latest(), Some(9));
        clock.seal(9);
        assert_eq!(clock.latest(), None);
    }
}
