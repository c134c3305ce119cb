use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by the ingest, worker and emitter tasks of one run.
///
/// Plain relaxed atomics: each counter has a single logical writer per
/// increment site and is only read for the final report.
#[derive(Debug, Default)]
pub struct RunStats {
    events: AtomicU64,
    malformed: AtomicU64,
    watermarks: AtomicU64,
    duplicate_watermarks: AtomicU64,
    clamped_timestamps: AtomicU64,
    sealed_points: AtomicU64,
    late_drops: AtomicU64,
    closed_at_end: AtomicU64,
    unresolved: AtomicU64,
    verdicts: AtomicU64,
    bindings: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_events(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_watermarks(&self) {
        self.watermarks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_duplicate_watermarks(&self) {
        self.duplicate_watermarks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_clamped_timestamps(&self) {
        self.clamped_timestamps.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_sealed_points(&self, n: u64) {
        self.sealed_points.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_late_drops(&self, n: u64) {
        self.late_drops.fetch_add(n, Ordering::Relaxed);
    }

    /// Every worker steps the same time-points, so only one reports.
    pub(crate) fn add_closed_at_end(&self, n: u64) {
        self.closed_at_end.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn set_unresolved(&self, n: u64) {
        self.unresolved.store(n, Ordering::Relaxed);
    }

    pub(crate) fn add_verdict(&self, bindings: usize) {
        self.verdicts.fetch_add(1, Ordering::Relaxed);
        self.bindings.fetch_add(bindings as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunReport {
        RunReport {
            events: self.events.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            watermarks: self.watermarks.load(Ordering::Relaxed),
            duplicate_watermarks: self.duplicate_watermarks.load(Ordering::Relaxed),
            clamped_timestamps: self.clamped_timestamps.load(Ordering::Relaxed),
            sealed_points: self.sealed_points.load(Ordering::Relaxed),
            late_drops: self.late_drops.load(Ordering::Relaxed),
            closed_at_end: self.closed_at_end.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            verdicts: self.verdicts.load(Ordering::Relaxed),
            bindings: self.bindings.load(Ordering::Relaxed),
        }
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Event records read (including ones later dropped as late).
    pub events: u64,
    /// Lines skipped as malformed.
    pub malformed: u64,
    /// Watermarks that advanced the sealed frontier, implicit ones included.
    pub watermarks: u64,
    /// Watermarks at or below the current frontier.
    pub duplicate_watermarks: u64,
    /// Time-points whose timestamp was raised to keep timestamps monotone.
    pub clamped_timestamps: u64,
    pub sealed_points: u64,
    pub late_drops: u64,
    /// Time-points whose verdict was decided only when the input ended,
    /// their future intervals cut short by the end of the trace.
    pub closed_at_end: u64,
    /// Sealed time-points never released (the run stopped before closing).
    pub unresolved: u64,
    /// Time-points written to the sink.
    pub verdicts: u64,
    pub bindings: u64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events={} malformed={} late_drops={} sealed={} closed_at_end={} unresolved={} verdicts={} bindings={}",
            self.events,
            self.malformed,
            self.late_drops,
            self.sealed_points,
            self.closed_at_end,
            self.unresolved,
            self.verdicts,
            self.bindings
        )
    }
}
