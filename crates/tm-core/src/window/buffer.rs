use std::collections::{BTreeMap, HashMap};

use crate::event::{Event, Stamp, TimePoint, Timestamp, Tuple};

// ---------------------------------------------------------------------------
// AdmitOutcome
// ---------------------------------------------------------------------------

/// Result of a watermark-aware admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    DroppedLate(LateDropWarning),
}

/// An event arrived for a time-point that was already sealed. It is dropped
/// and counted; finalized results are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("late event {predicate}@{tp} dropped (sealed up to {sealed_upto})")]
pub struct LateDropWarning {
    pub predicate: String,
    pub tp: TimePoint,
    pub sealed_upto: TimePoint,
}

// ---------------------------------------------------------------------------
// SealedPoint
// ---------------------------------------------------------------------------

/// Facts of one sealed time-point, grouped by predicate name.
pub type Facts = HashMap<String, Vec<Tuple>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SealedPoint {
    pub stamp: Stamp,
    pub facts: Facts,
}

struct PendingPoint {
    ts: Timestamp,
    facts: Facts,
    tuples: usize,
}

// ---------------------------------------------------------------------------
// WindowBuffer
// ---------------------------------------------------------------------------

/// Holds out-of-order events per time-point until a watermark seals them.
///
/// A sealed time-point is never reopened: later events for it are dropped
/// and counted as late.
#[derive(Default)]
pub struct WindowBuffer {
    pending: BTreeMap<TimePoint, PendingPoint>,
    sealed_upto: Option<TimePoint>,
    late_drops: u64,
    buffered_tuples: usize,
}

impl WindowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an event. Accepted at any time-point not yet sealed, including
    /// ones below the largest time-point seen so far.
    pub fn admit(&mut self, event: Event) -> AdmitOutcome {
        if let Some(sealed) = self.sealed_upto {
            if event.tp <= sealed {
                self.late_drops += 1;
                return AdmitOutcome::DroppedLate(LateDropWarning {
                    predicate: event.predicate,
                    tp: event.tp,
                    sealed_upto: sealed,
                });
            }
        }
        let point = self.pending.entry(event.tp).or_insert_with(|| PendingPoint {
            ts: event.ts,
            facts: Facts::new(),
            tuples: 0,
        });
        point
            .facts
            .entry(event.predicate)
            .or_default()
            .push(event.args);
        point.tuples += 1;
        self.buffered_tuples += 1;
        AdmitOutcome::Admitted
    }

    /// Announce a time-point with its authoritative timestamp, whether or not
    /// this buffer holds events for it. Ignored once the time-point is sealed.
    pub fn register(&mut self, stamp: Stamp) {
        if self.sealed_upto.is_some_and(|sealed| stamp.tp <= sealed) {
            return;
        }
        self.pending
            .entry(stamp.tp)
            .and_modify(|p| p.ts = stamp.ts)
            .or_insert_with(|| PendingPoint {
                ts: stamp.ts,
                facts: Facts::new(),
                tuples: 0,
            });
    }

    /// Seal every buffered time-point `<= watermark`, returning them in
    /// strictly increasing time-point order and releasing their storage.
    ///
    /// A watermark at or below the current one seals nothing.
    pub fn advance(&mut self, watermark: TimePoint) -> Vec<SealedPoint> {
        if self.sealed_upto.is_some_and(|sealed| watermark <= sealed) {
            return Vec::new();
        }
        self.sealed_upto = Some(watermark);

        let rest = match watermark.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        let sealed = std::mem::replace(&mut self.pending, rest);
        sealed
            .into_iter()
            .map(|(tp, point)| {
                self.buffered_tuples -= point.tuples;
                SealedPoint {
                    stamp: Stamp::new(tp, point.ts),
                    facts: point.facts,
                }
            })
            .collect()
    }

    pub fn sealed_upto(&self) -> Option<TimePoint> {
        self.sealed_upto
    }

    pub fn late_drops(&self) -> u64 {
        self.late_drops
    }

    pub fn buffered_points(&self) -> usize {
        self.pending.len()
    }

    pub fn buffered_tuples(&self) -> usize {
        self.buffered_tuples
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
