use std::collections::{HashMap, HashSet, VecDeque};

use tm_lang::ast::Interval;

use crate::event::{Stamp, Timestamp, TpBatch, Tuple, Value};

use super::Operator;
use super::binary::{SideQueues, key_of};

// ---------------------------------------------------------------------------
// Since
// ---------------------------------------------------------------------------

/// `f SINCE[lo,hi] g`: rows of `g` that held at some time-point `j` with
/// `ts - ts_j` in the interval, and whose `f` key held at every time-point
/// after `j` up to now (or, negated, at none of them).
///
/// Each candidate row keeps the timestamps at which it started to hold.
/// Starts older than `hi` are dropped; with an unbounded `hi` only the
/// earliest start past `lo` is kept.
pub struct Since {
    interval: Interval,
    negated: bool,
    left_key: Vec<usize>,
    right_key: Vec<usize>,
    queues: SideQueues,
    starts: HashMap<Tuple, VecDeque<Timestamp>>,
}

impl Since {
    pub fn new(
        interval: Interval,
        negated: bool,
        left_key: Vec<usize>,
        right_key: Vec<usize>,
    ) -> Self {
        Self {
            interval,
            negated,
            left_key,
            right_key,
            queues: SideQueues::default(),
            starts: HashMap::new(),
        }
    }

    fn step(&mut self, left: TpBatch, right: TpBatch) -> TpBatch {
        let now = right.stamp();
        let guard: HashSet<Vec<Value>> = left
            .rows
            .iter()
            .map(|r| key_of(r, &self.left_key))
            .collect();
        let (right_key, negated) = (&self.right_key, self.negated);
        self.starts
            .retain(|row, _| guard.contains(&key_of(row, right_key)) != negated);

        for row in right.rows {
            let starts = self.starts.entry(row).or_default();
            if starts.back() != Some(&now.ts) {
                starts.push_back(now.ts);
            }
        }

        let interval = self.interval;
        let mut rows = Vec::new();
        self.starts.retain(|row, starts| {
            match interval.upper {
                Some(hi) => {
                    while starts.front().is_some_and(|t| now.ts.saturating_sub(*t) > hi) {
                        starts.pop_front();
                    }
                }
                None => {
                    while starts.len() > 1 && now.ts.saturating_sub(starts[1]) >= interval.lower {
                        starts.remove(1);
                    }
                }
            }
            if starts
                .iter()
                .any(|t| interval.contains(now.ts.saturating_sub(*t)))
            {
                rows.push(row.clone());
            }
            !starts.is_empty()
        });
        TpBatch::new(now, rows)
    }

    fn release(&mut self) -> Vec<TpBatch> {
        let ready = self.queues.ready();
        ready.into_iter().map(|(l, r)| self.step(l, r)).collect()
    }
}

impl Operator for Since {
    fn on_event(&mut self, port: usize, batch: TpBatch) {
        self.queues.push(port, batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        self.release()
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        self.release()
    }

    fn state_size(&self) -> usize {
        self.queues.weight() + self.starts.values().map(|s| 1 + s.len()).sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Until
// ---------------------------------------------------------------------------

/// One time-point of both inputs: the `f` keys and the `g` rows.
struct Aligned {
    stamp: Stamp,
    guard: HashSet<Vec<Value>>,
    rows: Vec<Tuple>,
}

/// `f UNTIL[lo,hi] g`: rows of `g` that hold at some later-or-equal
/// time-point `j` with `ts_j - ts` in the interval, and whose `f` key holds
/// at every time-point from now up to `j` (or, negated, at none of them).
///
/// Like [`super::Eventually`], a time-point is released once an input beyond
/// `ts + hi` has been finalized, or when the input ends.
pub struct Until {
    interval: Interval,
    hi: u64,
    negated: bool,
    left_key: Vec<usize>,
    right_key: Vec<usize>,
    queues: SideQueues,
    window: VecDeque<Aligned>,
}

impl Until {
    /// `interval` must be bounded; the plan compiler rejects unbounded ones.
    pub fn new(
        interval: Interval,
        negated: bool,
        left_key: Vec<usize>,
        right_key: Vec<usize>,
    ) -> Self {
        Self {
            interval,
            hi: interval.upper.unwrap_or(u64::MAX),
            negated,
            left_key,
            right_key,
            queues: SideQueues::default(),
            window: VecDeque::new(),
        }
    }

    fn align(&mut self) {
        for (left, right) in self.queues.ready() {
            let guard = left
                .rows
                .iter()
                .map(|r| key_of(r, &self.left_key))
                .collect();
            self.window.push_back(Aligned {
                stamp: right.stamp(),
                guard,
                rows: right.rows,
            });
        }
    }

    fn release_front(&mut self) -> Option<TpBatch> {
        let now = self.window.front()?.stamp;
        let mut seen: HashSet<&Tuple> = HashSet::new();
        // keys whose guard held on every point so far, or (negated) failed on one
        let mut held: Option<HashSet<&Vec<Value>>> = None;
        let mut blocked: HashSet<&Vec<Value>> = HashSet::new();
        for point in &self.window {
            let distance = point.stamp.ts.saturating_sub(now.ts);
            if distance > self.hi {
                break;
            }
            if self.interval.contains(distance) {
                for row in &point.rows {
                    let key = key_of(row, &self.right_key);
                    let allowed = if self.negated {
                        !blocked.contains(&key)
                    } else {
                        held.as_ref().is_none_or(|h| h.contains(&key))
                    };
                    if allowed {
                        seen.insert(row);
                    }
                }
            }
            if self.negated {
                blocked.extend(point.guard.iter());
            } else {
                let next: HashSet<&Vec<Value>> = match held {
                    None => point.guard.iter().collect(),
                    Some(h) => h.into_iter().filter(|k| point.guard.contains(*k)).collect(),
                };
                let exhausted = next.is_empty();
                held = Some(next);
                if exhausted {
                    break;
                }
            }
        }
        let rows = seen.into_iter().cloned().collect();
        self.window.pop_front();
        Some(TpBatch::new(now, rows))
    }
}

impl Operator for Until {
    fn on_event(&mut self, port: usize, batch: TpBatch) {
        self.queues.push(port, batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        self.align();
        let mut out = Vec::new();
        while let (Some(front), Some(back)) = (self.window.front(), self.window.back()) {
            if back.stamp.ts <= front.stamp.ts.saturating_add(self.hi) {
                break;
            }
            out.extend(self.release_front());
        }
        out
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        self.align();
        let mut out = Vec::with_capacity(self.window.len());
        while let Some(batch) = self.release_front() {
            out.push(batch);
        }
        out
    }

    fn state_size(&self) -> usize {
        self.queues.weight()
            + self
                .window
                .iter()
                .map(|p| 1 + p.guard.len() + p.rows.len())
                .sum::<usize>()
    }
}
