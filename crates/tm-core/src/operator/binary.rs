use std::collections::{HashMap, HashSet, VecDeque};

use crate::event::{Stamp, TpBatch, Tuple, Value};

use super::{Operator, batch_weight};

// ---------------------------------------------------------------------------
// SideQueues: time-point alignment of two inputs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(super) struct SideQueues {
    left: VecDeque<TpBatch>,
    right: VecDeque<TpBatch>,
}

impl SideQueues {
    pub(super) fn push(&mut self, port: usize, batch: TpBatch) {
        if port == 0 {
            self.left.push_back(batch);
        } else {
            self.right.push_back(batch);
        }
    }

    /// Pop every time-point both sides have finalized.
    pub(super) fn ready(&mut self) -> Vec<(TpBatch, TpBatch)> {
        let n = self.left.len().min(self.right.len());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            if let (Some(l), Some(r)) = (self.left.pop_front(), self.right.pop_front()) {
                debug_assert_eq!(l.tp, r.tp, "binary operator inputs out of step");
                out.push((l, r));
            }
        }
        out
    }

    pub(super) fn weight(&self) -> usize {
        batch_weight(&self.left) + batch_weight(&self.right)
    }
}

pub(super) fn key_of(row: &Tuple, key: &[usize]) -> Vec<Value> {
    key.iter().map(|i| row[*i].clone()).collect()
}

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// `f AND g`: hash join on the shared variables.
pub struct Join {
    left_key: Vec<usize>,
    right_key: Vec<usize>,
    right_extra: Vec<usize>,
    queues: SideQueues,
}

impl Join {
    pub fn new(left_key: Vec<usize>, right_key: Vec<usize>, right_extra: Vec<usize>) -> Self {
        Self {
            left_key,
            right_key,
            right_extra,
            queues: SideQueues::default(),
        }
    }

    fn join(&self, left: TpBatch, right: TpBatch) -> TpBatch {
        let mut index: HashMap<Vec<Value>, Vec<&Tuple>> = HashMap::new();
        for row in &right.rows {
            index.entry(key_of(row, &self.right_key)).or_default().push(row);
        }
        let mut rows = Vec::new();
        for l in &left.rows {
            let Some(matches) = index.get(&key_of(l, &self.left_key)) else {
                continue;
            };
            for r in matches {
                let mut out = l.clone();
                out.extend(self.right_extra.iter().map(|i| r[*i].clone()));
                rows.push(out);
            }
        }
        TpBatch::new(left.stamp(), rows)
    }

    fn release(&mut self) -> Vec<TpBatch> {
        self.queues
            .ready()
            .into_iter()
            .map(|(l, r)| self.join(l, r))
            .collect()
    }
}

impl Operator for Join {
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
        self.queues.weight()
    }
}

// ---------------------------------------------------------------------------
// AntiJoin
// ---------------------------------------------------------------------------

/// `f AND NOT g`: left rows with no right row on the shared variables.
///
/// A time-point is released only once the negated side has finalized it, so
/// absence is never inferred from input that may still arrive.
pub struct AntiJoin {
    left_key: Vec<usize>,
    right_key: Vec<usize>,
    queues: SideQueues,
}

impl AntiJoin {
    pub fn new(left_key: Vec<usize>, right_key: Vec<usize>) -> Self {
        Self {
            left_key,
            right_key,
            queues: SideQueues::default(),
        }
    }

    fn release(&mut self) -> Vec<TpBatch> {
        let mut out = Vec::new();
        for (left, right) in self.queues.ready() {
            let blocked: HashSet<Vec<Value>> = right
                .rows
                .iter()
                .map(|r| key_of(r, &self.right_key))
                .collect();
            let stamp = left.stamp();
            let rows = left
                .rows
                .into_iter()
                .filter(|l| !blocked.contains(&key_of(l, &self.left_key)))
                .collect();
            out.push(TpBatch::new(stamp, rows));
        }
        out
    }
}

impl Operator for AntiJoin {
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
        self.queues.weight()
    }
}

// ---------------------------------------------------------------------------
// Union
// ---------------------------------------------------------------------------

/// `f OR g` over identical free variables.
pub struct Union {
    right_perm: Vec<usize>,
    queues: SideQueues,
}

impl Union {
    pub fn new(right_perm: Vec<usize>) -> Self {
        Self {
            right_perm,
            queues: SideQueues::default(),
        }
    }

    fn release(&mut self) -> Vec<TpBatch> {
        let mut out = Vec::new();
        for (left, right) in self.queues.ready() {
            let mut seen: HashSet<Tuple> = left.rows.iter().cloned().collect();
            let mut rows = left.rows;
            for r in &right.rows {
                let row = key_of(r, &self.right_perm);
                if seen.insert(row.clone()) {
                    rows.push(row);
                }
            }
            out.push(TpBatch {
                tp: left.tp,
                ts: left.ts,
                rows,
            });
        }
        out
    }
}

impl Operator for Union {
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
        self.queues.weight()
    }
}
