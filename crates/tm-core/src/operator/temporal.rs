use std::collections::{HashSet, VecDeque};

use tm_lang::ast::Interval;

use crate::event::{Stamp, TpBatch, Tuple};

use super::{Operator, batch_weight};

// ---------------------------------------------------------------------------
// Once
// ---------------------------------------------------------------------------

/// `ONCE[lo,hi] f`: rows of `f` seen at some earlier-or-equal time-point
/// whose timestamp lies in `[ts - hi, ts - lo]`.
///
/// Child batches older than `hi` are evicted. With an unbounded `hi`, batches
/// that have entered the window never leave it and are folded into `settled`.
pub struct Once {
    interval: Interval,
    arrivals: VecDeque<TpBatch>,
    window: VecDeque<TpBatch>,
    settled: HashSet<Tuple>,
}

impl Once {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            arrivals: VecDeque::new(),
            window: VecDeque::new(),
            settled: HashSet::new(),
        }
    }

    fn evaluate(&mut self, now: Stamp) -> TpBatch {
        match self.interval.upper {
            Some(hi) => {
                while self
                    .window
                    .front()
                    .is_some_and(|b| now.ts.saturating_sub(b.ts) > hi)
                {
                    self.window.pop_front();
                }
            }
            None => {
                while self
                    .window
                    .front()
                    .is_some_and(|b| now.ts.saturating_sub(b.ts) >= self.interval.lower)
                {
                    if let Some(b) = self.window.pop_front() {
                        self.settled.extend(b.rows);
                    }
                }
            }
        }

        let mut seen: HashSet<&Tuple> = self.settled.iter().collect();
        for b in &self.window {
            if self.interval.contains(now.ts.saturating_sub(b.ts)) {
                seen.extend(b.rows.iter());
            }
        }
        TpBatch::new(now, seen.into_iter().cloned().collect())
    }

    fn release(&mut self) -> Vec<TpBatch> {
        let mut out = Vec::with_capacity(self.arrivals.len());
        while let Some(batch) = self.arrivals.pop_front() {
            let now = batch.stamp();
            self.window.push_back(batch);
            out.push(self.evaluate(now));
        }
        out
    }
}

impl Operator for Once {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        self.arrivals.push_back(batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        self.release()
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        self.release()
    }

    fn state_size(&self) -> usize {
        batch_weight(&self.arrivals) + batch_weight(&self.window) + self.settled.len()
    }
}

// ---------------------------------------------------------------------------
// Eventually
// ---------------------------------------------------------------------------

/// `EVENTUALLY[lo,hi] f`: rows of `f` at some later-or-equal time-point
/// whose timestamp lies in `[ts + lo, ts + hi]`.
///
/// The verdict for a time-point is held until a child batch with a timestamp
/// beyond `ts + hi` has been finalized; only then can no further input fall
/// inside its interval. At end of input the remaining time-points are judged
/// on the batches seen.
pub struct Eventually {
    interval: Interval,
    hi: u64,
    window: VecDeque<TpBatch>,
}

impl Eventually {
    /// `interval` must be bounded; the plan compiler rejects unbounded ones.
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            hi: interval.upper.unwrap_or(u64::MAX),
            window: VecDeque::new(),
        }
    }

    /// Time-points whose verdict is still open.
    pub fn pending(&self) -> usize {
        self.window.len()
    }

    fn release_front(&mut self) -> Option<TpBatch> {
        let now = self.window.front()?.stamp();
        let mut seen: HashSet<&Tuple> = HashSet::new();
        for b in &self.window {
            let distance = b.ts.saturating_sub(now.ts);
            if distance > self.hi {
                break;
            }
            if self.interval.contains(distance) {
                seen.extend(b.rows.iter());
            }
        }
        let rows = seen.into_iter().cloned().collect();
        self.window.pop_front();
        Some(TpBatch::new(now, rows))
    }
}

impl Operator for Eventually {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        self.window.push_back(batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        let mut out = Vec::new();
        while let (Some(front), Some(back)) = (self.window.front(), self.window.back()) {
            if back.ts <= front.ts.saturating_add(self.hi) {
                break;
            }
            out.extend(self.release_front());
        }
        out
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        let mut out = Vec::with_capacity(self.window.len());
        while let Some(batch) = self.release_front() {
            out.push(batch);
        }
        out
    }

    fn state_size(&self) -> usize {
        batch_weight(&self.window)
    }
}

// ---------------------------------------------------------------------------
// Prev / Next
// ---------------------------------------------------------------------------

/// `PREVIOUS[lo,hi] f`: rows of `f` at the preceding time-point, when the
/// timestamp gap lies in the interval. Nothing holds at the first one.
pub struct Prev {
    interval: Interval,
    arrivals: VecDeque<TpBatch>,
    last: Option<TpBatch>,
}

impl Prev {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            arrivals: VecDeque::new(),
            last: None,
        }
    }

    fn release(&mut self) -> Vec<TpBatch> {
        let mut out = Vec::with_capacity(self.arrivals.len());
        while let Some(batch) = self.arrivals.pop_front() {
            let now = batch.stamp();
            let rows = match self.last.take() {
                Some(prev) if self.interval.contains(now.ts.saturating_sub(prev.ts)) => prev.rows,
                _ => Vec::new(),
            };
            out.push(TpBatch::new(now, rows));
            self.last = Some(batch);
        }
        out
    }
}

impl Operator for Prev {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        self.arrivals.push_back(batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        self.release()
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        self.release()
    }

    fn state_size(&self) -> usize {
        batch_weight(&self.arrivals) + batch_weight(&self.last)
    }
}

/// `NEXT[lo,hi] f`: rows of `f` at the following time-point, when the
/// timestamp gap lies in the interval. A time-point is released once its
/// successor has been finalized; the last one of the trace has none.
pub struct Next {
    interval: Interval,
    held: Option<Stamp>,
    ready: Vec<TpBatch>,
}

impl Next {
    pub fn new(interval: Interval) -> Self {
        Self {
            interval,
            held: None,
            ready: Vec::new(),
        }
    }
}

impl Operator for Next {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        let now = batch.stamp();
        if let Some(prev) = self.held.replace(now) {
            let rows = if self.interval.contains(now.ts.saturating_sub(prev.ts)) {
                batch.rows
            } else {
                Vec::new()
            };
            self.ready.push(TpBatch::new(prev, rows));
        }
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        std::mem::take(&mut self.ready)
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        let mut out = std::mem::take(&mut self.ready);
        out.extend(self.held.take().map(TpBatch::empty));
        out
    }

    fn state_size(&self) -> usize {
        usize::from(self.held.is_some()) + batch_weight(&self.ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;

    fn batch(tp: u64, ts: u64, vals: &[i64]) -> TpBatch {
        TpBatch::new(
            Stamp::new(tp, ts),
            vals.iter().map(|v| vec![Value::Int(*v)]).collect(),
        )
    }

    fn sorted(mut b: TpBatch) -> Vec<i64> {
        b.rows.sort();
        b.rows
            .into_iter()
            .map(|r| match r[0] {
                Value::Int(v) => v,
                _ => unreachable!(),
            })
            .collect()
    }

    /// Feed one child batch per time-point and collect everything released.
    fn drive(op: &mut dyn Operator, input: Vec<TpBatch>) -> Vec<TpBatch> {
        let mut out = Vec::new();
        for b in input {
            let stamp = b.stamp();
            op.on_event(0, b);
            out.extend(op.on_watermark(stamp));
        }
        out
    }

    #[test]
    fn once_sees_rows_within_interval() {
        let mut once = Once::new(Interval::bounded(0, 5));
        let out = drive(
            &mut once,
            vec![batch(0, 0, &[1]), batch(1, 3, &[2]), batch(2, 7, &[]), batch(3, 20, &[])],
        );
        assert_eq!(out.len(), 4);
        assert_eq!(sorted(out[0].clone()), vec![1]);
        assert_eq!(sorted(out[1].clone()), vec![1, 2]);
        // ts 7: tp0 at distance 7 is out, tp1 at distance 4 is in
        assert_eq!(sorted(out[2].clone()), vec![2]);
        assert!(out[3].rows.is_empty());
    }

    #[test]
    fn once_lower_bound_excludes_recent_rows() {
        let mut once = Once::new(Interval::bounded(2, 4));
        let out = drive(&mut once, vec![batch(0, 0, &[1]), batch(1, 1, &[2]), batch(2, 3, &[])]);
        assert!(out[0].rows.is_empty());
        assert!(out[1].rows.is_empty());
        assert_eq!(sorted(out[2].clone()), vec![1, 2]);
    }

    #[test]
    fn once_evicts_expired_batches() {
        let mut once = Once::new(Interval::bounded(0, 2));
        drive(&mut once, (0..10).map(|i| batch(i, i, &[i as i64])).collect());
        // only ts 7..=9 can still be within 2 of a future timestamp
        assert!(once.state_size() <= 6, "state {}", once.state_size());
    }

    #[test]
    fn once_unbounded_settles_history() {
        let mut once = Once::new(Interval::unbounded(1));
        let out = drive(
            &mut once,
            vec![batch(0, 0, &[1]), batch(1, 0, &[2]), batch(2, 1, &[]), batch(3, 9, &[])],
        );
        assert!(out[0].rows.is_empty());
        assert!(out[1].rows.is_empty());
        assert_eq!(sorted(out[2].clone()), vec![1, 2]);
        assert_eq!(sorted(out[3].clone()), vec![1, 2]);
        assert_eq!(once.settled.len(), 2);
    }

    #[test]
    fn eventually_waits_for_interval_to_close() {
        let mut ev = Eventually::new(Interval::bounded(0, 5));
        let out = drive(&mut ev, vec![batch(0, 0, &[]), batch(1, 3, &[7]), batch(2, 5, &[])]);
        // ts 5 is still inside [0, 0+5]
        assert!(out.is_empty());
        assert_eq!(ev.pending(), 3);

        let out = drive(&mut ev, vec![batch(3, 6, &[])]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tp, 0);
        assert_eq!(sorted(out[0].clone()), vec![7]);
    }

    #[test]
    fn eventually_releases_several_points_at_once() {
        let mut ev = Eventually::new(Interval::bounded(1, 2));
        let mut out = drive(&mut ev, vec![batch(0, 0, &[1]), batch(1, 1, &[2]), batch(2, 1, &[3])]);
        assert!(out.is_empty());
        out = drive(&mut ev, vec![batch(3, 10, &[])]);
        assert_eq!(out.iter().map(|b| b.tp).collect::<Vec<_>>(), vec![0, 1, 2]);
        // tp0: rows at distance 1 (tp1, tp2); tp1 and tp2 see nothing in [2, 3]
        assert_eq!(sorted(out[0].clone()), vec![2, 3]);
        assert!(out[1].rows.is_empty());
        assert!(out[2].rows.is_empty());
        assert_eq!(ev.pending(), 1);
    }

    #[test]
    fn eventually_judges_open_points_at_close() {
        let mut ev = Eventually::new(Interval::bounded(0, 7));
        let out = drive(&mut ev, vec![batch(0, 0, &[1]), batch(1, 2, &[])]);
        assert!(out.is_empty());

        let out = ev.on_close();
        assert_eq!(out.iter().map(|b| b.tp).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(sorted(out[0].clone()), vec![1]);
        assert!(out[1].rows.is_empty());
        assert_eq!(ev.pending(), 0);
        assert!(ev.on_close().is_empty());
    }

    #[test]
    fn previous_looks_one_point_back() {
        let mut prev = Prev::new(Interval::bounded(1, 3));
        let out = drive(
            &mut prev,
            vec![batch(0, 0, &[1]), batch(1, 2, &[2]), batch(2, 9, &[3])],
        );
        assert!(out[0].rows.is_empty());
        assert_eq!(sorted(out[1].clone()), vec![1]);
        // gap of 7 is outside [1,3]
        assert!(out[2].rows.is_empty());
        assert_eq!(prev.state_size(), 2);
    }

    #[test]
    fn next_waits_for_the_successor() {
        let mut next = Next::new(Interval::bounded(0, 3));
        let out = drive(&mut next, vec![batch(0, 0, &[])]);
        assert!(out.is_empty());
        let out = drive(&mut next, vec![batch(1, 2, &[5]), batch(2, 9, &[6])]);
        assert_eq!(out.iter().map(|b| b.tp).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(sorted(out[0].clone()), vec![5]);
        assert!(out[1].rows.is_empty());

        let out = next.on_close();
        assert_eq!(out, vec![TpBatch::empty(Stamp::new(2, 9))]);
    }
}
