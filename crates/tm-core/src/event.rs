pub use tm_lang::ast::Value;

pub type TimePoint = u64;
pub type Timestamp = u64;

/// One row of bindings, laid out by the producing node's columns.
pub type Tuple = Vec<Value>;

/// A predicate occurrence read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub predicate: String,
    pub args: Tuple,
    pub tp: TimePoint,
    pub ts: Timestamp,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Event(Event),
    /// No future event carries a time-point at or below this one.
    Watermark(TimePoint),
}

/// A sealed time-point with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stamp {
    pub tp: TimePoint,
    pub ts: Timestamp,
}

impl Stamp {
    pub fn new(tp: TimePoint, ts: Timestamp) -> Self {
        Self { tp, ts }
    }
}

/// Finalized rows of one operator at one time-point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpBatch {
    pub tp: TimePoint,
    pub ts: Timestamp,
    pub rows: Vec<Tuple>,
}

impl TpBatch {
    pub fn new(stamp: Stamp, rows: Vec<Tuple>) -> Self {
        Self {
            tp: stamp.tp,
            ts: stamp.ts,
            rows,
        }
    }

    pub fn empty(stamp: Stamp) -> Self {
        Self::new(stamp, Vec::new())
    }

    pub fn stamp(&self) -> Stamp {
        Stamp::new(self.tp, self.ts)
    }
}

/// Satisfying bindings of the whole formula at one time-point, sorted and
/// free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub tp: TimePoint,
    pub ts: Timestamp,
    pub columns: Vec<String>,
    pub rows: Vec<Tuple>,
}

impl Verdict {
    pub fn new(stamp: Stamp, columns: Vec<String>, mut rows: Vec<Tuple>) -> Self {
        rows.sort();
        rows.dedup();
        Self {
            tp: stamp.tp,
            ts: stamp.ts,
            columns,
            rows,
        }
    }
}
