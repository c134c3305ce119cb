use crate::event::{Stamp, TpBatch, Tuple};

use super::Operator;

/// Leaf with the same rows at every time-point.
pub struct ConstRows {
    rows: Vec<Tuple>,
}

impl ConstRows {
    pub fn new(rows: Vec<Tuple>) -> Self {
        Self { rows }
    }
}

impl Operator for ConstRows {
    fn on_event(&mut self, _port: usize, _batch: TpBatch) {}

    fn on_watermark(&mut self, stamp: Stamp) -> Vec<TpBatch> {
        vec![TpBatch::new(stamp, self.rows.clone())]
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        Vec::new()
    }

    fn state_size(&self) -> usize {
        0
    }
}
