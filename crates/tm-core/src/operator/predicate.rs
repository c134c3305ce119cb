use tm_lang::plan::ArgPattern;

use crate::event::{Stamp, TpBatch, Tuple};

use super::Operator;

/// Leaf operator: matches raw event arguments against the predicate's
/// argument pattern and projects them onto its variables.
pub struct PredicateScan {
    pattern: Vec<ArgPattern>,
    width: usize,
    pending: Option<TpBatch>,
}

impl PredicateScan {
    pub fn new(pattern: Vec<ArgPattern>, width: usize) -> Self {
        Self {
            pattern,
            width,
            pending: None,
        }
    }

    fn bind(&self, args: &Tuple) -> Option<Tuple> {
        if args.len() != self.pattern.len() {
            return None;
        }
        let mut row = Vec::with_capacity(self.width);
        for (pat, arg) in self.pattern.iter().zip(args) {
            match pat {
                ArgPattern::Bind(_) => row.push(arg.clone()),
                ArgPattern::Same(col) => {
                    if row[*col] != *arg {
                        return None;
                    }
                }
                ArgPattern::Const(c) => {
                    if c != arg {
                        return None;
                    }
                }
            }
        }
        Some(row)
    }
}

impl Operator for PredicateScan {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        let rows: Vec<Tuple> = batch.rows.iter().filter_map(|a| self.bind(a)).collect();
        match self.pending.as_mut() {
            Some(p) if p.tp == batch.tp => p.rows.extend(rows),
            _ => self.pending = Some(TpBatch::new(batch.stamp(), rows)),
        }
    }

    fn on_watermark(&mut self, stamp: Stamp) -> Vec<TpBatch> {
        match self.pending.take() {
            Some(batch) if batch.tp == stamp.tp => vec![batch],
            Some(stale) => {
                log::warn!(
                    "predicate scan discarded rows for tp {} while sealing tp {}",
                    stale.tp,
                    stamp.tp
                );
                vec![TpBatch::empty(stamp)]
            }
            None => vec![TpBatch::empty(stamp)],
        }
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        Vec::new()
    }

    fn state_size(&self) -> usize {
        self.pending.as_ref().map_or(0, |b| 1 + b.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;

    fn int_row(vals: &[i64]) -> Tuple {
        vals.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn constants_and_repeated_variables_filter_rows() {
        // P(x, 3, x, y)
        let mut scan = PredicateScan::new(
            vec![
                ArgPattern::Bind(0),
                ArgPattern::Const(Value::Int(3)),
                ArgPattern::Same(0),
                ArgPattern::Bind(1),
            ],
            2,
        );
        let stamp = Stamp::new(1, 10);
        scan.on_event(
            0,
            TpBatch::new(
                stamp,
                vec![
                    int_row(&[1, 3, 1, 9]),
                    int_row(&[1, 4, 1, 9]),
                    int_row(&[1, 3, 2, 9]),
                    int_row(&[5, 3, 5]),
                ],
            ),
        );
        let out = scan.on_watermark(stamp);
        assert_eq!(out, vec![TpBatch::new(stamp, vec![int_row(&[1, 9])])]);
        assert_eq!(scan.state_size(), 0);
    }

    #[test]
    fn seal_without_input_yields_empty_batch() {
        let mut scan = PredicateScan::new(vec![ArgPattern::Bind(0)], 1);
        let out = scan.on_watermark(Stamp::new(4, 4));
        assert_eq!(out, vec![TpBatch::empty(Stamp::new(4, 4))]);
    }
}
