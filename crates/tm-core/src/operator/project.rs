use std::collections::HashSet;

use crate::event::{Stamp, TpBatch, Tuple};

use super::{Operator, batch_weight};

/// `EXISTS x. f`: drops the quantified columns and de-duplicates.
pub struct Project {
    keep: Vec<usize>,
    pending: Vec<TpBatch>,
}

impl Project {
    pub fn new(keep: Vec<usize>) -> Self {
        Self {
            keep,
            pending: Vec::new(),
        }
    }
}

impl Operator for Project {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        self.pending.push(batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        self.on_close()
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        let keep = &self.keep;
        self.pending
            .drain(..)
            .map(|batch| {
                let mut seen = HashSet::new();
                let rows: Vec<Tuple> = batch
                    .rows
                    .iter()
                    .map(|r| keep.iter().map(|i| r[*i].clone()).collect::<Tuple>())
                    .filter(|r| seen.insert(r.clone()))
                    .collect();
                TpBatch::new(batch.stamp(), rows)
            })
            .collect()
    }

    fn state_size(&self) -> usize {
        batch_weight(&self.pending)
    }
}

/// Row-wise variable equality: `f AND x = y` keeps or extends rows of `f`.
pub struct Equate {
    mode: EquateMode,
    pending: Vec<TpBatch>,
}

enum EquateMode {
    Filter {
        left: usize,
        right: usize,
        equal: bool,
    },
    Extend(usize),
}

impl Equate {
    /// Keep rows whose two columns compare as `equal` says.
    pub fn filter(left: usize, right: usize, equal: bool) -> Self {
        Self {
            mode: EquateMode::Filter { left, right, equal },
            pending: Vec::new(),
        }
    }

    /// Append a copy of column `source` to every row.
    pub fn extend(source: usize) -> Self {
        Self {
            mode: EquateMode::Extend(source),
            pending: Vec::new(),
        }
    }

    fn apply(&self, mut row: Tuple) -> Option<Tuple> {
        match self.mode {
            EquateMode::Filter { left, right, equal } => {
                ((row[left] == row[right]) == equal).then_some(row)
            }
            EquateMode::Extend(source) => {
                row.push(row[source].clone());
                Some(row)
            }
        }
    }
}

impl Operator for Equate {
    fn on_event(&mut self, _port: usize, batch: TpBatch) {
        self.pending.push(batch);
    }

    fn on_watermark(&mut self, _stamp: Stamp) -> Vec<TpBatch> {
        self.on_close()
    }

    fn on_close(&mut self) -> Vec<TpBatch> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .map(|batch| {
                let stamp = batch.stamp();
                let rows = batch.rows.into_iter().filter_map(|r| self.apply(r)).collect();
                TpBatch::new(stamp, rows)
            })
            .collect()
    }

    fn state_size(&self) -> usize {
        batch_weight(&self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;

    #[test]
    fn projection_deduplicates() {
        let mut project = Project::new(vec![0]);
        let stamp = Stamp::new(1, 1);
        project.on_event(
            0,
            TpBatch::new(
                stamp,
                vec![
                    vec![Value::Int(1), Value::Int(2)],
                    vec![Value::Int(1), Value::Int(3)],
                    vec![Value::Int(4), Value::Int(3)],
                ],
            ),
        );
        let out = project.on_watermark(stamp);
        assert_eq!(
            out,
            vec![TpBatch::new(
                stamp,
                vec![vec![Value::Int(1)], vec![Value::Int(4)]]
            )]
        );
        assert_eq!(project.state_size(), 0);
    }

    #[test]
    fn equate_filters_and_extends_rows() {
        let stamp = Stamp::new(0, 0);
        let rows = vec![
            vec![Value::Int(1), Value::Int(1)],
            vec![Value::Int(1), Value::Int(2)],
        ];

        let mut differ = Equate::filter(0, 1, false);
        differ.on_event(0, TpBatch::new(stamp, rows.clone()));
        assert_eq!(
            differ.on_watermark(stamp),
            vec![TpBatch::new(stamp, vec![rows[1].clone()])]
        );

        let mut copy = Equate::extend(1);
        copy.on_event(0, TpBatch::new(stamp, rows[1..].to_vec()));
        assert_eq!(
            copy.on_watermark(stamp)[0].rows,
            vec![vec![Value::Int(1), Value::Int(2), Value::Int(2)]]
        );
        assert_eq!(copy.state_size(), 0);
    }
}
