//! Incremental relational-temporal operators.
//!
//! Every operator consumes, per input port, exactly one finalized batch per
//! sealed time-point in time-point order, and produces exactly one batch per
//! time-point in the same order. Output may lag input (future operators wait
//! for their interval to close) but never depends on data for *when* it is
//! released, so all shards of a partitioned graph release the same
//! time-points at the same step.
//!
//! When the input ends, [`Operator::on_close`] releases whatever is still
//! held, judged over the finite trace seen so far.

mod binary;
mod constant;
mod predicate;
mod project;
mod since;
mod temporal;

use tm_lang::plan::{NodeKind, PlanNode};

use crate::event::{Stamp, TpBatch};

pub use binary::{AntiJoin, Join, Union};
pub use constant::ConstRows;
pub use predicate::PredicateScan;
pub use project::{Equate, Project};
pub use since::{Since, Until};
pub use temporal::{Eventually, Next, Once, Prev};

pub trait Operator: Send {
    /// Accept the finalized input batch of one time-point on `port`.
    fn on_event(&mut self, port: usize, batch: TpBatch);

    /// `stamp` has been sealed; return every batch that is now final, in
    /// time-point order.
    fn on_watermark(&mut self, stamp: Stamp) -> Vec<TpBatch>;

    /// The input has ended: return every batch still held, in time-point
    /// order. No later time-point exists, so open future intervals are
    /// judged on what was seen.
    fn on_close(&mut self) -> Vec<TpBatch>;

    /// Buffered batches plus buffered rows.
    fn state_size(&self) -> usize;
}

/// Instantiate the operator for one plan node. Constant leaves emit their
/// rows only on the `primary` shard.
pub fn build_operator(node: &PlanNode, primary: bool) -> Box<dyn Operator> {
    match &node.kind {
        NodeKind::Predicate { pattern, .. } => {
            Box::new(PredicateScan::new(pattern.clone(), node.columns.len()))
        }
        NodeKind::Const { rows } => {
            Box::new(ConstRows::new(if primary { rows.clone() } else { Vec::new() }))
        }
        NodeKind::Join {
            left_key,
            right_key,
            right_extra,
        } => Box::new(Join::new(
            left_key.clone(),
            right_key.clone(),
            right_extra.clone(),
        )),
        NodeKind::AntiJoin {
            left_key,
            right_key,
        } => Box::new(AntiJoin::new(left_key.clone(), right_key.clone())),
        NodeKind::Union { right_perm } => Box::new(Union::new(right_perm.clone())),
        NodeKind::Project { keep } => Box::new(Project::new(keep.clone())),
        NodeKind::Filter { left, right, equal } => {
            Box::new(Equate::filter(*left, *right, *equal))
        }
        NodeKind::Extend { source } => Box::new(Equate::extend(*source)),
        NodeKind::Once(interval) => Box::new(Once::new(*interval)),
        NodeKind::Eventually(interval) => Box::new(Eventually::new(*interval)),
        NodeKind::Prev(interval) => Box::new(Prev::new(*interval)),
        NodeKind::Next(interval) => Box::new(Next::new(*interval)),
        NodeKind::Since {
            interval,
            negated,
            left_key,
            right_key,
        } => Box::new(Since::new(
            *interval,
            *negated,
            left_key.clone(),
            right_key.clone(),
        )),
        NodeKind::Until {
            interval,
            negated,
            left_key,
            right_key,
        } => Box::new(Until::new(
            *interval,
            *negated,
            left_key.clone(),
            right_key.clone(),
        )),
    }
}

fn batch_weight<'a>(batches: impl IntoIterator<Item = &'a TpBatch>) -> usize {
    batches.into_iter().map(|b| 1 + b.rows.len()).sum()
}
