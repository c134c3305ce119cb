//! Operator graph instantiated from a compiled plan.
//!
//! Evaluation of one sealed time-point is a [`Step`]: nodes run in plan
//! order, and every non-root node's output is handed back to the caller as an
//! [`Outbound`] to be hash-partitioned across shards. The caller delivers the
//! merged partition for this shard before polling again. A single shard
//! simply delivers the output back unchanged ([`OperatorGraph::step_local`]).
//!
//! Once the input has ended, [`OperatorGraph::begin_close`] runs one last
//! step that releases every held time-point through the same exchange.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use orion_error::prelude::*;
use tm_lang::plan::{NodeId, NodeKind, Plan};

use crate::error::{CoreReason, CoreResult};
use crate::event::{Stamp, TpBatch, Value};
use crate::operator::{Operator, build_operator};
use crate::window::{Facts, SealedPoint};


// ---------------------------------------------------------------------------
// OperatorGraph
// ---------------------------------------------------------------------------

pub struct OperatorGraph {
    plan: Arc<Plan>,
    operators: Vec<Box<dyn Operator>>,
    stepped: u64,
    released: u64,
}

impl OperatorGraph {
    /// Graph of the only (or primary) shard.
    pub fn new(plan: Arc<Plan>) -> Self {
        Self::for_shard(plan, 0)
    }

    /// Graph of shard `shard`. Constant leaves emit on shard 0 only.
    pub fn for_shard(plan: Arc<Plan>, shard: usize) -> Self {
        let operators = plan
            .nodes
            .iter()
            .map(|node| build_operator(node, shard == 0))
            .collect();
        Self {
            plan,
            operators,
            stepped: 0,
            released: 0,
        }
    }

    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    /// Begin evaluating one sealed time-point.
    pub fn begin_step(&mut self, point: SealedPoint) -> Step<'_> {
        self.stepped += 1;
        Step::new(
            self,
            Trigger::Seal {
                stamp: point.stamp,
                facts: point.facts,
            },
        )
    }

    /// Begin the final step after the input has ended.
    pub fn begin_close(&mut self) -> Step<'_> {
        Step::new(self, Trigger::Close)
    }

    /// Evaluate one sealed time-point on an unpartitioned graph.
    pub fn step_local(&mut self, point: SealedPoint) -> Vec<TpBatch> {
        let mut step = self.begin_step(point);
        while let Some(out) = step.poll_outbound() {
            step.deliver(out.node, out.batches);
        }
        step.finish()
    }

    /// Run the final step on an unpartitioned graph.
    pub fn close_local(&mut self) -> Vec<TpBatch> {
        let mut step = self.begin_close();
        while let Some(out) = step.poll_outbound() {
            step.deliver(out.node, out.batches);
        }
        step.finish()
    }

    /// Sum of buffered state over all operators.
    pub fn state_size(&self) -> usize {
        self.operators.iter().map(|op| op.state_size()).sum()
    }

    /// Sealed time-points whose verdict has not been released yet.
    pub fn unresolved(&self) -> u64 {
        self.stepped - self.released
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// Output of one node that must pass through the shuffle exchange.
#[derive(Debug)]
pub struct Outbound {
    pub node: NodeId,
    pub key: Vec<usize>,
    pub batches: Vec<TpBatch>,
}

enum Trigger {
    Seal { stamp: Stamp, facts: Facts },
    Close,
}

pub struct Step<'g> {
    plan: Arc<Plan>,
    graph: &'g mut OperatorGraph,
    trigger: Trigger,
    cursor: usize,
    inbox: HashMap<NodeId, Vec<TpBatch>>,
    awaiting: Option<NodeId>,
    root_out: Vec<TpBatch>,
}

impl<'g> Step<'g> {
    fn new(graph: &'g mut OperatorGraph, trigger: Trigger) -> Self {
        Step {
            plan: Arc::clone(&graph.plan),
            graph,
            trigger,
            cursor: 0,
            inbox: HashMap::new(),
            awaiting: None,
            root_out: Vec::new(),
        }
    }

    /// Sealed time-point this step evaluates; `None` for the final step.
    pub fn stamp(&self) -> Option<Stamp> {
        match self.trigger {
            Trigger::Seal { stamp, .. } => Some(stamp),
            Trigger::Close => None,
        }
    }

    /// Run nodes until one produces output that needs exchanging. Returns
    /// `None` once the root has run.
    pub fn poll_outbound(&mut self) -> Option<Outbound> {
        debug_assert!(self.awaiting.is_none(), "outbound not delivered");
        while self.cursor < self.plan.nodes.len() {
            let node = &self.plan.nodes[self.cursor];
            self.cursor += 1;
            let op = &mut self.graph.operators[node.id];

            for (port, input) in node.inputs.iter().enumerate() {
                for batch in self.inbox.remove(input).unwrap_or_default() {
                    op.on_event(port, batch);
                }
            }
            let out = match &self.trigger {
                Trigger::Seal { stamp, facts } => {
                    if let NodeKind::Predicate { name, .. } = &node.kind {
                        let rows = facts.get(name).cloned().unwrap_or_default();
                        op.on_event(0, TpBatch::new(*stamp, rows));
                    }
                    op.on_watermark(*stamp)
                }
                Trigger::Close => op.on_close(),
            };
            match &node.exchange_key {
                None => self.root_out.extend(out),
                Some(key) => {
                    self.awaiting = Some(node.id);
                    return Some(Outbound {
                        node: node.id,
                        key: key.clone(),
                        batches: out,
                    });
                }
            }
        }
        None
    }

    /// Hand back this shard's share of `node`'s exchanged output.
    pub fn deliver(&mut self, node: NodeId, batches: Vec<TpBatch>) {
        self.awaiting = None;
        self.inbox.insert(node, batches);
    }

    /// Root batches released by this step, in time-point order.
    pub fn finish(self) -> Vec<TpBatch> {
        self.graph.released += self.root_out.len() as u64;
        self.root_out
    }
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

pub fn shard_of(values: &[Value], shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    values.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Shard that ingests a raw event.
pub fn route_event(predicate: &str, args: &[Value], shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    predicate.hash(&mut hasher);
    args.hash(&mut hasher);
    (hasher.finish() % shards as u64) as usize
}

/// Split every batch by the hash of its key columns. Each shard receives a
/// batch for every time-point, possibly empty.
pub fn partition(batches: Vec<TpBatch>, key: &[usize], shards: usize) -> Vec<Vec<TpBatch>> {
    let mut parts: Vec<Vec<TpBatch>> = (0..shards)
        .map(|_| Vec::with_capacity(batches.len()))
        .collect();
    for batch in batches {
        let stamp = batch.stamp();
        let mut split: Vec<TpBatch> = (0..shards).map(|_| TpBatch::empty(stamp)).collect();
        for row in batch.rows {
            let k: Vec<Value> = key.iter().map(|i| row[*i].clone()).collect();
            split[shard_of(&k, shards)].rows.push(row);
        }
        for (part, piece) in parts.iter_mut().zip(split) {
            part.push(piece);
        }
    }
    parts
}

/// Concatenate the pieces received from every shard, time-point by
/// time-point. All shards must have released the same time-points.
pub fn merge(pieces: Vec<Vec<TpBatch>>) -> CoreResult<Vec<TpBatch>> {
    let mut iter = pieces.into_iter();
    let Some(mut merged) = iter.next() else {
        return Ok(Vec::new());
    };
    for piece in iter {
        if piece.len() != merged.len() {
            return Err(StructError::from(CoreReason::Graph).with_detail(format!(
                "shards released {} and {} time-points in the same step",
                merged.len(),
                piece.len()
            )));
        }
        for (acc, part) in merged.iter_mut().zip(piece) {
            if acc.tp != part.tp {
                return Err(StructError::from(CoreReason::Graph).with_detail(format!(
                    "shards out of step: tp {} vs tp {}",
                    acc.tp, part.tp
                )));
            }
            acc.rows.extend(part.rows);
        }
    }
    Ok(merged)
}
