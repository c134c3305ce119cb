use crate::ast::{Interval, Value};

// ---------------------------------------------------------------------------
// Plan: compiled operator DAG
// ---------------------------------------------------------------------------

pub type NodeId = usize;

/// Executable form of a formula: nodes in topological order (every input
/// precedes the node that consumes it), the last node being the root.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub nodes: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Variable names laid out by the rows this node produces.
    pub columns: Vec<String>,
    pub inputs: Vec<NodeId>,
    /// Columns the parent partitions this node's output on. `None` for the
    /// root, whose output goes straight to the emitter.
    pub exchange_key: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Predicate {
        name: String,
        pattern: Vec<ArgPattern>,
    },
    /// Fixed rows at every time-point: `TRUE`, `FALSE` and `x = c`.
    Const { rows: Vec<Vec<Value>> },
    /// Natural join; output is the left row followed by `right_extra` columns.
    Join {
        left_key: Vec<usize>,
        right_key: Vec<usize>,
        right_extra: Vec<usize>,
    },
    /// Left rows whose key has no match on the right (`f AND NOT g`).
    AntiJoin {
        left_key: Vec<usize>,
        right_key: Vec<usize>,
    },
    /// Union; right rows are reordered into the left layout by `right_perm`.
    Union { right_perm: Vec<usize> },
    Project { keep: Vec<usize> },
    /// Rows whose `left` and `right` columns are (or are not) equal.
    Filter {
        left: usize,
        right: usize,
        equal: bool,
    },
    /// Appends a copy of column `source` (`f AND y = x` with `y` unbound).
    Extend { source: usize },
    Once(Interval),
    Eventually(Interval),
    Prev(Interval),
    Next(Interval),
    /// `f SINCE[I] g`. Rows follow the right (`g`) layout; `left_key` and
    /// `right_key` locate the left operand's variables in either input.
    /// `negated` reads the left operand as `NOT f`.
    Since {
        interval: Interval,
        negated: bool,
        left_key: Vec<usize>,
        right_key: Vec<usize>,
    },
    /// `f UNTIL[I] g`, laid out like [`NodeKind::Since`].
    Until {
        interval: Interval,
        negated: bool,
        left_key: Vec<usize>,
        right_key: Vec<usize>,
    },
}

/// How one predicate argument constrains or binds an event argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgPattern {
    /// First occurrence of a variable; becomes output column `col`.
    Bind(usize),
    /// Repeated variable; must equal output column `col`.
    Same(usize),
    Const(Value),
}

impl Plan {
    pub fn root(&self) -> &PlanNode {
        // compile() never yields an empty plan
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn root_id(&self) -> NodeId {
        self.nodes.len() - 1
    }

    pub fn output_columns(&self) -> &[String] {
        &self.root().columns
    }

    pub fn node(&self, id: NodeId) -> &PlanNode {
        &self.nodes[id]
    }

    /// Predicate names the plan reads, deduplicated, in plan order.
    pub fn predicates(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for node in &self.nodes {
            if let NodeKind::Predicate { name, .. } = &node.kind {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
        }
        out
    }

    /// Worst-case look-ahead in timestamp units along the deepest path:
    /// how far past a time-point input must be sealed before its verdict is
    /// final.
    pub fn future_horizon(&self) -> u64 {
        let mut horizon = vec![0u64; self.nodes.len()];
        for node in &self.nodes {
            let from_inputs = node.inputs.iter().map(|i| horizon[*i]).max().unwrap_or(0);
            let own = match node.kind {
                NodeKind::Eventually(iv)
                | NodeKind::Next(iv)
                | NodeKind::Until { interval: iv, .. } => iv.upper.unwrap_or(0),
                _ => 0,
            };
            horizon[node.id] = from_inputs + own;
        }
        horizon.last().copied().unwrap_or(0)
    }
}
