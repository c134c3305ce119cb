use crate::ast::{Formula, Interval, Term};
use crate::error::FormulaError;
use crate::plan::{ArgPattern, NodeId, NodeKind, Plan, PlanNode};

#[cfg(test)]
mod tests;

/// Compile a parsed formula into an executable [`Plan`].
///
/// Rejects formulas that cannot be evaluated over an infinite domain:
/// negation outside a conjunction or the left operand of `SINCE`/`UNTIL`,
/// negated subformulas with variables the other operand does not bind,
/// disjunctions with differing free variables, equalities between two
/// variables outside a conjunction that binds one of them, and `EVENTUALLY`
/// or `UNTIL` with an unbounded interval.
pub fn compile(formula: &Formula) -> Result<Plan, FormulaError> {
    let mut builder = PlanBuilder { nodes: Vec::new() };
    builder.lower(formula)?;
    Ok(Plan {
        nodes: builder.nodes,
    })
}

struct PlanBuilder {
    nodes: Vec<PlanNode>,
}

impl PlanBuilder {
    fn push(&mut self, kind: NodeKind, columns: Vec<String>, inputs: Vec<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(PlanNode {
            id,
            kind,
            columns,
            inputs,
            exchange_key: None,
        });
        id
    }

    fn columns(&self, id: NodeId) -> &[String] {
        &self.nodes[id].columns
    }

    fn set_exchange_key(&mut self, id: NodeId, key: Vec<usize>) {
        self.nodes[id].exchange_key = Some(key);
    }

    fn lower(&mut self, formula: &Formula) -> Result<NodeId, FormulaError> {
        match formula {
            Formula::True => Ok(self.push(NodeKind::Const { rows: vec![vec![]] }, vec![], vec![])),
            Formula::False => Ok(self.push(NodeKind::Const { rows: vec![] }, vec![], vec![])),
            Formula::Predicate { name, args } => Ok(self.predicate(name, args)),
            Formula::Equals(var, Term::Const(c)) => Ok(self.push(
                NodeKind::Const {
                    rows: vec![vec![c.clone()]],
                },
                vec![var.clone()],
                vec![],
            )),
            Formula::Equals(..) => Err(FormulaError::unmonitorable(format!(
                "{formula} must be conjoined with a formula binding one of its variables"
            ))),
            Formula::And(l, r) => {
                if let Some(eq) = var_equality(r) {
                    return self.equate(l, eq);
                }
                if let Some(eq) = var_equality(l) {
                    return self.equate(r, eq);
                }
                match (l.as_ref(), r.as_ref()) {
                    (Formula::Not(_), Formula::Not(_)) => Err(FormulaError::unmonitorable(
                        format!("both operands of {formula} are negated"),
                    )),
                    (_, Formula::Not(neg)) => self.anti_join(l, neg),
                    (Formula::Not(neg), _) => self.anti_join(r, neg),
                    _ => self.join(l, r),
                }
            }
            Formula::Not(inner) => Err(FormulaError::unmonitorable(format!(
                "NOT {inner} must be the operand of a conjunction"
            ))),
            Formula::Or(l, r) => self.union(l, r),
            Formula::Exists(vars, inner) => self.project(vars, inner),
            Formula::Once(interval, inner) => {
                let child = self.lower(inner)?;
                let columns = self.columns(child).to_vec();
                self.set_exchange_key(child, (0..columns.len()).collect());
                Ok(self.push(NodeKind::Once(*interval), columns, vec![child]))
            }
            Formula::Eventually(interval, inner) => {
                if interval.upper.is_none() {
                    return Err(FormulaError::unmonitorable(format!(
                        "EVENTUALLY{interval} needs a bounded interval"
                    )));
                }
                let child = self.lower(inner)?;
                let columns = self.columns(child).to_vec();
                self.set_exchange_key(child, (0..columns.len()).collect());
                Ok(self.push(NodeKind::Eventually(*interval), columns, vec![child]))
            }
            Formula::Prev(interval, inner) => {
                let child = self.lower(inner)?;
                let columns = self.columns(child).to_vec();
                self.set_exchange_key(child, (0..columns.len()).collect());
                Ok(self.push(NodeKind::Prev(*interval), columns, vec![child]))
            }
            Formula::Next(interval, inner) => {
                let child = self.lower(inner)?;
                let columns = self.columns(child).to_vec();
                self.set_exchange_key(child, (0..columns.len()).collect());
                Ok(self.push(NodeKind::Next(*interval), columns, vec![child]))
            }
            Formula::Since(interval, l, r) => self.since_until(*interval, l, r, true),
            Formula::Until(interval, l, r) => {
                if interval.upper.is_none() {
                    return Err(FormulaError::unmonitorable(format!(
                        "UNTIL{interval} needs a bounded interval"
                    )));
                }
                self.since_until(*interval, l, r, false)
            }
        }
    }

    /// `l SINCE r` or `l UNTIL r`, where `l` may be negated and may only use
    /// variables of `r`.
    fn since_until(
        &mut self,
        interval: Interval,
        l: &Formula,
        r: &Formula,
        since: bool,
    ) -> Result<NodeId, FormulaError> {
        let (negated, guard) = match l {
            Formula::Not(inner) => (true, inner.as_ref()),
            other => (false, other),
        };
        let left = self.lower(guard)?;
        let right = self.lower(r)?;
        let lc = self.columns(left).to_vec();
        let rc = self.columns(right).to_vec();
        let op = if since { "SINCE" } else { "UNTIL" };
        if let Some(unbound) = lc.iter().find(|v| !rc.contains(v)) {
            return Err(FormulaError::unmonitorable(format!(
                "variable {unbound} of {l} is not bound by the {op} operand {r}"
            )));
        }
        let mut shared: Vec<&String> = lc.iter().collect();
        shared.sort();
        let left_key = positions(&lc, &shared);
        let right_key = positions(&rc, &shared);

        self.set_exchange_key(left, left_key.clone());
        self.set_exchange_key(right, right_key.clone());
        let kind = if since {
            NodeKind::Since {
                interval,
                negated,
                left_key,
                right_key,
            }
        } else {
            NodeKind::Until {
                interval,
                negated,
                left_key,
                right_key,
            }
        };
        Ok(self.push(kind, rc, vec![left, right]))
    }

    /// `f AND a = b` (or `a != b` via `NOT`) with both sides variables.
    fn equate(&mut self, positive: &Formula, eq: VarEquality<'_>) -> Result<NodeId, FormulaError> {
        let child = self.lower(positive)?;
        let cc = self.columns(child).to_vec();
        let pos = |v: &str| cc.iter().position(|c| c == v);
        let (kind, columns) = match (pos(eq.left), pos(eq.right)) {
            (Some(left), Some(right)) => (
                NodeKind::Filter {
                    left,
                    right,
                    equal: eq.equal,
                },
                cc.clone(),
            ),
            (Some(source), None) if eq.equal => {
                let mut columns = cc.clone();
                columns.push(eq.right.to_string());
                (NodeKind::Extend { source }, columns)
            }
            (None, Some(source)) if eq.equal => {
                let mut columns = cc.clone();
                columns.push(eq.left.to_string());
                (NodeKind::Extend { source }, columns)
            }
            _ => {
                return Err(FormulaError::unmonitorable(format!(
                    "{positive} does not bind the variables of {} {} {}",
                    eq.left,
                    if eq.equal { "=" } else { "!=" },
                    eq.right
                )));
            }
        };
        self.set_exchange_key(child, (0..cc.len()).collect());
        Ok(self.push(kind, columns, vec![child]))
    }

    fn predicate(&mut self, name: &str, args: &[Term]) -> NodeId {
        let mut columns: Vec<String> = Vec::new();
        let pattern = args
            .iter()
            .map(|arg| match arg {
                Term::Const(c) => ArgPattern::Const(c.clone()),
                Term::Var(v) => match columns.iter().position(|c| c == v) {
                    Some(col) => ArgPattern::Same(col),
                    None => {
                        columns.push(v.clone());
                        ArgPattern::Bind(columns.len() - 1)
                    }
                },
            })
            .collect();
        self.push(
            NodeKind::Predicate {
                name: name.to_string(),
                pattern,
            },
            columns,
            Vec::new(),
        )
    }

    fn join(&mut self, l: &Formula, r: &Formula) -> Result<NodeId, FormulaError> {
        let left = self.lower(l)?;
        let right = self.lower(r)?;
        let lc = self.columns(left).to_vec();
        let rc = self.columns(right).to_vec();

        let mut shared: Vec<&String> = lc.iter().filter(|v| rc.contains(v)).collect();
        shared.sort();
        let left_key = positions(&lc, &shared);
        let right_key = positions(&rc, &shared);
        let right_extra: Vec<usize> = (0..rc.len()).filter(|i| !lc.contains(&rc[*i])).collect();

        let mut columns = lc.clone();
        columns.extend(right_extra.iter().map(|i| rc[*i].clone()));

        self.set_exchange_key(left, left_key.clone());
        self.set_exchange_key(right, right_key.clone());
        Ok(self.push(
            NodeKind::Join {
                left_key,
                right_key,
                right_extra,
            },
            columns,
            vec![left, right],
        ))
    }

    fn anti_join(&mut self, positive: &Formula, negated: &Formula) -> Result<NodeId, FormulaError> {
        let left = self.lower(positive)?;
        let right = self.lower(negated)?;
        let lc = self.columns(left).to_vec();
        let rc = self.columns(right).to_vec();

        if let Some(unbound) = rc.iter().find(|v| !lc.contains(v)) {
            return Err(FormulaError::unmonitorable(format!(
                "variable {unbound} of NOT {negated} is not bound by {positive}"
            )));
        }
        let mut shared: Vec<&String> = rc.iter().collect();
        shared.sort();
        let left_key = positions(&lc, &shared);
        let right_key = positions(&rc, &shared);

        self.set_exchange_key(left, left_key.clone());
        self.set_exchange_key(right, right_key.clone());
        Ok(self.push(
            NodeKind::AntiJoin {
                left_key,
                right_key,
            },
            lc,
            vec![left, right],
        ))
    }

    fn union(&mut self, l: &Formula, r: &Formula) -> Result<NodeId, FormulaError> {
        let left = self.lower(l)?;
        let right = self.lower(r)?;
        let lc = self.columns(left).to_vec();
        let rc = self.columns(right).to_vec();

        let same_vars = lc.len() == rc.len() && lc.iter().all(|v| rc.contains(v));
        if !same_vars {
            return Err(FormulaError::unmonitorable(format!(
                "operands of {l} OR {r} have different free variables"
            )));
        }
        let lc_refs: Vec<&String> = lc.iter().collect();
        let right_perm = positions(&rc, &lc_refs);

        self.set_exchange_key(left, (0..lc.len()).collect());
        self.set_exchange_key(right, right_perm.clone());
        Ok(self.push(NodeKind::Union { right_perm }, lc, vec![left, right]))
    }

    fn project(&mut self, vars: &[String], inner: &Formula) -> Result<NodeId, FormulaError> {
        let child = self.lower(inner)?;
        let cc = self.columns(child).to_vec();
        if let Some(missing) = vars.iter().find(|v| !cc.contains(v)) {
            return Err(FormulaError::unmonitorable(format!(
                "EXISTS binds {missing}, which is not free in {inner}"
            )));
        }
        let keep: Vec<usize> = (0..cc.len()).filter(|i| !vars.contains(&cc[*i])).collect();
        let columns = keep.iter().map(|i| cc[*i].clone()).collect();
        self.set_exchange_key(child, keep.clone());
        Ok(self.push(NodeKind::Project { keep }, columns, vec![child]))
    }
}

struct VarEquality<'a> {
    left: &'a str,
    right: &'a str,
    equal: bool,
}

/// `a = b` or `NOT a = b` between two variables.
fn var_equality(formula: &Formula) -> Option<VarEquality<'_>> {
    match formula {
        Formula::Equals(left, Term::Var(right)) => Some(VarEquality {
            left,
            right,
            equal: true,
        }),
        Formula::Not(inner) => match inner.as_ref() {
            Formula::Equals(left, Term::Var(right)) => Some(VarEquality {
                left,
                right,
                equal: false,
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Position of each wanted variable within `columns`.
fn positions(columns: &[String], wanted: &[&String]) -> Vec<usize> {
    wanted
        .iter()
        .filter_map(|w| columns.iter().position(|c| c == *w))
        .collect()
}
