use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A constant appearing in a formula or carried by an event argument.
///
/// Integers order before strings so that emitted bindings sort the same way
/// regardless of which worker produced them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

/// Closed interval over timestamp differences. `upper == None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub lower: u64,
    pub upper: Option<u64>,
}

impl Interval {
    pub fn bounded(lower: u64, upper: u64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    pub fn unbounded(lower: u64) -> Self {
        Self { lower, upper: None }
    }

    /// Whether a timestamp distance falls inside the interval.
    pub fn contains(&self, distance: u64) -> bool {
        distance >= self.lower && self.upper.is_none_or(|hi| distance <= hi)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upper {
            Some(hi) => write!(f, "[{},{}]", self.lower, hi),
            None => write!(f, "[{},*)", self.lower),
        }
    }
}

// ---------------------------------------------------------------------------
// Formula
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Var(String),
    Const(Value),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => f.write_str(v),
            Term::Const(Value::Str(s)) => write!(f, "'{s}'"),
            Term::Const(c) => write!(f, "{c}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Predicate { name: String, args: Vec<Term> },
    /// `x = c`
    Equals(String, Term),
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Exists(Vec<String>, Box<Formula>),
    Once(Interval, Box<Formula>),
    Eventually(Interval, Box<Formula>),
    Prev(Interval, Box<Formula>),
    Next(Interval, Box<Formula>),
    /// `lhs SINCE[I] rhs`
    Since(Interval, Box<Formula>, Box<Formula>),
    /// `lhs UNTIL[I] rhs`
    Until(Interval, Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn predicate(name: &str, args: Vec<Term>) -> Self {
        Formula::Predicate {
            name: name.to_string(),
            args,
        }
    }

    /// Free variables, in sorted order.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut out);
        out
    }

    fn collect_free(&self, out: &mut BTreeSet<String>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Predicate { args, .. } => {
                for arg in args {
                    if let Term::Var(v) = arg {
                        out.insert(v.clone());
                    }
                }
            }
            Formula::Equals(var, rhs) => {
                out.insert(var.clone());
                if let Term::Var(v) = rhs {
                    out.insert(v.clone());
                }
            }
            Formula::Not(f)
            | Formula::Once(_, f)
            | Formula::Eventually(_, f)
            | Formula::Prev(_, f)
            | Formula::Next(_, f) => f.collect_free(out),
            Formula::And(l, r)
            | Formula::Or(l, r)
            | Formula::Since(_, l, r)
            | Formula::Until(_, l, r) => {
                l.collect_free(out);
                r.collect_free(out);
            }
            Formula::Exists(vars, f) => {
                let mut inner = BTreeSet::new();
                f.collect_free(&mut inner);
                for v in vars {
                    inner.remove(v);
                }
                out.extend(inner);
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("TRUE"),
            Formula::False => f.write_str("FALSE"),
            Formula::Predicate { name, args } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
            Formula::Equals(var, rhs) => write!(f, "{var} = {rhs}"),
            Formula::Not(inner) => write!(f, "(NOT {inner})"),
            Formula::And(l, r) => write!(f, "({l} AND {r})"),
            Formula::Or(l, r) => write!(f, "({l} OR {r})"),
            Formula::Exists(vars, inner) => write!(f, "(EXISTS {}. {inner})", vars.join(",")),
            Formula::Once(i, inner) => write!(f, "(ONCE{i} {inner})"),
            Formula::Eventually(i, inner) => write!(f, "(EVENTUALLY{i} {inner})"),
            Formula::Prev(i, inner) => write!(f, "(PREVIOUS{i} {inner})"),
            Formula::Next(i, inner) => write!(f, "(NEXT{i} {inner})"),
            Formula::Since(i, l, r) => write!(f, "({l} SINCE{i} {r})"),
            Formula::Until(i, l, r) => write!(f, "({l} UNTIL{i} {r})"),
        }
    }
}
