use winnow::combinator::{alt, cut_err, opt, separated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::*;
use crate::error::FormulaError;
use crate::parse_utils::{ident, kw, nonneg_integer, quoted_string, signed_integer, ws_skip};


// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Parse a formula such as `(ONCE[0,7] A(a,b)) AND B(b,c)`.
///
/// Keywords are case-insensitive. `AND` binds tighter than `OR`, `SINCE` and
/// `UNTIL` bind tighter than `AND` and nest to the right; the unary operators
/// (`NOT`, `ONCE`, `EVENTUALLY`, `PREVIOUS`, `NEXT`, `EXISTS`) bind tightest.
pub fn parse_formula(input: &str) -> Result<Formula, FormulaError> {
    (ws_skip, or_formula, ws_skip)
        .map(|(_, f, _)| f)
        .parse(input)
        .map_err(|e| FormulaError::Parse {
            message: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Precedence levels (lowest to highest)
// ---------------------------------------------------------------------------

/// `or_formula = and_formula { ("OR" | "||") and_formula }`
fn or_formula(input: &mut &str) -> ModalResult<Formula> {
    let mut left = and_formula.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(alt((kw("OR"), literal("||").void())))
            .parse_next(input)?
            .is_some()
        {
            ws_skip.parse_next(input)?;
            let right = cut_err(and_formula)
                .context(StrContext::Expected(StrContextValue::Description(
                    "formula after OR",
                )))
                .parse_next(input)?;
            left = Formula::Or(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

/// `and_formula = temporal { ("AND" | "&&") temporal }`
fn and_formula(input: &mut &str) -> ModalResult<Formula> {
    let mut left = temporal.parse_next(input)?;
    loop {
        ws_skip.parse_next(input)?;
        if opt(alt((kw("AND"), literal("&&").void())))
            .parse_next(input)?
            .is_some()
        {
            ws_skip.parse_next(input)?;
            let right = cut_err(temporal)
                .context(StrContext::Expected(StrContextValue::Description(
                    "formula after AND",
                )))
                .parse_next(input)?;
            left = Formula::And(Box::new(left), Box::new(right));
        } else {
            break;
        }
    }
    Ok(left)
}

/// `temporal = unary [ ("SINCE" | "UNTIL") interval? temporal ]`
fn temporal(input: &mut &str) -> ModalResult<Formula> {
    let left = unary.parse_next(input)?;
    let checkpoint = *input;
    ws_skip.parse_next(input)?;
    let op = opt(alt((kw("SINCE").value(true), kw("UNTIL").value(false)))).parse_next(input)?;
    let Some(since) = op else {
        *input = checkpoint;
        return Ok(left);
    };
    let interval = opt_interval.parse_next(input)?;
    ws_skip.parse_next(input)?;
    let right = cut_err(temporal)
        .context(StrContext::Expected(StrContextValue::Description(
            "formula after SINCE/UNTIL",
        )))
        .parse_next(input)?;
    let (left, right) = (Box::new(left), Box::new(right));
    Ok(if since {
        Formula::Since(interval, left, right)
    } else {
        Formula::Until(interval, left, right)
    })
}

fn unary(input: &mut &str) -> ModalResult<Formula> {
    ws_skip.parse_next(input)?;

    if opt(alt((kw("NOT"), literal("~").void())))
        .parse_next(input)?
        .is_some()
    {
        let inner = cut_operand.parse_next(input)?;
        return Ok(Formula::Not(Box::new(inner)));
    }

    if opt(kw("ONCE")).parse_next(input)?.is_some() {
        let interval = opt_interval.parse_next(input)?;
        let inner = cut_operand.parse_next(input)?;
        return Ok(Formula::Once(interval, Box::new(inner)));
    }

    if opt(kw("EVENTUALLY")).parse_next(input)?.is_some() {
        let interval = opt_interval.parse_next(input)?;
        let inner = cut_operand.parse_next(input)?;
        return Ok(Formula::Eventually(interval, Box::new(inner)));
    }

    if opt(alt((kw("PREVIOUS"), kw("PREV")))).parse_next(input)?.is_some() {
        let interval = opt_interval.parse_next(input)?;
        let inner = cut_operand.parse_next(input)?;
        return Ok(Formula::Prev(interval, Box::new(inner)));
    }

    if opt(kw("NEXT")).parse_next(input)?.is_some() {
        let interval = opt_interval.parse_next(input)?;
        let inner = cut_operand.parse_next(input)?;
        return Ok(Formula::Next(interval, Box::new(inner)));
    }

    if opt(kw("EXISTS")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let vars: Vec<&str> = cut_err(separated(1.., ident, (ws_skip, literal(","), ws_skip)))
            .context(StrContext::Expected(StrContextValue::Description(
                "quantified variables",
            )))
            .parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal("."))
            .context(StrContext::Expected(StrContextValue::Description(
                "'.' after quantified variables",
            )))
            .parse_next(input)?;
        let inner = cut_operand.parse_next(input)?;
        let vars = vars.into_iter().map(str::to_string).collect();
        return Ok(Formula::Exists(vars, Box::new(inner)));
    }

    primary.parse_next(input)
}

fn cut_operand(input: &mut &str) -> ModalResult<Formula> {
    ws_skip.parse_next(input)?;
    cut_err(unary)
        .context(StrContext::Expected(StrContextValue::Description(
            "operand formula",
        )))
        .parse_next(input)
}

fn primary(input: &mut &str) -> ModalResult<Formula> {
    if opt(literal("(")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(or_formula).parse_next(input)?;
        ws_skip.parse_next(input)?;
        cut_err(literal(")"))
            .context(StrContext::Expected(StrContextValue::Description("')'")))
            .parse_next(input)?;
        return Ok(inner);
    }
    if opt(kw("TRUE")).parse_next(input)?.is_some() {
        return Ok(Formula::True);
    }
    if opt(kw("FALSE")).parse_next(input)?.is_some() {
        return Ok(Formula::False);
    }
    if let Some(var) = opt((ident, ws_skip, literal("="))).parse_next(input)? {
        ws_skip.parse_next(input)?;
        let rhs = cut_err(term)
            .context(StrContext::Expected(StrContextValue::Description(
                "constant or variable after '='",
            )))
            .parse_next(input)?;
        return Ok(Formula::Equals(var.0.to_string(), rhs));
    }
    predicate.parse_next(input)
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn predicate(input: &mut &str) -> ModalResult<Formula> {
    let name = ident
        .context(StrContext::Expected(StrContextValue::Description(
            "predicate name",
        )))
        .parse_next(input)?
        .to_string();
    ws_skip.parse_next(input)?;
    cut_err(literal("("))
        .context(StrContext::Expected(StrContextValue::Description(
            "'(' after predicate name",
        )))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let args: Vec<Term> =
        separated(0.., term, (ws_skip, literal(","), ws_skip)).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")"))
        .context(StrContext::Expected(StrContextValue::Description(
            "')' closing argument list",
        )))
        .parse_next(input)?;
    Ok(Formula::Predicate { name, args })
}

fn term(input: &mut &str) -> ModalResult<Term> {
    alt((
        signed_integer.map(|v| Term::Const(Value::Int(v))),
        quoted_string.map(|s| Term::Const(Value::Str(s))),
        ident.map(|v: &str| Term::Var(v.to_string())),
    ))
    .parse_next(input)
}

// ---------------------------------------------------------------------------
// Intervals
// ---------------------------------------------------------------------------

/// Interval after a temporal keyword; omitted means `[0,*)`.
fn opt_interval(input: &mut &str) -> ModalResult<Interval> {
    ws_skip.parse_next(input)?;
    if !input.starts_with(['[', '(']) {
        return Ok(Interval::unbounded(0));
    }
    // `(` may also open a parenthesised operand; only commit when the
    // bracket is followed by a number.
    if input.starts_with('(') {
        let rest = input[1..].trim_start();
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Interval::unbounded(0));
        }
    }
    cut_err(raw_interval.verify_map(normalize_interval))
        .context(StrContext::Expected(StrContextValue::Description(
            "interval such as [0,7], (0,7] or [3,*)",
        )))
        .parse_next(input)
}

struct RawInterval {
    open_lower: bool,
    lower: u64,
    upper: Option<u64>,
    open_upper: bool,
}

fn raw_interval(input: &mut &str) -> ModalResult<RawInterval> {
    let open_lower = alt((literal("[").value(false), literal("(").value(true))).parse_next(input)?;
    ws_skip.parse_next(input)?;
    let lower = nonneg_integer.parse_next(input)?;
    ws_skip.parse_next(input)?;
    literal(",").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let upper = alt((
        literal("*").value(None),
        kw("INFINITY").value(None),
        nonneg_integer.map(Some),
    ))
    .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let open_upper = alt((literal("]").value(false), literal(")").value(true))).parse_next(input)?;
    Ok(RawInterval {
        open_lower,
        lower,
        upper,
        open_upper,
    })
}

fn normalize_interval(raw: RawInterval) -> Option<Interval> {
    let lower = if raw.open_lower {
        raw.lower.checked_add(1)?
    } else {
        raw.lower
    };
    match raw.upper {
        None => Some(Interval::unbounded(lower)),
        Some(hi) => {
            let upper = if raw.open_upper { hi.checked_sub(1)? } else { hi };
            (lower <= upper).then_some(Interval::bounded(lower, upper))
        }
    }
}
