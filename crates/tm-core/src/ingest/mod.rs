//! Event log line parsing.
//!
//! Accepted lines:
//!
//! ```text
//! A(1,'x',y), tp=3, ts=17        positional arguments, ts defaults to tp
//! A, tp=3, ts=17, x=1, y=2       generator CSV, attribute values in order
//! 4'A, tp=3, ts=17, x=1          leading delay tag is ignored
//! >WATERMARK 12<                 watermark marker
//! ```
//!
//! Blank lines and `#` comments produce no record.

use winnow::combinator::{alt, cut_err, delimited, opt, repeat, separated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

use tm_lang::parse_utils::{blank, ident, kw, nonneg_integer, quoted_string, signed_integer};

use crate::event::{Event, Record, TimePoint, Value};


/// An input line that could not be turned into a record. The line is skipped
/// and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed record at line {line}: {reason}")]
pub struct MalformedRecordError {
    pub line: u64,
    pub reason: String,
}

/// Parse one log line. `line` is the 1-based line number used in errors.
pub fn parse_record(line: u64, text: &str) -> Result<Option<Record>, MalformedRecordError> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }
    let malformed = |reason: String| MalformedRecordError { line, reason };

    let raw = raw_line.parse(text).map_err(|e| malformed(e.to_string()))?;
    match raw {
        RawLine::Watermark(w) if w < 0 => Ok(None),
        RawLine::Watermark(w) => Ok(Some(Record::Watermark(w as TimePoint))),
        RawLine::Event {
            name,
            positional,
            attrs,
        } => {
            let mut tp = None;
            let mut ts = None;
            let mut named = Vec::new();
            for (key, value) in attrs {
                if key.eq_ignore_ascii_case("tp") {
                    tp = Some(time_value("tp", value).map_err(malformed)?);
                } else if key.eq_ignore_ascii_case("ts") {
                    ts = Some(time_value("ts", value).map_err(malformed)?);
                } else {
                    named.push(value);
                }
            }
            let tp = tp.ok_or_else(|| malformed(format!("{name}: missing tp=<int>")))?;
            let args = match positional {
                Some(_) if !named.is_empty() => {
                    return Err(malformed(format!(
                        "{name}: positional arguments and named attributes cannot be mixed"
                    )));
                }
                Some(args) => args,
                None => named,
            };
            Ok(Some(Record::Event(Event {
                predicate: name.to_string(),
                args,
                tp,
                ts: ts.unwrap_or(tp),
            })))
        }
    }
}

fn time_value(key: &str, value: Value) -> Result<u64, String> {
    match value {
        Value::Int(v) if v >= 0 => Ok(v as u64),
        other => Err(format!("{key} must be a non-negative integer, got {other}")),
    }
}

// ---------------------------------------------------------------------------
// Grammar
// ---------------------------------------------------------------------------

enum RawLine<'a> {
    Watermark(i64),
    Event {
        name: &'a str,
        positional: Option<Vec<Value>>,
        attrs: Vec<(&'a str, Value)>,
    },
}

fn raw_line<'a>(input: &mut &'a str) -> ModalResult<RawLine<'a>> {
    let _ = opt((nonneg_integer, literal("'"))).parse_next(input)?;
    blank.parse_next(input)?;
    let line = alt((watermark, event)).parse_next(input)?;
    blank.parse_next(input)?;
    Ok(line)
}

fn watermark<'a>(input: &mut &'a str) -> ModalResult<RawLine<'a>> {
    let _ = opt(literal(">")).parse_next(input)?;
    blank.parse_next(input)?;
    kw("WATERMARK").parse_next(input)?;
    blank.parse_next(input)?;
    let w = cut_err(signed_integer)
        .context(StrContext::Expected(StrContextValue::Description(
            "watermark time-point",
        )))
        .parse_next(input)?;
    blank.parse_next(input)?;
    let _ = opt(literal("<")).parse_next(input)?;
    Ok(RawLine::Watermark(w))
}

fn event<'a>(input: &mut &'a str) -> ModalResult<RawLine<'a>> {
    let name = ident
        .context(StrContext::Expected(StrContextValue::Description(
            "predicate name",
        )))
        .parse_next(input)?;
    blank.parse_next(input)?;
    let positional = opt(delimited(
        (literal("("), blank),
        separated(0.., value, (blank, literal(","), blank)),
        (
            blank,
            cut_err(literal(")")).context(StrContext::Expected(StrContextValue::Description(
                "')' closing argument list",
            ))),
        ),
    ))
    .parse_next(input)?;
    let attrs: Vec<(&str, Value)> = repeat(0.., attr).parse_next(input)?;
    Ok(RawLine::Event {
        name,
        positional,
        attrs,
    })
}

/// `, key=value`
fn attr<'a>(input: &mut &'a str) -> ModalResult<(&'a str, Value)> {
    (
        blank,
        literal(","),
        blank,
        ident,
        blank,
        literal("="),
        blank,
        cut_err(value),
    )
        .map(|(_, _, _, key, _, _, _, v)| (key, v))
        .parse_next(input)
}

fn value(input: &mut &str) -> ModalResult<Value> {
    alt((
        quoted_string.map(Value::Str),
        take_while(1.., |c: char| {
            !matches!(c, ',' | '(' | ')' | '=' | '\'' | '"') && !c.is_whitespace()
        })
        .map(classify),
    ))
    .parse_next(input)
}

fn classify(token: &str) -> Value {
    match token.parse::<i64>() {
        Ok(v) => Value::Int(v),
        Err(_) => Value::Str(token.to_string()),
    }
}
