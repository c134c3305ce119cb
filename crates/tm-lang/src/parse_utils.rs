use winnow::ascii::multispace0;
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{literal, take_while};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Single- or double-quoted string without escapes.
pub fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let quote = alt((literal("'"), literal("\""))).parse_next(input)?;
    let close = if quote == "'" { '\'' } else { '"' };
    let content = take_while(0.., move |c: char| c != close).parse_next(input)?;
    winnow::combinator::cut_err(literal(quote))
        .context(StrContext::Expected(StrContextValue::Description(
            "closing quote",
        )))
        .parse_next(input)?;
    Ok(content.to_string())
}

// ---------------------------------------------------------------------------
// Whitespace & comments
// ---------------------------------------------------------------------------

/// Skip whitespace and `# ...` line comments.
pub fn ws_skip(input: &mut &str) -> ModalResult<()> {
    loop {
        let _ = multispace0.parse_next(input)?;
        if opt(literal("#")).parse_next(input)?.is_some() {
            let _ = take_while(0.., |c: char| c != '\n').parse_next(input)?;
        } else {
            break;
        }
    }
    Ok(())
}

/// Skip spaces and tabs only; record parsers must not run past a line end.
pub fn blank(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)
}

// ---------------------------------------------------------------------------
// Keyword matching with word boundary
// ---------------------------------------------------------------------------

/// Match a keyword ignoring ASCII case, rejecting it when it is only the
/// prefix of a longer identifier.
pub fn kw<'a>(keyword: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        let saved = *input;
        let n = keyword.len();
        let head = input.get(..n).ok_or(ErrMode::Backtrack(ContextError::new()))?;
        if !head.eq_ignore_ascii_case(keyword) {
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        *input = &input[n..];
        if input.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            *input = saved;
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Numbers
// ---------------------------------------------------------------------------

/// Parse a non-negative integer literal.
pub fn nonneg_integer(input: &mut &str) -> ModalResult<u64> {
    let saved = *input;
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    digits.parse::<u64>().map_err(|_| {
        *input = saved;
        ErrMode::Backtrack(ContextError::new())
    })
}

/// Parse an optionally negative integer literal.
pub fn signed_integer(input: &mut &str) -> ModalResult<i64> {
    let saved = *input;
    let neg = opt(literal("-")).parse_next(input)?.is_some();
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let magnitude: i64 = digits.parse().map_err(|_| {
        *input = saved;
        ErrMode::Backtrack(ContextError::new())
    })?;
    Ok(if neg { -magnitude } else { magnitude })
}
