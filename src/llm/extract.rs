//! Structured extraction of model output.
//!
//! Model responses are supposed to be a single JSON object or array but often
//! arrive wrapped in prose, with trailing commas, single-quoted strings or
//! doubled separators. [`repair_json`] applies one deterministic repair pass;
//! [`extract`] parses the result and checks it against the stage schema.
//!
//! Repairs only touch text outside string literals, so well-formed JSON passes
//! through unchanged.

use serde_json::Value;
use tracing::{debug, warn};

use super::StageSchema;
use crate::error::ExtractionError;

/// A single repair applied to the raw text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    /// Prose before the opening or after the closing bracket was dropped
    StrippedProse,
    /// Commas directly before `}` or `]` were removed
    TrailingCommas(usize),
    /// Single-quoted strings were rewritten with double quotes
    SingleQuotes(usize),
    /// Runs of separator commas were collapsed to one
    RepeatedCommas(usize),
    /// Raw control characters inside strings were escaped
    ControlCharacters(usize),
}

/// Repaired text ready for parsing
#[derive(Debug, Clone, PartialEq)]
pub struct Repaired {
    pub text: String,
    pub repairs: Vec<Repair>,
}

/// Extract a schema-valid value from raw model output.
///
/// Never panics; every failure is returned as an [`ExtractionError`] carrying
/// the raw text.
pub fn extract(raw: &str, schema: StageSchema) -> Result<Value, ExtractionError> {
    let repaired = repair_json(raw).map_err(|reason| {
        warn!(?schema, %reason, raw_len = raw.len(), "model output could not be repaired");
        ExtractionError::unparseable(reason, raw)
    })?;

    if !repaired.repairs.is_empty() {
        debug!(?schema, repairs = ?repaired.repairs, "repaired model output");
    }

    let value: Value = serde_json::from_str(&repaired.text).map_err(|e| {
        warn!(?schema, error = %e, raw_len = raw.len(), "model output is not valid JSON");
        ExtractionError::unparseable(format!("invalid JSON after repair: {}", e), raw)
    })?;

    schema.validate(&value).map_err(|reason| {
        warn!(?schema, %reason, "model output does not match stage schema");
        ExtractionError::schema_mismatch(reason, raw)
    })?;

    Ok(value)
}

/// Run the repair sequence over raw model text.
///
/// Returns the reason as an error when no JSON structure can be recovered.
pub fn repair_json(raw: &str) -> Result<Repaired, String> {
    let mut repairs = Vec::new();

    // 1. Isolate the outermost structure
    let start = raw
        .find(['{', '['])
        .ok_or_else(|| "no JSON object or array found".to_string())?;
    let mut pieces = lex(&raw[start..]);
    let end = structure_end(&pieces).ok_or_else(|| {
        let opener = &raw[start..start + 1];
        format!("unbalanced structure: opening '{}' is never closed", opener)
    })?;

    let trailing = pieces[end + 1..].iter().any(|p| !p.is_whitespace());
    if !raw[..start].trim().is_empty() || trailing {
        repairs.push(Repair::StrippedProse);
    }
    pieces.truncate(end + 1);

    // 2. Trailing commas
    let (pieces, count) = remove_trailing_commas(pieces);
    if count > 0 {
        repairs.push(Repair::TrailingCommas(count));
    }

    // 3. Single-quoted strings
    let (pieces, count) = normalize_single_quotes(pieces);
    if count > 0 {
        repairs.push(Repair::SingleQuotes(count));
    }

    // 4. Repeated separators
    let (pieces, count) = collapse_commas(pieces);
    if count > 0 {
        repairs.push(Repair::RepeatedCommas(count));
    }

    // 5. Balance check
    check_balance(&pieces)?;

    let (text, escaped) = render(&pieces);
    if escaped > 0 {
        repairs.push(Repair::ControlCharacters(escaped));
    }

    Ok(Repaired { text, repairs })
}

/// Index of the closer that returns the nesting depth to zero.
///
/// String literals are single pieces, so brackets inside them never count.
fn structure_end(pieces: &[Piece]) -> Option<usize> {
    let mut depth = 0usize;

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Char('{' | '[') => depth += 1,
            Piece::Char('}' | ']') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    /// Structural or literal character outside any string
    Char(char),
    /// String literal; `body` is the source text between the quotes
    Str {
        body: String,
        single: bool,
        terminated: bool,
    },
}

impl Piece {
    fn is_char(&self, c: char) -> bool {
        matches!(self, Piece::Char(x) if *x == c)
    }

    fn is_whitespace(&self) -> bool {
        matches!(self, Piece::Char(c) if c.is_whitespace())
    }
}

/// Split text into string literals and everything else.
///
/// A `'` opens a string only where a value or key may start (after `{`, `[`,
/// `,` or `:`), and closes it only when followed by a delimiter, so
/// apostrophes inside single-quoted text survive.
fn lex(text: &str) -> Vec<Piece> {
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::with_capacity(chars.len());
    let mut last_code: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        let opens_single = c == '\'' && matches!(last_code, None | Some('{' | '[' | ',' | ':'));

        if c == '"' || opens_single {
            let single = c == '\'';
            let mut body = String::new();
            let mut terminated = false;
            i += 1;

            while i < chars.len() {
                let ch = chars[i];
                if ch == '\\' {
                    body.push(ch);
                    if let Some(&next) = chars.get(i + 1) {
                        body.push(next);
                    }
                    i += 2;
                    continue;
                }
                if ch == c && (!single || closes_single_quote(&chars, i + 1)) {
                    terminated = true;
                    i += 1;
                    break;
                }
                body.push(ch);
                i += 1;
            }

            pieces.push(Piece::Str {
                body,
                single,
                terminated,
            });
            last_code = Some('"');
            continue;
        }

        if !c.is_whitespace() {
            last_code = Some(c);
        }
        pieces.push(Piece::Char(c));
        i += 1;
    }

    pieces
}

fn closes_single_quote(chars: &[char], from: usize) -> bool {
    match chars[from.min(chars.len())..]
        .iter()
        .find(|c| !c.is_whitespace())
    {
        None => true,
        Some(c) => matches!(c, ',' | ':' | '}' | ']'),
    }
}

fn remove_trailing_commas(pieces: Vec<Piece>) -> (Vec<Piece>, usize) {
    let mut drop = vec![false; pieces.len()];

    for (i, piece) in pieces.iter().enumerate() {
        if !piece.is_char(',') {
            continue;
        }
        let next = pieces[i + 1..]
            .iter()
            .find(|p| !p.is_whitespace() && !p.is_char(','));
        if next.is_some_and(|p| p.is_char('}') || p.is_char(']')) {
            drop[i] = true;
        }
    }

    let count = drop.iter().filter(|&&d| d).count();
    let kept = pieces
        .into_iter()
        .zip(drop)
        .filter(|(_, d)| !d)
        .map(|(p, _)| p)
        .collect();
    (kept, count)
}

fn normalize_single_quotes(pieces: Vec<Piece>) -> (Vec<Piece>, usize) {
    let mut count = 0;

    let pieces = pieces
        .into_iter()
        .map(|piece| match piece {
            Piece::Str {
                body,
                single: true,
                terminated,
            } => {
                count += 1;
                Piece::Str {
                    body: requote(&body),
                    single: false,
                    terminated,
                }
            }
            other => other,
        })
        .collect();

    (pieces, count)
}

/// Rewrite a single-quoted string body for double-quote delimiters
fn requote(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'\'') => {
                out.push('\'');
                chars.next();
            }
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => out.push_str("\\\""),
            _ => out.push(c),
        }
    }

    out
}

fn collapse_commas(pieces: Vec<Piece>) -> (Vec<Piece>, usize) {
    let mut out: Vec<Piece> = Vec::with_capacity(pieces.len());
    let mut count = 0;

    for piece in pieces {
        if piece.is_char(',') {
            let previous = out.iter().rev().find(|p| !p.is_whitespace());
            if previous.is_some_and(|p| p.is_char(',')) {
                count += 1;
                continue;
            }
        }
        out.push(piece);
    }

    (out, count)
}

fn check_balance(pieces: &[Piece]) -> Result<(), String> {
    let count = |c: char| pieces.iter().filter(|p| p.is_char(c)).count();

    let (open_braces, close_braces) = (count('{'), count('}'));
    if open_braces != close_braces {
        return Err(format!(
            "unbalanced braces: {} '{{' vs {} '}}'",
            open_braces, close_braces
        ));
    }

    let (open_brackets, close_brackets) = (count('['), count(']'));
    if open_brackets != close_brackets {
        return Err(format!(
            "unbalanced brackets: {} '[' vs {} ']'",
            open_brackets, close_brackets
        ));
    }

    Ok(())
}

/// Reassemble text, escaping raw control characters inside strings
fn render(pieces: &[Piece]) -> (String, usize) {
    let mut out = String::new();
    let mut escaped = 0;

    for piece in pieces {
        match piece {
            Piece::Char(c) => out.push(*c),
            Piece::Str {
                body, terminated, ..
            } => {
                out.push('"');
                for c in body.chars() {
                    match c {
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\t' => out.push_str("\\t"),
                        c if c.is_control() && (c as u32) < 0x20 => {
                            out.push_str(&format!("\\u{:04x}", c as u32))
                        }
                        _ => {
                            out.push(c);
                            continue;
                        }
                    }
                    escaped += 1;
                }
                if *terminated {
                    out.push('"');
                }
            }
        }
    }

    (out, escaped)
}
