//! Free-text directive shim
//!
//! Language model output may embed calls as lines of the form
//! `FUNCTION_CALL: name(param=value, ...)`. This is the only place text is
//! parsed into invocations; everything downstream works on
//! [`RawInvocation`].

use super::call::{ParamValue, RawInvocation};
use super::error::DispatchError;
use serde_json::Value;

pub const DIRECTIVE_MARKER: &str = "FUNCTION_CALL:";

/// One input line, classified
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Text(String),
    Directive(Result<RawInvocation, DispatchError>),
}

/// Split `text` into plain lines and directives, preserving order
///
/// Only a line that starts with the marker (after indentation) is a
/// directive; a marker quoted mid-sentence stays text.
pub fn parse_text(text: &str) -> Vec<Line> {
    text.lines()
        .map(|line| match directive_body(line) {
            Some(body) => Line::Directive(parse_directive(body)),
            None => Line::Text(line.to_string()),
        })
        .collect()
}

pub fn contains_directive(text: &str) -> bool {
    text.lines().any(|line| directive_body(line).is_some())
}

fn directive_body(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix(DIRECTIVE_MARKER)
}

/// Parse `name(arg, key=value, key=[a, b])`
pub fn parse_directive(body: &str) -> Result<RawInvocation, DispatchError> {
    let body = body.trim().trim_end_matches(';').trim();

    let open = body
        .find('(')
        .ok_or_else(|| DispatchError::MalformedDirective(format!("missing '(' in {:?}", body)))?;
    if !body.ends_with(')') {
        return Err(DispatchError::MalformedDirective(format!(
            "missing ')' in {:?}",
            body
        )));
    }

    let name = body[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DispatchError::MalformedDirective(format!(
            "invalid capability name {:?}",
            name
        )));
    }

    let mut invocation = RawInvocation::new(name);
    let args = &body[open + 1..body.len() - 1];

    for arg in split_top_level(args)? {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }

        match split_key(arg) {
            Some((key, value)) => {
                let value = parse_value(value)?;
                if invocation.named.insert(key.to_string(), value).is_some() {
                    return Err(DispatchError::InvalidParameter {
                        capability: name.to_string(),
                        parameter: key.to_string(),
                        reason: "given more than once".to_string(),
                    });
                }
            }
            None => {
                if !invocation.named.is_empty() {
                    return Err(DispatchError::MalformedDirective(format!(
                        "positional argument {:?} after named arguments",
                        arg
                    )));
                }
                invocation.positional.push(parse_value(arg)?);
            }
        }
    }

    Ok(invocation)
}

/// Build an invocation from a structured tool call's JSON arguments
pub fn from_tool_call(name: &str, arguments: &str) -> Result<RawInvocation, DispatchError> {
    let mut invocation = RawInvocation::new(name);

    if arguments.trim().is_empty() {
        return Ok(invocation);
    }

    let parsed: Value = serde_json::from_str(arguments).map_err(|e| {
        DispatchError::MalformedDirective(format!("{}: arguments are not JSON: {}", name, e))
    })?;

    let Value::Object(map) = parsed else {
        return Err(DispatchError::MalformedDirective(format!(
            "{}: arguments must be a JSON object",
            name
        )));
    };

    for (key, value) in map {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => ParamValue::Str(s),
            Value::Number(n) => match n.as_f64() {
                Some(n) => ParamValue::Number(n),
                None => continue,
            },
            Value::Array(items) => ParamValue::List(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            other => ParamValue::Str(other.to_string()),
        };
        invocation.named.insert(key, value);
    }

    Ok(invocation)
}

/// Split on commas outside brackets and quotes
fn split_top_level(args: &str) -> Result<Vec<&str>, DispatchError> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth -= 1;
                if depth < 0 {
                    return Err(DispatchError::MalformedDirective(format!(
                        "unbalanced ']' in {:?}",
                        args
                    )));
                }
            }
            (None, ',') if depth == 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() || depth != 0 {
        return Err(DispatchError::MalformedDirective(format!(
            "unterminated quote or bracket in {:?}",
            args
        )));
    }

    parts.push(&args[start..]);
    Ok(parts)
}

/// `key=value` when the `=` comes before any quote or bracket
fn split_key(arg: &str) -> Option<(&str, &str)> {
    let eq = arg.find('=')?;
    let key = arg[..eq].trim();

    let is_ident = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_ident.then(|| (key, &arg[eq + 1..]))
}

fn parse_value(raw: &str) -> Result<ParamValue, DispatchError> {
    let raw = raw.trim();

    if let Some(inner) = raw.strip_prefix('[') {
        let inner = inner.strip_suffix(']').ok_or_else(|| {
            DispatchError::MalformedDirective(format!("unterminated list {:?}", raw))
        })?;

        let items = split_top_level(inner)?
            .into_iter()
            .map(|item| unquote(item.trim()).to_string())
            .filter(|item| !item.is_empty())
            .collect();
        return Ok(ParamValue::List(items));
    }

    if is_quoted(raw) {
        return Ok(ParamValue::Str(unquote(raw).to_string()));
    }

    if let Ok(n) = raw.parse::<f64>() {
        return Ok(ParamValue::Number(n));
    }

    Ok(ParamValue::Str(raw.to_string()))
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

fn unquote(s: &str) -> &str {
    if is_quoted(s) {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
