//! Path expansion for patch operations.
//!
//! Patch paths are a superset of RFC 6901 JSON Pointer: plain key and index
//! segments, the append marker `-`, and array filters
//! `[?(@.field.path=='value')]`. Brackets may follow keys and other
//! brackets (`containers[?(@.role=='worker')][0]`), so segments are parsed
//! piece by piece rather than split naively.
//!
//! Expansion walks the document left to right keeping a frontier of
//! (pointer, value) states: filters fan the frontier out to every matching
//! element, indices narrow it. The result is zero or more concrete,
//! RFC 6901-escaped pointers. Zero survivors is not an error; the caller
//! treats the operation as a no-op.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::PatchError;
use crate::types::Resource;

/// Recognizes `@.field.path=='value'` equality filters. Group 1 is the
/// field path, group 2 the expected value.
static FILTER_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^@\.([A-Za-z0-9_.-]+)\s*==\s*['"](.*)['"]$"#).expect("static pattern"));

/// One location in the document during expansion. The value is `None` past
/// an append marker, which points at nothing yet.
#[derive(Debug, Clone)]
struct PathState<'a> {
    pointer: Vec<String>,
    value: Option<&'a JsonValue>,
}

/// Expand a raw path expression into concrete JSON Pointers against `root`.
pub fn expand_paths(root: &Resource, raw_path: &str) -> Result<Vec<String>, PatchError> {
    if raw_path.is_empty() {
        return Ok(vec![String::new()]);
    }

    let root_value = JsonValue::Object(root.clone());
    let segments = split_raw_path(raw_path);
    let mut states = vec![PathState {
        pointer: Vec::new(),
        value: Some(&root_value),
    }];

    for segment in &segments {
        if segment == "-" {
            states = apply_dash(states);
            continue;
        }
        let mut next = Vec::with_capacity(states.len());
        for state in states {
            next.extend(apply_segment(state, segment, raw_path)?);
        }
        states = next;
        if states.is_empty() {
            break;
        }
    }

    Ok(states
        .into_iter()
        .map(|state| build_pointer(&state.pointer))
        .collect())
}

/// Split a raw path on `/`, unescaping RFC 6901 sequences in each segment.
/// The leading slash is optional; the append marker is left alone.
fn split_raw_path(path: &str) -> Vec<String> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return vec![String::new()];
    }
    trimmed
        .split('/')
        .map(|segment| {
            if segment == "-" {
                segment.to_string()
            } else {
                unescape_segment(segment)
            }
        })
        .collect()
}

/// Process one segment, which may combine keys, bracketed indices, filters,
/// and append markers.
fn apply_segment<'a>(
    state: PathState<'a>,
    segment: &str,
    raw_path: &str,
) -> Result<Vec<PathState<'a>>, PatchError> {
    let mut current = vec![state];
    let mut remaining = segment;

    while !remaining.is_empty() {
        if let Some(rest) = remaining.strip_prefix('[') {
            let close = rest.find(']').ok_or_else(|| PatchError::InvalidPath {
                path: raw_path.to_string(),
                message: format!("unclosed bracket in segment {:?}", segment),
            })?;
            let content = &rest[..close];
            remaining = &rest[close + 1..];

            if let Some(filter) = content
                .strip_prefix("?(")
                .and_then(|c| c.strip_suffix(')'))
            {
                current = apply_filter(current, filter, raw_path)?;
            } else if content == "-" {
                current = apply_dash(current);
            } else {
                let index: i64 = content.parse().map_err(|_| PatchError::InvalidPath {
                    path: raw_path.to_string(),
                    message: format!("unsupported array index {:?}", content),
                })?;
                current = apply_index(current, index, raw_path)?;
            }
        } else {
            let (token, rest) = match remaining.find('[') {
                Some(at) => (&remaining[..at], &remaining[at..]),
                None => (remaining, ""),
            };
            remaining = rest;
            if token.is_empty() {
                continue;
            }
            if let Ok(index) = token.parse::<i64>() {
                current = apply_index(current, index, raw_path)?;
            } else {
                current = apply_key(current, token, raw_path)?;
            }
        }
    }

    Ok(current)
}

/// Traverse an object key for every state. Traversing through an absent key
/// or null yields a state with no value, so `add` can create it later.
fn apply_key<'a>(
    states: Vec<PathState<'a>>,
    key: &str,
    raw_path: &str,
) -> Result<Vec<PathState<'a>>, PatchError> {
    let mut next = Vec::with_capacity(states.len());
    for state in states {
        let child = match state.value {
            Some(JsonValue::Object(map)) => map.get(key),
            Some(JsonValue::Null) | None => None,
            Some(other) => {
                return Err(PatchError::InvalidPath {
                    path: raw_path.to_string(),
                    message: format!(
                        "segment {:?} expects an object, found {}",
                        key,
                        kind_of(other)
                    ),
                });
            }
        };
        next.push(PathState {
            pointer: extend(&state.pointer, key.to_string()),
            value: child,
        });
    }
    Ok(next)
}

/// Traverse an array index for every state. Out of bounds is an error.
fn apply_index<'a>(
    states: Vec<PathState<'a>>,
    index: i64,
    raw_path: &str,
) -> Result<Vec<PathState<'a>>, PatchError> {
    let mut next = Vec::with_capacity(states.len());
    for state in states {
        let items = match state.value {
            Some(JsonValue::Array(items)) => items,
            other => {
                return Err(PatchError::InvalidPath {
                    path: raw_path.to_string(),
                    message: format!(
                        "index segment expects an array, found {}",
                        other.map(kind_of).unwrap_or("nothing")
                    ),
                });
            }
        };
        let element = usize::try_from(index).ok().and_then(|i| items.get(i));
        let Some(element) = element else {
            return Err(PatchError::OutOfBounds {
                index,
                segment: index.to_string(),
            });
        };
        next.push(PathState {
            pointer: extend(&state.pointer, index.to_string()),
            value: Some(element),
        });
    }
    Ok(next)
}

/// Append the end-of-array marker to every state.
fn apply_dash(states: Vec<PathState<'_>>) -> Vec<PathState<'_>> {
    states
        .into_iter()
        .map(|state| PathState {
            pointer: extend(&state.pointer, "-".to_string()),
            value: None,
        })
        .collect()
}

/// Fan each array state out to the elements matching the filter. States
/// that are not arrays (or are empty) simply drop out of the frontier.
fn apply_filter<'a>(
    states: Vec<PathState<'a>>,
    expr: &str,
    raw_path: &str,
) -> Result<Vec<PathState<'a>>, PatchError> {
    let captures = FILTER_EXPR
        .captures(expr.trim())
        .ok_or_else(|| PatchError::InvalidPath {
            path: raw_path.to_string(),
            message: format!("unsupported filter expression: {}", expr),
        })?;
    let field_path: Vec<&str> = captures[1].split('.').collect();
    let expected = captures[2].to_string();

    let mut next = Vec::new();
    for state in states {
        let Some(JsonValue::Array(items)) = state.value else {
            continue;
        };
        for (index, item) in items.iter().enumerate() {
            if matches_filter(item, &field_path, &expected) {
                next.push(PathState {
                    pointer: extend(&state.pointer, index.to_string()),
                    value: Some(item),
                });
            }
        }
    }
    Ok(next)
}

/// Equality filter match: navigate the field path, then compare the
/// stringified leaf against the quoted literal. A missing field or a
/// non-object along the way is a non-match, never an error.
fn matches_filter(item: &JsonValue, field_path: &[&str], expected: &str) -> bool {
    let mut current = item;
    for segment in field_path {
        match current {
            JsonValue::Object(map) => match map.get(*segment) {
                Some(child) => current = child,
                None => return false,
            },
            _ => return false,
        }
    }
    match current {
        JsonValue::Null => expected.is_empty(),
        JsonValue::String(s) => s == expected,
        JsonValue::Bool(b) => b.to_string() == expected,
        JsonValue::Number(n) => n.to_string() == expected,
        // Containers never match a quoted literal.
        JsonValue::Array(_) | JsonValue::Object(_) => false,
    }
}

fn extend(base: &[String], segment: String) -> Vec<String> {
    let mut next = Vec::with_capacity(base.len() + 1);
    next.extend_from_slice(base);
    next.push(segment);
    next
}

/// Assemble segments into an RFC 6901 pointer, escaping `~` and `/`. The
/// append marker is written through unescaped.
fn build_pointer(segments: &[String]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        if segment == "-" {
            out.push('-');
        } else {
            out.push_str(&escape_segment(segment));
        }
    }
    out
}

/// RFC 6901 escaping. `~` first, then `/`, to avoid double-escaping.
fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// RFC 6901 unescaping. `/` first, then `~`, reversing the encoding.
pub(crate) fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Split a concrete JSON Pointer into unescaped segments.
pub(crate) fn split_pointer(pointer: &str) -> Vec<String> {
    let trimmed = pointer.strip_prefix('/').unwrap_or(pointer);
    if trimmed.is_empty() {
        if pointer.is_empty() {
            return Vec::new();
        }
        return vec![String::new()];
    }
    trimmed
        .split('/')
        .map(|segment| {
            if segment == "-" {
                segment.to_string()
            } else {
                unescape_segment(segment)
            }
        })
        .collect()
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
