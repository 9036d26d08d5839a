//! Path navigation over parsed values
//!
//! # Path Syntax
//!
//! - Dot-separated keys: `image.repository`
//! - A leading dot is ignored: `.image.repository`
//! - Sequence indexing: `ingress.hosts[0].host`
//! - Bracket-quoted keys for keys containing dots: `podLabels["app.kubernetes.io/name"]`
//!
//! # Examples
//!
//! ```
//! use helm_chart::navigate::{navigate, parse_path, PathSegment};
//!
//! let path = parse_path(".image.tag").unwrap();
//! assert_eq!(path, vec![
//!     PathSegment::Key("image".to_string()),
//!     PathSegment::Key("tag".to_string()),
//! ]);
//!
//! let values: serde_yaml::Value = serde_yaml::from_str("image:\n  tag: v1\n").unwrap();
//! let tag = navigate(&values, ".image.tag").unwrap();
//! assert_eq!(tag.as_str(), Some("v1"));
//! ```

use serde_yaml::Value;

use crate::{Error, Result};

/// A segment of a path - either a key or a sequence index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A key in a mapping (e.g., "image" in ".image.tag")
    Key(String),
    /// An index in a sequence (e.g., 0 in `hosts[0]`)
    Index(usize),
}

/// Parse a path string into segments.
///
/// Empty segments (leading, trailing or doubled dots) are skipped. Brackets
/// must be closed and contain either a non-negative integer or a quoted key.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let invalid = |reason: &str| Error::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    let mut current_key = String::new();
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if !current_key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                }
            }
            '[' => {
                if !current_key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current_key)));
                }

                let mut inner = String::new();
                let mut closed = false;
                let mut quoted = false;
                let mut quote: Option<char> = None;
                for ch in chars.by_ref() {
                    match (quote, ch) {
                        (None, ']') => {
                            closed = true;
                            break;
                        }
                        (None, '"' | '\'') if inner.is_empty() && !quoted => {
                            quote = Some(ch);
                            quoted = true;
                        }
                        (Some(q), c) if c == q => quote = None,
                        _ => inner.push(ch),
                    }
                }
                if !closed || quote.is_some() {
                    return Err(invalid("unclosed '['"));
                }

                if quoted {
                    segments.push(PathSegment::Key(inner));
                } else {
                    let index = inner
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| invalid("sequence index must be a non-negative integer"))?;
                    segments.push(PathSegment::Index(index));
                }
            }
            ']' => return Err(invalid("unexpected ']'")),
            _ => current_key.push(ch),
        }
    }

    if !current_key.is_empty() {
        segments.push(PathSegment::Key(current_key));
    }

    Ok(segments)
}

/// Get the subtree at `segments`.
///
/// Returns `None` when a key is missing, an index is out of range, or a
/// segment addresses into a scalar.
pub fn get_at_path<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value);
    };

    let next_value = match (first, untag(value)) {
        (PathSegment::Key(key), Value::Mapping(map)) => map.get(key.as_str())?,
        (PathSegment::Index(idx), Value::Sequence(seq)) => seq.get(*idx)?,
        _ => return None,
    };

    get_at_path(next_value, rest)
}

/// Navigate to `path`, failing with [`Error::PathNotFound`].
pub fn navigate<'a>(value: &'a Value, path: &str) -> Result<&'a Value> {
    let segments = parse_path(path)?;
    get_at_path(value, &segments).ok_or_else(|| Error::PathNotFound {
        path: path.to_string(),
    })
}

/// Serialize a subtree back to YAML text.
pub fn to_yaml(value: &Value) -> Result<String> {
    serde_yaml::to_string(value).map_err(|e| Error::parse("values.yaml", e))
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}
