//! Depth-limited rendering of values
//!
//! Large values files are rendered with nested structures summarised, so a
//! caller can see the shape of the configuration first and drill into a
//! `path` afterwards. For `{ a: { b: { c: 1 } } }`:
//!
//! ```text
//! max_depth = 0   full YAML
//! max_depth = 1   a: object (1 key)
//! max_depth = 2   a:
//!                   b: object (1 key)
//! max_depth = 3   full expansion down to c: 1
//! ```
//!
//! Unless a caller asks otherwise, two levels and three sequence items are
//! shown.

use std::collections::HashSet;

use serde_yaml::{Mapping, Value};

use crate::comments::{annotate, KeyComments, KeyPath};
use crate::yaml::scalar_to_string;
use crate::{Error, Result};

/// Depth the renderer starts from when it must shrink an unlimited rendering.
pub const BUDGET_START_DEPTH: usize = 4;
/// Nesting levels expanded when the caller does not choose.
pub const DEFAULT_MAX_DEPTH: usize = 2;
/// Sequence items kept when the caller does not choose.
pub const DEFAULT_MAX_ARRAY_ITEMS: usize = 3;

/// Controls how values are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseOptions {
    /// Nesting levels to expand before summarising; 0 is unlimited.
    pub max_depth: usize,
    /// Sequence items to keep before truncating; 0 is unlimited.
    pub max_array_items: usize,
    /// Render scalar values; otherwise only their type names.
    pub show_defaults: bool,
    /// Write each key's comment above it.
    pub show_comments: bool,
}

impl Default for CollapseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_array_items: DEFAULT_MAX_ARRAY_ITEMS,
            show_defaults: true,
            show_comments: false,
        }
    }
}

impl CollapseOptions {
    /// Neither depth nor sequence length is limited.
    pub fn is_unlimited(&self) -> bool {
        self.max_depth == 0 && self.max_array_items == 0
    }
}

/// Output of [`render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Whether anything was summarised or truncated.
    pub collapsed: bool,
}

/// Render `value` as YAML with the given options.
///
/// `comments` are keyed relative to `value` and only used with
/// [`CollapseOptions::show_comments`]. Entries that end up summarised do not
/// get their comment.
pub fn render(value: &Value, comments: &KeyComments, opts: CollapseOptions) -> Result<Rendered> {
    let mut collapser = Collapser {
        opts,
        collapsed: false,
        summarised: HashSet::new(),
    };
    let text = if opts.is_unlimited() && opts.show_defaults {
        to_yaml(value)?
    } else {
        let tree = collapser.collapse(value, 0, Some(&Vec::new()));
        to_yaml(&tree)?
    };

    let text = if opts.show_comments {
        annotate(&text, comments, |path| collapser.summarised.contains(path))
    } else {
        text
    };
    Ok(Rendered {
        text,
        collapsed: collapser.collapsed,
    })
}

/// Render `value` so that it plus `reserved` bytes fit in `budget`.
///
/// If the first rendering is too large the depth is reduced one level at a
/// time (from [`BUDGET_START_DEPTH`] when unlimited) down to 1. Still too
/// large at depth 1 is [`Error::OutputTooLarge`].
pub fn render_within_budget(
    value: &Value,
    comments: &KeyComments,
    mut opts: CollapseOptions,
    reserved: usize,
    budget: usize,
) -> Result<Rendered> {
    let mut rendered = render(value, comments, opts)?;
    let fits = |r: &Rendered| r.text.len() + reserved <= budget;
    if fits(&rendered) {
        return Ok(rendered);
    }

    let mut depth = match opts.max_depth {
        0 => BUDGET_START_DEPTH + 1,
        d => d,
    };
    while depth > 1 {
        depth -= 1;
        opts.max_depth = depth;
        rendered = render(value, comments, opts)?;
        tracing::debug!(depth, bytes = rendered.text.len(), "Reduced values depth");
        if fits(&rendered) {
            return Ok(rendered);
        }
    }

    Err(Error::OutputTooLarge {
        file: "values.yaml".to_string(),
        size: (rendered.text.len() + reserved) as u64,
        limit: budget as u64,
    })
}

struct Collapser {
    opts: CollapseOptions,
    collapsed: bool,
    /// Key paths, outside sequences, whose value became a summary
    summarised: HashSet<KeyPath>,
}

impl Collapser {
    fn collapse(&mut self, value: &Value, level: usize, path: Option<&KeyPath>) -> Value {
        let opts = self.opts;
        let summarise = level > 0 && opts.max_depth > 0 && level >= opts.max_depth;

        match value {
            Value::Mapping(map) if !map.is_empty() => {
                if summarise {
                    return self.summary(path, summarize_mapping(map.len()));
                }
                let mut out = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    let child = path.zip(scalar_to_string(k)).map(|(p, key)| {
                        let mut child = p.clone();
                        child.push(key);
                        child
                    });
                    out.insert(k.clone(), self.collapse(v, level + 1, child.as_ref()));
                }
                Value::Mapping(out)
            }
            Value::Sequence(seq) if !seq.is_empty() => {
                if summarise {
                    return self.summary(path, summarize_sequence(seq.len()));
                }
                let keep = match opts.max_array_items {
                    0 => seq.len(),
                    n => n.min(seq.len()),
                };
                let mut out: Vec<Value> = seq[..keep]
                    .iter()
                    .map(|item| self.collapse(item, level + 1, None))
                    .collect();
                if keep < seq.len() {
                    self.collapsed = true;
                    out.push(Value::String(format!("... ({} more items)", seq.len() - keep)));
                }
                Value::Sequence(out)
            }
            Value::Tagged(tagged) => self.collapse(&tagged.value, level, path),
            other if !opts.show_defaults => type_name(other),
            other => other.clone(),
        }
    }

    fn summary(&mut self, path: Option<&KeyPath>, text: String) -> Value {
        self.collapsed = true;
        if let Some(path) = path {
            self.summarised.insert(path.clone());
        }
        Value::String(text)
    }
}

fn type_name(value: &Value) -> Value {
    match value {
        Value::Bool(_) => Value::String("boolean".to_string()),
        Value::Number(_) => Value::String("number".to_string()),
        Value::String(_) => Value::String("string".to_string()),
        other => other.clone(),
    }
}

fn summarize_mapping(len: usize) -> String {
    match len {
        1 => "object (1 key)".to_string(),
        n => format!("object ({n} keys)"),
    }
}

fn summarize_sequence(len: usize) -> String {
    match len {
        1 => "array (1 item)".to_string(),
        n => format!("array ({n} items)"),
    }
}

fn to_yaml(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        other => serde_yaml::to_string(other).map_err(|e| Error::parse("values.yaml", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn opts(max_depth: usize, max_array_items: usize) -> CollapseOptions {
        CollapseOptions {
            max_depth,
            max_array_items,
            ..CollapseOptions::default()
        }
    }

    fn plain(value: &Value, opts: CollapseOptions) -> Rendered {
        render(value, &KeyComments::default(), opts).unwrap()
    }

    #[rstest]
    #[case(0, "a:\n  b:\n    c: 1\n", false)]
    #[case(1, "a: object (1 key)\n", true)]
    #[case(2, "a:\n  b: object (1 key)\n", true)]
    #[case(3, "a:\n  b:\n    c: 1\n", false)]
    fn depth_levels(#[case] depth: usize, #[case] expected: &str, #[case] collapsed: bool) {
        let rendered = plain(&yaml("a: {b: {c: 1}}"), opts(depth, 0));
        assert_eq!(rendered.text, expected);
        assert_eq!(rendered.collapsed, collapsed);
    }

    #[test]
    fn defaults_expand_two_levels_and_three_items() {
        let value = yaml("a: {b: {c: 1}}\nlist: [1, 2, 3, 4]\n");
        let rendered = plain(&value, CollapseOptions::default());
        assert!(rendered.collapsed);
        let reparsed = yaml(&rendered.text);
        assert_eq!(reparsed["a"]["b"], yaml("object (1 key)"));
        assert_eq!(reparsed["list"], yaml("[1, 2, 3, '... (1 more items)']"));
    }

    #[test]
    fn sequences_are_summarised_and_truncated() {
        let value = yaml("hosts: [a, b, c, d, e]\nnested:\n  list: [1, 2]\n");
        let rendered = plain(&value, opts(1, 0));
        assert_eq!(
            rendered.text,
            "hosts: array (5 items)\nnested: object (1 key)\n"
        );

        let rendered = plain(&value, opts(0, 2));
        assert!(rendered.collapsed);
        let reparsed = yaml(&rendered.text);
        assert_eq!(reparsed["hosts"], yaml("[a, b, '... (3 more items)']"));
        assert_eq!(reparsed["nested"]["list"], yaml("[1, 2]"));
    }

    #[test]
    fn empty_containers_are_kept() {
        let rendered = plain(&yaml("a: {}\nb: []\n"), opts(1, 0));
        assert_eq!(rendered.text, "a: {}\nb: []\n");
        assert!(!rendered.collapsed);
    }

    #[test]
    fn key_order_is_preserved() {
        let rendered = plain(&yaml("zeta: 1\nalpha: 2\nmid: 3\n"), opts(0, 0));
        assert_eq!(rendered.text, "zeta: 1\nalpha: 2\nmid: 3\n");
    }

    #[test]
    fn types_replace_defaults() {
        let value = yaml("name: web\nreplicas: 2\nenabled: true\nextra: null\nports: [80]\n");
        let options = CollapseOptions {
            show_defaults: false,
            ..opts(0, 0)
        };
        let rendered = plain(&value, options);
        assert_eq!(
            rendered.text,
            "name: string\nreplicas: number\nenabled: boolean\nextra: null\nports:\n- number\n"
        );
        assert!(!rendered.collapsed);
    }

    #[test]
    fn comments_are_written_on_expanded_entries_only() {
        let source = "# Replica count\nreplicaCount: 3\n# Service configuration\nservice:\n  # Service type\n  type: ClusterIP\n  port: 80\n";
        let comments = KeyComments::extract(source);
        let value = yaml(source);
        let with_comments = |max_depth| CollapseOptions {
            show_comments: true,
            ..opts(max_depth, 0)
        };

        let rendered = render(&value, &comments, with_comments(1)).unwrap();
        assert_eq!(
            rendered.text,
            "# Replica count\nreplicaCount: 3\nservice: object (2 keys)\n"
        );

        let rendered = render(&value, &comments, with_comments(2)).unwrap();
        assert_eq!(
            rendered.text,
            "# Replica count\nreplicaCount: 3\n# Service configuration\nservice:\n  # Service type\n  type: ClusterIP\n  port: 80\n"
        );

        let hidden = render(&value, &comments, opts(2, 0)).unwrap();
        assert!(!hidden.text.contains('#'));
    }

    #[test]
    fn budget_reduces_depth_until_it_fits() {
        let mut text = String::new();
        for i in 0..50 {
            text.push_str(&format!("section{i}:\n  inner:\n    deep:\n      value: {}\n", "x".repeat(40)));
        }
        let value = yaml(&text);
        let none = KeyComments::default();
        let full = plain(&value, opts(0, 0));

        let rendered = render_within_budget(&value, &none, opts(0, 0), 0, full.text.len() / 2).unwrap();
        assert!(rendered.collapsed);
        assert!(rendered.text.len() <= full.text.len() / 2);
    }

    #[test]
    fn budget_exhausted_at_depth_one() {
        let value = yaml("a: 1\nb: 2\nc: 3\n");
        let err = render_within_budget(&value, &KeyComments::default(), opts(0, 0), 0, 4).unwrap_err();
        assert!(matches!(err, Error::OutputTooLarge { limit: 4, .. }));
    }

    #[test]
    fn reserved_bytes_count_against_budget() {
        let value = yaml("a: 1\n");
        let none = KeyComments::default();
        assert!(render_within_budget(&value, &none, opts(0, 0), 0, 10).is_ok());
        assert!(render_within_budget(&value, &none, opts(0, 0), 10, 10).is_err());
    }
}
