//! A chart's `values.yaml` as text, tree and key comments

use serde_yaml::Value;

use crate::collapse::{render_within_budget, CollapseOptions, Rendered};
use crate::comments::KeyComments;
use crate::navigate::{get_at_path, parse_path, PathSegment};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ValuesDocument {
    text: String,
    value: Value,
    comments: KeyComments,
}

impl ValuesDocument {
    /// Parse values text. An empty document is an empty mapping.
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        let value: Value = serde_yaml::from_str(&text).map_err(|e| Error::parse("values.yaml", e))?;
        let value = match value {
            Value::Null => Value::Mapping(Default::default()),
            other => other,
        };
        let comments = KeyComments::extract(&text);
        Ok(Self {
            text,
            value,
            comments,
        })
    }

    /// Source text, comments included.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn comments(&self) -> &KeyComments {
        &self.comments
    }

    /// Render the document, or the subtree at `path`, within `budget` bytes
    /// less `reserved`.
    ///
    /// The whole document with nothing limited or hidden is the source text
    /// as written.
    pub fn render(
        &self,
        path: Option<&str>,
        opts: CollapseOptions,
        reserved: usize,
        budget: usize,
    ) -> Result<Rendered> {
        let Some(path) = path else {
            let verbatim = opts.is_unlimited() && opts.show_defaults && opts.show_comments;
            if verbatim && self.text.len() + reserved <= budget {
                return Ok(Rendered {
                    text: self.text.clone(),
                    collapsed: false,
                });
            }
            return render_within_budget(&self.value, &self.comments, opts, reserved, budget);
        };

        let segments = parse_path(path)?;
        let subtree = get_at_path(&self.value, &segments).ok_or_else(|| Error::PathNotFound {
            path: path.to_string(),
        })?;
        let comments = key_prefix(&segments)
            .map(|prefix| self.comments.under(&prefix))
            .unwrap_or_default();
        render_within_budget(subtree, &comments, opts, reserved, budget)
    }
}

/// The segments as mapping keys, if none is a sequence index.
fn key_prefix(segments: &[PathSegment]) -> Option<Vec<String>> {
    segments
        .iter()
        .map(|segment| match segment {
            PathSegment::Key(key) => Some(key.clone()),
            PathSegment::Index(_) => None,
        })
        .collect()
}
