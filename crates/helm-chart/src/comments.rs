//! Key comments in values files
//!
//! `serde_yaml` drops comments, so they are recovered with a line scan over
//! the block-style YAML chart authors write. Every mapping key outside a
//! sequence is paired with the first meaningful line of the comment block
//! directly above it, or failing that its trailing inline comment. Helm-docs
//! `-- ` prefixes are removed and `@schema` annotation blocks are skipped.
//!
//! The same scan runs over rendered output to put the comments back.

use std::collections::HashMap;

/// Mapping keys from the document root down to a key.
pub type KeyPath = Vec<String>;

/// First-line comments keyed by the path of the key they describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyComments {
    by_path: HashMap<KeyPath, String>,
}

impl KeyComments {
    /// Collect key comments from YAML source text.
    pub fn extract(text: &str) -> Self {
        let mut by_path = HashMap::new();
        for key in scan(text) {
            let comment = first_meaningful(&key.head)
                .or_else(|| key.inline.and_then(|c| first_meaningful(&[c])));
            if let Some(comment) = comment {
                by_path.insert(key.path, comment);
            }
        }
        Self { by_path }
    }

    pub fn get(&self, path: &[String]) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Comments below `prefix`, with paths made relative to it.
    pub fn under(&self, prefix: &[String]) -> Self {
        let by_path = self
            .by_path
            .iter()
            .filter(|(path, _)| path.len() > prefix.len() && path.starts_with(prefix))
            .map(|(path, comment)| (path[prefix.len()..].to_vec(), comment.clone()))
            .collect();
        Self { by_path }
    }
}

/// Write `# comment` lines above the keys of block YAML `text`.
///
/// Keys for which `skip` returns true are left bare.
pub fn annotate(text: &str, comments: &KeyComments, skip: impl Fn(&[String]) -> bool) -> String {
    if comments.is_empty() {
        return text.to_string();
    }

    let mut above: HashMap<usize, (usize, &str)> = HashMap::new();
    for key in scan(text) {
        if skip(&key.path) {
            continue;
        }
        if let Some(comment) = comments.get(&key.path) {
            above.insert(key.line, (key.indent, comment));
        }
    }

    let mut out = String::with_capacity(text.len() + above.len() * 32);
    for (line, raw) in text.split_inclusive('\n').enumerate() {
        if let Some((indent, comment)) = above.get(&line) {
            out.push_str(&" ".repeat(*indent));
            out.push_str("# ");
            out.push_str(comment);
            out.push('\n');
        }
        out.push_str(raw);
    }
    out
}

/// A mapping key line that is not nested in a sequence.
struct KeyLine<'a> {
    line: usize,
    indent: usize,
    path: KeyPath,
    /// Comment lines directly above, without the leading `#`
    head: Vec<&'a str>,
    inline: Option<&'a str>,
}

enum Frame {
    Key { indent: usize, key: String },
    Sequence { indent: usize },
}

impl Frame {
    fn indent(&self) -> usize {
        match self {
            Frame::Key { indent, .. } | Frame::Sequence { indent } => *indent,
        }
    }
}

fn scan(text: &str) -> Vec<KeyLine<'_>> {
    let mut keys = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    // Column of the key or dash that opened a block scalar
    let mut block: Option<usize> = None;

    for (line, raw) in text.lines().enumerate() {
        let trimmed = raw.trim_start();
        let indent = raw.len() - trimmed.len();

        if let Some(opener) = block {
            if trimmed.is_empty() || indent > opener {
                continue;
            }
            block = None;
        }
        if trimmed.is_empty() || trimmed == "---" || trimmed == "..." {
            pending.clear();
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            pending.push(comment);
            continue;
        }
        let head = std::mem::take(&mut pending);

        if trimmed == "-" || trimmed.starts_with("- ") {
            while frames.last().is_some_and(|f| f.indent() > indent) {
                frames.pop();
            }
            if !matches!(frames.last(), Some(Frame::Sequence { indent: i }) if *i == indent) {
                frames.push(Frame::Sequence { indent });
            }
            let item = trimmed[1..].trim_start();
            let item_column = indent + (trimmed.len() - item.len());
            match split_key(item) {
                Some((_, rest)) if is_block_scalar(split_inline_comment(rest).0) => {
                    block = Some(item_column);
                }
                None if is_block_scalar(split_inline_comment(item).0) => block = Some(indent),
                _ => {}
            }
            continue;
        }

        let Some((key, rest)) = split_key(trimmed) else {
            continue;
        };
        while frames.last().is_some_and(|f| f.indent() >= indent) {
            frames.pop();
        }
        let (value, inline) = split_inline_comment(rest);
        if is_block_scalar(value) {
            block = Some(indent);
        }

        let in_sequence = frames.iter().any(|f| matches!(f, Frame::Sequence { .. }));
        if !in_sequence {
            let mut path: KeyPath = frames
                .iter()
                .filter_map(|f| match f {
                    Frame::Key { key, .. } => Some(key.clone()),
                    Frame::Sequence { .. } => None,
                })
                .collect();
            path.push(key.clone());
            keys.push(KeyLine {
                line,
                indent,
                path,
                head,
                inline,
            });
        }
        frames.push(Frame::Key { indent, key });
    }
    keys
}

/// Split `key: rest` into the unquoted key and the text after the colon.
fn split_key(s: &str) -> Option<(String, &str)> {
    let (key, after) = match s.chars().next()? {
        quote @ ('"' | '\'') => {
            let close = closing_quote(s, quote)?;
            (unquote(&s[1..close], quote), &s[close + 1..])
        }
        '[' | '{' | '?' | '&' | '*' | '!' | '|' | '>' | '%' | '@' | '`' => return None,
        _ => {
            let bytes = s.as_bytes();
            let colon = (0..bytes.len()).find(|&i| {
                bytes[i] == b':' && bytes.get(i + 1).is_none_or(|b| *b == b' ' || *b == b'\t')
            })?;
            if s[..colon].contains(" #") {
                return None;
            }
            (s[..colon].trim_end().to_string(), &s[colon..])
        }
    };
    let rest = after.strip_prefix(':')?;
    if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
        return None;
    }
    Some((key, rest.trim_start()))
}

fn closing_quote(s: &str, quote: char) -> Option<usize> {
    let mut chars = s.char_indices().skip(1).peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if quote == '"' => {
                chars.next();
            }
            c if c == quote => {
                if quote == '\'' && chars.peek().is_some_and(|(_, next)| *next == '\'') {
                    chars.next();
                    continue;
                }
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

fn unquote(inner: &str, quote: char) -> String {
    match quote {
        '\'' => inner.replace("''", "'"),
        _ => inner.replace("\\\"", "\"").replace("\\\\", "\\"),
    }
}

/// Split a value from a trailing `# comment` that sits outside quotes.
fn split_inline_comment(rest: &str) -> (&str, Option<&str>) {
    if let Some(comment) = rest.strip_prefix('#') {
        return ("", Some(comment));
    }
    let mut quote: Option<char> = None;
    let mut prev = ' ';
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') if prev == ' ' => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '#') if prev == ' ' || prev == '\t' => {
                return (rest[..i].trim_end(), Some(&rest[i + 1..]));
            }
            _ => {}
        }
        prev = c;
    }
    (rest, None)
}

fn is_block_scalar(value: &str) -> bool {
    value.starts_with('|') || value.starts_with('>')
}

/// First line of a comment block worth showing.
fn first_meaningful(lines: &[&str]) -> Option<String> {
    let mut in_schema = false;
    for line in lines {
        let line = line.trim().trim_start_matches('#').trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("@schema") {
            in_schema = !in_schema;
            continue;
        }
        if in_schema {
            continue;
        }
        return Some(line.strip_prefix("-- ").unwrap_or(line).to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn path(keys: &[&str]) -> KeyPath {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn helm_docs_comments_are_attached_to_their_keys() {
        let comments = KeyComments::extract(
            "# -- Number of replicas\nreplicaCount: 1\nimage:\n  # -- Image tag\n  tag: v1\n",
        );
        assert_eq!(comments.get(&path(&["replicaCount"])), Some("Number of replicas"));
        assert_eq!(comments.get(&path(&["image", "tag"])), Some("Image tag"));
        assert_eq!(comments.get(&path(&["image"])), None);
        assert_eq!(comments.len(), 2);
    }

    #[test]
    fn same_key_in_different_sections_does_not_collide() {
        let comments = KeyComments::extract(
            "redis:\n  # Enable redis caching\n  enabled: true\npostgresql:\n  # Enable postgresql database\n  enabled: false\n",
        );
        assert_eq!(comments.get(&path(&["redis", "enabled"])), Some("Enable redis caching"));
        assert_eq!(
            comments.get(&path(&["postgresql", "enabled"])),
            Some("Enable postgresql database")
        );
    }

    #[rstest]
    #[case::schema_block(
        "# @schema\n# type: object\n# @schema\n# -- Enable the service\nservice:\n  enabled: true\n",
        "Enable the service"
    )]
    #[case::first_line_only(
        "# -- Main description line\n# Additional detail\nservice: {}\n",
        "Main description line"
    )]
    #[case::inline("service: {} # the service\n", "the service")]
    #[case::double_hash("## Service settings\nservice: {}\n", "Service settings")]
    fn comment_text_is_cleaned(#[case] text: &str, #[case] expected: &str) {
        let comments = KeyComments::extract(text);
        assert_eq!(comments.get(&path(&["service"])), Some(expected));
    }

    #[test]
    fn blank_line_detaches_a_comment() {
        let comments = KeyComments::extract("# Section banner\n\nname: demo\n");
        assert!(comments.is_empty());
    }

    #[test]
    fn quoted_keys_and_hashes_in_values() {
        let comments = KeyComments::extract(
            "# Comment on dotted key\n\"a.b\": nested\n# Colour\ncolor: \"#ff0000\"\nurl: http://x/#frag\n",
        );
        assert_eq!(comments.get(&path(&["a.b"])), Some("Comment on dotted key"));
        assert_eq!(comments.get(&path(&["color"])), Some("Colour"));
        assert_eq!(comments.get(&path(&["url"])), None);
    }

    #[test]
    fn block_scalars_and_sequences_are_skipped() {
        let text = "\
config: |
  # not a comment
  key: value
ingress:
  hosts:
    # -- Host entry
    - host: example.com
      paths: []
  # -- TLS settings
  tls: []
";
        let comments = KeyComments::extract(text);
        assert_eq!(comments.get(&path(&["config", "key"])), None);
        assert_eq!(comments.get(&path(&["ingress", "tls"])), Some("TLS settings"));
        assert_eq!(comments.len(), 1);
    }

    #[test]
    fn unindented_sequences_keep_their_parent() {
        let comments = KeyComments::extract("hosts:\n- a\n- b\n# -- Next key\nnext: 1\n");
        assert_eq!(comments.get(&path(&["next"])), Some("Next key"));
    }

    #[test]
    fn under_reroots_paths() {
        let comments = KeyComments::extract("image:\n  # -- Image tag\n  tag: v1\n# Top\ntop: 1\n");
        let image = comments.under(&path(&["image"]));
        assert_eq!(image.get(&path(&["tag"])), Some("Image tag"));
        assert_eq!(image.len(), 1);
    }

    #[test]
    fn annotate_writes_comments_above_keys() {
        let comments = KeyComments::extract("# Replicas\nreplicas: 1\nservice:\n  # Port\n  port: 80\n");
        let text = annotate("replicas: 1\nservice:\n  port: 80\n", &comments, |_| false);
        assert_eq!(text, "# Replicas\nreplicas: 1\nservice:\n  # Port\n  port: 80\n");

        let skipped = annotate("replicas: 1\n", &comments, |p| p == ["replicas"]);
        assert_eq!(skipped, "replicas: 1\n");
    }
}
