//! YAML helpers shared by chart metadata and repository index parsing.

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// Render a scalar node as a string.
///
/// Chart authors regularly write `version: 1.0` or `appVersion: 2`, which YAML
/// parses as numbers. Those are accepted and rendered back as text.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        Value::Null | Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

/// Deserialize an optional scalar as a string, mapping empty strings to `None`.
pub fn optional_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(scalar_to_string)
        .filter(|s| !s.trim().is_empty()))
}

/// Deserialize a scalar as a string, defaulting to empty.
pub fn scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_scalar(deserializer)?.unwrap_or_default())
}
