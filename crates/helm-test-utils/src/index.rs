//! [`IndexBuilder`] for repository index fixtures.

use serde_yaml::{Mapping, Value};

/// One version entry in a repository index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
    pub created: Option<String>,
    pub deprecated: bool,
    pub digest: Option<String>,
    pub urls: Vec<String>,
}

impl IndexEntry {
    /// An entry whose single URL is the relative `<name>-<version>.tgz`.
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            app_version: None,
            description: None,
            created: None,
            deprecated: false,
            digest: None,
            urls: vec![format!("{name}-{version}.tgz")],
        }
    }

    pub fn app_version(mut self, app_version: &str) -> Self {
        self.app_version = Some(app_version.to_string());
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn created(mut self, created: &str) -> Self {
        self.created = Some(created.to_string());
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn digest(mut self, digest: &str) -> Self {
        self.digest = Some(digest.to_string());
        self
    }

    pub fn urls(mut self, urls: &[&str]) -> Self {
        self.urls = urls.iter().map(|u| u.to_string()).collect();
        self
    }

    fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        let mut put = |key: &str, value: Value| {
            map.insert(Value::String(key.to_string()), value);
        };
        put("apiVersion", "v2".into());
        put("name", self.name.clone().into());
        put("version", self.version.clone().into());
        if let Some(app_version) = &self.app_version {
            put("appVersion", app_version.clone().into());
        }
        if let Some(description) = &self.description {
            put("description", description.clone().into());
        }
        if let Some(created) = &self.created {
            put("created", created.clone().into());
        }
        if self.deprecated {
            put("deprecated", true.into());
        }
        if let Some(digest) = &self.digest {
            put("digest", digest.clone().into());
        }
        put(
            "urls",
            Value::Sequence(self.urls.iter().cloned().map(Value::String).collect()),
        );
        Value::Mapping(map)
    }
}

/// Builds an `index.yaml` document.
///
/// Entries for the same chart keep the order they were added in.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    entries: Vec<IndexEntry>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: IndexEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    pub fn to_yaml(&self) -> String {
        let mut charts = Mapping::new();
        for entry in &self.entries {
            let key = Value::String(entry.name.clone());
            if !charts.contains_key(&key) {
                charts.insert(key.clone(), Value::Sequence(Vec::new()));
            }
            if let Some(Value::Sequence(versions)) = charts.get_mut(&key) {
                versions.push(entry.to_value());
            }
        }

        let mut root = Mapping::new();
        root.insert("apiVersion".into(), "v1".into());
        root.insert("entries".into(), Value::Mapping(charts));
        root.insert("generated".into(), "2024-06-01T00:00:00Z".into());
        serde_yaml::to_string(&Value::Mapping(root)).unwrap()
    }
}
