//! [`ChartBuilder`] for packaged chart fixtures.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// Builds a packaged chart (`.tgz`) in memory.
///
/// Every file is placed under a root directory named after the chart, the
/// way `helm package` lays archives out.
///
/// # Example
///
/// ```rust
/// use helm_test_utils::ChartBuilder;
///
/// let bytes = ChartBuilder::new("alertmanager", "1.2.0")
///     .values("replicaCount: 1\n")
///     .notes("Thanks for installing!\n")
///     .build();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ChartBuilder {
    name: String,
    version: String,
    api_version: String,
    app_version: Option<String>,
    dependencies: Vec<(String, String, Option<String>)>,
    files: Vec<(String, Vec<u8>)>,
    subcharts: Vec<ChartBuilder>,
    subchart_archives: Vec<ChartBuilder>,
}

impl ChartBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            api_version: "v2".to_string(),
            app_version: None,
            dependencies: Vec::new(),
            files: Vec::new(),
            subcharts: Vec::new(),
            subchart_archives: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn api_version(mut self, api_version: &str) -> Self {
        self.api_version = api_version.to_string();
        self
    }

    pub fn app_version(mut self, app_version: &str) -> Self {
        self.app_version = Some(app_version.to_string());
        self
    }

    /// Declare a dependency in the generated `Chart.yaml`.
    pub fn dependency(mut self, name: &str, version: &str, repository: Option<&str>) -> Self {
        self.dependencies.push((
            name.to_string(),
            version.to_string(),
            repository.map(str::to_string),
        ));
        self
    }

    pub fn values(self, values: impl Into<String>) -> Self {
        self.file("values.yaml", values)
    }

    pub fn schema(self, schema: impl Into<String>) -> Self {
        self.file("values.schema.json", schema)
    }

    pub fn notes(self, notes: impl Into<String>) -> Self {
        self.file("templates/NOTES.txt", notes)
    }

    /// Add an arbitrary file relative to the chart root.
    ///
    /// A `Chart.yaml` added here replaces the generated one.
    pub fn file(mut self, path: &str, content: impl Into<String>) -> Self {
        self.files.push((path.to_string(), content.into().into_bytes()));
        self
    }

    /// Bundle a sub-chart unpacked under `charts/<name>/`.
    pub fn subchart(mut self, chart: ChartBuilder) -> Self {
        self.subcharts.push(chart);
        self
    }

    /// Bundle a sub-chart as `charts/<name>-<version>.tgz`.
    pub fn subchart_archive(mut self, chart: ChartBuilder) -> Self {
        self.subchart_archives.push(chart);
        self
    }

    /// Archive file name, `<name>-<version>.tgz`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.tgz", self.name, self.version)
    }

    /// Generated `Chart.yaml` contents.
    pub fn chart_yaml(&self) -> String {
        let mut out = format!(
            "apiVersion: {}\nname: {}\nversion: {}\n",
            self.api_version, self.name, self.version
        );
        if let Some(app_version) = &self.app_version {
            out.push_str(&format!("appVersion: \"{app_version}\"\n"));
        }
        out.push_str(&format!("description: A Helm chart for {}\n", self.name));
        if !self.dependencies.is_empty() {
            out.push_str("dependencies:\n");
            for (name, version, repository) in &self.dependencies {
                out.push_str(&format!("  - name: {name}\n    version: \"{version}\"\n"));
                if let Some(repository) = repository {
                    out.push_str(&format!("    repository: \"{repository}\"\n"));
                }
            }
        }
        out
    }

    /// Files relative to the chart root, sub-charts included.
    fn entries(&self) -> Vec<(String, Vec<u8>)> {
        let mut entries = Vec::new();
        if !self.files.iter().any(|(path, _)| path == "Chart.yaml") {
            entries.push(("Chart.yaml".to_string(), self.chart_yaml().into_bytes()));
        }
        entries.extend(self.files.iter().cloned());

        for sub in &self.subcharts {
            for (path, data) in sub.entries() {
                entries.push((format!("charts/{}/{path}", sub.name), data));
            }
        }
        for sub in &self.subchart_archives {
            entries.push((format!("charts/{}", sub.file_name()), sub.build()));
        }
        entries
    }

    /// Build the gzip-compressed tarball.
    pub fn build(&self) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut tar = tar::Builder::new(encoder);

        for (path, data) in self.entries() {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, format!("{}/{path}", self.name), data.as_slice())
                .unwrap();
        }

        let mut encoder = tar.into_inner().unwrap();
        encoder.flush().unwrap();
        encoder.finish().unwrap()
    }
}

/// Lowercase hex sha256 of `bytes`, as found in index `digest` fields.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
