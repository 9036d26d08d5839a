//! Chart metadata and dependency declarations
//!
//! Dependencies are declared in `Chart.yaml` (apiVersion v2) or, for older
//! apiVersion v1 charts, in a separate `requirements.yaml`. A packaged chart
//! may also bundle its dependencies under `charts/`, either unpacked as
//! directories or as nested `.tgz` archives. [`ChartNode`] models that tree so
//! the dependencies of bundled sub-charts can be reported alongside the
//! parent's.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::archive::{read_bytes, read_text, ChartArchive, ExtractLimits, Scan};
use crate::yaml::{optional_scalar, scalar};
use crate::{Error, Result};

/// Nested archives deeper than this are ignored.
const MAX_NESTED_ARCHIVE_DEPTH: usize = 4;

/// A dependency declared by a chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default, deserialize_with = "scalar")]
    pub name: String,

    /// Version constraint, e.g. `8.*` or `>=1.2.0`
    #[serde(default, deserialize_with = "scalar")]
    pub version: String,

    /// Repository reference; absent for dependencies bundled under `charts/`
    #[serde(
        default,
        deserialize_with = "optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub repository: Option<String>,

    #[serde(
        default,
        deserialize_with = "optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub condition: Option<String>,

    #[serde(
        default,
        deserialize_with = "optional_scalar",
        skip_serializing_if = "Option::is_none"
    )]
    pub alias: Option<String>,
}

impl Dependency {
    /// Whether a bundled sub-chart satisfies this declaration.
    fn is_satisfied_by(&self, chart: &ChartMetadata) -> bool {
        if self.name != chart.name {
            return false;
        }
        if self.version == chart.version {
            return true;
        }
        let Ok(version) = semver::Version::parse(chart.version.trim_start_matches('v')) else {
            return false;
        };
        parse_constraint(&self.version).is_some_and(|req| req.matches(&version))
    }
}

/// Parse a chart version constraint.
///
/// Helm separates AND-ed comparators with spaces (`>=1.0.0 <2.0.0`) where
/// semver expects commas, so both spellings are tried.
fn parse_constraint(constraint: &str) -> Option<semver::VersionReq> {
    let constraint = constraint.trim();
    semver::VersionReq::parse(constraint)
        .or_else(|_| {
            let joined = constraint.split_whitespace().collect::<Vec<_>>().join(", ");
            semver::VersionReq::parse(&joined)
        })
        .ok()
}

/// The subset of `Chart.yaml` this server reports on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartMetadata {
    pub api_version: Option<String>,
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default, deserialize_with = "optional_scalar")]
    api_version: Option<String>,
    #[serde(default, deserialize_with = "scalar")]
    name: String,
    #[serde(default, deserialize_with = "scalar")]
    version: String,
    #[serde(default, deserialize_with = "optional_scalar")]
    app_version: Option<String>,
    #[serde(default, deserialize_with = "optional_scalar")]
    description: Option<String>,
    #[serde(default)]
    dependencies: Option<Vec<Dependency>>,
}

#[derive(Debug, Deserialize)]
struct RawRequirements {
    #[serde(default)]
    dependencies: Option<Vec<Dependency>>,
}

impl ChartMetadata {
    /// Parse `Chart.yaml` text.
    pub fn parse(text: &str, file: &str) -> Result<Self> {
        let raw: Option<RawMetadata> =
            serde_yaml::from_str(text).map_err(|e| Error::parse(file, e))?;
        let raw = raw.ok_or_else(|| Error::InvalidMetadata {
            file: file.to_string(),
            message: "document is empty".to_string(),
        })?;

        let dependencies = raw.dependencies.unwrap_or_default();
        validate_dependencies(&dependencies, file)?;

        Ok(Self {
            api_version: raw.api_version,
            name: raw.name,
            version: raw.version,
            app_version: raw.app_version,
            description: raw.description,
            dependencies,
        })
    }

    /// Adopt dependencies from `requirements.yaml` when `Chart.yaml` has none.
    fn merge_requirements(&mut self, text: &str, file: &str) -> Result<()> {
        if !self.dependencies.is_empty() {
            return Ok(());
        }
        let raw: Option<RawRequirements> =
            serde_yaml::from_str(text).map_err(|e| Error::parse(file, e))?;
        let dependencies = raw.and_then(|r| r.dependencies).unwrap_or_default();
        validate_dependencies(&dependencies, file)?;
        self.dependencies = dependencies;
        Ok(())
    }
}

fn validate_dependencies(dependencies: &[Dependency], file: &str) -> Result<()> {
    for (i, dep) in dependencies.iter().enumerate() {
        let message = if dep.name.trim().is_empty() {
            format!("dependency {i} is missing required field: name")
        } else if dep.version.trim().is_empty() {
            format!("dependency {i} ({}) is missing required field: version", dep.name)
        } else {
            continue;
        };
        return Err(Error::InvalidMetadata {
            file: file.to_string(),
            message,
        });
    }
    Ok(())
}

/// A chart together with the sub-charts bundled inside it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartNode {
    pub metadata: ChartMetadata,
    pub subcharts: Vec<ChartNode>,
}

/// Metadata files collected for one chart directory.
#[derive(Debug, Default)]
struct ChartDirFiles {
    chart_yaml: Option<String>,
    requirements: Option<String>,
}

/// What a path inside the archive contributes to the chart tree.
#[derive(Debug, PartialEq, Eq)]
enum TreeFile {
    Metadata,
    Requirements,
    NestedArchive,
}

impl ChartNode {
    /// Load the chart tree from an archive.
    pub fn load(archive: &ChartArchive, limits: ExtractLimits) -> Result<Self> {
        Self::load_nested(archive, limits, 0)
    }

    fn load_nested(archive: &ChartArchive, limits: ExtractLimits, depth: usize) -> Result<Self> {
        let mut dirs: BTreeMap<String, ChartDirFiles> = BTreeMap::new();
        let mut nested: Vec<(String, ChartNode)> = Vec::new();

        archive.scan(|relative, size, reader| {
            let Some((dir, kind)) = classify(relative) else {
                return Ok(Scan::Continue);
            };
            match kind {
                TreeFile::Metadata => {
                    let text = read_text(reader, relative, size, limits.max_file_bytes)?;
                    dirs.entry(dir).or_default().chart_yaml = Some(text);
                }
                TreeFile::Requirements => {
                    let text = read_text(reader, relative, size, limits.max_file_bytes)?;
                    dirs.entry(dir).or_default().requirements = Some(text);
                }
                TreeFile::NestedArchive if depth < MAX_NESTED_ARCHIVE_DEPTH => {
                    let loaded = read_bytes(reader, relative, size, limits.max_nested_archive_bytes)
                        .and_then(|bytes| {
                            Self::load_nested(&ChartArchive::new(bytes), limits, depth + 1)
                        });
                    match loaded {
                        Ok(node) => nested.push((dir, node)),
                        Err(e) => {
                            tracing::warn!(path = relative, error = %e, "Skipping bundled sub-chart")
                        }
                    }
                }
                TreeFile::NestedArchive => {
                    tracing::debug!(path = relative, depth, "Bundled sub-chart nested too deeply");
                }
            }
            Ok(Scan::Continue)
        })?;

        assemble("", &dirs, &mut nested)
    }

    /// Dependencies of this chart, each followed by the dependencies of the
    /// bundled sub-chart that satisfies it.
    pub fn flatten_dependencies(&self) -> Vec<Dependency> {
        let mut out = Vec::with_capacity(self.metadata.dependencies.len());
        for dep in &self.metadata.dependencies {
            out.push(dep.clone());
            if let Some(sub) = self.subcharts.iter().find(|s| dep.is_satisfied_by(&s.metadata)) {
                out.extend(sub.flatten_dependencies());
            }
        }
        out
    }
}

fn assemble(
    prefix: &str,
    dirs: &BTreeMap<String, ChartDirFiles>,
    nested: &mut Vec<(String, ChartNode)>,
) -> Result<ChartNode> {
    let chart_path = join(prefix, "Chart.yaml");
    let files = dirs.get(prefix);
    let chart_yaml = files
        .and_then(|f| f.chart_yaml.as_deref())
        .ok_or_else(|| Error::file_not_found(chart_path.clone()))?;

    let mut metadata = ChartMetadata::parse(chart_yaml, &chart_path)?;
    if let Some(requirements) = files.and_then(|f| f.requirements.as_deref()) {
        metadata.merge_requirements(requirements, &join(prefix, "requirements.yaml"))?;
    }

    let mut subcharts = Vec::new();
    for child in dirs.keys().filter(|k| parent_dir(k).as_deref() == Some(prefix)) {
        match assemble(child, dirs, nested) {
            Ok(node) => subcharts.push(node),
            Err(e) => tracing::warn!(path = %child, error = %e, "Skipping bundled sub-chart"),
        }
    }

    let mut i = 0;
    while i < nested.len() {
        if nested[i].0 == prefix {
            subcharts.push(nested.remove(i).1);
        } else {
            i += 1;
        }
    }

    Ok(ChartNode {
        metadata,
        subcharts,
    })
}

/// Classify a root-relative path as part of the chart tree.
///
/// Chart directories are the root (`""`) and any `charts/<name>` nested
/// below another chart directory.
fn classify(relative: &str) -> Option<(String, TreeFile)> {
    let parts: Vec<&str> = relative.split('/').collect();
    let (last, dir) = parts.split_last()?;

    match *last {
        "Chart.yaml" if is_chart_dir(dir) => Some((dir.join("/"), TreeFile::Metadata)),
        "requirements.yaml" if is_chart_dir(dir) => Some((dir.join("/"), TreeFile::Requirements)),
        name if name.ends_with(".tgz") => {
            let (charts, parent) = dir.split_last()?;
            (*charts == "charts" && is_chart_dir(parent))
                .then(|| (parent.join("/"), TreeFile::NestedArchive))
        }
        _ => None,
    }
}

fn is_chart_dir(parts: &[&str]) -> bool {
    parts.len() % 2 == 0
        && parts
            .chunks(2)
            .all(|pair| pair[0] == "charts" && !pair[1].is_empty())
}

fn parent_dir(dir: &str) -> Option<String> {
    if dir.is_empty() {
        return None;
    }
    let parts: Vec<&str> = dir.split('/').collect();
    Some(parts[..parts.len().saturating_sub(2)].join("/"))
}

fn join(prefix: &str, file: &str) -> String {
    if prefix.is_empty() {
        file.to_string()
    } else {
        format!("{prefix}/{file}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_test_utils::ChartBuilder;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn dep(name: &str, version: &str, repository: Option<&str>) -> Dependency {
        Dependency {
            name: name.to_string(),
            version: version.to_string(),
            repository: repository.map(str::to_string),
            ..Dependency::default()
        }
    }

    fn load(builder: ChartBuilder) -> Result<ChartNode> {
        ChartNode::load(&ChartArchive::new(builder.build()), ExtractLimits::default())
    }

    #[rstest]
    #[case("Chart.yaml", Some(("", TreeFile::Metadata)))]
    #[case("charts/redis/Chart.yaml", Some(("charts/redis", TreeFile::Metadata)))]
    #[case("charts/a/charts/b/requirements.yaml", Some(("charts/a/charts/b", TreeFile::Requirements)))]
    #[case("charts/redis-17.0.0.tgz", Some(("", TreeFile::NestedArchive)))]
    #[case("templates/Chart.yaml", None)]
    #[case("charts/Chart.yaml", None)]
    #[case("values.yaml", None)]
    fn classify_cases(#[case] path: &str, #[case] expected: Option<(&str, TreeFile)>) {
        assert_eq!(
            classify(path),
            expected.map(|(dir, kind)| (dir.to_string(), kind))
        );
    }

    #[test]
    fn parent_dirs() {
        assert_eq!(parent_dir(""), None);
        assert_eq!(parent_dir("charts/a").as_deref(), Some(""));
        assert_eq!(parent_dir("charts/a/charts/b").as_deref(), Some("charts/a"));
    }

    #[test]
    fn chart_without_dependencies_yields_empty_list() {
        let node = load(ChartBuilder::new("alertmanager", "1.0.0")).unwrap();
        assert!(node.flatten_dependencies().is_empty());
    }

    #[test]
    fn declared_dependencies_are_reported_in_order() {
        let node = load(
            ChartBuilder::new("stack", "60.0.0")
                .dependency("crds", "60.0.0", None)
                .dependency("grafana", "8.*", Some("https://grafana.github.io/helm-charts")),
        )
        .unwrap();
        let deps = node.flatten_dependencies();
        assert_eq!(
            deps,
            vec![
                dep("crds", "60.0.0", None),
                dep("grafana", "8.*", Some("https://grafana.github.io/helm-charts")),
            ]
        );
    }

    #[test]
    fn requirements_yaml_is_used_for_v1_charts() {
        let node = load(
            ChartBuilder::new("legacy", "1.0.0")
                .api_version("v1")
                .file(
                    "requirements.yaml",
                    "dependencies:\n  - name: mariadb\n    version: 7.x.x\n    repository: https://charts.example.com\n",
                ),
        )
        .unwrap();
        assert_eq!(
            node.flatten_dependencies(),
            vec![dep("mariadb", "7.x.x", Some("https://charts.example.com"))]
        );
    }

    #[test]
    fn bundled_subchart_dependencies_follow_their_parent() {
        let grafana = ChartBuilder::new("grafana", "8.3.0")
            .dependency("image-renderer", "1.*", Some("https://example.com/charts"));
        let node = load(
            ChartBuilder::new("stack", "60.0.0")
                .dependency("grafana", "8.*", Some("https://grafana.github.io/helm-charts"))
                .dependency("kube-state-metrics", "5.*", None)
                .subchart(grafana),
        )
        .unwrap();

        let names: Vec<_> = node
            .flatten_dependencies()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["grafana", "image-renderer", "kube-state-metrics"]);
    }

    #[test]
    fn nested_archive_subcharts_are_followed() {
        let child = ChartBuilder::new("redis", "17.0.0")
            .dependency("common", "2.x.x", Some("oci://registry.example.com"));
        let node = load(
            ChartBuilder::new("app", "1.0.0")
                .dependency("redis", "17.0.0", None)
                .subchart_archive(child),
        )
        .unwrap();

        assert_eq!(node.subcharts.len(), 1);
        let names: Vec<_> = node
            .flatten_dependencies()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["redis", "common"]);
    }

    #[test]
    fn unmatched_subchart_version_is_not_followed() {
        let child = ChartBuilder::new("redis", "18.0.0").dependency("common", "2.x.x", None);
        let node = load(
            ChartBuilder::new("app", "1.0.0")
                .dependency("redis", "~17.1", None)
                .subchart(child),
        )
        .unwrap();
        assert_eq!(node.flatten_dependencies().len(), 1);
    }

    #[test]
    fn dependency_without_version_is_invalid() {
        let err = load(
            ChartBuilder::new("broken", "1.0.0")
                .file("Chart.yaml", "apiVersion: v2\nname: broken\nversion: 1.0.0\ndependencies:\n  - name: redis\n"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata { .. }));
    }

    #[rstest]
    #[case(">=1.0.0 <2.0.0", "1.5.0", true)]
    #[case("^2.1", "2.9.9", true)]
    #[case("~1.2.0", "1.3.0", false)]
    #[case("5.*", "5.10.1", true)]
    fn constraints(#[case] constraint: &str, #[case] version: &str, #[case] expected: bool) {
        let version = semver::Version::parse(version).unwrap();
        assert_eq!(
            parse_constraint(constraint).is_some_and(|req| req.matches(&version)),
            expected
        );
    }
}
