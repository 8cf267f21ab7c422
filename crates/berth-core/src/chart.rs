//! Chart definition and directory loading

use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use crate::error::ChartError;

const CHART_FILE: &str = "Chart.yaml";
const VALUES_FILE: &str = "values.yaml";
const IGNORE_FILE: &str = ".helmignore";
const TEMPLATES_PREFIX: &str = "templates/";

/// Chart API versions the loader accepts
const SUPPORTED_API_VERSIONS: [&str; 2] = ["v1", "v2"];

/// Chart metadata, as declared in `Chart.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    /// Chart API version (v1 or v2)
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    /// Chart version (required, SemVer)
    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Version of the packaged application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Kubernetes version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,

    /// application or library
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Maintainer information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A single file carried by a chart, keyed by its slash-separated path
/// relative to the chart root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartFile {
    pub name: String,
    #[serde(with = "base64_serde")]
    pub data: Vec<u8>,
}

impl ChartFile {
    /// File contents as text, if they are valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

/// An immutable, fully loaded chart
///
/// Everything the release service needs travels inside this value; the
/// source directory is not consulted again once loading returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartArtifact {
    pub metadata: ChartMetadata,

    /// Default values from `values.yaml` (always a mapping)
    pub values: serde_json::Value,

    /// Files under `templates/`, sorted by name
    pub templates: Vec<ChartFile>,

    /// Every other non-ignored file, sorted by name
    #[serde(default)]
    pub files: Vec<ChartFile>,
}

impl ChartArtifact {
    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[inline]
    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    /// Look up a template by its chart-relative name
    pub fn template(&self, name: &str) -> Option<&ChartFile> {
        self.templates.iter().find(|t| t.name == name)
    }
}

/// Loads a chart from an unpacked chart directory
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryChartLoader;

impl DirectoryChartLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load the chart rooted at `path`
    ///
    /// Fails with [`ChartError::NotFound`] when the path does not exist and
    /// with [`ChartError::Load`] when anything inside it is missing,
    /// unreadable or malformed.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ChartArtifact, ChartError> {
        let root = path.as_ref();

        if !root.exists() {
            return Err(ChartError::NotFound {
                path: root.display().to_string(),
            });
        }
        if !root.is_dir() {
            return Err(ChartError::load(root, "not a directory"));
        }

        let metadata = read_metadata(root)?;
        let values = read_values(root)?;
        let ignore = HelmIgnore::load(root)?;

        let mut templates = Vec::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !is_hidden(entry)
                    && !ignore.is_ignored(
                        &relative_name(root, entry.path()),
                        entry.file_type().is_dir(),
                    )
            });

        for entry in walker {
            let entry = entry.map_err(|e| ChartError::load(root, e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = relative_name(root, entry.path());
            if name == CHART_FILE || name == VALUES_FILE {
                continue;
            }

            let data = std::fs::read(entry.path())
                .map_err(|e| ChartError::load(entry.path(), e.to_string()))?;

            if name.starts_with(TEMPLATES_PREFIX) {
                if std::str::from_utf8(&data).is_err() {
                    return Err(ChartError::load(
                        entry.path(),
                        "template is not valid UTF-8",
                    ));
                }
                templates.push(ChartFile { name, data });
            } else {
                files.push(ChartFile { name, data });
            }
        }

        Ok(ChartArtifact {
            metadata,
            values,
            templates,
            files,
        })
    }
}

fn read_metadata(root: &Path) -> Result<ChartMetadata, ChartError> {
    let chart_file = root.join(CHART_FILE);
    if !chart_file.is_file() {
        return Err(ChartError::load(root, "Chart.yaml not found"));
    }

    let content = std::fs::read_to_string(&chart_file)
        .map_err(|e| ChartError::load(&chart_file, e.to_string()))?;
    let metadata: ChartMetadata = serde_yaml::from_str(&content)
        .map_err(|e| ChartError::load(&chart_file, format!("invalid Chart.yaml: {}", e)))?;

    if !SUPPORTED_API_VERSIONS.contains(&metadata.api_version.as_str()) {
        return Err(ChartError::load(
            &chart_file,
            format!(
                "unsupported apiVersion '{}', expected one of: {}",
                metadata.api_version,
                SUPPORTED_API_VERSIONS.join(", ")
            ),
        ));
    }
    if metadata.name.trim().is_empty() {
        return Err(ChartError::load(&chart_file, "chart name is empty"));
    }

    Ok(metadata)
}

fn read_values(root: &Path) -> Result<serde_json::Value, ChartError> {
    let values_file = root.join(VALUES_FILE);
    if !values_file.is_file() {
        return Ok(serde_json::Value::Object(Default::default()));
    }

    let content = std::fs::read_to_string(&values_file)
        .map_err(|e| ChartError::load(&values_file, e.to_string()))?;
    let values: serde_json::Value = serde_yaml::from_str(&content)
        .map_err(|e| ChartError::load(&values_file, format!("invalid values.yaml: {}", e)))?;

    match values {
        serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
        serde_json::Value::Object(_) => Ok(values),
        _ => Err(ChartError::load(&values_file, "values.yaml must be a mapping")),
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Slash-separated path of `path` relative to `root`
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Rules from a chart's `.helmignore`
///
/// Patterns without a slash match the file name at any depth; patterns with
/// a slash match the whole relative path. A trailing slash restricts a rule
/// to directories and a leading `!` re-includes. The last matching rule wins.
#[derive(Debug, Default)]
struct HelmIgnore {
    rules: Vec<IgnoreRule>,
}

#[derive(Debug)]
struct IgnoreRule {
    pattern: glob::Pattern,
    anchored: bool,
    dir_only: bool,
    negate: bool,
}

impl HelmIgnore {
    fn load(root: &Path) -> Result<Self, ChartError> {
        let path = root.join(IGNORE_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| ChartError::load(&path, e.to_string()))?;
        Self::parse(&content).map_err(|message| ChartError::load(&path, message))
    }

    fn parse(content: &str) -> Result<Self, String> {
        let mut rules = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negate, line) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, line) = match line.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let line = line.trim_start_matches('/');
            if line.is_empty() {
                continue;
            }

            let pattern = glob::Pattern::new(line)
                .map_err(|e| format!("invalid pattern '{}': {}", line, e))?;
            rules.push(IgnoreRule {
                pattern,
                anchored: line.contains('/'),
                dir_only,
                negate,
            });
        }

        Ok(Self { rules })
    }

    fn is_ignored(&self, relative: &str, is_dir: bool) -> bool {
        let base = relative.rsplit('/').next().unwrap_or(relative);

        let mut ignored = false;
        for rule in &self.rules {
            if rule.dir_only && !is_dir {
                continue;
            }
            let target = if rule.anchored { relative } else { base };
            if rule.pattern.matches(target) {
                ignored = !rule.negate;
            }
        }
        ignored
    }
}

/// Custom serde for semver::Version
mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Chart.yaml versions are often written unquoted (`version: 1.0`)
        let raw = serde_yaml::Value::deserialize(deserializer)?;
        let s = match raw {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "expected a version string, found {:?}",
                    other
                )));
            }
        };
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// File contents travel as base64 inside JSON payloads
mod base64_serde {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
