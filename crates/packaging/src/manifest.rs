use inspection_models::PlatformError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Project manifest (`pyproject.toml`): the requirements the lock file must
/// satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub version: Option<String>,
    pub requirements: Vec<Requirement>,
    pub dev_requirements: Vec<Requirement>,
}

/// One requirement line reduced to what lock consistency needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub raw: String,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    project: Option<RawProject>,
    #[serde(default, rename = "dependency-groups")]
    dependency_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    tool: RawTool,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    name: String,
    version: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTool {
    uv: Option<RawUv>,
}

#[derive(Debug, Deserialize)]
struct RawUv {
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: Vec<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, PlatformError> {
        let content = std::fs::read_to_string(path).map_err(|e| PlatformError::ManifestInvalid {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PlatformError> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| PlatformError::ManifestInvalid {
            reason: e.to_string(),
        })?;
        let project = raw.project.ok_or_else(|| PlatformError::ManifestInvalid {
            reason: "missing [project] table".to_string(),
        })?;

        let requirements = project
            .dependencies
            .iter()
            .map(|r| Requirement::parse(r))
            .collect::<Result<Vec<_>, _>>()?;

        let mut dev_requirements = Vec::new();
        if let Some(dev) = raw.dependency_groups.get("dev") {
            for r in dev {
                dev_requirements.push(Requirement::parse(r)?);
            }
        }
        if let Some(uv) = raw.tool.uv {
            for r in &uv.dev_dependencies {
                let req = Requirement::parse(r)?;
                if !dev_requirements.iter().any(|d| d.name == req.name) {
                    dev_requirements.push(req);
                }
            }
        }

        Ok(Self {
            name: normalize_name(&project.name),
            version: project.version,
            requirements,
            dev_requirements,
        })
    }
}

impl Requirement {
    /// Parses a PEP 508 line far enough to get the distribution name and
    /// extras; specifiers and markers are kept only in `raw`.
    pub fn parse(line: &str) -> Result<Self, PlatformError> {
        let trimmed = line.trim();
        let name_end = trimmed
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
            .unwrap_or(trimmed.len());
        let name = &trimmed[..name_end];
        if name.is_empty() {
            return Err(PlatformError::ManifestInvalid {
                reason: format!("cannot read requirement name from {line:?}"),
            });
        }

        let rest = trimmed[name_end..].trim_start();
        let extras = match rest.strip_prefix('[') {
            Some(after) => {
                let close = after.find(']').ok_or_else(|| PlatformError::ManifestInvalid {
                    reason: format!("unterminated extras in {line:?}"),
                })?;
                after[..close]
                    .split(',')
                    .map(|e| normalize_name(e.trim()))
                    .filter(|e| !e.is_empty())
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(Self {
            name: normalize_name(name),
            extras,
            raw: trimmed.to_string(),
        })
    }
}

/// Lowercase, with runs of `-`, `_` and `.` collapsed to a single `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c == '-' || c == '_' || c == '.' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}
