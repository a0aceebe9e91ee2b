use crate::manifest::{normalize_name, Manifest};
use inspection_models::PlatformError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Exact-pinned dependency lock file (`uv.lock` layout).
#[derive(Debug, Clone)]
pub struct LockFile {
    pub version: Option<u32>,
    pub requires_python: Option<String>,
    pub packages: Vec<LockedPackage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockedPackage {
    pub name: String,
    pub version: Option<String>,
    pub source: PackageSource,
    pub dependencies: Vec<DependencyRef>,
    pub optional_dependencies: BTreeMap<String, Vec<DependencyRef>>,
    pub dev_dependencies: BTreeMap<String, Vec<DependencyRef>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Registry(String),
    Git(String),
    Url(String),
    /// The project itself or a local path (editable, virtual, path, directory).
    Local(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub name: String,
    pub version: Option<String>,
    pub extras: Vec<String>,
    pub marker: Option<String>,
}

/// The installed set for the runtime environment, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    pub packages: Vec<ResolvedPackage>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct RawLock {
    version: Option<u32>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
    #[serde(default)]
    package: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
    version: Option<String>,
    source: Option<RawSource>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default, rename = "optional-dependencies")]
    optional_dependencies: BTreeMap<String, Vec<RawDependency>>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, Vec<RawDependency>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSource {
    registry: Option<String>,
    git: Option<String>,
    url: Option<String>,
    editable: Option<String>,
    r#virtual: Option<String>,
    path: Option<String>,
    directory: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDependency {
    name: String,
    version: Option<String>,
    #[serde(default)]
    extra: Vec<String>,
    marker: Option<String>,
}

impl From<RawDependency> for DependencyRef {
    fn from(raw: RawDependency) -> Self {
        Self {
            name: normalize_name(&raw.name),
            version: raw.version,
            extras: raw.extra.iter().map(|e| normalize_name(e)).collect(),
            marker: raw.marker,
        }
    }
}

impl From<Option<RawSource>> for PackageSource {
    fn from(raw: Option<RawSource>) -> Self {
        let Some(raw) = raw else {
            return PackageSource::Unknown;
        };
        if let Some(r) = raw.registry {
            PackageSource::Registry(r)
        } else if let Some(g) = raw.git {
            PackageSource::Git(g)
        } else if let Some(u) = raw.url {
            PackageSource::Url(u)
        } else if let Some(l) = raw
            .editable
            .or(raw.r#virtual)
            .or(raw.path)
            .or(raw.directory)
        {
            PackageSource::Local(l)
        } else {
            PackageSource::Unknown
        }
    }
}

impl PackageSource {
    pub fn is_local(&self) -> bool {
        matches!(self, PackageSource::Local(_))
    }
}

impl std::fmt::Display for PackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageSource::Registry(r) => write!(f, "registry+{r}"),
            PackageSource::Git(g) => write!(f, "git+{g}"),
            PackageSource::Url(u) => write!(f, "url+{u}"),
            PackageSource::Local(l) => write!(f, "local+{l}"),
            PackageSource::Unknown => f.write_str("unknown"),
        }
    }
}

/// True for a single concrete release such as `2.31.0` or `1.0.0rc1`.
pub fn is_exact_version(version: &str) -> bool {
    !version.is_empty()
        && version.starts_with(|c: char| c.is_ascii_digit())
        && !version
            .chars()
            .any(|c| matches!(c, '<' | '>' | '=' | '!' | '~' | '*' | ',' | ' ' | '^'))
}

impl LockFile {
    pub fn load(path: &Path) -> Result<Self, PlatformError> {
        if !path.exists() {
            return Err(PlatformError::LockFileMissing {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    #[instrument(skip(content), fields(bytes = content.len()))]
    pub fn parse(content: &str) -> Result<Self, PlatformError> {
        let raw: RawLock = toml::from_str(content).map_err(|e| PlatformError::LockFileInvalid {
            reason: e.to_string(),
        })?;

        let mut seen = HashSet::new();
        let mut packages = Vec::with_capacity(raw.package.len());
        for raw_pkg in raw.package {
            let name = normalize_name(&raw_pkg.name);
            let source = PackageSource::from(raw_pkg.source);

            if !source.is_local() {
                let version = raw_pkg.version.clone().unwrap_or_default();
                if !is_exact_version(&version) {
                    return Err(PlatformError::UnpinnedDependency { name, version });
                }
            }
            if !seen.insert((name.clone(), raw_pkg.version.clone())) {
                return Err(PlatformError::LockFileInvalid {
                    reason: format!(
                        "package {} {} is locked twice",
                        name,
                        raw_pkg.version.as_deref().unwrap_or("(unversioned)")
                    ),
                });
            }

            packages.push(LockedPackage {
                name,
                version: raw_pkg.version,
                source,
                dependencies: raw_pkg.dependencies.into_iter().map(Into::into).collect(),
                optional_dependencies: raw_pkg
                    .optional_dependencies
                    .into_iter()
                    .map(|(k, v)| (normalize_name(&k), v.into_iter().map(Into::into).collect()))
                    .collect(),
                dev_dependencies: raw_pkg
                    .dev_dependencies
                    .into_iter()
                    .map(|(k, v)| (k, v.into_iter().map(Into::into).collect()))
                    .collect(),
            });
        }

        debug!(packages = packages.len(), "Parsed lock file");
        Ok(Self {
            version: raw.version,
            requires_python: raw.requires_python,
            packages,
        })
    }

    /// The lock entry of the project being packaged.
    pub fn project(&self, manifest: &Manifest) -> Result<&LockedPackage, PlatformError> {
        self.packages
            .iter()
            .find(|p| p.name == manifest.name && p.source.is_local())
            .ok_or_else(|| PlatformError::LockMismatch {
                reason: format!("project {} is not in the lock file", manifest.name),
            })
    }

    fn resolve(&self, dep: &DependencyRef) -> Result<&LockedPackage, PlatformError> {
        let candidates: Vec<&LockedPackage> = self
            .packages
            .iter()
            .filter(|p| p.name == dep.name)
            .filter(|p| match &dep.version {
                Some(v) => p.version.as_deref() == Some(v.as_str()),
                None => true,
            })
            .collect();

        match candidates.as_slice() {
            [only] => Ok(only),
            [] => Err(PlatformError::LockMismatch {
                reason: format!("dependency {} has no locked entry", dep.name),
            }),
            _ => Err(PlatformError::LockMismatch {
                reason: format!(
                    "dependency {} is ambiguous: {} versions locked and none selected",
                    dep.name,
                    candidates.len()
                ),
            }),
        }
    }

    /// Fails when the lock was not regenerated after the manifest changed.
    pub fn check_against(&self, manifest: &Manifest) -> Result<(), PlatformError> {
        let project = self.project(manifest)?;

        if let (Some(locked), Some(declared)) = (&project.version, &manifest.version) {
            if locked != declared {
                return Err(PlatformError::LockMismatch {
                    reason: format!(
                        "project version {declared} in manifest but {locked} in lock file"
                    ),
                });
            }
        }

        let locked_runtime: BTreeSet<&str> =
            project.dependencies.iter().map(|d| d.name.as_str()).collect();
        let declared_runtime: BTreeSet<&str> =
            manifest.requirements.iter().map(|r| r.name.as_str()).collect();

        let missing: Vec<&str> = declared_runtime.difference(&locked_runtime).copied().collect();
        if !missing.is_empty() {
            return Err(PlatformError::LockMismatch {
                reason: format!("not locked: {}", missing.join(", ")),
            });
        }
        let stale: Vec<&str> = locked_runtime.difference(&declared_runtime).copied().collect();
        if !stale.is_empty() {
            return Err(PlatformError::LockMismatch {
                reason: format!("locked but no longer declared: {}", stale.join(", ")),
            });
        }

        let locked_dev: BTreeSet<&str> = project
            .dev_dependencies
            .values()
            .flatten()
            .map(|d| d.name.as_str())
            .collect();
        let missing_dev: Vec<&str> = manifest
            .dev_requirements
            .iter()
            .map(|r| r.name.as_str())
            .filter(|n| !locked_dev.contains(n))
            .collect();
        if !missing_dev.is_empty() {
            return Err(PlatformError::LockMismatch {
                reason: format!("dev requirements not locked: {}", missing_dev.join(", ")),
            });
        }

        for package in &self.packages {
            let edges = package
                .dependencies
                .iter()
                .chain(package.optional_dependencies.values().flatten())
                .chain(package.dev_dependencies.values().flatten());
            for dep in edges {
                self.resolve(dep)?;
            }
        }

        Ok(())
    }

    /// Runtime dependency closure of the project: no dev dependencies and not
    /// the project itself. Requested extras pull in the matching optional
    /// dependencies; markers are not evaluated.
    #[instrument(skip(self, manifest), fields(project = %manifest.name))]
    pub fn runtime_closure(&self, manifest: &Manifest) -> Result<DependencySet, PlatformError> {
        let project = self.project(manifest)?;

        let mut queue: VecDeque<DependencyRef> = project.dependencies.iter().cloned().collect();
        let mut visited: HashSet<(String, Option<String>)> = HashSet::new();
        let mut expanded_extras: HashSet<(String, Option<String>, String)> = HashSet::new();
        let mut resolved = BTreeSet::new();

        while let Some(dep) = queue.pop_front() {
            let package = self.resolve(&dep)?;
            if package.name == project.name && package.source.is_local() {
                continue;
            }
            let key = (package.name.clone(), package.version.clone());

            for extra in &dep.extras {
                let extra_key = (package.name.clone(), package.version.clone(), extra.clone());
                if expanded_extras.insert(extra_key) {
                    if let Some(extra_deps) = package.optional_dependencies.get(extra) {
                        queue.extend(extra_deps.iter().cloned());
                    }
                }
            }

            if visited.insert(key) {
                resolved.insert(ResolvedPackage {
                    name: package.name.clone(),
                    version: package.version.clone().unwrap_or_default(),
                    source: package.source.to_string(),
                });
                queue.extend(package.dependencies.iter().cloned());
            }
        }

        let set = DependencySet {
            packages: resolved.into_iter().collect(),
        };
        info!(packages = set.packages.len(), digest = %set.digest(), "Resolved runtime dependency set");
        Ok(set)
    }
}

impl DependencySet {
    /// Stable SHA-256 over `name==version source` lines in name order.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for p in &self.packages {
            hasher.update(format!("{}=={} {}\n", p.name, p.version, p.source).as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = normalize_name(name);
        self.packages.iter().any(|p| p.name == name)
    }
}
