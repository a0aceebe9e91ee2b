use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use inspection_models::{Config, PlatformError};
use crate::containerfile::render_containerfile;
use crate::lockfile::{DependencySet, LockFile};
use crate::manifest::Manifest;
use crate::plan::{ImagePlan, ImagePlanner};
use crate::verify::verify_plan;
use tracing::{info, error, instrument};

/// Result of a finished build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub tag: String,
    pub dependencies: DependencySet,
}

pub struct ImageBuilder {
    docker_bin: String,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new("docker".to_string())
    }
}

impl ImageBuilder {
    pub fn new(docker_bin: String) -> Self {
        Self { docker_bin }
    }

    /// Lock and manifest checks that must pass before any build starts.
    pub fn preflight(config: &Config, context: &Path) -> Result<DependencySet, PlatformError> {
        let manifest = Manifest::load(&context.join(&config.image.manifest))?;
        let lock = LockFile::load(&context.join(&config.image.lock_file))?;
        lock.check_against(&manifest)?;
        lock.runtime_closure(&manifest)
    }

    pub fn plan(config: &Config) -> Result<ImagePlan, PlatformError> {
        let plan = ImagePlanner::new(config).plan();
        verify_plan(&plan, config)?;
        Ok(plan)
    }

    #[instrument(skip(self, config), fields(tag = %config.image.tag))]
    pub async fn build_image(&self, config: &Config, context: &Path) -> Result<BuildOutcome, PlatformError> {
        let dependencies = Self::preflight(config, context)?;
        let plan = Self::plan(config)?;

        // The Containerfile lives outside the context so it never lands in the image
        let temp_dir = tempfile::tempdir()?;
        let containerfile_path = temp_dir.path().join("Containerfile");
        std::fs::write(&containerfile_path, render_containerfile(&plan))?;

        info!("Building image: {}", plan.tag);
        info!("Build context: {:?}", context);
        info!("Containerfile path: {:?}", containerfile_path);
        info!(digest = %dependencies.digest(), packages = dependencies.len(), "Locked runtime dependencies");

        let build_result = Command::new(&self.docker_bin)
            .arg("build")
            .arg("-t")
            .arg(&plan.tag)
            .arg("-f")
            .arg(&containerfile_path)
            .arg(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PlatformError::DockerError { message: e.to_string() })?;

        if !build_result.status.success() {
            let stdout = String::from_utf8_lossy(&build_result.stdout);
            let stderr = String::from_utf8_lossy(&build_result.stderr);
            error!("Image build failed - stdout: {}", stdout);
            error!("Image build failed - stderr: {}", stderr);
            return Err(PlatformError::DockerError {
                message: format!("image build failed: {}", stderr.trim()),
            });
        }

        info!("Built image: {}", plan.tag);
        Ok(BuildOutcome { tag: plan.tag, dependencies })
    }

    /// Looks inside a built image for the resolver binary and for files under
    /// the working directory not owned by the process identity.
    #[instrument(skip(self, config))]
    pub async fn audit_filesystem(&self, config: &Config, tag: &str) -> Result<Vec<String>, PlatformError> {
        // PATH inside the container may not list every install location.
        let script = format!(
            "find / -xdev -name {resolver} ! -type d -print -quit | grep -q . && echo resolver-present; \
             find {workdir} ! -user {user} -print -quit | sed 's/^/foreign-owner: /'",
            resolver = config.image.resolver,
            workdir = config.image.workdir,
            user = config.identity.user,
        );

        let output = Command::new(&self.docker_bin)
            .args(["run", "--rm", "--user", "0", "--entrypoint", "/bin/sh", tag, "-c"])
            .arg(&script)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PlatformError::DockerError { message: e.to_string() })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = ?output.status, "Image filesystem audit could not run - stderr: {}", stderr);
            return Err(PlatformError::DockerError {
                message: format!("filesystem audit of {tag} failed ({}): {}", output.status, stderr.trim()),
            });
        }

        let findings = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| *l == "resolver-present" || l.starts_with("foreign-owner: "))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !findings.is_empty() {
            error!(?findings, "Image filesystem audit failed");
        }
        Ok(findings)
    }
}
