use bollard::models::ImageInspect;
use bollard::Docker;
use inspection_models::{Config, PlatformError};
use serde::Serialize;
use tracing::{info, instrument};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// What the engine reports about a built image, reduced to the lifecycle
/// contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageReport {
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub cmd: Vec<String>,
    pub healthcheck: Option<HealthcheckReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthcheckReport {
    pub test: Vec<String>,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub start_period_secs: u64,
    pub retries: u32,
}

fn nanos_to_secs(n: Option<i64>) -> u64 {
    n.map(|v| (v / NANOS_PER_SEC).max(0) as u64).unwrap_or(0)
}

impl ImageReport {
    pub fn from_inspect(inspect: &ImageInspect) -> Self {
        let Some(config) = &inspect.config else {
            return Self::default();
        };

        let mut exposed_ports: Vec<String> = config
            .exposed_ports
            .as_ref()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        exposed_ports.sort();

        Self {
            user: config.user.clone().filter(|u| !u.is_empty()),
            working_dir: config.working_dir.clone(),
            env: config.env.clone().unwrap_or_default(),
            exposed_ports,
            cmd: config.cmd.clone().unwrap_or_default(),
            healthcheck: config.healthcheck.as_ref().map(|h| HealthcheckReport {
                test: h.test.clone().unwrap_or_default(),
                interval_secs: nanos_to_secs(h.interval),
                timeout_secs: nanos_to_secs(h.timeout),
                start_period_secs: nanos_to_secs(h.start_period),
                retries: h.retries.unwrap_or(0).max(0) as u32,
            }),
        }
    }

    fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find_map(|e| e.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')))
    }

    /// Compares the built image with the configuration it was planned from.
    pub fn verify(&self, config: &Config) -> Vec<String> {
        let mut problems = Vec::new();

        match self.user.as_deref() {
            None => problems.push("image runs as the default (root) user".to_string()),
            Some(user) => {
                let name = user.split(':').next().unwrap_or_default();
                if name == "root" || name == "0" {
                    problems.push(format!("image runs as {user}"));
                } else if user != config.identity.user_group() && name != config.identity.user {
                    problems.push(format!(
                        "image user {user} differs from {}",
                        config.identity.user_group()
                    ));
                }
            }
        }

        let env_path = config.image.env_path();
        if self.env_value(&config.image.env_var) != Some(env_path.as_str()) {
            problems.push(format!("{} is not {env_path}", config.image.env_var));
        }
        let bin_prefix = format!("{}:", config.image.env_bin_path());
        if !self
            .env_value("PATH")
            .map(|p| p.starts_with(&bin_prefix))
            .unwrap_or(false)
        {
            problems.push(format!("PATH does not start with {bin_prefix}"));
        }

        let port = format!("{}/tcp", config.server.port);
        if self.exposed_ports != vec![port.clone()] {
            problems.push(format!(
                "exposed ports {:?}, expected only {port}",
                self.exposed_ports
            ));
        }

        match &self.healthcheck {
            None => problems.push("image declares no health check".to_string()),
            Some(h) => {
                let policy = &config.health;
                if (h.interval_secs, h.timeout_secs, h.start_period_secs, h.retries)
                    != (
                        policy.interval_secs,
                        policy.timeout_secs,
                        policy.start_period_secs,
                        policy.retries,
                    )
                {
                    problems.push(format!(
                        "health check timing {}s/{}s/{}s x{} differs from policy",
                        h.interval_secs, h.timeout_secs, h.start_period_secs, h.retries
                    ));
                }
            }
        }

        if self.working_dir.as_deref() != Some(config.image.workdir.as_str()) {
            problems.push(format!("working dir is not {}", config.image.workdir));
        }

        problems
    }
}

/// Reads built images back from the container engine.
pub struct ImageInspector {
    docker: Docker,
}

impl ImageInspector {
    pub fn connect() -> Result<Self, PlatformError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| PlatformError::DockerError {
            message: e.to_string(),
        })?;
        Ok(Self { docker })
    }

    #[instrument(skip(self))]
    pub async fn inspect(&self, tag: &str) -> Result<ImageReport, PlatformError> {
        let inspect = self
            .docker
            .inspect_image(tag)
            .await
            .map_err(|e| PlatformError::DockerError {
                message: e.to_string(),
            })?;
        let report = ImageReport::from_inspect(&inspect);
        info!(tag, user = ?report.user, "Inspected image");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerConfig, HealthConfig};
    use std::collections::HashMap;

    fn good_report() -> ImageReport {
        ImageReport {
            user: Some("appuser:appuser".to_string()),
            working_dir: Some("/app".to_string()),
            env: vec![
                "PATH=/app/.venv/bin:/usr/local/bin:/usr/bin:/bin".to_string(),
                "VIRTUAL_ENV=/app/.venv".to_string(),
            ],
            exposed_ports: vec!["8000/tcp".to_string()],
            cmd: vec!["uvicorn".to_string()],
            healthcheck: Some(HealthcheckReport {
                test: vec!["CMD-SHELL".to_string(), "curl -f http://localhost:8000/health || exit 1".to_string()],
                interval_secs: 30,
                timeout_secs: 3,
                start_period_secs: 5,
                retries: 3,
            }),
        }
    }

    #[test]
    fn test_good_image_passes() {
        assert!(good_report().verify(&Config::default()).is_empty());
    }

    #[test]
    fn test_root_image_fails() {
        let mut report = good_report();
        report.user = None;
        let problems = report.verify(&Config::default());
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("root"));
    }

    #[test]
    fn test_extra_port_fails() {
        let mut report = good_report();
        report.exposed_ports.push("5432/tcp".to_string());
        assert_eq!(report.verify(&Config::default()).len(), 1);
    }

    #[test]
    fn test_from_inspect_converts_durations() {
        let mut ports = HashMap::new();
        ports.insert("8000/tcp".to_string(), HashMap::new());
        let inspect = ImageInspect {
            config: Some(ContainerConfig {
                user: Some("appuser:appuser".to_string()),
                working_dir: Some("/app".to_string()),
                env: Some(good_report().env),
                exposed_ports: Some(ports),
                cmd: Some(vec!["uvicorn".to_string()]),
                healthcheck: Some(HealthConfig {
                    test: Some(vec!["CMD-SHELL".to_string(), "curl -f http://localhost:8000/health || exit 1".to_string()]),
                    interval: Some(30 * NANOS_PER_SEC),
                    timeout: Some(3 * NANOS_PER_SEC),
                    start_period: Some(5 * NANOS_PER_SEC),
                    retries: Some(3),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = ImageReport::from_inspect(&inspect);
        assert_eq!(report, good_report());
    }
}
