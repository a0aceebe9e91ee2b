use inspection_models::{join_path, Config, HealthPolicy, ImageConfig, ProcessIdentity};
use serde::{Deserialize, Serialize};

pub const BUILDER_STAGE: &str = "builder";
pub const RUNTIME_STAGE: &str = "runtime";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    From { image: String, alias: String },
    Workdir(String),
    Env { key: String, value: String },
    Run(Vec<String>),
    Copy {
        from_stage: Option<String>,
        sources: Vec<String>,
        dest: String,
    },
    User(String),
    Expose(u16),
    Healthcheck {
        interval_secs: u64,
        timeout_secs: u64,
        start_period_secs: u64,
        retries: u32,
        command: String,
    },
    Cmd(Vec<String>),
}

/// What a step is for. Verification reasons about ordering by purpose, not
/// by parsing shell text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Base,
    InstallResolver,
    CopyLockInputs,
    ResolveDependencies,
    InstallRuntimePackages,
    CreateIdentity,
    Workdir,
    CopyEnvironment,
    CopySource,
    CopyMigrations,
    ActivateEnvironment,
    Chown,
    Expose,
    Healthcheck,
    SwitchUser,
    Entrypoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub kind: StepKind,
    pub instruction: Instruction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub base: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePlan {
    pub tag: String,
    pub builder: Stage,
    pub runtime: Stage,
}

impl Stage {
    fn new(name: &str, base: &str) -> Self {
        Self {
            name: name.to_string(),
            base: base.to_string(),
            steps: vec![Step {
                kind: StepKind::Base,
                instruction: Instruction::From {
                    image: base.to_string(),
                    alias: name.to_string(),
                },
            }],
        }
    }

    fn push(&mut self, kind: StepKind, instruction: Instruction) {
        self.steps.push(Step { kind, instruction });
    }

    pub fn position(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == kind)
    }

    pub fn last_position(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().rposition(|s| s.kind == kind)
    }

    pub fn steps_of(&self, kind: StepKind) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(move |s| s.kind == kind)
    }
}

/// Turns configuration into a two-stage image plan.
pub struct ImagePlanner<'a> {
    image: &'a ImageConfig,
    identity: &'a ProcessIdentity,
    health: &'a HealthPolicy,
    port: u16,
}

impl<'a> ImagePlanner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            image: &config.image,
            identity: &config.identity,
            health: &config.health,
            port: config.server.port,
        }
    }

    pub fn plan(&self) -> ImagePlan {
        ImagePlan {
            tag: self.image.tag.clone(),
            builder: self.builder_stage(),
            runtime: self.runtime_stage(),
        }
    }

    pub fn resolver_install_command(&self) -> String {
        match &self.image.resolver_version {
            Some(v) => format!("pip install --no-cache-dir {}=={}", self.image.resolver, v),
            None => format!("pip install --no-cache-dir {}", self.image.resolver),
        }
    }

    pub fn resolve_command(&self) -> String {
        format!(
            "{} sync --frozen --no-dev --no-install-project",
            self.image.resolver
        )
    }

    fn builder_stage(&self) -> Stage {
        let image = self.image;
        let mut stage = Stage::new(BUILDER_STAGE, &image.builder_base);
        stage.push(
            StepKind::InstallResolver,
            Instruction::Run(vec![self.resolver_install_command()]),
        );
        stage.push(StepKind::Workdir, Instruction::Workdir(image.workdir.clone()));
        stage.push(
            StepKind::CopyLockInputs,
            Instruction::Copy {
                from_stage: None,
                sources: vec![image.manifest.clone(), image.lock_file.clone()],
                dest: format!("{}/", image.workdir.trim_end_matches('/')),
            },
        );
        stage.push(
            StepKind::ResolveDependencies,
            Instruction::Env {
                key: "UV_PROJECT_ENVIRONMENT".to_string(),
                value: image.env_path(),
            },
        );
        stage.push(
            StepKind::ResolveDependencies,
            Instruction::Run(vec![self.resolve_command()]),
        );
        stage
    }

    fn runtime_stage(&self) -> Stage {
        let image = self.image;
        let identity = self.identity;
        let mut stage = Stage::new(RUNTIME_STAGE, &image.runtime_base);

        if !image.runtime_packages.is_empty() {
            stage.push(
                StepKind::InstallRuntimePackages,
                Instruction::Run(vec![
                    "apt-get update".to_string(),
                    format!(
                        "apt-get install -y --no-install-recommends {}",
                        image.runtime_packages.join(" ")
                    ),
                    "rm -rf /var/lib/apt/lists/*".to_string(),
                ]),
            );
        }

        let gid = identity.gid.map(|g| format!(" --gid {g}")).unwrap_or_default();
        let uid = identity.uid.map(|u| format!(" --uid {u}")).unwrap_or_default();
        stage.push(
            StepKind::CreateIdentity,
            Instruction::Run(vec![
                format!("groupadd --system{} {}", gid, identity.group),
                format!(
                    "useradd --system{} --gid {} --no-create-home --shell /usr/sbin/nologin {}",
                    uid, identity.group, identity.user
                ),
            ]),
        );

        stage.push(StepKind::Workdir, Instruction::Workdir(image.workdir.clone()));

        let env_path = image.env_path();
        stage.push(
            StepKind::CopyEnvironment,
            Instruction::Copy {
                from_stage: Some(BUILDER_STAGE.to_string()),
                sources: vec![env_path.clone()],
                dest: env_path.clone(),
            },
        );
        stage.push(
            StepKind::CopySource,
            Instruction::Copy {
                from_stage: None,
                sources: vec![format!("{}/", image.source_dir.trim_end_matches('/'))],
                dest: format!("{}/", join_path(&image.workdir, &image.source_dir)),
            },
        );
        stage.push(
            StepKind::CopyMigrations,
            Instruction::Copy {
                from_stage: None,
                sources: vec![format!("{}/", image.migrations_dir.trim_end_matches('/'))],
                dest: format!("{}/", join_path(&image.workdir, &image.migrations_dir)),
            },
        );
        stage.push(
            StepKind::CopyMigrations,
            Instruction::Copy {
                from_stage: None,
                sources: vec![image.migrations_config.clone()],
                dest: join_path(&image.workdir, &image.migrations_config),
            },
        );

        stage.push(
            StepKind::ActivateEnvironment,
            Instruction::Env {
                key: image.env_var.clone(),
                value: env_path.clone(),
            },
        );
        stage.push(
            StepKind::ActivateEnvironment,
            Instruction::Env {
                key: "PATH".to_string(),
                value: format!("{}:$PATH", image.env_bin_path()),
            },
        );

        stage.push(
            StepKind::Chown,
            Instruction::Run(vec![format!(
                "chown -R {} {}",
                identity.user_group(),
                image.workdir
            )]),
        );

        stage.push(StepKind::Expose, Instruction::Expose(self.port));
        stage.push(
            StepKind::Healthcheck,
            Instruction::Healthcheck {
                interval_secs: self.health.interval_secs,
                timeout_secs: self.health.timeout_secs,
                start_period_secs: self.health.start_period_secs,
                retries: self.health.retries,
                command: format!("curl -f {} || exit 1", self.health.url_for(self.port)),
            },
        );

        stage.push(StepKind::SwitchUser, Instruction::User(identity.user_group()));
        stage.push(
            StepKind::Entrypoint,
            Instruction::Cmd(vec![
                image.server_command.clone(),
                image.app_import.clone(),
                "--host".to_string(),
                "0.0.0.0".to_string(),
                "--port".to_string(),
                self.port.to_string(),
            ]),
        );
        stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_stage_order() {
        let config = Config::default();
        let plan = ImagePlanner::new(&config).plan();
        let kinds: Vec<StepKind> = plan.runtime.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::Base,
                StepKind::InstallRuntimePackages,
                StepKind::CreateIdentity,
                StepKind::Workdir,
                StepKind::CopyEnvironment,
                StepKind::CopySource,
                StepKind::CopyMigrations,
                StepKind::CopyMigrations,
                StepKind::ActivateEnvironment,
                StepKind::ActivateEnvironment,
                StepKind::Chown,
                StepKind::Expose,
                StepKind::Healthcheck,
                StepKind::SwitchUser,
                StepKind::Entrypoint,
            ]
        );
    }

    #[test]
    fn test_builder_resolves_without_project_or_dev() {
        let config = Config::default();
        let plan = ImagePlanner::new(&config).plan();
        let resolve = plan
            .builder
            .steps_of(StepKind::ResolveDependencies)
            .find_map(|s| match &s.instruction {
                Instruction::Run(cmds) => Some(cmds.join(" && ")),
                _ => None,
            })
            .unwrap();
        assert!(resolve.contains("--frozen"));
        assert!(resolve.contains("--no-dev"));
        assert!(resolve.contains("--no-install-project"));
    }

    #[test]
    fn test_pinned_resolver_version() {
        let mut config = Config::default();
        config.image.resolver_version = Some("0.4.18".to_string());
        let planner = ImagePlanner::new(&config);
        assert_eq!(
            planner.resolver_install_command(),
            "pip install --no-cache-dir uv==0.4.18"
        );
    }

    #[test]
    fn test_numeric_identity_flags() {
        let mut config = Config::default();
        config.identity.uid = Some(10001);
        config.identity.gid = Some(10001);
        let plan = ImagePlanner::new(&config).plan();
        let create = plan.runtime.steps_of(StepKind::CreateIdentity).next().unwrap();
        match &create.instruction {
            Instruction::Run(cmds) => {
                assert_eq!(cmds[0], "groupadd --system --gid 10001 appuser");
                assert!(cmds[1].contains("--uid 10001"));
                assert!(cmds[1].contains("/usr/sbin/nologin"));
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }
}
