use crate::plan::{ImagePlan, Instruction, Stage, StepKind, BUILDER_STAGE};
use inspection_models::{Config, PlatformError};
use serde::Serialize;
use tracing::{debug, warn};

/// A broken lifecycle rule, named so failures are greppable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: &'static str,
    pub detail: String,
}

impl Violation {
    fn new(rule: &'static str, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

impl From<Violation> for PlatformError {
    fn from(v: Violation) -> Self {
        PlatformError::PlanViolation {
            rule: v.rule.to_string(),
            detail: v.detail,
        }
    }
}

/// Checks every rule and returns all violations.
pub fn check_plan(plan: &ImagePlan, config: &Config) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_builder(&plan.builder, config, &mut violations);
    check_resolver_absent(&plan.runtime, config, &mut violations);
    check_ordering(&plan.runtime, &mut violations);
    check_identity(&plan.runtime, config, &mut violations);
    check_environment(&plan.runtime, config, &mut violations);
    check_interface(&plan.runtime, config, &mut violations);

    for v in &violations {
        warn!(rule = v.rule, detail = %v.detail, "Image plan violation");
    }
    debug!(violations = violations.len(), "Image plan checked");
    violations
}

/// Fails on the first violation.
pub fn verify_plan(plan: &ImagePlan, config: &Config) -> Result<(), PlatformError> {
    match check_plan(plan, config).into_iter().next() {
        Some(v) => Err(v.into()),
        None => Ok(()),
    }
}

fn run_text(instruction: &Instruction) -> Option<String> {
    match instruction {
        Instruction::Run(cmds) => Some(cmds.join(" && ")),
        _ => None,
    }
}

fn mentions_word(text: &str, word: &str) -> bool {
    text.split(|c: char| c.is_whitespace() || c == '/' || c == '=' || c == ';' || c == '&' || c == '|')
        .any(|token| token == word)
}

fn check_builder(stage: &Stage, config: &Config, out: &mut Vec<Violation>) {
    let resolve: Vec<String> = stage
        .steps_of(StepKind::ResolveDependencies)
        .filter_map(|s| run_text(&s.instruction))
        .collect();
    if resolve.is_empty() {
        out.push(Violation::new("lock-frozen", "builder stage never resolves dependencies"));
        return;
    }
    for cmd in &resolve {
        for flag in ["--frozen", "--no-dev", "--no-install-project"] {
            if !cmd.contains(flag) {
                out.push(Violation::new(
                    "lock-frozen",
                    format!("resolve step {cmd:?} is missing {flag}"),
                ));
            }
        }
    }
    let lock_copied = stage.steps_of(StepKind::CopyLockInputs).any(|s| {
        matches!(&s.instruction, Instruction::Copy { sources, .. } if sources.contains(&config.image.lock_file))
    });
    if !lock_copied {
        out.push(Violation::new(
            "lock-frozen",
            format!("{} is not copied into the builder stage", config.image.lock_file),
        ));
    }
}

fn check_resolver_absent(stage: &Stage, config: &Config, out: &mut Vec<Violation>) {
    let resolver = config.image.resolver.as_str();
    let env_path = config.image.env_path();

    for step in &stage.steps {
        if step.kind == StepKind::InstallResolver {
            out.push(Violation::new(
                "resolver-absent",
                "runtime stage installs the dependency resolver",
            ));
        }
        match &step.instruction {
            Instruction::Run(_) => {
                let text = run_text(&step.instruction).unwrap_or_default();
                if mentions_word(&text, resolver) {
                    out.push(Violation::new(
                        "resolver-absent",
                        format!("runtime stage invokes {resolver}: {text:?}"),
                    ));
                }
            }
            Instruction::Copy {
                from_stage,
                sources,
                ..
            } => {
                if from_stage.as_deref() == Some(BUILDER_STAGE) {
                    for src in sources {
                        if src.trim_end_matches('/') != env_path {
                            out.push(Violation::new(
                                "resolver-absent",
                                format!("runtime stage copies {src} out of the builder stage"),
                            ));
                        }
                    }
                }
                if sources.iter().any(|s| mentions_word(s, resolver)) {
                    out.push(Violation::new(
                        "resolver-absent",
                        format!("runtime stage copies {resolver}"),
                    ));
                }
            }
            _ => {}
        }
    }
}

fn check_ordering(stage: &Stage, out: &mut Vec<Violation>) {
    let env_copy = stage.position(StepKind::CopyEnvironment);
    if env_copy.is_none() {
        out.push(Violation::new(
            "packages-before-environment",
            "runtime stage never copies the environment",
        ));
    }
    if let (Some(packages), Some(env)) = (stage.last_position(StepKind::InstallRuntimePackages), env_copy) {
        if packages > env {
            out.push(Violation::new(
                "packages-before-environment",
                "runtime packages are installed after the environment is copied",
            ));
        }
    }

    let last_copy = stage
        .steps
        .iter()
        .rposition(|s| matches!(s.instruction, Instruction::Copy { .. }));
    let chown = stage.last_position(StepKind::Chown);
    match (chown, last_copy) {
        (None, _) => out.push(Violation::new("chown-covers-all-files", "no chown step")),
        (Some(c), Some(l)) if c < l => out.push(Violation::new(
            "chown-covers-all-files",
            "files are copied after the ownership change",
        )),
        _ => {}
    }

    let users: Vec<usize> = stage
        .steps
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s.instruction, Instruction::User(_)))
        .map(|(i, _)| i)
        .collect();
    if let Some(c) = chown {
        let until = users.first().copied().unwrap_or(stage.steps.len());
        let root_run = stage
            .steps
            .iter()
            .take(until)
            .skip(c + 1)
            .any(|s| s.kind != StepKind::Chown && matches!(s.instruction, Instruction::Run(_)));
        if root_run {
            out.push(Violation::new(
                "chown-covers-all-files",
                "commands run as root after the ownership change",
            ));
        }
    }

    match users.as_slice() {
        [] => out.push(Violation::new("user-last", "no USER instruction")),
        [user] => {
            if let Some(c) = chown {
                if *user < c {
                    out.push(Violation::new("user-last", "USER precedes the ownership change"));
                }
            }
            let trailing = &stage.steps[user + 1..];
            if trailing.iter().any(|s| s.kind != StepKind::Entrypoint) {
                out.push(Violation::new(
                    "user-last",
                    "configuration steps follow the identity switch",
                ));
            }
            if !trailing.iter().any(|s| s.kind == StepKind::Entrypoint) {
                out.push(Violation::new("user-last", "no entrypoint after USER"));
            }
        }
        _ => out.push(Violation::new(
            "user-last",
            format!("{} USER instructions", users.len()),
        )),
    }
}

fn check_identity(stage: &Stage, config: &Config, out: &mut Vec<Violation>) {
    let expected = config.identity.user_group();
    for step in &stage.steps {
        match &step.instruction {
            Instruction::User(user) => {
                let name = user.split(':').next().unwrap_or_default();
                if name == "root" || name == "0" {
                    out.push(Violation::new("non-root-user", format!("USER {user}")));
                } else if *user != expected {
                    out.push(Violation::new(
                        "non-root-user",
                        format!("USER {user} does not match identity {expected}"),
                    ));
                }
            }
            Instruction::Run(_) if step.kind == StepKind::Chown => {
                let text = run_text(&step.instruction).unwrap_or_default();
                let workdir = config.image.workdir.trim_end_matches('/');
                let covers_workdir = text
                    .split_whitespace()
                    .any(|t| t.trim_end_matches('/') == workdir);
                if !text.contains(&expected) || !covers_workdir {
                    out.push(Violation::new(
                        "chown-covers-all-files",
                        format!("chown {text:?} does not hand {} to {expected}", config.image.workdir),
                    ));
                }
            }
            Instruction::Copy { dest, .. } => {
                if !is_within(dest, &config.image.workdir) {
                    out.push(Violation::new(
                        "chown-covers-all-files",
                        format!("{dest} lies outside {}", config.image.workdir),
                    ));
                }
            }
            _ => {}
        }
    }
}

/// Component-wise containment: `/app/src` is inside `/app`, `/application`
/// is not.
fn is_within(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    let path = path.trim_end_matches('/');
    dir.is_empty() || path == dir || path.starts_with(&format!("{dir}/"))
}

fn check_environment(stage: &Stage, config: &Config, out: &mut Vec<Violation>) {
    let env_path = config.image.env_path();
    let env_bin = config.image.env_bin_path();
    let envs: Vec<(&str, &str)> = stage
        .steps
        .iter()
        .filter_map(|s| match &s.instruction {
            Instruction::Env { key, value } => Some((key.as_str(), value.as_str())),
            _ => None,
        })
        .collect();

    if !envs.iter().any(|(k, v)| *k == config.image.env_var && *v == env_path) {
        out.push(Violation::new(
            "environment-activated",
            format!("{} is not set to {env_path}", config.image.env_var),
        ));
    }
    if !envs
        .iter()
        .any(|(k, v)| *k == "PATH" && v.starts_with(&format!("{env_bin}:")))
    {
        out.push(Violation::new(
            "environment-activated",
            format!("PATH is not prefixed with {env_bin}"),
        ));
    }
}

fn check_interface(stage: &Stage, config: &Config, out: &mut Vec<Violation>) {
    let port = config.server.port;
    if !stage
        .steps
        .iter()
        .any(|s| s.instruction == Instruction::Expose(port))
    {
        out.push(Violation::new("single-port", format!("port {port} is not exposed")));
    }

    match stage.steps_of(StepKind::Entrypoint).last().map(|s| &s.instruction) {
        Some(Instruction::Cmd(args)) => {
            let port_str = port.to_string();
            if !args.iter().any(|a| a == "0.0.0.0") || !args.iter().any(|a| *a == port_str) {
                out.push(Violation::new(
                    "single-port",
                    format!("entrypoint {args:?} does not bind 0.0.0.0:{port}"),
                ));
            }
        }
        _ => out.push(Violation::new("single-port", "no entrypoint command")),
    }

    let health = &config.health;
    match stage.steps_of(StepKind::Healthcheck).next().map(|s| &s.instruction) {
        Some(Instruction::Healthcheck {
            interval_secs,
            timeout_secs,
            start_period_secs,
            retries,
            command,
        }) => {
            if (*interval_secs, *timeout_secs, *start_period_secs, *retries)
                != (
                    health.interval_secs,
                    health.timeout_secs,
                    health.start_period_secs,
                    health.retries,
                )
            {
                out.push(Violation::new(
                    "healthcheck-declared",
                    "health check timing differs from the configured policy",
                ));
            }
            let tool = command.split_whitespace().next().unwrap_or_default();
            let installed = config.image.runtime_packages.iter().any(|p| p == tool);
            if !installed && !tool.starts_with('/') {
                out.push(Violation::new(
                    "healthcheck-declared",
                    format!("probe tool {tool} is not installed in the runtime stage"),
                ));
            }
            if !command.contains(&health.path) {
                out.push(Violation::new(
                    "healthcheck-declared",
                    format!("probe does not target {}", health.path),
                ));
            }
        }
        _ => out.push(Violation::new("healthcheck-declared", "no HEALTHCHECK")),
    }
}
