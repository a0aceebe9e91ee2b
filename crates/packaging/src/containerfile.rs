use crate::plan::{ImagePlan, Instruction, Stage};

/// Renders a verified plan as Containerfile text.
pub fn render_containerfile(plan: &ImagePlan) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} - generated, do not edit\n", plan.tag));
    render_stage(&mut out, &plan.builder);
    out.push('\n');
    render_stage(&mut out, &plan.runtime);
    out
}

fn render_stage(out: &mut String, stage: &Stage) {
    for step in &stage.steps {
        out.push_str(&render_instruction(&step.instruction));
        out.push('\n');
    }
}

pub fn render_instruction(instruction: &Instruction) -> String {
    match instruction {
        Instruction::From { image, alias } => format!("FROM {image} AS {alias}"),
        Instruction::Workdir(dir) => format!("WORKDIR {dir}"),
        Instruction::Env { key, value } => format!("ENV {}={}", key, quote_env(value)),
        Instruction::Run(cmds) => format!("RUN {}", cmds.join(" \\\n    && ")),
        Instruction::Copy {
            from_stage,
            sources,
            dest,
        } => {
            let from = from_stage
                .as_ref()
                .map(|s| format!("--from={s} "))
                .unwrap_or_default();
            format!("COPY {}{} {}", from, sources.join(" "), dest)
        }
        Instruction::User(user) => format!("USER {user}"),
        Instruction::Expose(port) => format!("EXPOSE {port}"),
        Instruction::Healthcheck {
            interval_secs,
            timeout_secs,
            start_period_secs,
            retries,
            command,
        } => format!(
            "HEALTHCHECK --interval={interval_secs}s --timeout={timeout_secs}s --start-period={start_period_secs}s --retries={retries} \\\n    CMD {command}"
        ),
        Instruction::Cmd(args) => format!("CMD {}", exec_form(args)),
    }
}

fn quote_env(value: &str) -> String {
    if value.contains(|c: char| c.is_whitespace() || c == '$' || c == '"') {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn exec_form(args: &[String]) -> String {
    // serde_json gives the JSON array quoting the exec form expects
    serde_json::to_string(args).unwrap_or_else(|_| "[]".to_string())
}
