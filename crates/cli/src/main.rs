use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use inspection_control::{
    render_init_sql, BootstrapOutcome, Bootstrapper, DatabaseTargets, PgAdmin,
};
use inspection_metrics::{MetricsService, TracingService};
use inspection_models::{Config, PlatformError};
use inspection_packaging::{check_plan, ImageBuilder, ImageInspector, PackagingService};
use inspection_probe::probe_once;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "inspection-cli")]
#[command(about = "Build, probe and bootstrap the vehicle inspection service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true, env = "VEHICLE_INSPECTION_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock file checks
    Lock {
        #[command(subcommand)]
        command: LockCommands,
    },
    /// Container image plan, build and verification
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },
    /// Probe the liveness endpoint once; exit 0 on success, 1 on failure
    Probe {
        /// Full URL; defaults to the configured health path on localhost
        #[arg(long)]
        url: Option<String>,
        /// Request timeout; defaults to the configured health timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Database bootstrap
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum LockCommands {
    /// Check the lock file against the manifest
    Check {
        #[arg(long, default_value = ".")]
        context: PathBuf,
    },
    /// Print the digest of the locked runtime dependency set
    Digest {
        #[arg(long, default_value = ".")]
        context: PathBuf,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Print the two-stage Containerfile
    Render {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check the planned image against the lifecycle rules
    Verify,
    /// Build the image from a project directory
    Build {
        #[arg(long, default_value = ".")]
        context: PathBuf,
        /// Container engine binary
        #[arg(long, default_value = "docker")]
        docker_bin: String,
    },
    /// Inspect a built image and audit its filesystem
    Inspect {
        /// Image tag; defaults to the configured tag
        #[arg(long)]
        tag: Option<String>,
        /// Only read image metadata, skip running the image
        #[arg(long)]
        metadata_only: bool,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Provision the test database and grants, once per volume
    Bootstrap {
        /// Write the run counter in Prometheus text format, for a
        /// textfile collector
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },
    /// Report whether both databases exist with full privileges
    Verify,
    /// Print the first-run init script for the database engine
    Script {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Err(e) = TracingService::init_stderr(&config.logging) {
        eprintln!("Failed to initialise logging: {e}");
    }

    match run(cli.command, Arc::new(config)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let platform = e.downcast_ref::<PlatformError>();
            let code = platform.map(PlatformError::exit_code).unwrap_or(1);
            let error_type = platform.map(PlatformError::error_type).unwrap_or("Unexpected");
            error!(error = %e, error_type, "Command failed");
            ExitCode::from(code as u8)
        }
    }
}

async fn run(command: Commands, config: Arc<Config>) -> Result<()> {
    match command {
        Commands::Lock { command } => lock(command, &config),
        Commands::Image { command } => image(command, config).await,
        Commands::Probe { url, timeout_secs } => probe(&config, url, timeout_secs).await,
        Commands::Db { command } => db(command, &config).await,
    }
}

fn lock(command: LockCommands, config: &Config) -> Result<()> {
    match command {
        LockCommands::Check { context } => {
            let dependencies = ImageBuilder::preflight(config, &context)?;
            info!(packages = dependencies.len(), digest = %dependencies.digest(), "Lock file is consistent");
            for package in &dependencies.packages {
                println!("{}=={}", package.name, package.version);
            }
        }
        LockCommands::Digest { context } => {
            let dependencies = ImageBuilder::preflight(config, &context)?;
            println!("{}", dependencies.digest());
        }
    }
    Ok(())
}

async fn image(command: ImageCommands, config: Arc<Config>) -> Result<()> {
    match command {
        ImageCommands::Render { output } => {
            let containerfile = PackagingService::new(config).render()?;
            write_or_print(output.as_deref(), &containerfile)?;
        }
        ImageCommands::Verify => {
            let plan = inspection_packaging::ImagePlanner::new(&config).plan();
            let violations = check_plan(&plan, &config);
            for violation in &violations {
                println!("{}: {}", violation.rule, violation.detail);
            }
            if let Some(first) = violations.into_iter().next() {
                return Err(PlatformError::from(first).into());
            }
            info!(tag = %plan.tag, "Image plan honours the lifecycle rules");
        }
        ImageCommands::Build { context, docker_bin } => {
            let service = PackagingService::with_builder(config, ImageBuilder::new(docker_bin));
            let outcome = service.build(&context).await?;
            println!("{} {}", outcome.tag, outcome.dependencies.digest());
        }
        ImageCommands::Inspect { tag, metadata_only } => {
            let tag = tag.unwrap_or_else(|| config.image.tag.clone());
            let (report, problems) = if metadata_only {
                let report = ImageInspector::connect()?.inspect(&tag).await?;
                let problems = report.verify(&config);
                (report, problems)
            } else {
                PackagingService::new(config).verify_built(&tag).await?
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !problems.is_empty() {
                return Err(PlatformError::PlanViolation {
                    rule: "image-contract".to_string(),
                    detail: problems.join("; "),
                }
                .into());
            }
        }
    }
    Ok(())
}

async fn probe(config: &Config, url: Option<String>, timeout_secs: Option<u64>) -> Result<()> {
    let url = url.unwrap_or_else(|| config.health.url_for(config.server.port));
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.health.timeout());
    let outcome = probe_once(&url, timeout).await?;
    info!(url = %url, latency_ms = outcome.latency_ms, "Service is healthy");
    Ok(())
}

async fn db(command: DbCommands, config: &Config) -> Result<()> {
    let targets = DatabaseTargets::from_config(&config.database);
    match command {
        DbCommands::Script { output } => {
            let plan = inspection_control::BootstrapPlan::for_targets(targets);
            write_or_print(output.as_deref(), &render_init_sql(&plan))?;
        }
        DbCommands::Bootstrap { metrics_file } => {
            let metrics = MetricsService::new()?;
            let result = bootstrap(config, targets).await;
            let exposition = record_bootstrap_run(&metrics, result.as_ref().ok())?;
            if let Some(path) = metrics_file {
                write_or_print(Some(&path), &exposition)?;
            }
            let outcome = result?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        DbCommands::Verify => {
            let admin = PgAdmin::connect(&config.database).await?;
            let report = Bootstrapper::new(admin, targets).verify().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                return Err(PlatformError::BootstrapFailed {
                    reason: report.problems().join("; "),
                }
                .into());
            }
        }
    }
    Ok(())
}

async fn bootstrap(config: &Config, targets: DatabaseTargets) -> Result<BootstrapOutcome, PlatformError> {
    let admin = PgAdmin::connect(&config.database).await?;
    Bootstrapper::new(admin, targets).run().await
}

/// Counts the run under its outcome label, `failed` when there is none, and
/// returns the resulting exposition.
fn record_bootstrap_run(
    metrics: &MetricsService,
    outcome: Option<&BootstrapOutcome>,
) -> Result<String, PlatformError> {
    let label = outcome.map_or("failed", BootstrapOutcome::label);
    metrics.record_bootstrap(label);
    info!(outcome = label, "Bootstrap run recorded");
    metrics.get_prometheus_metrics()
}

fn write_or_print(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)?;
            info!(path = %path.display(), "Wrote file");
        }
        None => print!("{content}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_probe_arguments() {
        let cli = Cli::parse_from([
            "inspection-cli",
            "probe",
            "--url",
            "http://localhost:8000/health",
            "--timeout-secs",
            "3",
        ]);
        match cli.command {
            Commands::Probe { url, timeout_secs } => {
                assert_eq!(url.as_deref(), Some("http://localhost:8000/health"));
                assert_eq!(timeout_secs, Some(3));
            }
            _ => panic!("expected probe"),
        }
    }

    #[test]
    fn test_bootstrap_metrics_file_flag() {
        let cli = Cli::parse_from([
            "inspection-cli",
            "db",
            "bootstrap",
            "--metrics-file",
            "/var/lib/node_exporter/inspection.prom",
        ]);
        match cli.command {
            Commands::Db {
                command: DbCommands::Bootstrap { metrics_file },
            } => assert_eq!(
                metrics_file,
                Some(PathBuf::from("/var/lib/node_exporter/inspection.prom"))
            ),
            _ => panic!("expected db bootstrap"),
        }
    }

    #[test]
    fn test_bootstrap_run_is_exported() {
        let metrics = MetricsService::new().unwrap();
        let text = record_bootstrap_run(&metrics, None).unwrap();
        assert!(text.contains("inspection_bootstrap_runs_total{outcome=\"failed\"} 1"));

        let outcome = BootstrapOutcome::AlreadyApplied {
            marker: "0001_provision_test_database".to_string(),
        };
        let text = record_bootstrap_run(&metrics, Some(&outcome)).unwrap();
        assert!(text.contains("inspection_bootstrap_runs_total{outcome=\"already_applied\"} 1"));
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["inspection-cli", "db", "script", "--config", "app.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("app.toml")));
        assert!(matches!(
            cli.command,
            Commands::Db {
                command: DbCommands::Script { output: None }
            }
        ));
    }
}
