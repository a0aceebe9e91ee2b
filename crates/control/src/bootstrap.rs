use inspection_metrics::TracingService;
use inspection_models::PlatformError;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::admin::DatabaseAdmin;
use crate::migrations::PROVISION_MARKER;
use crate::plan::{BootstrapPlan, BootstrapStep, DatabaseTargets};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// Steps were executed and the marker recorded. `adopted` is set when the
    /// test database was already present and only the grants were applied.
    Applied { steps: Vec<BootstrapStep>, adopted: bool },
    AlreadyApplied { marker: String },
}

impl BootstrapOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            BootstrapOutcome::Applied { adopted: false, .. } => "applied",
            BootstrapOutcome::Applied { adopted: true, .. } => "adopted",
            BootstrapOutcome::AlreadyApplied { .. } => "already_applied",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseState {
    pub name: String,
    pub exists: bool,
    pub privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub role: String,
    pub marker_recorded: bool,
    pub databases: Vec<DatabaseState>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        self.marker_recorded && self.databases.iter().all(|db| db.exists && db.privileged)
    }

    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.marker_recorded {
            problems.push(format!("ledger marker {PROVISION_MARKER} not recorded"));
        }
        for db in &self.databases {
            if !db.exists {
                problems.push(format!("database {} does not exist", db.name));
            } else if !db.privileged {
                problems.push(format!(
                    "role {} lacks CREATE, CONNECT, TEMPORARY on {}",
                    self.role, db.name
                ));
            }
        }
        problems
    }
}

pub struct Bootstrapper<A> {
    admin: A,
    plan: BootstrapPlan,
}

impl<A: DatabaseAdmin> Bootstrapper<A> {
    pub fn new(admin: A, targets: DatabaseTargets) -> Self {
        Self {
            admin,
            plan: BootstrapPlan::for_targets(targets),
        }
    }

    pub fn plan(&self) -> &BootstrapPlan {
        &self.plan
    }

    /// Applies the plan once per database volume. The ledger lives in the
    /// primary database, so a volume that already carries the marker is
    /// left untouched.
    #[instrument(skip(self), fields(primary = %self.plan.targets.primary, test = %self.plan.targets.test))]
    pub async fn run(&self) -> Result<BootstrapOutcome, PlatformError> {
        let targets = &self.plan.targets;
        if !self.admin.database_exists(&targets.primary).await? {
            return Err(PlatformError::BootstrapFailed {
                reason: format!("primary database {} does not exist", targets.primary),
            });
        }

        self.admin.ensure_ledger().await?;
        if self.admin.ledger_contains(PROVISION_MARKER).await? {
            info!(marker = PROVISION_MARKER, "Bootstrap already applied, skipping");
            return Ok(BootstrapOutcome::AlreadyApplied {
                marker: PROVISION_MARKER.to_string(),
            });
        }

        let mut adopted = false;
        for step in &self.plan.steps {
            match step {
                BootstrapStep::CreateDatabase { name } => {
                    adopted = self.create_or_adopt(name).await?;
                    if !adopted {
                        TracingService::log_bootstrap_step("create_database", name, None);
                    }
                }
                BootstrapStep::GrantAll { database, role } => {
                    self.admin.grant_all(database, role).await?;
                    TracingService::log_bootstrap_step("grant_all", database, Some(role.as_str()));
                }
            }
        }

        self.admin.record_marker(PROVISION_MARKER).await?;
        info!(marker = PROVISION_MARKER, adopted, "Bootstrap applied");

        Ok(BootstrapOutcome::Applied {
            steps: self.plan.steps.clone(),
            adopted,
        })
    }

    async fn create_or_adopt(&self, name: &str) -> Result<bool, PlatformError> {
        if self.admin.database_exists(name).await? {
            warn!(database = %name, "Database exists without a ledger marker, adopting it");
            return Ok(true);
        }
        match self.admin.create_database(name).await {
            Ok(()) => Ok(false),
            // Created concurrently between the existence check and CREATE.
            Err(PlatformError::DatabaseAlreadyExists { .. }) => {
                warn!(database = %name, "Database appeared during bootstrap, adopting it");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Reports the provisioned state without changing it. A missing ledger
    /// reads as an unrecorded marker.
    #[instrument(skip(self))]
    pub async fn verify(&self) -> Result<BootstrapReport, PlatformError> {
        let targets = &self.plan.targets;
        let marker_recorded = self.admin.ledger_exists().await?
            && self.admin.ledger_contains(PROVISION_MARKER).await?;

        let mut databases = Vec::new();
        for name in targets.databases() {
            let exists = self.admin.database_exists(name).await?;
            let privileged = exists
                && self
                    .admin
                    .has_all_privileges(name, &targets.admin_role)
                    .await?;
            databases.push(DatabaseState {
                name: name.to_string(),
                exists,
                privileged,
            });
        }

        Ok(BootstrapReport {
            role: targets.admin_role.clone(),
            marker_recorded,
            databases,
        })
    }
}
