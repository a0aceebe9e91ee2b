use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad failure classes. Build and bootstrap failures abort whatever was in
/// progress; health failures only ever become a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Build,
    Health,
    Bootstrap,
    Config,
    Internal,
}

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Lock file not found: {path}")]
    LockFileMissing { path: String },

    #[error("Invalid lock file: {reason}")]
    LockFileInvalid { reason: String },

    #[error("Invalid manifest: {reason}")]
    ManifestInvalid { reason: String },

    #[error("Dependency {name} is not pinned to an exact version (got {version:?})")]
    UnpinnedDependency { name: String, version: String },

    #[error("Lock file is inconsistent with manifest: {reason}")]
    LockMismatch { reason: String },

    #[error("Image plan violates {rule}: {detail}")]
    PlanViolation { rule: String, detail: String },

    #[error("Docker error: {message}")]
    DockerError { message: String },

    #[error("Health check failed: {reason}")]
    HealthCheckFailed { reason: String },

    #[error("Database already exists: {name}")]
    DatabaseAlreadyExists { name: String },

    #[error("Bootstrap failed: {reason}")]
    BootstrapFailed { reason: String },

    #[error("Database error: {reason}")]
    DatabaseError { reason: String },

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {reason}")]
    InternalError { reason: String },
}

impl From<figment::Error> for PlatformError {
    fn from(err: figment::Error) -> Self {
        PlatformError::ConfigError {
            reason: err.to_string(),
        }
    }
}

impl PlatformError {
    pub fn error_type(&self) -> &'static str {
        match self {
            PlatformError::LockFileMissing { .. } => "LockFileMissing",
            PlatformError::LockFileInvalid { .. } => "LockFileInvalid",
            PlatformError::ManifestInvalid { .. } => "ManifestInvalid",
            PlatformError::UnpinnedDependency { .. } => "UnpinnedDependency",
            PlatformError::LockMismatch { .. } => "LockMismatch",
            PlatformError::PlanViolation { .. } => "PlanViolation",
            PlatformError::DockerError { .. } => "DockerError",
            PlatformError::HealthCheckFailed { .. } => "HealthCheckFailed",
            PlatformError::DatabaseAlreadyExists { .. } => "DatabaseAlreadyExists",
            PlatformError::BootstrapFailed { .. } => "BootstrapFailed",
            PlatformError::DatabaseError { .. } => "DatabaseError",
            PlatformError::SqlxError(_) => "DatabaseError",
            PlatformError::ConfigError { .. } => "ConfigError",
            PlatformError::Io(_) => "IoError",
            PlatformError::InternalError { .. } => "InternalError",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::LockFileMissing { .. }
            | PlatformError::LockFileInvalid { .. }
            | PlatformError::ManifestInvalid { .. }
            | PlatformError::UnpinnedDependency { .. }
            | PlatformError::LockMismatch { .. }
            | PlatformError::PlanViolation { .. }
            | PlatformError::DockerError { .. } => ErrorKind::Build,
            PlatformError::HealthCheckFailed { .. } => ErrorKind::Health,
            PlatformError::DatabaseAlreadyExists { .. }
            | PlatformError::BootstrapFailed { .. }
            | PlatformError::DatabaseError { .. }
            | PlatformError::SqlxError(_) => ErrorKind::Bootstrap,
            PlatformError::ConfigError { .. } => ErrorKind::Config,
            PlatformError::Io(_) | PlatformError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Health failures are reported, never escalated.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Health)
    }

    /// Process exit code used by the command line tools.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Health => 1,
            ErrorKind::Config => 78,
            ErrorKind::Build => 65,
            ErrorKind::Bootstrap => 69,
            ErrorKind::Internal => 70,
        }
    }
}
