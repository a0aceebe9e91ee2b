use async_trait::async_trait;
use inspection_models::{DatabaseConfig, PlatformError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, Row};
use tracing::{debug, instrument};

use crate::migrations::LEDGER_DDL;
use crate::plan::quote_ident;

const DUPLICATE_DATABASE: &str = "42P04";

/// Operations the bootstrap needs from the database engine, run as the
/// administrative role against the primary database.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    async fn ensure_ledger(&self) -> Result<(), PlatformError>;
    async fn ledger_exists(&self) -> Result<bool, PlatformError>;
    async fn ledger_contains(&self, marker: &str) -> Result<bool, PlatformError>;
    async fn record_marker(&self, marker: &str) -> Result<(), PlatformError>;
    async fn database_exists(&self, name: &str) -> Result<bool, PlatformError>;
    async fn create_database(&self, name: &str) -> Result<(), PlatformError>;
    async fn grant_all(&self, database: &str, role: &str) -> Result<(), PlatformError>;
    async fn has_all_privileges(&self, database: &str, role: &str) -> Result<bool, PlatformError>;
}

pub struct PgAdmin {
    pool: PgPool,
}

impl PgAdmin {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, PlatformError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl DatabaseAdmin for PgAdmin {
    #[instrument(skip(self))]
    async fn ensure_ledger(&self) -> Result<(), PlatformError> {
        self.pool.execute(LEDGER_DDL).await?;
        Ok(())
    }

    async fn ledger_exists(&self) -> Result<bool, PlatformError> {
        let row = sqlx::query("SELECT to_regclass('inspection_bootstrap_ledger') IS NOT NULL AS present")
            .fetch_one(&self.pool)
            .await?;
        let present: bool = row.try_get("present")?;
        Ok(present)
    }

    async fn ledger_contains(&self, marker: &str) -> Result<bool, PlatformError> {
        let row = sqlx::query("SELECT 1 FROM inspection_bootstrap_ledger WHERE marker = $1")
            .bind(marker)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn record_marker(&self, marker: &str) -> Result<(), PlatformError> {
        sqlx::query(
            "INSERT INTO inspection_bootstrap_ledger (marker) VALUES ($1) ON CONFLICT (marker) DO NOTHING",
        )
        .bind(marker)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn database_exists(&self, name: &str) -> Result<bool, PlatformError> {
        let row = sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn create_database(&self, name: &str) -> Result<(), PlatformError> {
        // Plain statements go over the simple protocol; CREATE DATABASE takes no binds.
        let statement = format!("CREATE DATABASE {}", quote_ident(name));
        match self.pool.execute(statement.as_str()).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(DUPLICATE_DATABASE) =>
            {
                Err(PlatformError::DatabaseAlreadyExists { name: name.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn grant_all(&self, database: &str, role: &str) -> Result<(), PlatformError> {
        let statement = format!(
            "GRANT ALL PRIVILEGES ON DATABASE {} TO {}",
            quote_ident(database),
            quote_ident(role)
        );
        self.pool.execute(statement.as_str()).await?;
        Ok(())
    }

    async fn has_all_privileges(&self, database: &str, role: &str) -> Result<bool, PlatformError> {
        // A comma list passes when any one privilege is held, so each is checked.
        let row = sqlx::query(
            "SELECT has_database_privilege($1, $2, 'CREATE') \
                AND has_database_privilege($1, $2, 'CONNECT') \
                AND has_database_privilege($1, $2, 'TEMPORARY') AS granted",
        )
        .bind(role)
        .bind(database)
        .fetch_one(&self.pool)
        .await?;
        let granted: bool = row.try_get("granted")?;
        debug!(database, role, granted, "Checked database privileges");
        Ok(granted)
    }
}
