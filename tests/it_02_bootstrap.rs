use inspection_control::{
    render_init_sql, BootstrapOutcome, BootstrapPlan, Bootstrapper, DatabaseTargets,
};
use inspection_models::Config;
use inspection_testsupport::MemoryAdmin;

#[tokio::test]
async fn bootstrap_runs_once_per_volume() -> anyhow::Result<()> {
    let config = Config::default();
    let targets = DatabaseTargets::from_config(&config.database);
    let volume = MemoryAdmin::fresh(&config.database.primary);

    let first = Bootstrapper::new(volume.clone(), targets.clone()).run().await?;
    assert!(matches!(first, BootstrapOutcome::Applied { adopted: false, .. }));

    // A restarted container gets a new bootstrapper against the same volume.
    let second = Bootstrapper::new(volume.clone(), targets.clone()).run().await?;
    assert!(matches!(second, BootstrapOutcome::AlreadyApplied { .. }));

    let report = Bootstrapper::new(volume, targets).verify().await?;
    assert!(report.is_complete());
    assert_eq!(report.databases.len(), 2);
    Ok(())
}

#[test]
fn init_script_matches_plan_order() {
    let config = Config::default();
    let plan = BootstrapPlan::for_targets(DatabaseTargets::from_config(&config.database));
    let script = render_init_sql(&plan);

    let create = script.find("CREATE DATABASE").unwrap();
    let grant_primary = script
        .find("GRANT ALL PRIVILEGES ON DATABASE \"vehicle_inspection\"")
        .unwrap();
    let grant_test = script
        .find("GRANT ALL PRIVILEGES ON DATABASE \"vehicle_inspection_test\"")
        .unwrap();
    assert!(create < grant_primary && grant_primary < grant_test);
    assert!(script.contains("WHERE NOT EXISTS"));
}

#[cfg(feature = "postgres_tests")]
mod postgres {
    use super::*;
    use inspection_control::PgAdmin;
    use inspection_models::DatabaseConfig;

    /// Needs a disposable server reachable at `DATABASE_URL`.
    #[tokio::test]
    async fn pg_bootstrap_is_idempotent() -> anyhow::Result<()> {
        let url = std::env::var("DATABASE_URL")?;
        let database = DatabaseConfig {
            url,
            ..DatabaseConfig::default()
        };
        let targets = DatabaseTargets::from_config(&database);

        let admin = PgAdmin::connect(&database).await?;
        let bootstrapper = Bootstrapper::new(admin, targets);
        bootstrapper.run().await?;
        let again = bootstrapper.run().await?;
        assert!(matches!(again, BootstrapOutcome::AlreadyApplied { .. }));

        let report = bootstrapper.verify().await?;
        assert!(report.is_complete(), "{:?}", report.problems());
        Ok(())
    }
}
