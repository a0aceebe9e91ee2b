use std::sync::Arc;

use inspection_models::{Config, PlatformError};
use inspection_packaging::{check_plan, ImagePlanner, PackagingService, RUNTIME_STAGE};
use inspection_testsupport::{ProjectFixture, LOCK};

#[test]
fn locked_set_is_stable_and_excludes_dev() -> anyhow::Result<()> {
    let project = ProjectFixture::new()?;
    let service = PackagingService::new(Arc::new(Config::default()));

    let first = service.check_lock(project.path())?;
    let second = service.check_lock(project.path())?;
    assert_eq!(first.digest(), second.digest());
    assert!(first.contains("uvloop"));
    assert!(first.contains("starlette"));
    assert!(!first.contains("pytest"));
    assert!(!first.contains("vehicle-inspection"));
    Ok(())
}

#[test]
fn missing_lock_aborts() -> anyhow::Result<()> {
    let project = ProjectFixture::new()?;
    project.remove("uv.lock")?;
    let service = PackagingService::new(Arc::new(Config::default()));

    let err = service.check_lock(project.path()).unwrap_err();
    assert!(matches!(err, PlatformError::LockFileMissing { .. }));
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn floating_version_aborts() -> anyhow::Result<()> {
    let project = ProjectFixture::with_lock(&LOCK.replace("\"0.27.0\"", "\">=0.27\""))?;
    let service = PackagingService::new(Arc::new(Config::default()));

    let err = service.check_lock(project.path()).unwrap_err();
    assert!(matches!(err, PlatformError::UnpinnedDependency { .. }));
    Ok(())
}

#[test]
fn default_plan_honours_lifecycle_rules() {
    let config = Config::default();
    let plan = ImagePlanner::new(&config).plan();
    assert!(check_plan(&plan, &config).is_empty());
    assert_eq!(plan.runtime.name, RUNTIME_STAGE);

    let containerfile = PackagingService::new(Arc::new(config)).render().unwrap();
    assert!(containerfile.contains("FROM python:3.11-slim AS builder"));
    assert!(containerfile.contains("COPY --from=builder"));
    assert!(containerfile.contains("HEALTHCHECK --interval=30s --timeout=3s --start-period=5s --retries=3"));
    assert!(containerfile.contains("USER appuser"));
    assert!(containerfile.contains("EXPOSE 8000"));
}

#[cfg(feature = "docker_tests")]
mod docker {
    use super::*;

    #[ignore]
    #[tokio::test(flavor = "multi_thread")]
    async fn built_image_honours_contract() -> anyhow::Result<()> {
        let project = ProjectFixture::new()?;
        let config = Arc::new(Config::default());
        let service = PackagingService::new(config.clone());

        let outcome = service.build(project.path()).await?;
        let (report, problems) = service.verify_built(&outcome.tag).await?;
        assert!(problems.is_empty(), "{problems:?}");
        assert_eq!(report.user.as_deref(), Some("appuser:appuser"));
        Ok(())
    }
}
