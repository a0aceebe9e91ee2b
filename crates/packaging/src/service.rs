use crate::{render_containerfile, BuildOutcome, DependencySet, ImageBuilder, ImageInspector, ImageReport};
use inspection_models::{Config, PlatformError};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PackagingService {
    config: Arc<Config>,
    image_builder: ImageBuilder,
}

impl PackagingService {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            image_builder: ImageBuilder::default(),
        }
    }

    pub fn with_builder(config: Arc<Config>, image_builder: ImageBuilder) -> Self {
        Self {
            config,
            image_builder,
        }
    }

    /// Validates lock and manifest in `context` and returns the runtime set.
    pub fn check_lock(&self, context: &Path) -> Result<DependencySet, PlatformError> {
        ImageBuilder::preflight(&self.config, context)
    }

    pub fn render(&self) -> Result<String, PlatformError> {
        let plan = ImageBuilder::plan(&self.config)?;
        Ok(render_containerfile(&plan))
    }

    pub async fn build(&self, context: &Path) -> Result<BuildOutcome, PlatformError> {
        self.image_builder.build_image(&self.config, context).await
    }

    /// Inspects a built image and audits its filesystem. Returns every problem
    /// found; an empty list means the image honours the lifecycle contract.
    pub async fn verify_built(&self, tag: &str) -> Result<(ImageReport, Vec<String>), PlatformError> {
        let inspector = ImageInspector::connect()?;
        let report = inspector.inspect(tag).await?;
        let mut problems = report.verify(&self.config);
        problems.extend(self.image_builder.audit_filesystem(&self.config, tag).await?);

        if problems.is_empty() {
            info!(tag, "Image verified");
        } else {
            warn!(tag, problems = problems.len(), "Image does not honour the lifecycle contract");
        }
        Ok((report, problems))
    }
}
