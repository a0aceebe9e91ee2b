use anyhow::Result;
use std::path::Path;
use tempfile::TempDir;

pub const MANIFEST: &str = r#"[project]
name = "vehicle-inspection"
version = "0.1.0"
requires-python = ">=3.11"
dependencies = [
    "fastapi>=0.104.0",
    "uvicorn[standard]>=0.24.0",
    "asyncpg>=0.29.0",
]

[dependency-groups]
dev = ["pytest>=7.4.0"]
"#;

pub const LOCK: &str = r#"version = 1
requires-python = ">=3.11"

[[package]]
name = "asyncpg"
version = "0.29.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "fastapi"
version = "0.104.1"
source = { registry = "https://pypi.org/simple" }
dependencies = [{ name = "starlette" }]

[[package]]
name = "h11"
version = "0.14.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "pytest"
version = "7.4.3"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "starlette"
version = "0.27.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "uvicorn"
version = "0.24.0"
source = { registry = "https://pypi.org/simple" }
dependencies = [{ name = "h11" }]

[package.optional-dependencies]
standard = [{ name = "uvloop" }]

[[package]]
name = "uvloop"
version = "0.19.0"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "vehicle-inspection"
version = "0.1.0"
source = { editable = "." }
dependencies = [
    { name = "asyncpg" },
    { name = "fastapi" },
    { name = "uvicorn", extra = ["standard"] },
]

[package.dev-dependencies]
dev = [{ name = "pytest" }]
"#;

/// A throwaway project directory laid out like the build context.
pub struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    pub fn new() -> Result<Self> {
        Self::with_lock(LOCK)
    }

    pub fn with_lock(lock: &str) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        std::fs::write(root.join("pyproject.toml"), MANIFEST)?;
        std::fs::write(root.join("uv.lock"), lock)?;
        std::fs::create_dir_all(root.join("src/vehicle_inspection"))?;
        std::fs::write(root.join("src/vehicle_inspection/__init__.py"), "")?;
        std::fs::create_dir_all(root.join("alembic"))?;
        std::fs::write(root.join("alembic/env.py"), "")?;
        std::fs::write(root.join("alembic.ini"), "[alembic]\nscript_location = alembic\n")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn remove(&self, rel: &str) -> Result<()> {
        std::fs::remove_file(self.path().join(rel))?;
        Ok(())
    }
}
