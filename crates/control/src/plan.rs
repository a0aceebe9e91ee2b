use inspection_models::DatabaseConfig;
use serde::{Deserialize, Serialize};

/// Names the bootstrap works on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTargets {
    pub primary: String,
    pub test: String,
    pub admin_role: String,
}

impl DatabaseTargets {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            primary: config.primary.clone(),
            test: config.test_database(),
            admin_role: config.admin_role.clone(),
        }
    }

    pub fn databases(&self) -> [&str; 2] {
        [&self.primary, &self.test]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BootstrapStep {
    CreateDatabase { name: String },
    GrantAll { database: String, role: String },
}

impl BootstrapStep {
    pub fn describe(&self) -> String {
        match self {
            BootstrapStep::CreateDatabase { name } => format!("create database {name}"),
            BootstrapStep::GrantAll { database, role } => {
                format!("grant all on {database} to {role}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapPlan {
    pub targets: DatabaseTargets,
    pub steps: Vec<BootstrapStep>,
}

impl BootstrapPlan {
    /// Create the test database, then grant on the primary, then on the test
    /// database.
    pub fn for_targets(targets: DatabaseTargets) -> Self {
        let steps = vec![
            BootstrapStep::CreateDatabase {
                name: targets.test.clone(),
            },
            BootstrapStep::GrantAll {
                database: targets.primary.clone(),
                role: targets.admin_role.clone(),
            },
            BootstrapStep::GrantAll {
                database: targets.test.clone(),
                role: targets.admin_role.clone(),
            },
        ];
        Self { targets, steps }
    }
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// psql script for the engine's first-run init directory. Database creation
/// is guarded with `\gexec` so a re-run does not fail on the duplicate.
pub fn render_init_sql(plan: &BootstrapPlan) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "-- Provisions {} and {} for role {}.\n",
        plan.targets.primary, plan.targets.test, plan.targets.admin_role
    ));
    for step in &plan.steps {
        match step {
            BootstrapStep::CreateDatabase { name } => {
                out.push_str(&format!(
                    "SELECT 'CREATE DATABASE {}' WHERE NOT EXISTS (SELECT FROM pg_database WHERE datname = {})\\gexec\n",
                    quote_ident(name).replace('\'', "''"),
                    quote_literal(name)
                ));
            }
            BootstrapStep::GrantAll { database, role } => {
                out.push_str(&format!(
                    "GRANT ALL PRIVILEGES ON DATABASE {} TO {};\n",
                    quote_ident(database),
                    quote_ident(role)
                ));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_order() {
        let plan = BootstrapPlan::for_targets(DatabaseTargets::from_config(&DatabaseConfig::default()));
        let described: Vec<String> = plan.steps.iter().map(|s| s.describe()).collect();
        assert_eq!(
            described,
            vec![
                "create database vehicle_inspection_test",
                "grant all on vehicle_inspection to postgres",
                "grant all on vehicle_inspection_test to postgres",
            ]
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_render_init_sql() {
        let plan = BootstrapPlan::for_targets(DatabaseTargets::from_config(&DatabaseConfig::default()));
        let sql = render_init_sql(&plan);
        let lines: Vec<&str> = sql.lines().skip(1).collect();
        assert_eq!(
            lines,
            vec![
                "SELECT 'CREATE DATABASE \"vehicle_inspection_test\"' WHERE NOT EXISTS (SELECT FROM pg_database WHERE datname = 'vehicle_inspection_test')\\gexec",
                "GRANT ALL PRIVILEGES ON DATABASE \"vehicle_inspection\" TO \"postgres\";",
                "GRANT ALL PRIVILEGES ON DATABASE \"vehicle_inspection_test\" TO \"postgres\";",
            ]
        );
    }
}
