pub mod config;
pub mod error;
pub mod health;

pub use config::*;
pub use error::*;
pub use health::*;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.test_database(), "vehicle_inspection_test");
        assert_eq!(config.image.env_path(), "/app/.venv");
        assert_eq!(config.image.env_bin_path(), "/app/.venv/bin");
    }

    #[test]
    fn test_default_health_policy_matches_container_contract() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.interval_secs, 30);
        assert_eq!(policy.timeout_secs, 3);
        assert_eq!(policy.start_period_secs, 5);
        assert_eq!(policy.retries, 3);
        assert_eq!(policy.url_for(8000), "http://localhost:8000/health");
    }

    #[test]
    fn test_root_identity_rejected() {
        let mut config = Config::default();
        config.identity.user = "root".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PlatformError::ConfigError { .. }));

        let mut config = Config::default();
        config.identity.uid = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_health_path_cannot_shadow_builtin_routes() {
        for path in ["/", "/metrics", "/health/:id", "/*rest"] {
            let mut config = Config::default();
            config.health.path = path.to_string();
            let err = config.validate().unwrap_err();
            assert!(matches!(err, PlatformError::ConfigError { .. }), "{path}");
        }

        let err = Config::from_toml_str("[health]\npath = \"/metrics\"\n").unwrap_err();
        assert!(err.to_string().contains("built-in route"));

        let mut config = Config::default();
        config.health.path = "/livez".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_type_names() {
        let err = PlatformError::DatabaseAlreadyExists {
            name: "vehicle_inspection_test".to_string(),
        };
        assert_eq!(err.error_type(), "DatabaseAlreadyExists");
        let err = PlatformError::ConfigError {
            reason: "bad".to_string(),
        };
        assert_eq!(err.error_type(), "ConfigError");
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_test_database_must_differ() {
        let mut config = Config::default();
        config.database.test = Some(config.database.primary.clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [server]
            bind = "127.0.0.1"
            port = 9000
            service_name = "svc"
            version = "1.2.3"

            [database]
            url = "postgresql://admin@db:5432/inspections"
            primary = "inspections"
            admin_role = "admin"
            max_connections = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.test_database(), "inspections_test");
        assert_eq!(config.health, HealthPolicy::default());
    }

    #[test]
    fn test_unknown_section_field_rejected() {
        let result = Config::from_toml_str(
            r#"
            [health]
            path = "/health"
            host = "localhost"
            interval_secs = 30
            timeout_secs = 3
            start_period_secs = 5
            retries = 3
            jitter = true
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "inspection.toml",
                r#"
                [logging]
                level = "debug"
                format = "pretty"
                "#,
            )?;
            jail.set_env("INSPECTION_SERVER__PORT", "9100");

            let config = Config::load(Some(Path::new("inspection.toml"))).unwrap();
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.format, LogFormat::Pretty);
            Ok(())
        });
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/inspection.toml"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_health_errors_are_not_fatal() {
        let err = PlatformError::HealthCheckFailed {
            reason: "timeout".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.exit_code(), 1);

        let err = PlatformError::LockFileMissing {
            path: "uv.lock".to_string(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.kind(), ErrorKind::Build);
    }

    #[test]
    fn test_health_status_serde() {
        let json = serde_json::to_string(&HealthStatus::Unhealthy).unwrap();
        assert_eq!(json, "\"unhealthy\"");
        let status: HealthStatus = serde_json::from_str("\"starting\"").unwrap();
        assert_eq!(status, HealthStatus::Starting);
    }
}
