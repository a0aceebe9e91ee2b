/// Ledger table recording which bootstrap markers have been applied.
pub const LEDGER_DDL: &str = include_str!("../migrations/0001_bootstrap_ledger.sql");

/// Marker written once the test database has been provisioned.
pub const PROVISION_MARKER: &str = "0001_provision_test_database";
