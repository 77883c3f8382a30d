mod repository;

pub use repository::*;

/// A pooled connection inside `BEGIN IMMEDIATE`. Rolled back on drop unless committed.
pub type WriteTransaction = sqlx::Transaction<'static, sqlx::Sqlite>;

/// SQL migration for people and the ledger
pub const MIGRATION_001_ROSTER_LEDGER: &str = include_str!("migrations/001_roster_ledger.sql");

/// SQL migration for aircraft, loads and the manifest
pub const MIGRATION_002_OPERATIONS: &str = include_str!("migrations/002_operations.sql");

/// SQL migration for fuel purchases
pub const MIGRATION_003_REFUELS: &str = include_str!("migrations/003_refuels.sql");
