/// Persistence layer
///
/// The monitor manager only talks to the [`Store`] trait; [`DatabaseImpl`] is
/// the libsql implementation used by the binary.

pub mod migrations;
pub mod models;
pub mod repository;

#[cfg(test)]
mod tests;

pub use repository::{DEFAULT_HISTORY_LIMIT, DatabaseImpl, Store};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
