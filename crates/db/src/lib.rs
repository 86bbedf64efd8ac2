pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, ping, DbPool};
pub use fixtures::{DemoSeed, SeedResult, VerificationResult};
pub use repositories::{
    sql_collaborators, RepositoryError, SqlAuditSink, SqlCatalog, SqlCustomerStore,
    SqlOrderStore, SqlReservationStore,
};
