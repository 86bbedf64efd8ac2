use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tablebell_core::audit::AuditSink;
use tablebell_core::config::CommissionConfig;
use tablebell_core::ports::{Clock, Collaborators, StoreError};
use tablebell_core::TieredCommissionResolver;

use crate::DbPool;

pub mod audit;
pub mod booking;
pub mod catalog;
pub mod customer;
pub mod order;

pub use audit::SqlAuditSink;
pub use booking::SqlReservationStore;
pub use catalog::SqlCatalog;
pub use customer::SqlCustomerStore;
pub use order::SqlOrderStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Corrupt(message),
        }
    }
}

/// Wires every SQL-backed collaborator onto one pool.
pub fn sql_collaborators(
    pool: DbPool,
    commission: CommissionConfig,
    clock: Arc<dyn Clock>,
) -> Collaborators {
    let audit: Arc<dyn AuditSink> = Arc::new(SqlAuditSink::new(pool.clone()));
    Collaborators {
        catalog: Arc::new(SqlCatalog::new(pool.clone())),
        reservations: Arc::new(SqlReservationStore::new(pool.clone())),
        orders: Arc::new(SqlOrderStore::new(pool.clone())),
        customers: Arc::new(SqlCustomerStore::new(pool)),
        commission: Arc::new(TieredCommissionResolver::new(commission)),
        audit,
        clock,
    }
}

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M";
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

pub(crate) fn parse_date(column: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_time(column: &str, value: &str) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_datetime(column: &str, value: &str) -> Result<NaiveDateTime, RepositoryError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_count(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Decode(format!("{column}: {value}")))
}

pub(crate) fn parse_string_list(column: &str, value: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(value).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

#[cfg(test)]
mod tests {
    use tablebell_core::ports::StoreError;

    use super::{parse_decimal, parse_time, RepositoryError};

    #[test]
    fn repository_errors_map_onto_store_errors() {
        let unavailable: StoreError = RepositoryError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(unavailable, StoreError::Unavailable(_)));

        let corrupt: StoreError = RepositoryError::Decode("price: bad".to_string()).into();
        assert_eq!(corrupt, StoreError::Corrupt("price: bad".to_string()));
    }

    #[test]
    fn stored_times_accept_minutes_or_seconds() {
        assert_eq!(parse_time("t", "19:30").expect("minutes").to_string(), "19:30:00");
        assert_eq!(parse_time("t", "19:30:00").expect("seconds").to_string(), "19:30:00");
        assert!(parse_decimal("price", "twelve").is_err());
    }
}
