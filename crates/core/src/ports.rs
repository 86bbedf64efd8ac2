//! Collaborator contracts consumed by the dialogue core.
//!
//! Persistence, catalog lookup, commission resolution and the clock are all
//! external to the core. Each is reached through a trait here; `tablebell-db`
//! provides SQLite implementations and [`crate::memory`] provides in-process
//! ones.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::domain::booking::Booking;
use crate::domain::customer::Customer;
use crate::domain::menu::MenuItem;
use crate::domain::order::Order;
use crate::domain::restaurant::{Restaurant, RestaurantId};
use crate::domain::table::DiningTable;
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn restaurant(&self, id: &RestaurantId) -> Result<Option<Restaurant>, StoreError>;

    /// Items in catalog default ordering, ties broken by item id.
    async fn menu(&self, id: &RestaurantId) -> Result<Vec<MenuItem>, StoreError>;

    async fn tables(&self, id: &RestaurantId) -> Result<Vec<DiningTable>, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved(Booking),
    /// A booking with the same idempotency key already exists.
    Duplicate(Booking),
    /// Another non-cancelled booking overlaps on the requested table.
    TableConflict,
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Non-cancelled bookings for the restaurant whose seating intersects
    /// `[window_start, window_end)`.
    async fn bookings_overlapping(
        &self,
        restaurant_id: &RestaurantId,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> Result<Vec<Booking>, StoreError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>, StoreError>;

    /// Atomic check-and-reserve: inserts `booking` only when no non-cancelled
    /// booking on the same table overlaps its interval.
    async fn try_reserve(&self, booking: Booking) -> Result<ReserveOutcome, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderInsertOutcome {
    Created(Order),
    Duplicate(Order),
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError>;

    async fn insert(&self, order: Order) -> Result<OrderInsertOutcome, StoreError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn upsert_by_phone(&self, phone: &str, name: &str) -> Result<Customer, StoreError>;
}

#[async_trait]
pub trait CommissionResolver: Send + Sync {
    /// Platform commission percentage for the restaurant, e.g. `15` for 15%.
    async fn resolve_rate_pct(&self, restaurant: &Restaurant) -> Result<Decimal, StoreError>;
}

/// Restaurant-local wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Everything a turn may call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogProvider>,
    pub reservations: Arc<dyn ReservationStore>,
    pub orders: Arc<dyn OrderStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub commission: Arc<dyn CommissionResolver>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

/// Runs a collaborator call under `timeout`, mapping both the elapsed timer
/// and the collaborator's own error into an [`ApplicationError`].
pub async fn bounded<T, E, F>(
    dependency: &'static str,
    timeout: Duration,
    future: F,
) -> Result<T, ApplicationError>
where
    F: Future<Output = Result<T, E>>,
    ApplicationError: From<E>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(ApplicationError::from),
        Err(_) => Err(ApplicationError::Timeout {
            dependency,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{bounded, StoreError};
    use crate::errors::ApplicationError;

    #[tokio::test]
    async fn slow_collaborators_time_out_as_retryable_errors() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, StoreError>(1)
        };

        let error = bounded("catalog", Duration::from_millis(10), slow)
            .await
            .expect_err("call should time out");
        assert_eq!(error, ApplicationError::Timeout { dependency: "catalog", timeout_ms: 10 });
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn collaborator_errors_pass_through_as_persistence_failures() {
        let failing = async { Err::<u32, _>(StoreError::Unavailable("locked".to_string())) };

        let error = bounded("reservations", Duration::from_secs(1), failing)
            .await
            .expect_err("store error");
        assert!(matches!(error, ApplicationError::Persistence(_)));
    }
}
