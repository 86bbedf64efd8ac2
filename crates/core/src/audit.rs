use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::booking::Booking;
use crate::domain::order::Order;
use crate::domain::restaurant::RestaurantId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Dialogue,
    Booking,
    Order,
    System,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue",
            Self::Booking => "booking",
            Self::Order => "order",
            Self::System => "system",
        }
    }
}

/// Only creation is audited; later lifecycle moves belong to restaurant tooling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
        }
    }
}

/// Who and where: the restaurant taking the call, the caller's phone and the
/// turn's correlation id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub restaurant_id: RestaurantId,
    pub caller: String,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        restaurant_id: RestaurantId,
        caller: impl Into<String>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            restaurant_id,
            caller: caller.into(),
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub restaurant_id: RestaurantId,
    pub resource_type: String,
    pub resource_id: String,
    pub action: AuditAction,
    pub category: AuditCategory,
    pub correlation_id: String,
    pub actor: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn created(
        context: &AuditContext,
        category: AuditCategory,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            restaurant_id: context.restaurant_id.clone(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: AuditAction::Create,
            category,
            correlation_id: context.correlation_id.clone(),
            actor: context.actor.clone(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
        .with_metadata("caller", context.caller.clone())
    }

    pub fn booking_created(context: &AuditContext, booking: &Booking) -> Self {
        Self::created(context, AuditCategory::Booking, "booking", booking.id.0.clone())
            .with_metadata("table_id", booking.table_id.0.to_string())
            .with_metadata("party_size", booking.party_size.to_string())
            .with_metadata("starts", format!("{} {}", booking.date, booking.start_time))
    }

    pub fn order_created(context: &AuditContext, order: &Order) -> Self {
        Self::created(context, AuditCategory::Order, "order", order.id.0.clone())
            .with_metadata("total", order.total.to_string())
            .with_metadata("commission_rate_pct", order.commission_rate_pct.to_string())
            .with_metadata("fulfillment", order.fulfillment_type.as_str())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("audit sink rejected event: {0}")]
pub struct AuditError(pub String);

/// Append-only action log. Callers log failures and carry on.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.log().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};
    use uuid::Uuid;

    use crate::audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink};
    use crate::domain::booking::{Booking, BookingId, BookingStatus};
    use crate::domain::customer::CustomerId;
    use crate::domain::restaurant::RestaurantId;
    use crate::domain::table::TableId;

    #[tokio::test]
    async fn booking_creation_is_recorded_with_caller_and_table() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new(
            RestaurantId("spice-route".to_owned()),
            "+15550100",
            "req-123",
            "dialogue-engine",
        );
        let booking = Booking {
            id: BookingId("bk-1".to_owned()),
            restaurant_id: RestaurantId("spice-route".to_owned()),
            table_id: TableId(3),
            customer_id: CustomerId(Uuid::nil()),
            date: NaiveDate::from_ymd_opt(2026, 10, 17).expect("date"),
            start_time: NaiveTime::from_hms_opt(19, 0, 0).expect("time"),
            duration_minutes: 90,
            party_size: 4,
            status: BookingStatus::Confirmed,
            idempotency_key: "k".to_owned(),
            created_at: Utc::now(),
        };

        sink.record(AuditEvent::booking_created(&context, &booking))
            .await
            .expect("in-memory sink never fails");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].action.as_str(), "create");
        assert_eq!(events[0].resource_id, "bk-1");
        assert_eq!(events[0].metadata.get("caller").map(String::as_str), Some("+15550100"));
        assert_eq!(events[0].metadata.get("table_id").map(String::as_str), Some("3"));
        assert_eq!(
            events[0].metadata.get("starts").map(String::as_str),
            Some("2026-10-17 19:00:00")
        );
    }
}
