//! Turning a confirmed conversation into a persisted order or booking.
//!
//! Commit is idempotent: the key is derived from the caller, the restaurant,
//! the intent and the final slot set, and both stores refuse a second
//! resource with the same key. Order keys also carry the business date, since
//! an order's slots only name a time of day. A booking whose replay target has
//! been cancelled is booked again under a key chained from the released one.

use std::time::Duration as StdDuration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::audit::{AuditContext, AuditEvent};
use crate::availability::{Availability, AvailabilityEngine, BookingRequest, Reservation};
use crate::dialogue::context::ConversationContext;
use crate::dialogue::slots::{SlotName, SlotValue};
use crate::dialogue::states::Intent;
use crate::domain::booking::Booking;
use crate::domain::menu::MenuItem;
use crate::domain::order::{
    commission_amount, order_total, FulfillmentType, Order, OrderId, OrderLine, OrderStatus,
};
use crate::domain::restaurant::Restaurant;
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{bounded, Collaborators, OrderInsertOutcome};

const AUDIT_ACTOR: &str = "dialogue-engine";

/// Hex blake3 digest of the caller, restaurant, intent, optional business date
/// and the canonical JSON of the filled slots. Identical final slot sets on the
/// same business date always hash identically.
pub fn idempotency_key(
    caller: &str,
    restaurant: &Restaurant,
    intent: Intent,
    business_date: Option<NaiveDate>,
    context: &ConversationContext,
) -> Result<String, ApplicationError> {
    let slots = serde_json::to_string(&context.filled_values()).map_err(|error| {
        ApplicationError::Domain(DomainError::InvariantViolation(format!(
            "slot set is not serializable: {error}"
        )))
    })?;
    let date = business_date.map(|date| date.to_string()).unwrap_or_default();

    Ok(digest(&[caller, restaurant.id.0.as_str(), intent.as_str(), &date, &slots]))
}

/// Key for booking again after the booking stored under `key` was released.
pub fn rebooking_key(key: &str, released: &Booking) -> String {
    digest(&[key, released.id.0.as_str(), "rebook"])
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome {
    OrderCreated { order: Order, replayed: bool },
    BookingCreated { booking: Booking, replayed: bool },
    /// The final availability check failed; nothing was written.
    BookingUnavailable(Availability),
}

/// Who is committing and under which request.
#[derive(Clone, Copy, Debug)]
pub struct CommitScope<'a> {
    pub caller: &'a str,
    pub restaurant: &'a Restaurant,
    pub correlation_id: &'a str,
}

#[derive(Clone)]
pub struct CommitService {
    collaborators: Collaborators,
    availability: AvailabilityEngine,
    default_commission_pct: Decimal,
    timeout: StdDuration,
}

impl CommitService {
    pub fn new(
        collaborators: Collaborators,
        availability: AvailabilityEngine,
        default_commission_pct: Decimal,
        timeout: StdDuration,
    ) -> Self {
        Self { collaborators, availability, default_commission_pct, timeout }
    }

    pub async fn commit_order(
        &self,
        scope: CommitScope<'_>,
        menu: &[MenuItem],
        context: &ConversationContext,
    ) -> Result<CommitOutcome, ApplicationError> {
        let today = self.collaborators.clock.now().date();
        let key =
            idempotency_key(scope.caller, scope.restaurant, Intent::Order, Some(today), context)?;
        let orders = &self.collaborators.orders;

        if let Some(order) =
            bounded("orders", self.timeout, orders.find_by_idempotency_key(&key)).await?
        {
            return Ok(CommitOutcome::OrderCreated { order, replayed: true });
        }

        let lines = order_lines(context, menu)?;
        let fulfillment_time = required(context, SlotName::FulfillmentTime)?
            .as_time()
            .ok_or_else(|| missing(SlotName::FulfillmentTime))?;
        let payment_method = match required(context, SlotName::PaymentMethod)? {
            SlotValue::Payment(method) => *method,
            _ => return Err(missing(SlotName::PaymentMethod)),
        };
        let fulfillment_type = context.fulfillment_type();
        let delivery_address = match fulfillment_type {
            FulfillmentType::Delivery => Some(text_slot(context, SlotName::DeliveryAddress)?),
            FulfillmentType::Pickup => None,
        };
        let name = text_slot(context, SlotName::CustomerName)?;

        let customer = bounded(
            "customers",
            self.timeout,
            self.collaborators.customers.upsert_by_phone(scope.caller, &name),
        )
        .await?;

        let rate = self.commission_rate(scope).await;
        let total = order_total(&lines);

        let order = Order {
            id: OrderId::generate(),
            restaurant_id: scope.restaurant.id.clone(),
            customer_id: customer.id,
            lines,
            fulfillment_type,
            fulfillment_time: today.and_time(fulfillment_time),
            delivery_address,
            payment_method,
            status: OrderStatus::Pending,
            total,
            commission_rate_pct: rate,
            commission_amount: commission_amount(total, rate),
            idempotency_key: key,
            created_at: Utc::now(),
        };

        match bounded("orders", self.timeout, orders.insert(order)).await? {
            OrderInsertOutcome::Duplicate(order) => {
                Ok(CommitOutcome::OrderCreated { order, replayed: true })
            }
            OrderInsertOutcome::Created(order) => {
                info!(
                    event_name = "dialogue.commit.order_created",
                    correlation_id = %scope.correlation_id,
                    restaurant_id = %scope.restaurant.id.0,
                    order_id = %order.id.0,
                    total = %order.total,
                    commission_amount = %order.commission_amount,
                    "order committed"
                );
                let event = AuditEvent::order_created(&self.audit_context(scope), &order);
                self.audit(scope, event).await;
                Ok(CommitOutcome::OrderCreated { order, replayed: false })
            }
        }
    }

    pub async fn commit_booking(
        &self,
        scope: CommitScope<'_>,
        context: &ConversationContext,
    ) -> Result<CommitOutcome, ApplicationError> {
        let mut key =
            idempotency_key(scope.caller, scope.restaurant, Intent::Booking, None, context)?;

        while let Some(booking) = bounded(
            "reservations",
            self.timeout,
            self.collaborators.reservations.find_by_idempotency_key(&key),
        )
        .await?
        {
            if booking.status.holds_table() {
                return Ok(CommitOutcome::BookingCreated { booking, replayed: true });
            }
            info!(
                event_name = "dialogue.commit.booking_released",
                correlation_id = %scope.correlation_id,
                booking_id = %booking.id.0,
                status = booking.status.as_str(),
                "replayed booking no longer holds its table, booking again"
            );
            key = rebooking_key(&key, &booking);
        }

        let request = booking_request(scope.restaurant, context)?;
        let name = text_slot(context, SlotName::CustomerName)?;
        let customer = bounded(
            "customers",
            self.timeout,
            self.collaborators.customers.upsert_by_phone(scope.caller, &name),
        )
        .await?;

        match self.availability.reserve(scope.restaurant, &request, &customer.id, &key).await? {
            Reservation::Existing(booking) => {
                Ok(CommitOutcome::BookingCreated { booking, replayed: true })
            }
            Reservation::Unavailable(availability) => {
                Ok(CommitOutcome::BookingUnavailable(availability))
            }
            Reservation::Booked(booking) => {
                info!(
                    event_name = "dialogue.commit.booking_created",
                    correlation_id = %scope.correlation_id,
                    restaurant_id = %scope.restaurant.id.0,
                    booking_id = %booking.id.0,
                    table_id = booking.table_id.0,
                    "booking committed"
                );
                let event = AuditEvent::booking_created(&self.audit_context(scope), &booking);
                self.audit(scope, event).await;
                Ok(CommitOutcome::BookingCreated { booking, replayed: false })
            }
        }
    }

    async fn commission_rate(&self, scope: CommitScope<'_>) -> Decimal {
        let lookup = self.collaborators.commission.resolve_rate_pct(scope.restaurant);
        match bounded("commission", self.timeout, lookup).await {
            Ok(rate) => rate,
            Err(error) => {
                warn!(
                    event_name = "commit.commission_fallback",
                    correlation_id = %scope.correlation_id,
                    restaurant_id = %scope.restaurant.id.0,
                    error = %error,
                    default_rate_pct = %self.default_commission_pct,
                    "commission lookup failed, using default rate"
                );
                self.default_commission_pct
            }
        }
    }

    fn audit_context(&self, scope: CommitScope<'_>) -> AuditContext {
        AuditContext::new(
            scope.restaurant.id.clone(),
            scope.caller,
            scope.correlation_id,
            AUDIT_ACTOR,
        )
    }

    async fn audit(&self, scope: CommitScope<'_>, event: AuditEvent) {
        let resource_id = event.resource_id.clone();
        let record = self.collaborators.audit.record(event);
        let result = match tokio::time::timeout(self.timeout, record).await {
            Ok(result) => result.map_err(|error| error.to_string()),
            Err(_) => Err("audit sink timed out".to_string()),
        };
        if let Err(error) = result {
            warn!(
                event_name = "commit.audit_failed",
                correlation_id = %scope.correlation_id,
                resource_id = %resource_id,
                error = %error,
                "audit entry not recorded"
            );
        }
    }
}

/// The final booking request read from a filled context.
pub fn booking_request(
    restaurant: &Restaurant,
    context: &ConversationContext,
) -> Result<BookingRequest, ApplicationError> {
    let date = required(context, SlotName::Date)?.as_date().ok_or_else(|| missing(SlotName::Date))?;
    let time = required(context, SlotName::Time)?.as_time().ok_or_else(|| missing(SlotName::Time))?;
    let party_size = match required(context, SlotName::PartySize)? {
        SlotValue::PartySize(size) => *size,
        _ => return Err(missing(SlotName::PartySize)),
    };
    Ok(BookingRequest { date, time, party_size, duration: restaurant.booking_duration() })
}

/// Priced order lines for the selected items, using current menu prices.
pub fn order_lines(
    context: &ConversationContext,
    menu: &[MenuItem],
) -> Result<Vec<OrderLine>, ApplicationError> {
    let selections = context.items();
    if selections.is_empty() {
        return Err(missing(SlotName::Items));
    }
    selections
        .iter()
        .map(|selection| {
            let item = menu.iter().find(|item| item.id == selection.item_id).ok_or_else(|| {
                ApplicationError::Domain(DomainError::InvariantViolation(format!(
                    "menu item `{}` disappeared before commit",
                    selection.item_id.0
                )))
            })?;
            Ok(OrderLine {
                item_id: item.id.clone(),
                name: item.name.clone(),
                quantity: selection.quantity,
                unit_price: item.price,
                extras: selection.extras.clone(),
            })
        })
        .collect()
}

fn required(context: &ConversationContext, slot: SlotName) -> Result<&SlotValue, ApplicationError> {
    context.value(slot).ok_or_else(|| missing(slot))
}

fn text_slot(context: &ConversationContext, slot: SlotName) -> Result<String, ApplicationError> {
    required(context, slot)?.as_text().map(str::to_string).ok_or_else(|| missing(slot))
}

fn missing(slot: SlotName) -> ApplicationError {
    DomainError::InvalidSlot { slot: slot.as_str(), reason: "not filled at commit".to_string() }
        .into()
}
