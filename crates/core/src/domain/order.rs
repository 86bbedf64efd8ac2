use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::domain::menu::MenuItemId;
use crate::domain::restaurant::RestaurantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(format!("ord-{}", Uuid::new_v4().simple()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentType {
    Pickup,
    Delivery,
}

impl FulfillmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Delivery => "delivery",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pickup" | "pick up" | "pick-up" | "collection" | "takeaway" | "takeout" => {
                Some(Self::Pickup)
            }
            "delivery" | "deliver" | "delivered" => Some(Self::Delivery),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileWallet,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::MobileWallet => "mobile_wallet",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cash" | "cash on delivery" | "pay at counter" => Some(Self::Cash),
            "card" | "credit card" | "debit card" | "credit" | "debit" => Some(Self::Card),
            "mobile_wallet" | "mobile wallet" | "apple pay" | "google pay" | "wallet" => {
                Some(Self::MobileWallet)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_id: MenuItemId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub extras: Vec<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub restaurant_id: RestaurantId,
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLine>,
    pub fulfillment_type: FulfillmentType,
    pub fulfillment_time: NaiveDateTime,
    pub delivery_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub total: Decimal,
    pub commission_rate_pct: Decimal,
    pub commission_amount: Decimal,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

pub fn order_total(lines: &[OrderLine]) -> Decimal {
    lines.iter().map(OrderLine::line_total).sum()
}

/// Platform commission on `total` at `rate_pct` percent, rounded to cents.
pub fn commission_amount(total: Decimal, rate_pct: Decimal) -> Decimal {
    (total * rate_pct / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
