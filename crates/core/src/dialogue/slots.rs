//! Slot schema, value parsing and validation.
//!
//! Extractor output is untrusted. Every proposal is parsed into a typed
//! [`SlotValue`] and checked against the restaurant's rules before it may be
//! merged into the conversation.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::dialogue::states::Intent;
use crate::domain::menu::{MenuItem, MenuItemId};
use crate::domain::order::{FulfillmentType, PaymentMethod};
use crate::domain::restaurant::Restaurant;

pub const MAX_ITEM_QUANTITY: u32 = 50;
pub const MAX_CUSTOMER_NAME_CHARS: usize = 80;
pub const MIN_DELIVERY_ADDRESS_CHARS: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Items,
    FulfillmentType,
    FulfillmentTime,
    DeliveryAddress,
    CustomerName,
    PaymentMethod,
    Date,
    Time,
    PartySize,
}

impl SlotName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Items => "items",
            Self::FulfillmentType => "fulfillment_type",
            Self::FulfillmentTime => "fulfillment_time",
            Self::DeliveryAddress => "delivery_address",
            Self::CustomerName => "customer_name",
            Self::PaymentMethod => "payment_method",
            Self::Date => "date",
            Self::Time => "time",
            Self::PartySize => "party_size",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "items" | "item" => Some(Self::Items),
            "fulfillment_type" => Some(Self::FulfillmentType),
            "fulfillment_time" => Some(Self::FulfillmentTime),
            "delivery_address" | "address" => Some(Self::DeliveryAddress),
            "customer_name" | "name" => Some(Self::CustomerName),
            "payment_method" | "payment" => Some(Self::PaymentMethod),
            "date" => Some(Self::Date),
            "time" => Some(Self::Time),
            "party_size" => Some(Self::PartySize),
            _ => None,
        }
    }

    /// Whether the slot belongs to `intent`'s schema at all.
    pub fn applies_to(&self, intent: Intent) -> bool {
        match intent {
            Intent::Order => matches!(
                self,
                Self::Items
                    | Self::FulfillmentType
                    | Self::FulfillmentTime
                    | Self::DeliveryAddress
                    | Self::CustomerName
                    | Self::PaymentMethod
            ),
            Intent::Booking => {
                matches!(self, Self::Date | Self::Time | Self::PartySize | Self::CustomerName)
            }
        }
    }
}

/// Required slots in prompting order.
pub fn required_slots(intent: Intent, fulfillment: FulfillmentType) -> Vec<SlotName> {
    match intent {
        Intent::Order => {
            let mut slots = vec![SlotName::Items, SlotName::FulfillmentTime];
            if fulfillment == FulfillmentType::Delivery {
                slots.push(SlotName::DeliveryAddress);
            }
            slots.extend([SlotName::CustomerName, SlotName::PaymentMethod]);
            slots
        }
        Intent::Booking => {
            vec![SlotName::Date, SlotName::Time, SlotName::PartySize, SlotName::CustomerName]
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotFillState {
    #[default]
    Unfilled,
    Filled,
    RejectedNeedsRetry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemSelection {
    pub item_id: MenuItemId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Items(Vec<OrderItemSelection>),
    FulfillmentType(FulfillmentType),
    Time(#[serde(with = "hhmm")] NaiveTime),
    Date(NaiveDate),
    PartySize(u32),
    Text(String),
    Payment(PaymentMethod),
}

impl SlotValue {
    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(time) => Some(*time),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    fn fits(&self, slot: SlotName) -> bool {
        matches!(
            (slot, self),
            (SlotName::Items, Self::Items(_))
                | (SlotName::FulfillmentType, Self::FulfillmentType(_))
                | (SlotName::FulfillmentTime, Self::Time(_))
                | (SlotName::Time, Self::Time(_))
                | (SlotName::Date, Self::Date(_))
                | (SlotName::PartySize, Self::PartySize(_))
                | (SlotName::CustomerName, Self::Text(_))
                | (SlotName::DeliveryAddress, Self::Text(_))
                | (SlotName::PaymentMethod, Self::Payment(_))
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub state: SlotFillState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SlotValue>,
    #[serde(default)]
    pub confidence: f32,
    /// Turn number the value was filled or rejected in.
    #[serde(default)]
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl SlotEntry {
    pub fn filled(value: SlotValue, confidence: f32, turn: u32) -> Self {
        Self { state: SlotFillState::Filled, value: Some(value), confidence, turn, note: None }
    }

    pub fn rejected(reason: impl Into<String>, turn: u32) -> Self {
        Self {
            state: SlotFillState::RejectedNeedsRetry,
            value: None,
            confidence: 0.0,
            turn,
            note: Some(reason.into()),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.state == SlotFillState::Filled && self.value.is_some()
    }
}

/// Raw extractor value before interpretation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProposedValue {
    Integer(i64),
    Text(String),
}

impl ProposedValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    fn as_text(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Text(value) => value.trim().to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    Invalid,
    OutsideHours,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotRejection {
    pub slot: SlotName,
    pub kind: RejectionKind,
    pub reason: String,
}

impl SlotRejection {
    pub fn invalid(slot: SlotName, reason: impl Into<String>) -> Self {
        Self { slot, kind: RejectionKind::Invalid, reason: reason.into() }
    }

    pub fn outside_hours(slot: SlotName, reason: impl Into<String>) -> Self {
        Self { slot, kind: RejectionKind::OutsideHours, reason: reason.into() }
    }
}

/// Restaurant facts a proposal is validated against.
pub struct SlotRules<'a> {
    pub restaurant: &'a Restaurant,
    pub menu: &'a [MenuItem],
    pub now: NaiveDateTime,
}

/// Parses a raw proposal into a typed value and validates it.
pub fn interpret(
    slot: SlotName,
    raw: &ProposedValue,
    rules: &SlotRules<'_>,
) -> Result<SlotValue, SlotRejection> {
    let text = raw.as_text();
    let value = match slot {
        SlotName::Items => {
            return Err(SlotRejection::invalid(slot, "items are referenced, not proposed as text"))
        }
        SlotName::FulfillmentType => FulfillmentType::parse(&text)
            .map(SlotValue::FulfillmentType)
            .ok_or_else(|| SlotRejection::invalid(slot, "pickup or delivery"))?,
        SlotName::PaymentMethod => PaymentMethod::parse(&text)
            .map(SlotValue::Payment)
            .ok_or_else(|| SlotRejection::invalid(slot, "we accept cash, card or mobile wallet"))?,
        SlotName::PartySize => match raw {
            ProposedValue::Integer(value) => u32::try_from(*value)
                .map(SlotValue::PartySize)
                .map_err(|_| SlotRejection::invalid(slot, "party size must be positive"))?,
            ProposedValue::Text(_) => parse_count(&text)
                .map(SlotValue::PartySize)
                .ok_or_else(|| SlotRejection::invalid(slot, "how many people will be dining"))?,
        },
        SlotName::Date => parse_date(&text, rules.now.date())
            .map(SlotValue::Date)
            .ok_or_else(|| SlotRejection::invalid(slot, "which day would you like"))?,
        SlotName::Time => parse_clock_time(&text)
            .map(SlotValue::Time)
            .ok_or_else(|| SlotRejection::invalid(slot, "what time would you like"))?,
        SlotName::FulfillmentTime => parse_fulfillment_time(&text, rules.now)
            .map(SlotValue::Time)
            .ok_or_else(|| SlotRejection::invalid(slot, "what time should the order be ready"))?,
        SlotName::CustomerName | SlotName::DeliveryAddress => SlotValue::Text(text),
    };

    validate(slot, value, rules)
}

pub fn validate(
    slot: SlotName,
    value: SlotValue,
    rules: &SlotRules<'_>,
) -> Result<SlotValue, SlotRejection> {
    if !value.fits(slot) {
        return Err(SlotRejection::invalid(slot, "value has the wrong shape for this slot"));
    }

    match (&value, slot) {
        (SlotValue::PartySize(size), _) => {
            let max = rules.restaurant.max_party_size;
            if *size == 0 || *size > max {
                return Err(SlotRejection::invalid(
                    slot,
                    format!("we can seat parties of 1 to {max}"),
                ));
            }
        }
        (SlotValue::Text(name), SlotName::CustomerName) => {
            let trimmed = name.trim();
            let chars = trimmed.chars().count();
            let well_formed = trimmed
                .chars()
                .all(|ch| ch.is_alphabetic() || matches!(ch, ' ' | '-' | '\'' | '.'))
                && trimmed.chars().any(char::is_alphabetic);
            if chars == 0 || chars > MAX_CUSTOMER_NAME_CHARS || !well_formed {
                return Err(SlotRejection::invalid(slot, "what name should I put this under"));
            }
            return Ok(SlotValue::Text(trimmed.to_string()));
        }
        (SlotValue::Text(address), SlotName::DeliveryAddress) => {
            if !rules.restaurant.delivery_enabled {
                return Err(SlotRejection::invalid(slot, "this restaurant does not deliver"));
            }
            let trimmed = address.trim();
            if trimmed.chars().count() < MIN_DELIVERY_ADDRESS_CHARS {
                return Err(SlotRejection::invalid(slot, "I need a full delivery address"));
            }
            return Ok(SlotValue::Text(trimmed.to_string()));
        }
        (SlotValue::FulfillmentType(FulfillmentType::Delivery), _) => {
            if !rules.restaurant.delivery_enabled {
                return Err(SlotRejection::invalid(
                    slot,
                    "this restaurant only offers pickup",
                ));
            }
        }
        (SlotValue::Date(date), _) => {
            if *date < rules.now.date() {
                return Err(SlotRejection::invalid(slot, "that date has already passed"));
            }
        }
        (SlotValue::Time(time), SlotName::FulfillmentTime) => {
            let hours = rules.restaurant.hours();
            if !hours.contains(*time) {
                return Err(SlotRejection::outside_hours(
                    slot,
                    format!(
                        "we are open {} to {}",
                        hours.opening.format("%H:%M"),
                        hours.closing.format("%H:%M")
                    ),
                ));
            }
            if *time < rules.now.time() {
                return Err(SlotRejection::invalid(slot, "that time has already passed today"));
            }
        }
        (SlotValue::Items(selections), _) => {
            if selections.is_empty() {
                return Err(SlotRejection::invalid(slot, "what would you like to order"));
            }
            for selection in selections {
                validate_selection(selection, rules.menu)?;
            }
        }
        _ => {}
    }

    Ok(value)
}

pub fn validate_selection(
    selection: &OrderItemSelection,
    menu: &[MenuItem],
) -> Result<(), SlotRejection> {
    let known = menu.iter().any(|item| item.id == selection.item_id && item.available);
    if !known {
        return Err(SlotRejection::invalid(
            SlotName::Items,
            format!("`{}` is not on today's menu", selection.item_id.0),
        ));
    }
    if selection.quantity == 0 || selection.quantity > MAX_ITEM_QUANTITY {
        return Err(SlotRejection::invalid(
            SlotName::Items,
            format!("quantities must be between 1 and {MAX_ITEM_QUANTITY}"),
        ));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeDecision {
    Fill,
    Replace,
    Keep,
}

/// First filled value wins unless the caller re-specifies the slot with at
/// least the same confidence, or explicitly contradicts it.
pub fn merge_decision(
    existing: Option<&SlotEntry>,
    confidence: f32,
    re_specified: bool,
    contradicted: bool,
) -> MergeDecision {
    match existing {
        Some(entry) if entry.is_filled() => {
            if contradicted || (re_specified && confidence >= entry.confidence) {
                MergeDecision::Replace
            } else {
                MergeDecision::Keep
            }
        }
        _ => MergeDecision::Fill,
    }
}

/// Parses spoken or written clock times: `7pm`, `7:30 p.m.`, `19:00`, `noon`.
/// A bare hour from 1 to 10 is read as evening service.
pub fn parse_clock_time(text: &str) -> Option<NaiveTime> {
    let normalized = text.trim().to_ascii_lowercase().replace('.', "");
    let normalized = normalized.trim_start_matches("at ").trim();
    match normalized {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return NaiveTime::from_hms_opt(0, 0, 0),
        _ => {}
    }

    let (digits, meridiem) = if let Some(rest) = normalized.strip_suffix("pm") {
        (rest.trim(), Some(true))
    } else if let Some(rest) = normalized.strip_suffix("am") {
        (rest.trim(), Some(false))
    } else {
        (normalized, None)
    };

    let (hour, minute) = match digits.split_once(':') {
        Some((hour, minute)) => (hour.parse::<u32>().ok()?, minute.parse::<u32>().ok()?),
        None => (digits.parse::<u32>().ok()?, 0),
    };

    let hour = match meridiem {
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        Some(_) if hour > 12 => return None,
        None if (1..=10).contains(&hour) && !digits.contains(':') => hour + 12,
        _ => hour,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// `asap`/`now` means the next quarter hour, at least twenty minutes out.
pub fn parse_fulfillment_time(text: &str, now: NaiveDateTime) -> Option<NaiveTime> {
    let normalized = text.trim().to_ascii_lowercase();
    if matches!(normalized.as_str(), "asap" | "now" | "as soon as possible" | "right away") {
        let ready = now + Duration::minutes(20);
        let pad = (15 - i64::from(ready.minute()) % 15) % 15;
        let rounded = (ready + Duration::minutes(pad)).with_second(0)?;
        if rounded.date() != now.date() {
            return None;
        }
        return Some(rounded.time());
    }
    parse_clock_time(&normalized)
}

pub fn parse_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let normalized = text.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "today" | "tonight" | "this evening" | "this afternoon" => return Some(today),
        "tomorrow" | "tomorrow night" => return today.succ_opt(),
        _ => {}
    }

    if let Some(weekday) = parse_weekday(normalized.trim_start_matches("on ")) {
        let ahead = (7 + weekday.num_days_from_monday()
            - today.weekday().num_days_from_monday())
            % 7;
        return today.checked_add_signed(Duration::days(i64::from(ahead)));
    }

    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").ok()
}

fn parse_weekday(text: &str) -> Option<Weekday> {
    match text.trim() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Digits or English number words up to twenty.
pub fn parse_count(text: &str) -> Option<u32> {
    let normalized = text.trim().to_ascii_lowercase();
    if let Ok(value) = normalized.parse::<u32>() {
        return Some(value);
    }
    const WORDS: [&str; 21] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen", "twenty",
    ];
    match normalized.as_str() {
        "a" | "an" | "single" => Some(1),
        "a couple" | "couple" | "pair" => Some(2),
        word => WORDS.iter().position(|candidate| *candidate == word).map(|index| index as u32),
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M:%S"))
            .map_err(serde::de::Error::custom)
    }
}
