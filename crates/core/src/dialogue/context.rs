use std::collections::BTreeMap;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::dialogue::slots::{required_slots, OrderItemSelection, SlotEntry, SlotName, SlotValue};
use crate::dialogue::states::{DialogueState, Intent};
use crate::domain::menu::MenuItemId;
use crate::domain::order::FulfillmentType;
use crate::domain::restaurant::RestaurantId;

/// Conversation state carried by the caller between turns.
///
/// There is no server-side session: every field the engine needs is here and
/// every field it emits is accepted verbatim on the next call. An empty JSON
/// object is a fresh conversation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversationContext {
    pub state: DialogueState,
    pub intent: Option<Intent>,
    pub restaurant_id: Option<RestaurantId>,
    pub slots: BTreeMap<SlotName, SlotEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<MenuItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_reference: Option<PendingReference>,
    pub turn_count: u32,
    pub disambiguation_attempts: u32,
    pub clarification_attempts: u32,
    #[serde(skip_serializing_if = "Vec::is_empty", with = "hhmm_list")]
    pub alternatives: Vec<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitRecord>,
}

/// The descriptor that produced the current candidate list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingReference {
    pub descriptor: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Order,
    Booking,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitRecord {
    pub kind: CommitKind,
    pub resource_id: String,
    pub idempotency_key: String,
}

impl ConversationContext {
    pub fn slot(&self, name: SlotName) -> Option<&SlotEntry> {
        self.slots.get(&name)
    }

    pub fn value(&self, name: SlotName) -> Option<&SlotValue> {
        self.slots
            .get(&name)
            .filter(|entry| entry.is_filled())
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn is_filled(&self, name: SlotName) -> bool {
        self.value(name).is_some()
    }

    pub fn fill(&mut self, name: SlotName, value: SlotValue, confidence: f32) {
        self.slots.insert(name, SlotEntry::filled(value, confidence, self.turn_count));
    }

    pub fn reject(&mut self, name: SlotName, reason: impl Into<String>) {
        self.slots.insert(name, SlotEntry::rejected(reason, self.turn_count));
    }

    pub fn clear(&mut self, name: SlotName) {
        self.slots.remove(&name);
    }

    pub fn fulfillment_type(&self) -> FulfillmentType {
        match self.value(SlotName::FulfillmentType) {
            Some(SlotValue::FulfillmentType(kind)) => *kind,
            _ => FulfillmentType::Pickup,
        }
    }

    pub fn items(&self) -> &[OrderItemSelection] {
        match self.value(SlotName::Items) {
            Some(SlotValue::Items(items)) => items,
            _ => &[],
        }
    }

    /// Required slots still unfilled, in prompting order.
    pub fn missing_slots(&self) -> Vec<SlotName> {
        let Some(intent) = self.intent else {
            return Vec::new();
        };
        required_slots(intent, self.fulfillment_type())
            .into_iter()
            .filter(|slot| !self.is_filled(*slot))
            .collect()
    }

    /// Only the filled values, keyed by slot name.
    pub fn filled_values(&self) -> BTreeMap<SlotName, &SlotValue> {
        self.slots
            .iter()
            .filter_map(|(name, entry)| {
                entry.value.as_ref().filter(|_| entry.is_filled()).map(|value| (*name, value))
            })
            .collect()
    }

    pub fn clear_candidates(&mut self) {
        self.candidates.clear();
        self.pending_reference = None;
        self.disambiguation_attempts = 0;
    }
}

mod hhmm_list {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(times: &[NaiveTime], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(times.iter().map(|time| time.format("%H:%M").to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<NaiveTime>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| NaiveTime::parse_from_str(raw, "%H:%M").map_err(serde::de::Error::custom))
            .collect()
    }
}
