//! Caller-facing wording.

use chrono::NaiveTime;
use rust_decimal::Decimal;

use crate::dialogue::context::ConversationContext;
use crate::dialogue::slots::{SlotName, SlotValue};
use crate::dialogue::states::Intent;
use crate::domain::menu::MenuItem;
use crate::domain::order::FulfillmentType;
use crate::domain::restaurant::{OperatingHours, Restaurant};

fn clock(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

fn join_choices(choices: &[String]) -> String {
    match choices {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

pub fn greeting(restaurant: &Restaurant) -> String {
    format!(
        "Thanks for calling {}. I can take a food order or book a table. What would you like to do?",
        restaurant.name
    )
}

pub fn prompt_for_slot(slot: SlotName, intent: Intent) -> String {
    match (slot, intent) {
        (SlotName::Items, _) => "What would you like to order?".to_string(),
        (SlotName::FulfillmentTime, _) => {
            "What time would you like to pick it up or have it delivered?".to_string()
        }
        (SlotName::FulfillmentType, _) => "Is that for pickup or delivery?".to_string(),
        (SlotName::DeliveryAddress, _) => "What address should we deliver to?".to_string(),
        (SlotName::CustomerName, Intent::Order) => {
            "What name should I put the order under?".to_string()
        }
        (SlotName::CustomerName, Intent::Booking) => {
            "What name should I put the reservation under?".to_string()
        }
        (SlotName::PaymentMethod, _) => "Will you pay by cash, card or mobile wallet?".to_string(),
        (SlotName::Date, _) => "Which day would you like to come in?".to_string(),
        (SlotName::Time, _) => "What time would you like the table?".to_string(),
        (SlotName::PartySize, _) => "How many people will be dining?".to_string(),
    }
}

pub fn rejected(reason: &str, follow_up: &str) -> String {
    format!("Sorry, {reason}. {follow_up}")
}

pub fn outside_hours(hours: &OperatingHours, latest_start: Option<NaiveTime>) -> String {
    match latest_start {
        Some(latest) => format!(
            "We take reservations from {} until {}. What other time works for you?",
            clock(hours.opening),
            clock(latest)
        ),
        None => "We aren't able to take reservations that day. Is there another day that works?"
            .to_string(),
    }
}

pub fn present_candidates(candidates: &[MenuItem], repeated: bool) -> String {
    let names = candidates
        .iter()
        .enumerate()
        .map(|(index, item)| format!("{}) {} ({})", index + 1, item.name, item.price))
        .collect::<Vec<_>>();
    let lead = if repeated {
        "Sorry, I still need to know which one you'd like."
    } else {
        "We have a few options."
    };
    format!("{lead} {}. Which would you like?", names.join(", "))
}

pub fn no_match(descriptor: &str) -> String {
    format!(
        "I couldn't find anything matching \"{descriptor}\" on the menu. Could you describe it differently?"
    )
}

pub fn recommendations(items: &[MenuItem]) -> String {
    if items.is_empty() {
        return "I don't have a recommendation for that, but I'm happy to read out the menu."
            .to_string();
    }
    let names = items.iter().map(|item| item.name.clone()).collect::<Vec<_>>();
    format!("Popular choices are {}.", join_choices(&names))
}

pub fn items_added(added: &[(MenuItem, u32)], follow_up: &str) -> String {
    if added.is_empty() {
        return follow_up.to_string();
    }
    let lines = added
        .iter()
        .map(|(item, quantity)| format!("{quantity} x {}", item.name))
        .collect::<Vec<_>>();
    format!("Got it, {}. {follow_up}", lines.join(" and "))
}

/// Slots were taken down while a candidate list is still open.
pub fn noted(follow_up: &str) -> String {
    format!("Noted, thanks. {follow_up}")
}

pub fn clarify_intent() -> String {
    "Sorry, I didn't catch that. I can take a food order or book a table. Which would you like?"
        .to_string()
}

pub fn retry_turn() -> String {
    "Sorry, I couldn't work with that. Could you say it another way?".to_string()
}

/// Read-back of every filled slot before commit.
pub fn summary(context: &ConversationContext, menu: &[MenuItem], total: Option<Decimal>) -> String {
    match context.intent {
        Some(Intent::Order) => {
            let lines = context
                .items()
                .iter()
                .map(|selection| {
                    let name = menu
                        .iter()
                        .find(|item| item.id == selection.item_id)
                        .map(|item| item.name.as_str())
                        .unwrap_or(selection.item_id.0.as_str());
                    if selection.extras.is_empty() {
                        format!("{} x {}", selection.quantity, name)
                    } else {
                        format!(
                            "{} x {} ({})",
                            selection.quantity,
                            name,
                            selection.extras.join(", ")
                        )
                    }
                })
                .collect::<Vec<_>>();
            let fulfillment = match context.fulfillment_type() {
                FulfillmentType::Pickup => "pickup".to_string(),
                FulfillmentType::Delivery => match context.value(SlotName::DeliveryAddress) {
                    Some(SlotValue::Text(address)) => format!("delivery to {address}"),
                    _ => "delivery".to_string(),
                },
            };
            let time = context
                .value(SlotName::FulfillmentTime)
                .and_then(SlotValue::as_time)
                .map(clock)
                .unwrap_or_default();
            let name = context.value(SlotName::CustomerName).and_then(SlotValue::as_text);
            let payment = match context.value(SlotName::PaymentMethod) {
                Some(SlotValue::Payment(method)) => method.as_str().replace('_', " "),
                _ => String::new(),
            };
            let total = total.map(|total| format!(", total {total}")).unwrap_or_default();
            format!(
                "To confirm: {} for {} at {} under {}, paying by {}{}. Shall I place the order?",
                lines.join(", "),
                fulfillment,
                time,
                name.unwrap_or("you"),
                payment,
                total
            )
        }
        Some(Intent::Booking) => {
            let party = match context.value(SlotName::PartySize) {
                Some(SlotValue::PartySize(size)) => *size,
                _ => 0,
            };
            let date = context
                .value(SlotName::Date)
                .and_then(SlotValue::as_date)
                .map(|date| date.format("%A %-d %B").to_string())
                .unwrap_or_default();
            let time = context
                .value(SlotName::Time)
                .and_then(SlotValue::as_time)
                .map(clock)
                .unwrap_or_default();
            let name = context.value(SlotName::CustomerName).and_then(SlotValue::as_text);
            format!(
                "To confirm: a table for {party} on {date} at {time} under {}. Shall I book it?",
                name.unwrap_or("you")
            )
        }
        None => "What would you like to do?".to_string(),
    }
}

pub fn confirm_again() -> String {
    "Please say yes to confirm, or tell me what you'd like to change.".to_string()
}

pub fn what_to_change() -> String {
    "No problem. What would you like to change?".to_string()
}

pub fn order_committed(order_id: &str, total: Decimal, time: Option<NaiveTime>) -> String {
    match time {
        Some(time) => format!(
            "Your order is placed. The total is {total} and it will be ready at {}. Your order number is {order_id}.",
            clock(time)
        ),
        None => format!("Your order is placed. The total is {total}. Your order number is {order_id}."),
    }
}

pub fn booking_committed(booking_id: &str, party_size: u32, start: NaiveTime) -> String {
    format!(
        "You're booked: a table for {party_size} at {}. Your confirmation number is {booking_id}.",
        clock(start)
    )
}

pub fn no_capacity(alternatives: &[NaiveTime]) -> String {
    if alternatives.is_empty() {
        return "Sorry, we're fully booked at that time and I couldn't find another opening that day. Would another day work?"
            .to_string();
    }
    let times = alternatives.iter().map(|time| clock(*time)).collect::<Vec<_>>();
    format!(
        "Sorry, we're fully booked at that time. I can offer {}. Which would you prefer?",
        join_choices(&times)
    )
}

pub fn dependency_unavailable() -> String {
    "Sorry, I'm having trouble reaching the kitchen system right now. Could you say that again in a moment?"
        .to_string()
}

pub fn already_committed(resource_id: &str) -> String {
    format!("You're all set, your confirmation number is {resource_id}. Is there anything else?")
}

pub fn hand_off() -> String {
    "I'm sorry I couldn't get that sorted. Let me pass you to a member of staff who can help."
        .to_string()
}

pub fn goodbye() -> String {
    "No problem, I've cancelled that. Thanks for calling!".to_string()
}

pub fn unknown_restaurant() -> String {
    "Sorry, I can't find that restaurant. Please check the number you called.".to_string()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use rust_decimal::Decimal;

    use super::{items_added, join_choices, no_capacity, rejected};
    use crate::domain::menu::{MenuItem, MenuItemId};
    use crate::domain::restaurant::RestaurantId;

    #[test]
    fn choices_are_joined_with_a_final_or() {
        let choices = ["7:15 PM", "6:45 PM", "7:30 PM"].map(String::from);
        assert_eq!(join_choices(&choices), "7:15 PM, 6:45 PM or 7:30 PM");
        assert_eq!(join_choices(&choices[..1]), "7:15 PM");
    }

    #[test]
    fn alternatives_are_offered_in_clock_format() {
        let reply = no_capacity(&[
            NaiveTime::from_hms_opt(19, 15, 0).expect("valid time"),
            NaiveTime::from_hms_opt(18, 45, 0).expect("valid time"),
        ]);
        assert!(reply.contains("7:15 PM or 6:45 PM"));
    }

    #[test]
    fn rejection_reason_leads_the_follow_up() {
        assert_eq!(
            rejected("that date has already passed", "Which day?"),
            "Sorry, that date has already passed. Which day?"
        );
    }

    #[test]
    fn added_items_are_acknowledged_before_the_next_prompt() {
        let naan = MenuItem {
            id: MenuItemId("garlic-naan".to_string()),
            restaurant_id: RestaurantId("spice-route".to_string()),
            name: "Garlic Naan".to_string(),
            category: "breads".to_string(),
            description: String::new(),
            price: Decimal::new(399, 2),
            dietary_tags: Vec::new(),
            sort_order: 1,
            available: true,
        };

        assert_eq!(
            items_added(&[(naan, 2)], "What name should I put the order under?"),
            "Got it, 2 x Garlic Naan. What name should I put the order under?"
        );
        assert_eq!(items_added(&[], "Anything else?"), "Anything else?");
    }
}
