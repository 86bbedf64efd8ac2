use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tablebell_agent::{AgentRuntime, RuleBasedExtractor};
use tablebell_core::config::AppConfig;
use tablebell_core::demo;
use tablebell_core::dialogue::slots::SlotName;
use tablebell_core::dialogue::states::{DialogueState, IntentLabel};
use tablebell_core::domain::menu::MenuItemId;
use tablebell_core::domain::order::FulfillmentType;
use tablebell_core::domain::table::{DiningTable, TableId};
use tablebell_core::memory::{InMemoryCatalog, InMemoryStores};
use tablebell_core::ports::FixedClock;
use tablebell_core::{ConversationContext, TurnOutcome, TurnRequest, TurnResponse};

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 16)
        .and_then(|date| date.and_hms_opt(15, 0, 0))
        .expect("valid timestamp")
}

fn runtime(stores: &InMemoryStores) -> AgentRuntime {
    let config = AppConfig::default();
    let collaborators =
        stores.collaborators(config.commission.clone(), Arc::new(FixedClock(now())));
    AgentRuntime::with_extractor(collaborators, Arc::new(RuleBasedExtractor::new()), &config)
}

async fn say(
    runtime: &AgentRuntime,
    caller: &str,
    context: ConversationContext,
    message: &str,
) -> TurnResponse {
    let request = TurnRequest {
        caller_phone: caller.to_string(),
        message: message.to_string(),
        account_id: demo::DEMO_RESTAURANT_ID.to_string(),
        context,
    };
    runtime.handle_turn(request, "scenario").await
}

#[tokio::test]
async fn specific_pickup_order_commits_with_one_line() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);
    let caller = "+15550101";

    let first = say(
        &runtime,
        caller,
        ConversationContext::default(),
        "I'd like butter chicken for pickup at 7pm tonight",
    )
    .await;
    assert_eq!(first.intent, Some(IntentLabel::Order));
    assert_eq!(first.state, DialogueState::SlotFilling);

    let named = say(&runtime, caller, first.context, "Priya").await;
    let paid = say(&runtime, caller, named.context, "card please").await;
    assert_eq!(paid.state, DialogueState::Confirming, "{}", paid.message);

    let done = say(&runtime, caller, paid.context, "yes, that's right").await;
    assert_eq!(done.outcome, TurnOutcome::Committed, "{}", done.message);
    assert!(done.order_id.is_some());

    let orders = stores.orders.orders().await;
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].item_id, MenuItemId("butter-chicken".to_string()));
    assert_eq!(order.lines[0].quantity, 1);
    assert_eq!(order.fulfillment_type, FulfillmentType::Pickup);
    assert_eq!(
        order.fulfillment_time,
        now().date().and_time(NaiveTime::from_hms_opt(19, 0, 0).expect("valid time"))
    );
    assert_eq!(stores.audit.events().len(), 1);
}

#[tokio::test]
async fn something_spicy_then_the_chicken_one_resolves_one_item() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);
    let caller = "+15550102";

    let vague = say(&runtime, caller, ConversationContext::default(), "something spicy").await;
    assert_eq!(vague.outcome, TurnOutcome::AmbiguousReference);
    assert_eq!(vague.state, DialogueState::Disambiguating);
    assert!(vague
        .context
        .candidates
        .contains(&MenuItemId("chicken-tikka-masala".to_string())));

    let picked = say(&runtime, caller, vague.context, "the chicken one").await;
    assert_eq!(picked.state, DialogueState::SlotFilling, "{}", picked.message);
    let items = picked.context.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_id, MenuItemId("chicken-tikka-masala".to_string()));
    assert!(picked.context.candidates.is_empty());
}

async fn book_up_to_confirmation(runtime: &AgentRuntime, caller: &str) -> ConversationContext {
    let opened = say(
        runtime,
        caller,
        ConversationContext::default(),
        "I'd like to book a table for 2 tomorrow at 7pm",
    )
    .await;
    assert_eq!(opened.intent, Some(IntentLabel::Booking));

    let named = say(runtime, caller, opened.context, "it's Sam").await;
    assert_eq!(named.state, DialogueState::Confirming, "{}", named.message);
    named.context
}

#[tokio::test]
async fn concurrent_bookings_for_the_last_table_commit_once() {
    let table = DiningTable {
        id: TableId(1),
        restaurant_id: demo::restaurant().id,
        label: "T1".to_string(),
        capacity: 2,
        is_active: true,
    };
    let stores = InMemoryStores::new(InMemoryCatalog::default().with_restaurant(
        demo::restaurant(),
        demo::menu(),
        vec![table],
    ));
    let runtime = runtime(&stores);

    let first = book_up_to_confirmation(&runtime, "+15550103").await;
    let second = book_up_to_confirmation(&runtime, "+15550104").await;

    let (left, right) = tokio::join!(
        say(&runtime, "+15550103", first, "yes"),
        say(&runtime, "+15550104", second, "yes")
    );

    let outcomes = [left.outcome, right.outcome];
    assert_eq!(outcomes.iter().filter(|outcome| **outcome == TurnOutcome::Committed).count(), 1);
    let loser = if left.outcome == TurnOutcome::Committed { &right } else { &left };
    assert_eq!(loser.outcome, TurnOutcome::NoCapacity);
    assert!(!loser.context.alternatives.is_empty());
    assert!(loser.booking_id.is_none());
    assert!(!loser.context.is_filled(SlotName::Time));
    assert_eq!(stores.reservations.bookings().await.len(), 1);
}

#[tokio::test]
async fn booking_outside_hours_is_never_assigned() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);

    for message in ["book a table for 2 tomorrow at 9:30pm", "book a table for 2 tomorrow at 10am"]
    {
        let response = say(&runtime, "+15550105", ConversationContext::default(), message).await;
        assert_eq!(response.outcome, TurnOutcome::OutsideHours, "{message}");
        assert!(!response.context.is_filled(SlotName::Time));
    }
    assert!(stores.reservations.bookings().await.is_empty());
}

#[tokio::test]
async fn replaying_the_committing_turn_returns_the_same_booking() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);
    let caller = "+15550106";

    let confirming = book_up_to_confirmation(&runtime, caller).await;
    let first = say(&runtime, caller, confirming.clone(), "yes").await;
    let replay = say(&runtime, caller, confirming, "yes").await;

    assert_eq!(first.outcome, TurnOutcome::Committed);
    assert!(first.booking_id.is_some());
    assert_eq!(replay.booking_id, first.booking_id);
    assert_eq!(stores.reservations.bookings().await.len(), 1);

    let after = say(&runtime, caller, first.context, "yes").await;
    assert_eq!(after.outcome, TurnOutcome::AlreadyCommitted);
    assert_eq!(stores.reservations.bookings().await.len(), 1);
}

#[tokio::test]
async fn emitted_context_round_trips_through_json() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);
    let caller = "+15550107";

    let opened = say(
        &runtime,
        caller,
        ConversationContext::default(),
        "two garlic naans for delivery",
    )
    .await;
    let wire = serde_json::to_string(&opened.context).expect("serialize");
    let restored: ConversationContext = serde_json::from_str(&wire).expect("deserialize");
    assert_eq!(restored, opened.context);

    let echoed = say(&runtime, caller, restored, "").await;
    assert_eq!(echoed.context.slots, opened.context.slots);
    assert_eq!(echoed.context.items().len(), 1);
    assert_eq!(echoed.context.items()[0].quantity, 2);
    assert_eq!(echoed.context.fulfillment_type(), FulfillmentType::Delivery);
}

#[tokio::test]
async fn delivery_address_with_menu_words_does_not_open_a_choice() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);
    let caller = "+15550108";

    let mut context = ConversationContext::default();
    for message in [
        "two garlic naan and a mango lassi for delivery",
        "7:30pm",
        "12 Main Street, Springfield",
        "Alex",
        "card",
    ] {
        let response = say(&runtime, caller, context, message).await;
        let reply = &response.message;
        assert_ne!(response.state, DialogueState::Disambiguating, "{message}: {reply}");
        context = response.context;
    }
    assert_eq!(context.state, DialogueState::Confirming);

    let done = say(&runtime, caller, context, "yes").await;
    assert_eq!(done.outcome, TurnOutcome::Committed, "{}", done.message);

    let orders = stores.orders.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].lines.len(), 2);
    assert_eq!(orders[0].fulfillment_type, FulfillmentType::Delivery);
    assert_eq!(orders[0].delivery_address.as_deref(), Some("12 Main Street Springfield"));
}

#[tokio::test]
async fn name_said_early_is_kept_and_yes_is_never_a_name() {
    let stores = InMemoryStores::demo();
    let runtime = runtime(&stores);
    let caller = "+15550109";

    let mut context = ConversationContext::default();
    for message in ["something spicy", "the second one", "Priya", "cash", "pickup at 6pm"] {
        context = say(&runtime, caller, context, message).await.context;
    }
    assert_eq!(context.state, DialogueState::Confirming);
    let name = context.value(SlotName::CustomerName).and_then(|value| value.as_text());
    assert_eq!(name, Some("Priya"));

    let done = say(&runtime, caller, context, "yes").await;
    assert_eq!(done.outcome, TurnOutcome::Committed, "{}", done.message);
    assert_eq!(stores.customers.customers().await[0].name, "Priya");
    let orders = stores.orders.orders().await;
    assert_eq!(orders[0].lines[0].item_id, MenuItemId("lamb-vindaloo".to_string()));
}
