//! One conversational turn, end to end.
//!
//! The engine works on a clone of the caller's context. Any collaborator
//! failure discards the clone and replies with the context exactly as it came
//! in, so a failed turn never advances the conversation.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::availability::{Availability, AvailabilityEngine};
use crate::commit::{booking_request, order_lines, CommitOutcome, CommitScope, CommitService};
use crate::config::{AppConfig, DialogueConfig};
use crate::dialogue::context::{CommitKind, CommitRecord, ConversationContext, PendingReference};
use crate::dialogue::disambiguation::{resolve_descriptor, resolve_selection, search, Resolution};
use crate::dialogue::extractor::{
    CandidateSelection, Extraction, ExtractionContext, IntentGuess, ItemReference, SlotExtractor,
};
use crate::dialogue::replies;
use crate::dialogue::slots::{
    interpret, merge_decision, validate_selection, MergeDecision, OrderItemSelection,
    RejectionKind, SlotName, SlotRejection, SlotRules, SlotValue, MAX_ITEM_QUANTITY,
};
use crate::dialogue::states::{
    transition, DialogueEvent, DialogueState, DialogueTransition, Intent, IntentLabel,
};
use crate::dialogue::turn::{TurnOutcome, TurnRequest, TurnResponse};
use crate::domain::menu::{MenuItem, MenuItemId};
use crate::domain::order::{order_total, FulfillmentType};
use crate::domain::restaurant::{Restaurant, RestaurantId};
use crate::errors::{ApplicationError, DomainError};
use crate::ports::{bounded, Collaborators};

const RECOMMENDATION_LIMIT: usize = 3;

#[derive(Clone)]
pub struct DialogueEngine {
    collaborators: Collaborators,
    extractor: Arc<dyn SlotExtractor>,
    settings: DialogueConfig,
    availability: AvailabilityEngine,
    commit: CommitService,
    timeout: Duration,
}

/// Everything fixed for the duration of one turn.
struct Turn<'a> {
    caller: &'a str,
    restaurant: &'a Restaurant,
    menu: &'a [MenuItem],
    now: NaiveDateTime,
    correlation_id: &'a str,
}

/// What merging one extraction into the context produced.
#[derive(Default)]
struct Absorbed {
    added: Vec<(MenuItem, u32)>,
    filled: Vec<SlotName>,
    rejections: Vec<SlotRejection>,
    ambiguous: Option<Vec<MenuItem>>,
    unmatched: Option<String>,
}

impl DialogueEngine {
    pub fn new(
        collaborators: Collaborators,
        extractor: Arc<dyn SlotExtractor>,
        config: &AppConfig,
    ) -> Self {
        let timeout = Duration::from_millis(config.dialogue.dependency_timeout_ms);
        let availability = AvailabilityEngine::new(
            collaborators.catalog.clone(),
            collaborators.reservations.clone(),
            config.availability.clone(),
            timeout,
        );
        let commit = CommitService::new(
            collaborators.clone(),
            availability.clone(),
            config.commission.default_rate_pct,
            timeout,
        );
        Self {
            collaborators,
            extractor,
            settings: config.dialogue.clone(),
            availability,
            commit,
            timeout,
        }
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    /// Handles one caller utterance. Never fails: every error class becomes a
    /// reply with a [`TurnOutcome`].
    pub async fn handle_turn(&self, request: TurnRequest, correlation_id: &str) -> TurnResponse {
        let response = match self.run(&request, correlation_id).await {
            Ok(response) => response,
            Err(error) => recover(&request, error, correlation_id),
        };

        info!(
            event_name = "dialogue.turn.handled",
            correlation_id = %correlation_id,
            restaurant_id = %request.account_id,
            caller = %request.caller_phone,
            state = response.state.as_str(),
            outcome = response.outcome.as_str(),
            turn = response.context.turn_count,
            "dialogue turn handled"
        );
        response
    }

    async fn run(
        &self,
        request: &TurnRequest,
        correlation_id: &str,
    ) -> Result<TurnResponse, ApplicationError> {
        let mut context = request.context.clone();
        if let Some(response) = terminal_reply(&context) {
            return Ok(response);
        }

        let restaurant_id = RestaurantId(request.account_id.trim().to_string());
        if restaurant_id.0.is_empty() {
            return Err(DomainError::UnknownRestaurant(String::new()).into());
        }
        if let Some(bound) = &context.restaurant_id {
            if *bound != restaurant_id {
                return Err(DomainError::InvariantViolation(format!(
                    "context belongs to restaurant `{}`",
                    bound.0
                ))
                .into());
            }
        }

        let catalog = &self.collaborators.catalog;
        let restaurant = bounded("catalog", self.timeout, catalog.restaurant(&restaurant_id))
            .await?
            .ok_or_else(|| DomainError::UnknownRestaurant(restaurant_id.0.clone()))?;
        let menu = bounded("catalog", self.timeout, catalog.menu(&restaurant_id)).await?;
        context.restaurant_id = Some(restaurant_id);

        let turn = Turn {
            caller: &request.caller_phone,
            restaurant: &restaurant,
            menu: &menu,
            now: self.collaborators.clock.now(),
            correlation_id,
        };

        let message = request.message.trim();
        if message.is_empty() {
            return Ok(reprompt(context, &turn));
        }

        context.turn_count += 1;
        let extraction_context = ExtractionContext {
            state: context.state,
            intent: context.intent,
            unfilled: context.missing_slots(),
            candidates: candidate_items(&context, &menu),
            menu: menu.clone(),
            now: turn.now,
        };
        let extraction = bounded(
            "extractor",
            self.timeout,
            self.extractor.extract(message, &extraction_context),
        )
        .await?;
        debug!(
            event_name = "dialogue.extraction",
            correlation_id = %correlation_id,
            extractor = self.extractor.name(),
            intent = ?extraction.intent,
            proposals = extraction.proposals.len(),
            item_references = extraction.item_references.len(),
            "utterance extracted"
        );

        if extraction.intent == Some(IntentGuess::Cancel) {
            apply(&mut context, DialogueEvent::CancelRequested)?;
            return Ok(TurnResponse::new(replies::goodbye(), TurnOutcome::Abandoned, context));
        }
        if is_informational(&extraction) {
            return recommend(context, &extraction, &turn);
        }

        match context.state {
            DialogueState::IntentPending => {
                self.on_intent_pending(context, extraction, &turn).await
            }
            DialogueState::SlotFilling => {
                let absorbed = self.absorb(&mut context, &extraction, &turn, false);
                self.settle(context, absorbed, &turn).await
            }
            DialogueState::Disambiguating => {
                self.on_disambiguating(context, extraction, &turn).await
            }
            DialogueState::Confirming => self.on_confirming(context, extraction, &turn).await,
            DialogueState::Committed | DialogueState::Abandoned => {
                let reason = "turn on a finished conversation".to_string();
                Err(DomainError::InvariantViolation(reason).into())
            }
        }
    }

    async fn on_intent_pending(
        &self,
        mut context: ConversationContext,
        extraction: Extraction,
        turn: &Turn<'_>,
    ) -> Result<TurnResponse, ApplicationError> {
        let Some(intent) = extraction.intent.and_then(|guess| guess.concrete()) else {
            context.clarification_attempts += 1;
            if context.clarification_attempts >= self.settings.max_disambiguation_attempts {
                return hand_off(context);
            }
            apply(&mut context, DialogueEvent::SlotsIncomplete)?;
            return Ok(TurnResponse::new(
                replies::clarify_intent(),
                TurnOutcome::InProgress,
                context,
            ));
        };

        context.intent = Some(intent);
        apply(&mut context, DialogueEvent::IntentRecognized)?;
        let absorbed = self.absorb(&mut context, &extraction, turn, false);
        self.settle(context, absorbed, turn).await
    }

    async fn on_disambiguating(
        &self,
        mut context: ConversationContext,
        extraction: Extraction,
        turn: &Turn<'_>,
    ) -> Result<TurnResponse, ApplicationError> {
        let candidates = candidate_items(&context, turn.menu);
        let pending = context.pending_reference.clone().unwrap_or(PendingReference {
            descriptor: String::new(),
            quantity: 1,
            extras: Vec::new(),
        });

        let resolution = if candidates.is_empty() {
            Resolution::NoMatch
        } else {
            pick_candidate(&candidates, &extraction)
        };

        match resolution {
            Resolution::Resolved(item) => {
                let selection = OrderItemSelection {
                    item_id: item.id.clone(),
                    quantity: pending.quantity,
                    extras: pending.extras,
                };
                let confidence = extraction.confidence;
                let added = add_selection(&mut context, turn.menu, selection, confidence);
                context.clear_candidates();
                apply(&mut context, DialogueEvent::ReferenceResolved)?;

                let rest =
                    Extraction { item_references: Vec::new(), selection: None, ..extraction };
                let mut absorbed = self.absorb(&mut context, &rest, turn, false);
                match added {
                    Ok(item) => absorbed.added.insert(0, (item, pending.quantity)),
                    Err(rejection) => absorbed.rejections.insert(0, rejection),
                }
                self.settle(context, absorbed, turn).await
            }
            Resolution::Narrowed(items) => {
                context.candidates = items.iter().map(|item| item.id.clone()).collect();
                apply(&mut context, DialogueEvent::AmbiguousReference)?;
                Ok(TurnResponse::new(
                    replies::present_candidates(&items, false),
                    TurnOutcome::AmbiguousReference,
                    context,
                ))
            }
            Resolution::NoMatch | Resolution::NoProgress => {
                if candidates.is_empty() {
                    return hand_off(context);
                }
                // Other answers given while the list is open are kept; only a
                // turn that moved nothing forward spends an attempt.
                let rest =
                    Extraction { item_references: Vec::new(), selection: None, ..extraction };
                let absorbed = self.absorb(&mut context, &rest, turn, false);
                let stalled = absorbed.filled.is_empty();
                if stalled {
                    context.disambiguation_attempts += 1;
                    if context.disambiguation_attempts
                        >= self.settings.max_disambiguation_attempts
                    {
                        return hand_off(context);
                    }
                }

                apply(&mut context, DialogueEvent::AmbiguousReference)?;
                let choices = replies::present_candidates(&candidates, stalled);
                let message = match absorbed.rejections.first() {
                    Some(rejection) => replies::rejected(&rejection.reason, &choices),
                    None if stalled => choices,
                    None => replies::noted(&choices),
                };
                Ok(TurnResponse::new(message, TurnOutcome::AmbiguousReference, context))
            }
        }
    }

    async fn on_confirming(
        &self,
        mut context: ConversationContext,
        extraction: Extraction,
        turn: &Turn<'_>,
    ) -> Result<TurnResponse, ApplicationError> {
        let wants_changes =
            !extraction.proposals.is_empty() || !extraction.item_references.is_empty();

        if extraction.affirmation == Some(true) && !wants_changes {
            apply(&mut context, DialogueEvent::Affirmed)?;
            return self.commit(context, turn).await;
        }

        if extraction.affirmation == Some(false) || wants_changes {
            apply(&mut context, DialogueEvent::Rejected)?;
            if !wants_changes {
                return Ok(TurnResponse::new(
                    replies::what_to_change(),
                    TurnOutcome::InProgress,
                    context,
                ));
            }
            let absorbed = self.absorb(&mut context, &extraction, turn, true);
            return self.settle(context, absorbed, turn).await;
        }

        context.clarification_attempts += 1;
        if context.clarification_attempts >= self.settings.max_disambiguation_attempts {
            return hand_off(context);
        }
        apply(&mut context, DialogueEvent::SlotsIncomplete)?;
        Ok(TurnResponse::new(replies::confirm_again(), TurnOutcome::InProgress, context))
    }

    /// Merges item references and slot proposals into the context.
    fn absorb(
        &self,
        context: &mut ConversationContext,
        extraction: &Extraction,
        turn: &Turn<'_>,
        contradicted: bool,
    ) -> Absorbed {
        let mut absorbed = Absorbed::default();
        let Some(intent) = context.intent else {
            return absorbed;
        };

        if intent == Intent::Order {
            self.absorb_items(context, extraction, turn, &mut absorbed);
        }

        if intent == Intent::Booking && !context.alternatives.is_empty() {
            if let Some(CandidateSelection::Ordinal(position)) = extraction.selection {
                let picked = position
                    .checked_sub(1)
                    .and_then(|index| context.alternatives.get(index))
                    .copied();
                if let Some(time) = picked {
                    context.fill(SlotName::Time, SlotValue::Time(time), 1.0);
                    context.alternatives.clear();
                    absorbed.filled.push(SlotName::Time);
                }
            }
        }

        let rules = SlotRules { restaurant: turn.restaurant, menu: turn.menu, now: turn.now };
        let nothing_missing = context.missing_slots().is_empty();
        let mut proposals = extraction.proposals.iter().collect::<Vec<_>>();
        proposals.sort_by_key(|proposal| proposal.slot);

        for proposal in proposals {
            let slot = proposal.slot;
            if slot == SlotName::Items || !slot.applies_to(intent) {
                continue;
            }
            if proposal.confidence < self.settings.min_slot_confidence {
                debug!(
                    event_name = "dialogue.slot.low_confidence",
                    correlation_id = %turn.correlation_id,
                    slot = slot.as_str(),
                    confidence = proposal.confidence,
                    "proposal discarded"
                );
                continue;
            }

            let checked = interpret(slot, &proposal.raw, &rules)
                .and_then(|value| check_booking_window(slot, value, turn.restaurant));
            match checked {
                Ok(value) => {
                    let re_specified = proposal.corrective || nothing_missing;
                    let decision = merge_decision(
                        context.slot(slot),
                        proposal.confidence,
                        re_specified,
                        contradicted,
                    );
                    match decision {
                        MergeDecision::Fill | MergeDecision::Replace => {
                            context.fill(slot, value, proposal.confidence);
                            absorbed.filled.push(slot);
                            if slot == SlotName::Time {
                                context.alternatives.clear();
                            }
                        }
                        MergeDecision::Keep => debug!(
                            event_name = "dialogue.slot.kept",
                            correlation_id = %turn.correlation_id,
                            slot = slot.as_str(),
                            "earlier value kept"
                        ),
                    }
                }
                Err(rejection) => {
                    if contradicted || !context.is_filled(slot) {
                        context.reject(slot, rejection.reason.clone());
                    }
                    absorbed.rejections.push(rejection);
                }
            }
        }

        if intent == Intent::Booking {
            let date = context.value(SlotName::Date).and_then(SlotValue::as_date);
            let time = context.value(SlotName::Time).and_then(SlotValue::as_time);
            if let (Some(date), Some(time)) = (date, time) {
                if date == turn.now.date() && time < turn.now.time() {
                    let rejection = SlotRejection::invalid(
                        SlotName::Time,
                        "that time has already passed today",
                    );
                    context.reject(SlotName::Time, rejection.reason.clone());
                    absorbed.rejections.push(rejection);
                }
            }
        }

        absorbed
    }

    fn absorb_items(
        &self,
        context: &mut ConversationContext,
        extraction: &Extraction,
        turn: &Turn<'_>,
        absorbed: &mut Absorbed,
    ) {
        if extraction.item_references.is_empty() {
            return;
        }
        if extraction.confidence < self.settings.min_slot_confidence {
            debug!(
                event_name = "dialogue.items.low_confidence",
                correlation_id = %turn.correlation_id,
                references = extraction.item_references.len(),
                confidence = extraction.confidence,
                "item references discarded"
            );
            return;
        }

        for reference in &extraction.item_references {
            let (item_id, quantity, extras) = match reference {
                ItemReference::Catalog { item_id, quantity, extras } => {
                    (item_id.clone(), *quantity, extras.clone())
                }
                ItemReference::Descriptor { text, quantity, extras } => {
                    // Only one open candidate list at a time.
                    if absorbed.ambiguous.is_some() {
                        continue;
                    }
                    match resolve_descriptor(turn.menu, text) {
                        Resolution::Resolved(item) => (item.id, *quantity, extras.clone()),
                        Resolution::Narrowed(items) => {
                            context.candidates = items.iter().map(|item| item.id.clone()).collect();
                            context.pending_reference = Some(PendingReference {
                                descriptor: text.clone(),
                                quantity: *quantity,
                                extras: extras.clone(),
                            });
                            context.disambiguation_attempts = 0;
                            absorbed.ambiguous = Some(items);
                            continue;
                        }
                        Resolution::NoMatch | Resolution::NoProgress => {
                            absorbed.unmatched = Some(text.clone());
                            continue;
                        }
                    }
                }
            };

            let selection = OrderItemSelection { item_id, quantity, extras };
            match add_selection(context, turn.menu, selection, extraction.confidence) {
                Ok(item) => absorbed.added.push((item, quantity)),
                Err(rejection) => absorbed.rejections.push(rejection),
            }
        }
    }

    /// Decides the reply after merging: ask about ambiguity, report a
    /// rejection, prompt for the next slot, or move to confirmation.
    async fn settle(
        &self,
        mut context: ConversationContext,
        absorbed: Absorbed,
        turn: &Turn<'_>,
    ) -> Result<TurnResponse, ApplicationError> {
        let intent = context.intent.ok_or_else(|| {
            ApplicationError::from(DomainError::InvariantViolation(
                "slot filling without an intent".to_string(),
            ))
        })?;

        if let Some(candidates) = &absorbed.ambiguous {
            apply(&mut context, DialogueEvent::AmbiguousReference)?;
            let choices = replies::present_candidates(candidates, false);
            let message = replies::items_added(&absorbed.added, &choices);
            return Ok(TurnResponse::new(message, TurnOutcome::AmbiguousReference, context));
        }

        let missing = context.missing_slots();
        let follow_up = match missing.first() {
            Some(slot) => replies::prompt_for_slot(*slot, intent),
            None => replies::summary(&context, turn.menu, quoted_total(&context, turn.menu)),
        };

        if let Some(rejection) = absorbed.rejections.first() {
            apply(&mut context, DialogueEvent::SlotsIncomplete)?;
            let (message, outcome) = match (rejection.kind, rejection.slot) {
                (RejectionKind::OutsideHours, SlotName::Time) => {
                    let hours = turn.restaurant.hours();
                    let latest = hours.latest_start(turn.restaurant.booking_duration());
                    (replies::outside_hours(&hours, latest), TurnOutcome::OutsideHours)
                }
                (RejectionKind::OutsideHours, _) => {
                    (replies::rejected(&rejection.reason, &follow_up), TurnOutcome::OutsideHours)
                }
                (RejectionKind::Invalid, _) => {
                    (replies::rejected(&rejection.reason, &follow_up), TurnOutcome::ValidationError)
                }
            };
            return Ok(TurnResponse::new(message, outcome, context));
        }

        if let Some(descriptor) = &absorbed.unmatched {
            apply(&mut context, DialogueEvent::SlotsIncomplete)?;
            let message = replies::items_added(&absorbed.added, &replies::no_match(descriptor));
            return Ok(TurnResponse::new(message, TurnOutcome::InProgress, context));
        }

        if !missing.is_empty() {
            apply(&mut context, DialogueEvent::SlotsIncomplete)?;
            let message = replies::items_added(&absorbed.added, &follow_up);
            return Ok(TurnResponse::new(message, TurnOutcome::InProgress, context));
        }

        match intent {
            Intent::Order => {
                if !context.is_filled(SlotName::FulfillmentType) {
                    context.fill(
                        SlotName::FulfillmentType,
                        SlotValue::FulfillmentType(FulfillmentType::Pickup),
                        1.0,
                    );
                }
            }
            Intent::Booking => {
                let request = booking_request(turn.restaurant, &context)?;
                match self.availability.find_table(turn.restaurant, &request).await? {
                    Availability::Assigned { .. } => {}
                    unavailable => {
                        apply(&mut context, DialogueEvent::SlotsIncomplete)?;
                        return Ok(offer_alternatives(context, unavailable, turn.restaurant));
                    }
                }
            }
        }

        apply(&mut context, DialogueEvent::AllSlotsFilled)?;
        let summary = replies::summary(&context, turn.menu, quoted_total(&context, turn.menu));
        let message = replies::items_added(&absorbed.added, &summary);
        Ok(TurnResponse::new(message, TurnOutcome::InProgress, context))
    }

    async fn commit(
        &self,
        mut context: ConversationContext,
        turn: &Turn<'_>,
    ) -> Result<TurnResponse, ApplicationError> {
        let scope = CommitScope {
            caller: turn.caller,
            restaurant: turn.restaurant,
            correlation_id: turn.correlation_id,
        };
        let outcome = match context.intent {
            Some(Intent::Order) => self.commit.commit_order(scope, turn.menu, &context).await?,
            Some(Intent::Booking) => self.commit.commit_booking(scope, &context).await?,
            None => {
                return Err(DomainError::InvariantViolation(
                    "commit without an intent".to_string(),
                )
                .into())
            }
        };

        match outcome {
            CommitOutcome::OrderCreated { order, replayed } => {
                apply(&mut context, DialogueEvent::CommitSucceeded)?;
                debug!(event_name = "dialogue.commit.order", replayed, order_id = %order.id.0);
                context.commit = Some(CommitRecord {
                    kind: CommitKind::Order,
                    resource_id: order.id.0.clone(),
                    idempotency_key: order.idempotency_key.clone(),
                });
                let message = replies::order_committed(
                    &order.id.0,
                    order.total,
                    Some(order.fulfillment_time.time()),
                );
                let mut response = TurnResponse::new(message, TurnOutcome::Committed, context);
                response.order_id = Some(order.id.0);
                Ok(response)
            }
            CommitOutcome::BookingCreated { booking, replayed } => {
                apply(&mut context, DialogueEvent::CommitSucceeded)?;
                debug!(
                    event_name = "dialogue.commit.booking",
                    replayed,
                    booking_id = %booking.id.0
                );
                context.commit = Some(CommitRecord {
                    kind: CommitKind::Booking,
                    resource_id: booking.id.0.clone(),
                    idempotency_key: booking.idempotency_key.clone(),
                });
                let message = replies::booking_committed(
                    &booking.id.0,
                    booking.party_size,
                    booking.start_time,
                );
                let mut response = TurnResponse::new(message, TurnOutcome::Committed, context);
                response.booking_id = Some(booking.id.0);
                Ok(response)
            }
            CommitOutcome::BookingUnavailable(availability) => {
                apply(&mut context, DialogueEvent::CommitConflict)?;
                Ok(offer_alternatives(context, availability, turn.restaurant))
            }
        }
    }
}

fn apply(
    context: &mut ConversationContext,
    event: DialogueEvent,
) -> Result<DialogueTransition, ApplicationError> {
    let step = transition(context.state, event).map_err(DomainError::from)?;
    if step.to != context.state {
        context.clarification_attempts = 0;
    }
    context.state = step.to;
    Ok(step)
}

fn hand_off(mut context: ConversationContext) -> Result<TurnResponse, ApplicationError> {
    apply(&mut context, DialogueEvent::RetryBudgetExhausted)?;
    Ok(TurnResponse::new(replies::hand_off(), TurnOutcome::Abandoned, context))
}

fn terminal_reply(context: &ConversationContext) -> Option<TurnResponse> {
    match context.state {
        DialogueState::Committed => {
            let record = context.commit.clone();
            let resource_id = record.as_ref().map(|record| record.resource_id.as_str());
            let mut response = TurnResponse::new(
                replies::already_committed(resource_id.unwrap_or("on file")),
                TurnOutcome::AlreadyCommitted,
                context.clone(),
            );
            match record {
                Some(CommitRecord { kind: CommitKind::Order, resource_id, .. }) => {
                    response.order_id = Some(resource_id);
                }
                Some(CommitRecord { kind: CommitKind::Booking, resource_id, .. }) => {
                    response.booking_id = Some(resource_id);
                }
                None => {}
            }
            Some(response)
        }
        DialogueState::Abandoned => {
            Some(TurnResponse::new(replies::hand_off(), TurnOutcome::Abandoned, context.clone()))
        }
        _ => None,
    }
}

fn recover(request: &TurnRequest, error: ApplicationError, correlation_id: &str) -> TurnResponse {
    warn!(
        event_name = "dialogue.turn.failed",
        correlation_id = %correlation_id,
        restaurant_id = %request.account_id,
        caller = %request.caller_phone,
        retryable = error.is_retryable(),
        error = %error,
        "turn failed, context left unchanged"
    );
    let context = request.context.clone();
    match error {
        ApplicationError::Domain(DomainError::UnknownRestaurant(_)) => {
            TurnResponse::new(replies::unknown_restaurant(), TurnOutcome::ValidationError, context)
        }
        ApplicationError::Domain(_) => {
            TurnResponse::new(replies::retry_turn(), TurnOutcome::ValidationError, context)
        }
        _ => TurnResponse::new(
            replies::dependency_unavailable(),
            TurnOutcome::DependencyUnavailable,
            context,
        ),
    }
}

fn reprompt(context: ConversationContext, turn: &Turn<'_>) -> TurnResponse {
    let message = match (context.state, context.intent, context.missing_slots().first()) {
        (DialogueState::Disambiguating, _, _) => {
            replies::present_candidates(&candidate_items(&context, turn.menu), false)
        }
        (DialogueState::Confirming, _, _) => {
            replies::summary(&context, turn.menu, quoted_total(&context, turn.menu))
        }
        (DialogueState::SlotFilling, Some(intent), Some(slot)) => {
            replies::prompt_for_slot(*slot, intent)
        }
        _ => replies::greeting(turn.restaurant),
    };
    TurnResponse::new(message, TurnOutcome::InProgress, context)
}

fn is_informational(extraction: &Extraction) -> bool {
    extraction.intent == Some(IntentGuess::Recommendation)
        && extraction.proposals.is_empty()
        && extraction.selection.is_none()
}

fn recommend(
    mut context: ConversationContext,
    extraction: &Extraction,
    turn: &Turn<'_>,
) -> Result<TurnResponse, ApplicationError> {
    apply(&mut context, DialogueEvent::InformationalQuery)?;
    let filter = extraction.item_references.iter().find_map(|reference| match reference {
        ItemReference::Descriptor { text, .. } => Some(text.as_str()),
        ItemReference::Catalog { .. } => None,
    });
    let items = match filter {
        Some(text) => search(turn.menu, text),
        None => turn.menu.iter().filter(|item| item.available).cloned().collect(),
    };
    let items = items.into_iter().take(RECOMMENDATION_LIMIT).collect::<Vec<_>>();
    Ok(TurnResponse::new(replies::recommendations(&items), TurnOutcome::InProgress, context)
        .with_intent(Some(IntentLabel::Recommendation)))
}

fn offer_alternatives(
    mut context: ConversationContext,
    availability: Availability,
    restaurant: &Restaurant,
) -> TurnResponse {
    context.clear(SlotName::Time);
    match availability {
        Availability::OutsideHours { latest_start, .. } => TurnResponse::new(
            replies::outside_hours(&restaurant.hours(), latest_start),
            TurnOutcome::OutsideHours,
            context,
        ),
        Availability::NoCapacity { alternatives } => {
            let message = replies::no_capacity(&alternatives);
            context.alternatives = alternatives;
            TurnResponse::new(message, TurnOutcome::NoCapacity, context)
        }
        Availability::Assigned { .. } => {
            TurnResponse::new(replies::no_capacity(&[]), TurnOutcome::NoCapacity, context)
        }
    }
}

fn check_booking_window(
    slot: SlotName,
    value: SlotValue,
    restaurant: &Restaurant,
) -> Result<SlotValue, SlotRejection> {
    if let (SlotName::Time, SlotValue::Time(time)) = (slot, &value) {
        if !restaurant.hours().admits_booking(*time, restaurant.booking_duration()) {
            return Err(SlotRejection::outside_hours(slot, "that is outside our booking hours"));
        }
    }
    Ok(value)
}

fn pick_candidate(candidates: &[MenuItem], extraction: &Extraction) -> Resolution {
    let named = extraction.item_references.iter().find_map(|reference| match reference {
        ItemReference::Catalog { item_id, .. } => {
            candidates.iter().find(|candidate| &candidate.id == item_id)
        }
        ItemReference::Descriptor { .. } => None,
    });
    if let Some(item) = named {
        return Resolution::Resolved(item.clone());
    }

    let selection = extraction.selection.clone().or_else(|| {
        extraction.item_references.iter().find_map(|reference| match reference {
            ItemReference::Descriptor { text, .. } => {
                Some(CandidateSelection::Fragment(text.clone()))
            }
            ItemReference::Catalog { .. } => None,
        })
    });
    match selection {
        Some(selection) => resolve_selection(candidates, &selection),
        None => Resolution::NoProgress,
    }
}

fn find_item<'a>(menu: &'a [MenuItem], id: &MenuItemId) -> Option<&'a MenuItem> {
    menu.iter().find(|item| &item.id == id)
}

fn candidate_items(context: &ConversationContext, menu: &[MenuItem]) -> Vec<MenuItem> {
    context.candidates.iter().filter_map(|id| find_item(menu, id)).cloned().collect()
}

/// Validates and appends a selection; repeats of the same item and extras
/// add to the existing line.
fn add_selection(
    context: &mut ConversationContext,
    menu: &[MenuItem],
    selection: OrderItemSelection,
    confidence: f32,
) -> Result<MenuItem, SlotRejection> {
    validate_selection(&selection, menu)?;
    let item = find_item(menu, &selection.item_id)
        .cloned()
        .ok_or_else(|| SlotRejection::invalid(SlotName::Items, "that item is not on the menu"))?;

    let mut items = context.items().to_vec();
    match items.iter_mut().find(|line| {
        line.item_id == selection.item_id && line.extras == selection.extras
    }) {
        Some(line) => {
            let quantity = line.quantity.saturating_add(selection.quantity);
            if quantity > MAX_ITEM_QUANTITY {
                return Err(SlotRejection::invalid(
                    SlotName::Items,
                    format!("quantities must be between 1 and {MAX_ITEM_QUANTITY}"),
                ));
            }
            line.quantity = quantity;
        }
        None => items.push(selection),
    }

    let confidence =
        context.slot(SlotName::Items).map_or(confidence, |entry| entry.confidence.max(confidence));
    context.fill(SlotName::Items, SlotValue::Items(items), confidence);
    Ok(item)
}

fn quoted_total(context: &ConversationContext, menu: &[MenuItem]) -> Option<Decimal> {
    match context.intent {
        Some(Intent::Order) => order_lines(context, menu).ok().map(|lines| order_total(&lines)),
        _ => None,
    }
}
