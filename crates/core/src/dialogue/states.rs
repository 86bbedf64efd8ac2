use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogueState {
    #[default]
    IntentPending,
    SlotFilling,
    Disambiguating,
    Confirming,
    Committed,
    Abandoned,
}

impl DialogueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentPending => "INTENT_PENDING",
            Self::SlotFilling => "SLOT_FILLING",
            Self::Disambiguating => "DISAMBIGUATING",
            Self::Confirming => "CONFIRMING",
            Self::Committed => "COMMITTED",
            Self::Abandoned => "ABANDONED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Abandoned)
    }
}

/// Concrete, committable intents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Order,
    Booking,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Booking => "booking",
        }
    }
}

/// Intent label reported back to callers on every turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    Order,
    Booking,
    Recommendation,
}

impl From<Intent> for IntentLabel {
    fn from(value: Intent) -> Self {
        match value {
            Intent::Order => Self::Order,
            Intent::Booking => Self::Booking,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueEvent {
    IntentRecognized,
    InformationalQuery,
    SlotsIncomplete,
    AmbiguousReference,
    ReferenceResolved,
    RetryBudgetExhausted,
    AllSlotsFilled,
    Affirmed,
    Rejected,
    CommitSucceeded,
    CommitConflict,
    CancelRequested,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueAction {
    PromptForSlot,
    AnswerQuery,
    PresentCandidates,
    SummarizeForConfirmation,
    Commit,
    OfferAlternatives,
    HandOff,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTransition {
    pub from: DialogueState,
    pub to: DialogueState,
    pub event: DialogueEvent,
    pub actions: Vec<DialogueAction>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid dialogue transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DialogueState, event: DialogueEvent },
}

/// The dialogue transition table. Pure: the next state depends only on the
/// current state and the event.
pub fn transition(
    current: DialogueState,
    event: DialogueEvent,
) -> Result<DialogueTransition, TransitionError> {
    use DialogueAction::{
        AnswerQuery, Commit, HandOff, OfferAlternatives, PresentCandidates, PromptForSlot,
        SummarizeForConfirmation,
    };
    use DialogueEvent::{
        Affirmed, AllSlotsFilled, AmbiguousReference, CancelRequested, CommitConflict,
        CommitSucceeded, InformationalQuery, IntentRecognized, ReferenceResolved, Rejected,
        RetryBudgetExhausted, SlotsIncomplete,
    };
    use DialogueState::{
        Abandoned, Committed, Confirming, Disambiguating, IntentPending, SlotFilling,
    };

    if current.is_terminal() {
        return Err(TransitionError::InvalidTransition { state: current, event });
    }

    let (to, actions) = match (current, event) {
        (_, CancelRequested) | (_, RetryBudgetExhausted) => (Abandoned, vec![HandOff]),
        (state, InformationalQuery) => (state, vec![AnswerQuery]),
        (IntentPending, IntentRecognized) => (SlotFilling, vec![PromptForSlot]),
        (IntentPending, SlotsIncomplete) => (IntentPending, vec![PromptForSlot]),
        (SlotFilling, SlotsIncomplete) => (SlotFilling, vec![PromptForSlot]),
        (SlotFilling, AmbiguousReference) | (Disambiguating, AmbiguousReference) => {
            (Disambiguating, vec![PresentCandidates])
        }
        (Disambiguating, ReferenceResolved) => (SlotFilling, vec![PromptForSlot]),
        (SlotFilling, AllSlotsFilled) => (Confirming, vec![SummarizeForConfirmation]),
        (Confirming, SlotsIncomplete) => (Confirming, vec![SummarizeForConfirmation]),
        (Confirming, Affirmed) => (Confirming, vec![Commit]),
        (Confirming, Rejected) => (SlotFilling, vec![PromptForSlot]),
        (Confirming, CommitSucceeded) => (Committed, Vec::new()),
        (Confirming, CommitConflict) => (SlotFilling, vec![OfferAlternatives]),
        _ => return Err(TransitionError::InvalidTransition { state: current, event }),
    };

    Ok(DialogueTransition { from: current, to, event, actions })
}
