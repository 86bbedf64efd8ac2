use serde::{Deserialize, Serialize};

use crate::dialogue::context::ConversationContext;
use crate::dialogue::states::{DialogueState, IntentLabel};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurnRequest {
    pub caller_phone: String,
    pub message: String,
    pub account_id: String,
    #[serde(default)]
    pub context: ConversationContext,
}

/// How the turn ended, one per error class plus the two success shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    InProgress,
    ValidationError,
    AmbiguousReference,
    OutsideHours,
    NoCapacity,
    DependencyUnavailable,
    AlreadyCommitted,
    Abandoned,
    Committed,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::ValidationError => "validation_error",
            Self::AmbiguousReference => "ambiguous_reference",
            Self::OutsideHours => "outside_hours",
            Self::NoCapacity => "no_capacity",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::AlreadyCommitted => "already_committed",
            Self::Abandoned => "abandoned",
            Self::Committed => "committed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub message: String,
    pub intent: Option<IntentLabel>,
    pub state: DialogueState,
    pub outcome: TurnOutcome,
    pub context: ConversationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

impl TurnResponse {
    pub fn new(
        message: impl Into<String>,
        outcome: TurnOutcome,
        context: ConversationContext,
    ) -> Self {
        Self {
            message: message.into(),
            intent: context.intent.map(IntentLabel::from),
            state: context.state,
            outcome,
            context,
            order_id: None,
            booking_id: None,
        }
    }

    pub fn with_intent(mut self, intent: Option<IntentLabel>) -> Self {
        self.intent = intent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{TurnOutcome, TurnRequest, TurnResponse};
    use crate::dialogue::context::ConversationContext;
    use crate::dialogue::states::{DialogueState, Intent, IntentLabel};

    #[test]
    fn request_context_defaults_to_a_fresh_conversation() {
        let request: TurnRequest = serde_json::from_str(
            r#"{"caller_phone": "+15550100", "message": "hi", "account_id": "spice-route"}"#,
        )
        .expect("request without context");
        assert_eq!(request.context, ConversationContext::default());
    }

    #[test]
    fn response_omits_ids_until_commit() {
        let context = ConversationContext {
            state: DialogueState::SlotFilling,
            intent: Some(Intent::Booking),
            ..ConversationContext::default()
        };
        let response = TurnResponse::new("How many?", TurnOutcome::InProgress, context);
        let json = serde_json::to_value(&response).expect("serialize");

        assert_eq!(json["intent"], "booking");
        assert_eq!(json["state"], "SLOT_FILLING");
        assert_eq!(json["outcome"], "in_progress");
        assert!(json.get("order_id").is_none());
        assert!(json.get("booking_id").is_none());
        assert_eq!(response.intent, Some(IntentLabel::Booking));
    }
}
