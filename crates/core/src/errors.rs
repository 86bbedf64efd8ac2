use thiserror::Error;

use crate::dialogue::states::TransitionError;
use crate::ports::StoreError;

/// Rule violations inside the conversation model. Never retryable.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("slot `{slot}` is not usable: {reason}")]
    InvalidSlot { slot: &'static str, reason: String },
    #[error(transparent)]
    DialogueTransition(#[from] TransitionError),
    #[error("unknown restaurant `{0}`")]
    UnknownRestaurant(String),
    #[error("conversation invariant broken: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("store unavailable: {0}")]
    Persistence(String),
    #[error("collaborator failed: {0}")]
    Integration(String),
    #[error("dependency `{dependency}` timed out after {timeout_ms}ms")]
    Timeout { dependency: &'static str, timeout_ms: u64 },
    #[error("misconfigured: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Dependency failures the caller may retry with the same context.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Integration(_) | Self::Timeout { .. })
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::Domain(_) => InterfaceError::BadRequest { message, correlation_id },
            Self::Persistence(_) | Self::Integration(_) | Self::Timeout { .. } => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(_) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// What an HTTP caller gets to see. `message` is for logs; callers read
/// [`InterfaceError::user_message`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The turn request was not understood.",
            Self::ServiceUnavailable { .. } => "Ordering is briefly unavailable, try again.",
            Self::Internal { .. } => "Something went wrong on our side.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::ports::StoreError;

    #[test]
    fn unknown_restaurant_is_a_bad_request_carrying_the_correlation_id() {
        let interface = ApplicationError::from(DomainError::UnknownRestaurant("r-404".into()))
            .into_interface("req-1");

        assert_eq!(interface.correlation_id(), "req-1");
        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref message, .. } if message.contains("r-404")
        ));
        assert_eq!(interface.user_message(), "The turn request was not understood.");
    }

    #[test]
    fn invalid_slot_names_the_slot() {
        let error = DomainError::InvalidSlot { slot: "party_size", reason: "missing".into() };
        assert_eq!(error.to_string(), "slot `party_size` is not usable: missing");
        assert!(!ApplicationError::from(error).is_retryable());
    }

    #[test]
    fn timeout_is_retryable_and_maps_to_service_unavailable() {
        let error = ApplicationError::Timeout { dependency: "extractor", timeout_ms: 2_000 };
        assert!(error.is_retryable());

        let interface = error.into_interface("req-2");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn store_errors_become_retryable_persistence_failures() {
        let error = ApplicationError::from(StoreError::Unavailable("database is locked".into()));
        assert!(matches!(
            error,
            ApplicationError::Persistence(ref message) if message.contains("locked")
        ));
        assert!(error.is_retryable());
    }

    #[test]
    fn configuration_error_is_internal_and_final() {
        let error = ApplicationError::Configuration("nlu url".into());
        assert!(!error.is_retryable());
        assert!(matches!(error.into_interface("req-4"), InterfaceError::Internal { .. }));
    }
}
