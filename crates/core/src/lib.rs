pub mod audit;
pub mod availability;
pub mod commission;
pub mod commit;
pub mod config;
pub mod demo;
pub mod dialogue;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod ports;

pub use availability::{Availability, AvailabilityEngine, BookingRequest, Reservation};
pub use commission::TieredCommissionResolver;
pub use commit::{CommitOutcome, CommitService};
pub use config::AppConfig;
pub use dialogue::context::ConversationContext;
pub use dialogue::engine::DialogueEngine;
pub use dialogue::extractor::{Extraction, ExtractionContext, ExtractorError, SlotExtractor};
pub use dialogue::turn::{TurnOutcome, TurnRequest, TurnResponse};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ports::{Collaborators, StoreError};
