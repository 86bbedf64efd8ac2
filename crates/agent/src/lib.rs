//! Utterance understanding and the turn runtime.
//!
//! - `conversation`: deterministic rule-based extractor over the live menu
//! - `llm`: completion-endpoint extractor and the rule-based fallback wrapper
//! - `runtime`: [`AgentRuntime`], which wires an extractor into the dialogue
//!   engine according to `[nlu]` config
//!
//! Extractors only suggest. Every value they return is validated by the
//! dialogue engine before it can reach an order or a booking.

pub mod conversation;
pub mod llm;
pub mod runtime;

pub use conversation::RuleBasedExtractor;
pub use llm::{FallbackExtractor, HttpLlmClient, LlmClient, LlmExtractor};
pub use runtime::{build_extractor, AgentRuntime};
