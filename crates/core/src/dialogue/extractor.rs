use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dialogue::slots::{ProposedValue, SlotName};
use crate::dialogue::states::{DialogueState, Intent};
use crate::domain::menu::{MenuItem, MenuItemId};
use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentGuess {
    Order,
    Booking,
    Recommendation,
    Cancel,
}

impl IntentGuess {
    pub fn concrete(&self) -> Option<Intent> {
        match self {
            Self::Order => Some(Intent::Order),
            Self::Booking => Some(Intent::Booking),
            Self::Recommendation | Self::Cancel => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotProposal {
    pub slot: SlotName,
    pub raw: ProposedValue,
    pub confidence: f32,
    /// The utterance carried a correction cue for this slot.
    #[serde(default)]
    pub corrective: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemReference {
    Catalog {
        item_id: MenuItemId,
        quantity: u32,
        #[serde(default)]
        extras: Vec<String>,
    },
    Descriptor {
        text: String,
        quantity: u32,
        #[serde(default)]
        extras: Vec<String>,
    },
}

/// How the caller picked among presented candidates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSelection {
    /// One-based position in the presented list.
    Ordinal(usize),
    Fragment(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub intent: Option<IntentGuess>,
    #[serde(default)]
    pub proposals: Vec<SlotProposal>,
    #[serde(default)]
    pub item_references: Vec<ItemReference>,
    #[serde(default)]
    pub selection: Option<CandidateSelection>,
    #[serde(default)]
    pub affirmation: Option<bool>,
    #[serde(default)]
    pub confidence: f32,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.intent.is_none()
            && self.proposals.is_empty()
            && self.item_references.is_empty()
            && self.selection.is_none()
            && self.affirmation.is_none()
    }
}

/// What an extractor may know about the conversation so far.
#[derive(Clone, Debug)]
pub struct ExtractionContext {
    pub state: DialogueState,
    pub intent: Option<Intent>,
    /// Required slots still unfilled, first one is the slot being asked for.
    pub unfilled: Vec<SlotName>,
    pub candidates: Vec<MenuItem>,
    pub menu: Vec<MenuItem>,
    pub now: NaiveDateTime,
}

impl ExtractionContext {
    pub fn expected_slot(&self) -> Option<SlotName> {
        self.unfilled.first().copied()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractorError {
    #[error("extractor transport failure: {0}")]
    Transport(String),
    #[error("extractor returned malformed output: {0}")]
    Malformed(String),
}

impl From<ExtractorError> for ApplicationError {
    fn from(value: ExtractorError) -> Self {
        Self::Integration(value.to_string())
    }
}

/// Best-effort, possibly wrong, structured reading of one utterance.
#[async_trait]
pub trait SlotExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(
        &self,
        utterance: &str,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractorError>;
}
