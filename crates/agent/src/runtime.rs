use std::sync::Arc;

use anyhow::Result;
use tablebell_core::config::{AppConfig, NluConfig, NluProvider};
use tablebell_core::{Collaborators, DialogueEngine, SlotExtractor, TurnRequest, TurnResponse};
use tracing::{info, Instrument};

use crate::conversation::RuleBasedExtractor;
use crate::llm::{FallbackExtractor, HttpLlmClient, LlmExtractor};

/// Picks the extractor named by `[nlu] provider`.
///
/// The http provider always runs behind the rule-based fallback, so a broken
/// model endpoint degrades extraction quality rather than failing turns.
pub fn build_extractor(config: &NluConfig) -> Result<Arc<dyn SlotExtractor>> {
    Ok(match config.provider {
        NluProvider::RuleBased => Arc::new(RuleBasedExtractor::new()),
        NluProvider::Http => {
            let client = HttpLlmClient::from_config(config)?;
            let primary = Arc::new(LlmExtractor::new(Arc::new(client)));
            Arc::new(FallbackExtractor::new(primary))
        }
    })
}

/// Engine plus extractor, ready to serve turns.
#[derive(Clone)]
pub struct AgentRuntime {
    engine: DialogueEngine,
}

impl AgentRuntime {
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Result<Self> {
        let extractor = build_extractor(&config.nlu)?;
        Ok(Self::with_extractor(collaborators, extractor, config))
    }

    pub fn with_extractor(
        collaborators: Collaborators,
        extractor: Arc<dyn SlotExtractor>,
        config: &AppConfig,
    ) -> Self {
        let engine = DialogueEngine::new(collaborators, extractor, config);
        info!(
            event_name = "agent.runtime.ready",
            extractor = engine.extractor_name(),
            "agent runtime ready"
        );
        Self { engine }
    }

    pub fn extractor_name(&self) -> &'static str {
        self.engine.extractor_name()
    }

    pub async fn handle_turn(&self, request: TurnRequest, correlation_id: &str) -> TurnResponse {
        let span = tracing::info_span!("turn", correlation_id = %correlation_id);
        self.engine.handle_turn(request, correlation_id).instrument(span).await
    }
}
