use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tablebell_core::config::NluConfig;
use tablebell_core::dialogue::extractor::{
    Extraction, ExtractionContext, ExtractorError, SlotExtractor,
};
use tracing::{debug, warn};

use crate::conversation::RuleBasedExtractor;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &NluConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("nlu.base_url is required for the http provider"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build nlu http client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        let response = request.send().await.context("nlu request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("nlu endpoint returned {}", response.status()));
        }

        let payload: ChatCompletion =
            response.json().await.context("nlu response was not a chat completion")?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("nlu response had no choices"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(content) => return Ok(content),
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "nlu.request.retry",
                        attempt,
                        error = %error,
                        "retrying nlu request"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

const SYSTEM_PROMPT: &str = "You read one message from a restaurant caller and reply with a \
single JSON object and nothing else. Fields: intent (order|booking|recommendation|cancel|null), \
proposals (list of {slot, raw, confidence, corrective}), item_references (list of \
{kind: catalog, item_id, quantity, extras} or {kind: descriptor, text, quantity, extras}), \
selection ({ordinal: n} or {fragment: text} or null), affirmation (true|false|null), \
confidence (0 to 1). Slots: fulfillment_type, fulfillment_time, delivery_address, \
customer_name, payment_method, date, time, party_size. Only use item ids from the menu. \
Never invent values the caller did not say.";

/// Asks a completion endpoint for a JSON [`Extraction`].
pub struct LlmExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SlotExtractor for LlmExtractor {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn extract(
        &self,
        utterance: &str,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractorError> {
        let prompt = build_prompt(utterance, context);
        let raw = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ExtractorError::Transport(format!("{error:#}")))?;
        parse_extraction(&raw)
    }
}

fn build_prompt(utterance: &str, context: &ExtractionContext) -> String {
    let menu = context
        .menu
        .iter()
        .filter(|item| item.available)
        .map(|item| {
            json!({
                "item_id": item.id.0,
                "name": item.name,
                "category": item.category,
                "tags": item.dietary_tags,
            })
        })
        .collect::<Vec<_>>();
    let candidates =
        context.candidates.iter().map(|item| item.name.as_str()).collect::<Vec<_>>();

    let conversation = json!({
        "state": context.state.as_str(),
        "intent": context.intent.map(|intent| intent.as_str()),
        "asking_for": context.expected_slot().map(|slot| slot.as_str()),
        "unfilled": context.unfilled.iter().map(|slot| slot.as_str()).collect::<Vec<_>>(),
        "candidates": candidates,
        "now": context.now.format("%Y-%m-%d %H:%M").to_string(),
        "menu": menu,
    });

    format!("Conversation: {conversation}\nCaller: {utterance}")
}

/// Parses model output, tolerating code fences and prose around the object.
pub fn parse_extraction(raw: &str) -> Result<Extraction, ExtractorError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let object = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err(ExtractorError::Malformed("no JSON object in completion".to_string())),
    };

    let value: Value = serde_json::from_str(object)
        .map_err(|error| ExtractorError::Malformed(error.to_string()))?;
    let mut extraction: Extraction = serde_json::from_value(value)
        .map_err(|error| ExtractorError::Malformed(error.to_string()))?;

    extraction.confidence = extraction.confidence.clamp(0.0, 1.0);
    for proposal in &mut extraction.proposals {
        proposal.confidence = proposal.confidence.clamp(0.0, 1.0);
    }
    Ok(extraction)
}

/// Tries `primary` and falls back to the rule-based extractor when it fails.
pub struct FallbackExtractor {
    primary: Arc<dyn SlotExtractor>,
    fallback: RuleBasedExtractor,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn SlotExtractor>) -> Self {
        Self { primary, fallback: RuleBasedExtractor::new() }
    }
}

#[async_trait]
impl SlotExtractor for FallbackExtractor {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn extract(
        &self,
        utterance: &str,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractorError> {
        match self.primary.extract(utterance, context).await {
            Ok(extraction) => {
                debug!(
                    event_name = "nlu.extraction.primary",
                    extractor = self.primary.name(),
                    "primary extractor answered"
                );
                Ok(extraction)
            }
            Err(error) => {
                warn!(
                    event_name = "nlu.extraction.fallback",
                    extractor = self.primary.name(),
                    error = %error,
                    "primary extractor failed, using rule-based extraction"
                );
                Ok(self.fallback.extract_utterance(utterance, context))
            }
        }
    }
}
