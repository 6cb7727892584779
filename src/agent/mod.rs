use std::marker::PhantomData;

use async_trait::async_trait;
use rig::client::Nothing;
use rig::completion::Chat;
use rig::message::Message as RigMessage;
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use tracing::error;

use crate::errors::AppError;
use crate::models::{ChatTurn, Role};
use crate::schemas::{ResultSchema, StructuredResult};

const STRUCTURED_PREAMBLE: &str = "You are a helpful assistant that answers with structured data. \
                                   Fill every field of the requested schema with realistic values.";
const CHAT_PREAMBLE: &str = "You are a helpful AI assistant. \
                             Be concise, accurate, and friendly. \
                             If you don't know something, say so.";

/// Something that turns a prompt plus conversation history into a result.
///
/// Each implementation is bound to one result shape; failures of any kind
/// (transport, provider, unparseable output) come back as an [`AppError`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<StructuredResult, AppError>;
}

/// Builds a rig [`RigMessage`] history list from stored turns.
/// Structured replies are replayed with their JSON so the model sees the data.
fn to_rig_history(turns: &[ChatTurn]) -> Vec<RigMessage> {
    turns
        .iter()
        .map(|t| match t.role {
            Role::User => RigMessage::user(&t.content),
            Role::Model => match &t.structured_data {
                Some(data) => RigMessage::assistant(format!("{}\n{data}", t.content)),
                None => RigMessage::assistant(&t.content),
            },
        })
        .collect()
}

/// Shared handle on the Ollama provider.
#[derive(Clone)]
pub struct OllamaProvider {
    client: ollama::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str) -> Result<Self, AppError> {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(|e| AppError::GenerationFailed {
                message: format!("Failed to build Ollama client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    fn classify_error(&self, msg: String) -> AppError {
        if msg.contains("Connection refused") || msg.contains("connect") {
            AppError::ProviderUnavailable { host: self.base_url.clone() }
        } else {
            AppError::GenerationFailed { message: msg }
        }
    }
}

/// Generator bound to schema `T` through a rig extractor.
pub struct ExtractorGenerator<T> {
    provider: OllamaProvider,
    _schema: PhantomData<fn() -> T>,
}

impl<T: ResultSchema> ExtractorGenerator<T> {
    pub fn new(provider: OllamaProvider) -> Self {
        Self { provider, _schema: PhantomData }
    }
}

#[async_trait]
impl<T: ResultSchema> Generator for ExtractorGenerator<T> {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<StructuredResult, AppError> {
        let extractor = self
            .provider
            .client
            .extractor::<T>(&self.provider.model)
            .preamble(STRUCTURED_PREAMBLE)
            .build();

        let value = extractor
            .extract_with_chat_history(prompt, to_rig_history(history))
            .await
            .map_err(|e| {
                error!("Structured extraction failed: {e}");
                self.provider.classify_error(e.to_string())
            })?;

        Ok(value.into_result())
    }
}

/// Free-text generator used for prompts with no structured intent.
pub struct ChatGenerator {
    provider: OllamaProvider,
}

impl ChatGenerator {
    pub fn new(provider: OllamaProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ChatTurn],
    ) -> Result<StructuredResult, AppError> {
        let agent = self
            .provider
            .client
            .agent(&self.provider.model)
            .preamble(CHAT_PREAMBLE)
            .build();

        let content = agent
            .chat(prompt, to_rig_history(history))
            .await
            .map_err(|e| {
                error!("Chat completion failed: {e}");
                self.provider.classify_error(e.to_string())
            })?;

        Ok(StructuredResult::PlainText(content))
    }
}
