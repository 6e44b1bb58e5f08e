//! Ollama backend through Rig.
//!
//! Ollama's completion endpoint takes a single prompt, so the dialogue is
//! rendered as a transcript and the system turn travels as the preamble.

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversation::prompt::{Turn, render_dialogue_only, split_system};
use crate::llm::error::{GenerationError, GenerationResult};
use crate::llm::{GenerateFuture, GenerationParams, Generator};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral:7b-instruct-q8_0";

/// Ollama backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Completion model name.
    pub model: String,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            base_url: None,
        }
    }
}

/// Generator backed by a Rig Ollama completion model.
pub struct OllamaGenerator {
    model: ollama::CompletionModel,
    model_name: String,
}

impl OllamaGenerator {
    /// Create a generator from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &OllamaConfig) -> GenerationResult<Self> {
        if let Some(base_url) = &config.base_url {
            url::Url::parse(base_url)
                .map_err(|err| GenerationError::InvalidConfig(format!("{base_url}: {err}")))?;
        }

        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build()?;
        let model = client.completion_model(config.model.clone());

        Ok(Self {
            model,
            model_name: config.model.clone(),
        })
    }

    async fn complete(&self, turns: &[Turn], params: GenerationParams) -> GenerationResult<String> {
        let (system, _) = split_system(turns);
        let prompt = render_dialogue_only(turns);
        debug!(model = %self.model_name, prompt_chars = prompt.len(), "Sending Ollama completion");

        let builder = self
            .model
            .completion_request(prompt)
            .temperature(params.temperature)
            .max_tokens_opt(Some(u64::from(params.max_tokens)));
        let builder = if let Some(system) = system {
            builder.preamble(system.to_string())
        } else {
            builder
        };

        let response = self.model.completion(builder.build()).await?;
        let text = extract_text(&response.choice);
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

impl Generator for OllamaGenerator {
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        params: GenerationParams,
    ) -> GenerateFuture<'a, GenerationResult<String>> {
        Box::pin(self.complete(turns, params))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
