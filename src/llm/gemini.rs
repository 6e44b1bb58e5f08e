//! Google AI Studio (Gemini) backend over the `generateContent` REST API.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::conversation::core::entry::Role;
use crate::conversation::prompt::Turn;
use crate::llm::error::{GenerationError, GenerationResult};
use crate::llm::{GenerateFuture, GenerationParams, Generator};

/// Default API root.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound for a single HTTP exchange; the relay applies its own deadline.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Harm categories filtered at `BLOCK_MEDIUM_AND_ABOVE`.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];
const HARM_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

/// Gemini backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// AI Studio API key.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Model name, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// API root URL.
    pub base_url: String,
}

impl GeminiConfig {
    /// Config for `model` against the public endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    max_output_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn build_request(turns: &[Turn], params: GenerationParams) -> GenerateContentRequest<'_> {
    let mut system_parts = Vec::new();
    let mut contents = Vec::with_capacity(turns.len());

    for turn in turns {
        let role = match turn.role {
            Role::System => {
                system_parts.push(Part { text: &turn.text });
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(Content {
            role: Some(role),
            parts: vec![Part { text: &turn.text }],
        });
    }

    GenerateContentRequest {
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
        contents,
        generation_config: WireGenerationConfig {
            max_output_tokens: params.max_tokens,
            temperature: params.temperature,
        },
        safety_settings: HARM_CATEGORIES
            .iter()
            .map(|&category| SafetySetting {
                category,
                threshold: HARM_THRESHOLD,
            })
            .collect(),
    }
}

fn extract_reply(response: GenerateContentResponse) -> GenerationResult<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Blocked(reason));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(GenerationError::EmptyResponse);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    let text = text.trim();

    if text.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
                Err(GenerationError::Blocked(reason.to_string()))
            }
            _ => Err(GenerationError::EmptyResponse),
        };
    }

    Ok(text.to_string())
}

/// Gemini generator using an async `reqwest` client.
pub struct GeminiGenerator {
    client: Client,
    endpoint: Url,
    config: GeminiConfig,
}

impl GeminiGenerator {
    /// Create a generator from config.
    ///
    /// # Errors
    /// Returns an error if the key is missing, the URL is invalid, or the
    /// HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> GenerationResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::InvalidConfig(
                "gemini api key is empty".to_string(),
            ));
        }

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        let endpoint = Url::parse(&endpoint)
            .map_err(|err| GenerationError::InvalidConfig(format!("{endpoint}: {err}")))?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CLIENT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    async fn post(&self, turns: &[Turn], params: GenerationParams) -> GenerationResult<String> {
        let request = build_request(turns, params);
        debug!(
            model = %self.config.model,
            contents = request.contents.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gemini request failed");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.json::<GenerateContentResponse>().await?;
        extract_reply(body)
    }
}

impl Generator for GeminiGenerator {
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        params: GenerationParams,
    ) -> GenerateFuture<'a, GenerationResult<String>> {
        Box::pin(self.post(turns, params))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams {
            max_tokens: 256,
            temperature: 0.5,
        }
    }

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_request_maps_roles_and_system_instruction() {
        let turns = vec![
            Turn::system("Be brief."),
            Turn::user("Hi"),
            Turn::assistant("Hello!"),
            Turn::user("How are you?"),
        ];
        let value = serde_json::to_value(build_request(&turns, params())).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert!(value["systemInstruction"].get("role").is_none());
        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "How are you?");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(value["generationConfig"]["temperature"], 0.5);
        assert_eq!(value["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(value["safetySettings"][0]["threshold"], HARM_THRESHOLD);
    }

    #[test]
    fn test_request_without_system_turn_omits_instruction() {
        let turns = vec![Turn::user("Hi")];
        let value = serde_json::to_value(build_request(&turns, params())).unwrap();
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_extract_joins_and_trims_parts() {
        let response = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"  Hello"},{"text":" there \n"}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(extract_reply(response).unwrap(), "Hello there");
    }

    #[test]
    fn test_extract_prompt_block() {
        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(matches!(
            extract_reply(response),
            Err(GenerationError::Blocked(reason)) if reason == "SAFETY"
        ));
    }

    #[test]
    fn test_extract_safety_finish_without_text() {
        let response = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(
            extract_reply(response),
            Err(GenerationError::Blocked(_))
        ));
    }

    #[test]
    fn test_extract_empty() {
        assert!(matches!(
            extract_reply(parse("{}")),
            Err(GenerationError::EmptyResponse)
        ));
        let blank = parse(r#"{"candidates":[{"content":{"parts":[{"text":"   "}]},"finishReason":"STOP"}]}"#);
        assert!(matches!(
            extract_reply(blank),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = GeminiGenerator::new(GeminiConfig::new("", DEFAULT_GEMINI_MODEL));
        assert!(matches!(result, Err(GenerationError::InvalidConfig(_))));
    }

    #[test]
    fn test_new_builds_endpoint() {
        let generator = GeminiGenerator::new(GeminiConfig::new("key", "gemini-pro")).unwrap();
        assert_eq!(
            generator.endpoint.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
        assert_eq!(generator.model_name(), "gemini-pro");
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", GeminiConfig::new("secret-key", "m"));
        assert!(!rendered.contains("secret-key"));
    }
}
