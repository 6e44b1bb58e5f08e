//! Language-model backends behind a single generation seam.

pub mod error;
pub mod gemini;
pub mod ollama;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::conversation::core::config::GenerationConfig;
use crate::conversation::prompt::Turn;

pub use error::{GenerationError, GenerationResult};
pub use gemini::{GeminiConfig, GeminiGenerator};
pub use ollama::{OllamaConfig, OllamaGenerator};

/// Boxed future type for generation calls.
pub type GenerateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pass-through sampling parameters for one call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationParams {
    /// Maximum output length in tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Trait abstraction over text-generation APIs.
pub trait Generator: Send + Sync {
    /// Generate a reply for an ordered list of role-tagged turns.
    ///
    /// # Errors
    /// Returns an error if the API call fails or yields no usable text.
    fn generate<'a>(
        &'a self,
        turns: &'a [Turn],
        params: GenerationParams,
    ) -> GenerateFuture<'a, GenerationResult<String>>;

    /// Model identifier reported in diagnostics.
    fn model_name(&self) -> &str;
}

/// Backend selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Google AI Studio (Gemini) REST API.
    Gemini(GeminiConfig),
    /// Ollama through Rig.
    Ollama(OllamaConfig),
}

impl BackendConfig {
    /// Short backend name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Gemini(_) => "gemini",
            Self::Ollama(_) => "ollama",
        }
    }
}

/// Build the configured generator.
///
/// # Errors
/// Returns an error if the backend client cannot be constructed.
pub fn build_generator(config: &BackendConfig) -> GenerationResult<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config {
        BackendConfig::Gemini(gemini) => Arc::new(GeminiGenerator::new(gemini.clone())?),
        BackendConfig::Ollama(ollama) => Arc::new(OllamaGenerator::new(ollama)?),
    };
    tracing::info!(
        backend = config.kind(),
        model = generator.model_name(),
        "Generation backend ready"
    );
    Ok(generator)
}
