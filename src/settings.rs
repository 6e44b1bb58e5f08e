//! Environment-driven settings for the relay binaries.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::conversation::core::config::ConversationConfig;
use crate::conversation::maintenance::SweepConfig;
use crate::llm::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::llm::ollama::{DEFAULT_OLLAMA_MODEL, DEFAULT_OLLAMA_URL};
use crate::llm::{BackendConfig, GeminiConfig, OllamaConfig};
use crate::server::DEFAULT_PORT;
use crate::telegram::poller::{DEFAULT_MAX_MESSAGE_LENGTH, PollerConfig};

/// Default sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL: u64 = 300;

/// Above this, `MAX_TOKENS` only earns a warning.
const MAX_TOKENS_WARN: u32 = 2000;

/// Generation backend named by `LLM_BACKEND`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Google AI Studio.
    Gemini,
    /// Local or remote Ollama.
    Ollama,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// All runtime settings.
#[derive(Clone)]
pub struct Settings {
    /// Bot API token.
    pub telegram_token: Option<String>,
    /// Selected backend.
    pub backend: BackendKind,
    /// AI Studio key.
    pub gemini_api_key: Option<String>,
    /// Gemini model name.
    pub gemini_model: String,
    /// Ollama endpoint.
    pub ollama_url: String,
    /// Ollama model name.
    pub ollama_model: String,
    /// History, prompt and generation settings.
    pub conversation: ConversationConfig,
    /// Outbound chunk size in characters.
    pub max_message_length: usize,
    /// Seconds between sweeps, 0 disables.
    pub sweep_interval_seconds: u64,
    /// HTTP API port.
    pub port: u16,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    parse_errors: Vec<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("redacted", &self.redacted())
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Load from process environment.
    ///
    /// Call [`load_dotenv`] first to merge a `.env` file into it.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a specific env file. Process variables take precedence over
    /// the file, as with [`Settings::from_env`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_env_file(path: &Path) -> Result<Self, dotenvy::Error> {
        let file = dotenvy::from_path_iter(path)?.collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self::from_lookup(|key| {
            std::env::var(key).ok().or_else(|| file.get(key).cloned())
        }))
    }

    /// Load from an arbitrary key lookup.
    ///
    /// Unparsable values keep their default and are reported by
    /// [`Settings::validate`].
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut reader = Reader {
            lookup,
            errors: Vec::new(),
        };
        let mut conversation = ConversationConfig::default();

        let backend = reader.parse("LLM_BACKEND", BackendKind::Gemini);
        conversation.generation.max_tokens =
            reader.parse("MAX_TOKENS", conversation.generation.max_tokens);
        conversation.generation.temperature =
            reader.parse("TEMPERATURE", conversation.generation.temperature);
        conversation.generation.timeout_seconds =
            reader.parse("GENERATION_TIMEOUT", conversation.generation.timeout_seconds);
        conversation.history.timeout_seconds =
            reader.parse("CONVERSATION_TIMEOUT", conversation.history.timeout_seconds);
        conversation.history.max_history =
            reader.parse("MAX_HISTORY", conversation.history.max_history);
        conversation.prompt.context_turns =
            reader.parse("CONTEXT_TURNS", conversation.prompt.context_turns);
        if let Some(instruction) = reader.string("SYSTEM_INSTRUCTION") {
            conversation.prompt.system_instruction = instruction;
        }

        Self {
            telegram_token: reader.string("TELEGRAM_BOT_TOKEN"),
            backend,
            gemini_api_key: reader.string("GOOGLE_AI_STUDIO_API_KEY"),
            gemini_model: reader
                .string("GOOGLE_AI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            ollama_url: reader
                .string("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            ollama_model: reader
                .string("OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            conversation,
            max_message_length: reader.parse("MAX_MESSAGE_LENGTH", DEFAULT_MAX_MESSAGE_LENGTH),
            sweep_interval_seconds: reader.parse("SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL),
            port: reader.parse("RELAY_PORT", DEFAULT_PORT),
            log_level: reader
                .string("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string()),
            parse_errors: reader.errors,
        }
    }

    /// Check the settings; `require_token` is set by the bot binary.
    #[must_use]
    pub fn validate(&self, require_token: bool) -> SettingsReport {
        let mut report = SettingsReport {
            errors: self.parse_errors.clone(),
            warnings: Vec::new(),
        };

        if require_token && self.telegram_token.is_none() {
            report
                .errors
                .push("TELEGRAM_BOT_TOKEN is required".to_string());
        }
        if self.backend == BackendKind::Gemini && self.gemini_api_key.is_none() {
            report
                .errors
                .push("GOOGLE_AI_STUDIO_API_KEY is required for the gemini backend".to_string());
        }
        if self.max_message_length == 0 {
            report
                .errors
                .push("MAX_MESSAGE_LENGTH must be greater than 0".to_string());
        }
        if let Err(e) = self.conversation.validate() {
            report.errors.push(e.to_string());
        }

        let generation = &self.conversation.generation;
        if generation.max_tokens > MAX_TOKENS_WARN {
            report.warnings.push(format!(
                "MAX_TOKENS is {}, above {MAX_TOKENS_WARN} may be slow or costly",
                generation.max_tokens
            ));
        }
        if !(0.0..=1.0).contains(&generation.temperature) {
            report.warnings.push(format!(
                "TEMPERATURE {} is outside the usual range [0, 1]",
                generation.temperature
            ));
        }

        report
    }

    /// Backend selection for [`crate::llm::build_generator`].
    #[must_use]
    pub fn backend_config(&self) -> BackendConfig {
        match self.backend {
            BackendKind::Gemini => BackendConfig::Gemini(GeminiConfig {
                api_key: self.gemini_api_key.clone().unwrap_or_default(),
                model: self.gemini_model.clone(),
                base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            }),
            BackendKind::Ollama => BackendConfig::Ollama(OllamaConfig {
                model: self.ollama_model.clone(),
                base_url: Some(self.ollama_url.clone()),
            }),
        }
    }

    /// Sweep schedule.
    #[must_use]
    pub const fn sweep_config(&self) -> SweepConfig {
        SweepConfig::every(self.sweep_interval_seconds)
    }

    /// Telegram polling settings.
    #[must_use]
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            max_message_length: self.max_message_length,
            ..PollerConfig::default()
        }
    }

    /// Generation deadline.
    #[must_use]
    pub const fn generation_timeout(&self) -> Duration {
        self.conversation.generation.timeout()
    }

    /// Loggable view with secrets reduced to presence flags.
    #[must_use]
    pub fn redacted(&self) -> RedactedSettings {
        let model = match self.backend {
            BackendKind::Gemini => self.gemini_model.clone(),
            BackendKind::Ollama => self.ollama_model.clone(),
        };
        RedactedSettings {
            telegram_token_configured: self.telegram_token.is_some(),
            gemini_api_key_configured: self.gemini_api_key.is_some(),
            backend: self.backend,
            model,
            max_tokens: self.conversation.generation.max_tokens,
            temperature: self.conversation.generation.temperature,
            generation_timeout: self.conversation.generation.timeout_seconds,
            conversation_timeout: self.conversation.history.timeout_seconds,
            max_history: self.conversation.history.max_history,
            context_turns: self.conversation.prompt.context_turns,
            max_message_length: self.max_message_length,
            sweep_interval: self.sweep_interval_seconds,
            port: self.port,
            log_level: self.log_level.clone(),
        }
    }
}

/// Merge the nearest `.env` file into the process environment.
///
/// Variables already set are kept. Returns the file path, or `None` when no
/// file exists.
///
/// # Errors
/// Returns an error if a `.env` file exists but cannot be read or parsed.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Result of [`Settings::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SettingsReport {
    /// Problems that prevent startup.
    pub errors: Vec<String>,
    /// Suspicious but usable values.
    pub warnings: Vec<String>,
}

impl SettingsReport {
    /// No errors were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Settings view safe to log.
#[derive(Clone, Debug, Serialize)]
pub struct RedactedSettings {
    /// A bot token is present.
    pub telegram_token_configured: bool,
    /// An AI Studio key is present.
    pub gemini_api_key_configured: bool,
    /// Selected backend.
    pub backend: BackendKind,
    /// Model of the selected backend.
    pub model: String,
    /// Output token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Generation deadline in seconds.
    pub generation_timeout: u64,
    /// Idle timeout in seconds.
    pub conversation_timeout: u64,
    /// History bound.
    pub max_history: usize,
    /// Context window in entries.
    pub context_turns: usize,
    /// Outbound chunk size.
    pub max_message_length: usize,
    /// Sweep interval in seconds.
    pub sweep_interval: u64,
    /// HTTP API port.
    pub port: u16,
    /// Default log filter.
    pub log_level: String,
}

struct Reader<F> {
    lookup: F,
    errors: Vec<String>,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank trimmed value.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&mut self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let Some(raw) = self.string(key) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                self.errors.push(format!("{key}: invalid value '{raw}': {e}"));
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.backend, BackendKind::Gemini);
        assert_eq!(s.gemini_model, "gemini-1.5-flash");
        assert_eq!(s.conversation.generation.max_tokens, 1000);
        assert!((s.conversation.generation.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(s.conversation.history.max_history, 50);
        assert_eq!(s.conversation.history.timeout_seconds, 3600);
        assert_eq!(s.conversation.prompt.context_turns, 10);
        assert_eq!(s.max_message_length, 4096);
        assert_eq!(s.port, 3000);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn test_missing_secrets_are_errors() {
        let report = Settings::default().validate(true);
        assert!(!report.is_ok());
        assert_eq!(report.errors.len(), 2);

        let report = settings(&[("LLM_BACKEND", "ollama")]).validate(false);
        assert!(report.is_ok());
    }

    #[test]
    fn test_overrides_and_parse_errors() {
        let s = settings(&[
            ("GOOGLE_AI_STUDIO_API_KEY", "key"),
            ("MAX_HISTORY", "20"),
            ("CONTEXT_TURNS", "4"),
            ("RELAY_PORT", "not-a-port"),
            ("SYSTEM_INSTRUCTION", "  Be brief.  "),
        ]);
        assert_eq!(s.conversation.history.max_history, 20);
        assert_eq!(s.conversation.prompt.context_turns, 4);
        assert_eq!(s.conversation.prompt.system_instruction, "Be brief.");
        assert_eq!(s.port, DEFAULT_PORT);

        let report = s.validate(false);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("RELAY_PORT"));
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let report = settings(&[("LLM_BACKEND", "gpt")]).validate(false);
        assert!(report.errors.iter().any(|e| e.contains("unknown backend")));
    }

    #[test]
    fn test_warnings() {
        let report = settings(&[
            ("GOOGLE_AI_STUDIO_API_KEY", "key"),
            ("MAX_TOKENS", "4000"),
            ("TEMPERATURE", "1.5"),
        ])
        .validate(false);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_invalid_conversation_config() {
        let report = settings(&[("LLM_BACKEND", "ollama"), ("MAX_HISTORY", "0")]).validate(false);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_conversation_timeout_below_generation_timeout() {
        let report = settings(&[
            ("LLM_BACKEND", "ollama"),
            ("CONVERSATION_TIMEOUT", "30"),
            ("GENERATION_TIMEOUT", "60"),
        ])
        .validate(false);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("history.timeout_seconds"));
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let s = settings(&[
            ("TELEGRAM_BOT_TOKEN", "123:secret"),
            ("GOOGLE_AI_STUDIO_API_KEY", "hidden-key"),
        ]);
        let json = serde_json::to_string(&s.redacted()).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("hidden-key"));
        assert!(json.contains("\"telegram_token_configured\":true"));
        assert!(!format!("{s:?}").contains("hidden-key"));
    }

    #[test]
    fn test_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# relay settings").unwrap();
        writeln!(file, "LLM_BACKEND=ollama").unwrap();
        writeln!(file, "OLLAMA_MODEL=\"llama3:8b\"").unwrap();
        file.flush().unwrap();

        let s = Settings::from_env_file(file.path()).unwrap();
        assert_eq!(s.backend, BackendKind::Ollama);
        assert_eq!(s.ollama_model, "llama3:8b");
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::from_env_file(&dir.path().join("absent.env")).is_err());
    }

    #[test]
    fn test_backend_and_sweep_config() {
        let s = settings(&[("LLM_BACKEND", "Ollama"), ("SWEEP_INTERVAL", "0")]);
        assert!(matches!(s.backend_config(), BackendConfig::Ollama(_)));
        assert!(!s.sweep_config().enabled);
        assert_eq!(s.poller_config().max_message_length, 4096);
    }
}
