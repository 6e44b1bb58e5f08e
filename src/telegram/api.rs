//! Minimal Bot API client: long polling, chat actions and text messages.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::telegram::error::{TelegramError, TelegramResult};

/// Public Bot API root.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Slack added on top of the long-poll timeout.
const POLL_SLACK: Duration = Duration::from_secs(15);

/// One inbound update.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    /// Monotonic update identifier.
    pub update_id: i64,
    /// New incoming message, when the update carries one.
    #[serde(default)]
    pub message: Option<Message>,
}

/// Inbound message.
#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    /// Message identifier within the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    #[serde(default)]
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Text body; absent for media.
    #[serde(default)]
    pub text: Option<String>,
}

/// Message sender.
#[derive(Clone, Debug, Deserialize)]
pub struct User {
    /// Stable user identifier.
    pub id: i64,
    /// Whether the sender is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// Optional `@username`.
    #[serde(default)]
    pub username: Option<String>,
}

/// Chat reference.
#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    /// Chat identifier used for replies.
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> TelegramResult<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (ok, _) => Err(TelegramError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_else(|| {
                    if ok {
                        "missing result".to_string()
                    } else {
                        "unknown error".to_string()
                    }
                }),
            }),
        }
    }
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Serialize)]
struct SendChatAction {
    chat_id: i64,
    action: &'static str,
}

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct TelegramApi {
    client: Client,
    base: Url,
}

impl fmt::Debug for TelegramApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramApi")
            .field("host", &self.base.host_str())
            .finish_non_exhaustive()
    }
}

impl TelegramApi {
    /// Create a client for `token` against `api_url`.
    ///
    /// # Errors
    /// Returns an error if the token is blank or the URL is invalid.
    pub fn new(token: &str, api_url: &str, poll_timeout: Duration) -> TelegramResult<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TelegramError::InvalidConfig(
                "bot token must not be empty".to_string(),
            ));
        }
        let base = Url::parse(&format!("{}/bot{token}/", api_url.trim_end_matches('/')))?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(poll_timeout + POLL_SLACK)
            .build()?;
        Ok(Self { client, base })
    }

    fn method_url(&self, method: &str) -> TelegramResult<Url> {
        Ok(self.base.join(method)?)
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> TelegramResult<T> {
        let response = self
            .client
            .post(self.method_url(method)?)
            .json(body)
            .send()
            .await?;
        response.json::<ApiResponse<T>>().await?.into_result()
    }

    /// Long-poll for updates after `offset`.
    ///
    /// # Errors
    /// Returns an error on transport failure or an API error.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> TelegramResult<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &body).await
    }

    /// Send a plain-text message.
    ///
    /// # Errors
    /// Returns an error on transport failure or an API error.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> TelegramResult<()> {
        self.call::<_, serde_json::Value>("sendMessage", &SendMessage { chat_id, text })
            .await
            .map(drop)
    }

    /// Show the typing indicator in `chat_id`.
    ///
    /// # Errors
    /// Returns an error on transport failure or an API error.
    pub async fn send_typing(&self, chat_id: i64) -> TelegramResult<()> {
        let body = SendChatAction {
            chat_id,
            action: "typing",
        };
        self.call::<_, bool>("sendChatAction", &body).await.map(drop)
    }
}
