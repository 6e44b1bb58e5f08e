//! Telegram Bot API transport.

pub mod api;
pub mod error;
pub mod poller;

pub use api::{DEFAULT_API_URL, TelegramApi, Update};
pub use error::{TelegramError, TelegramResult};
pub use poller::{DEFAULT_MAX_MESSAGE_LENGTH, PollerConfig, TelegramPoller, split_message};
