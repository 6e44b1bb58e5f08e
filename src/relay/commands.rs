//! Chat command parsing and fixed replies.

/// Reply to `/start`.
pub const START_TEXT: &str = "🤖 Welcome to the AI chat bot!\n\n\
I keep track of our recent conversation and answer with the help of a large language model.\n\n\
Just send me any message and I'll respond!";

/// Reply to `/help`.
pub const HELP_TEXT: &str = "🆘 How to use this bot:\n\n\
• Simply send me any message or question\n\
• I remember the recent conversation for context\n\
• Idle conversations are forgotten after a while\n\n\
Commands:\n\
/start - Welcome message\n\
/help - This help message\n\
/clear - Clear conversation history";

/// Reply to `/clear`.
pub const CLEARED_TEXT: &str = "🗑️ Conversation history cleared!";

/// Fallback when the model produced nothing usable.
pub const EMPTY_REPLY_TEXT: &str =
    "I'm sorry, I couldn't generate a response. Please try rephrasing your message.";

/// Fallback for any other generation failure.
pub const GENERATION_FAILED_TEXT: &str =
    "I'm experiencing technical difficulties. Please try again later.";

/// Reply when handling failed outside generation.
pub const INTERNAL_ERROR_TEXT: &str =
    "❌ Sorry, I encountered an error while processing your message. Please try again.";

/// Bot command recognised in an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/clear`
    Clear,
    /// Any other `/command`.
    Unknown(String),
}

impl Command {
    /// Parse a leading `/command`, accepting a `@botname` suffix and
    /// trailing arguments. Returns `None` for ordinary text.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.trim_start().strip_prefix('/')?.split(char::is_whitespace).next()?;
        let name = token.split('@').next().unwrap_or(token);
        if name.is_empty() {
            return None;
        }

        let command = if name.eq_ignore_ascii_case("start") {
            Self::Start
        } else if name.eq_ignore_ascii_case("help") {
            Self::Help
        } else if name.eq_ignore_ascii_case("clear") {
            Self::Clear
        } else {
            Self::Unknown(name.to_string())
        };
        Some(command)
    }
}
