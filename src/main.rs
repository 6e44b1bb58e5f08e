//! Telegram bot entrypoint.

use std::process::ExitCode;

use chat_relay::start_relay;

fn main() -> ExitCode {
    start_relay::run_bot()
}
