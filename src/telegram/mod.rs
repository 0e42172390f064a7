//! Telegram adapter - command parsing, prompts, and image lookup.

pub mod command;
pub mod prompt;
pub mod session;

pub use command::{ArgError, Command, ParsedArgs, parse_args};
pub use prompt::{PromptInbox, PromptKey, PromptRegistry};
pub use session::{TelegramSession, incoming_message, quoted_message};
