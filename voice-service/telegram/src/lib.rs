//! Telegram Bot API transport: HTTP client, update mapping and the long-poll loop.

mod api;
mod client;
mod error;
mod polling;
mod update;

pub use api::{Chat, Message, TelegramFile, Update, User, Voice};
pub use client::{TelegramClient, TelegramClientConfig};
pub use error::TelegramError;
pub use polling::run_polling;
pub use update::inbound_event;
