mod chat;
mod dispatcher;

pub use chat::{BotMessages, ChatCommand, ChatCommandHandler};
pub use dispatcher::{BotDispatcher, DispatchOutcome, InboundEvent};
