use std::sync::Arc;

/// User-visible texts. Internal error details never end up in any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotMessages {
    pub welcome: String,
    pub help: String,
    pub processing: String,
    pub caption: String,
    pub failure: String,
}

impl Default for BotMessages {
    fn default() -> Self {
        Self {
            welcome: concat!(
                "Hi! 👋\n\n",
                "I turn your voice into a higher-pitched one.\n\n",
                "📝 How it works:\n",
                "1. Send me a voice message\n",
                "2. Wait a few seconds while I process the audio\n",
                "3. You will get your audio back with the new voice\n\n",
                "Try it now!"
            )
            .to_string(),
            help: concat!(
                "🤖 Voice Conversion Bot\n\n",
                "Available commands:\n",
                "/start - Start the bot\n",
                "/help - Show this help\n\n",
                "Just send a voice message and I will raise its pitch."
            )
            .to_string(),
            processing: "🎵 Processing your audio...".to_string(),
            caption: "✨ Here is your audio with the new voice".to_string(),
            failure: "❌ Something went wrong while processing your audio. Please try again."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Help,
}

impl ChatCommand {
    /// Parses `/start`, `/help`, optionally addressed (`/help@some_bot`) and with
    /// trailing arguments, which are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(ChatCommand::Start),
            "help" => Some(ChatCommand::Help),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChatCommand::Start => "start",
            ChatCommand::Help => "help",
        }
    }
}

pub struct ChatCommandHandler {
    messages: Arc<BotMessages>,
}

impl ChatCommandHandler {
    pub fn new(messages: Arc<BotMessages>) -> Self {
        Self { messages }
    }

    pub fn reply(&self, command: ChatCommand) -> &str {
        match command {
            ChatCommand::Start => &self.messages.welcome,
            ChatCommand::Help => &self.messages.help,
        }
    }

    /// Sent when a voice message is rejected before conversion starts.
    pub fn failure_notice(&self) -> &str {
        &self.messages.failure
    }
}
