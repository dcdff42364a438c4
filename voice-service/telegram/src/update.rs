use voice_application::{ChatCommand, InboundEvent};
use voice_domain::{ChatId, ClipSource, ContainerFormat, RequesterId};

use crate::api::{Message, Update};

/// Maps a raw update onto what the dispatcher understands. Voice notes are always Ogg/Opus.
pub fn inbound_event(update: &Update) -> InboundEvent {
    let Some(message) = update.message.as_ref() else {
        return InboundEvent::Unsupported {
            chat_id: None,
            kind: "non_message",
        };
    };
    let chat_id = ChatId(message.chat.id);

    if let Some(voice) = &message.voice {
        return InboundEvent::Voice {
            requester: requester_of(message),
            chat_id,
            source: ClipSource {
                file_id: voice.file_id.clone(),
                format: ContainerFormat::OggOpus,
                duration_secs: voice.duration,
            },
        };
    }

    if let Some(command) = message.text.as_deref().and_then(ChatCommand::parse) {
        return InboundEvent::Command { chat_id, command };
    }

    InboundEvent::Unsupported {
        chat_id: Some(chat_id),
        kind: message_kind(message),
    }
}

fn requester_of(message: &Message) -> RequesterId {
    let id = message
        .from
        .as_ref()
        .map(|user| user.id)
        .unwrap_or(message.chat.id);
    RequesterId::new(id.to_string())
}

fn message_kind(message: &Message) -> &'static str {
    if message.text.is_some() {
        "text"
    } else if message.audio.is_some() {
        "audio"
    } else if message.document.is_some() {
        "document"
    } else if message.photo.is_some() {
        "photo"
    } else if message.sticker.is_some() {
        "sticker"
    } else if message.video_note.is_some() {
        "video_note"
    } else {
        "other"
    }
}
