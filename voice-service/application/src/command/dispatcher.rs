use std::sync::Arc;

use voice_domain::{ChatId, ChatTransportPort, ClipSource, ConversionReport, RequesterId};

use crate::{ApplicationError, ChatCommand, ChatCommandHandler, ConvertVoiceRequest, ConvertVoiceUseCase};

/// Inbound traffic as the transport hands it over.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Command {
        chat_id: ChatId,
        command: ChatCommand,
    },
    Voice {
        requester: RequesterId,
        chat_id: ChatId,
        source: ClipSource,
    },
    Unsupported {
        chat_id: Option<ChatId>,
        kind: &'static str,
    },
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Replied(ChatCommand),
    Converted(ConversionReport),
    Ignored,
}

pub struct BotDispatcher {
    transport: Arc<dyn ChatTransportPort>,
    convert_voice: Arc<dyn ConvertVoiceUseCase>,
    commands: ChatCommandHandler,
}

impl BotDispatcher {
    pub fn new(
        transport: Arc<dyn ChatTransportPort>,
        convert_voice: Arc<dyn ConvertVoiceUseCase>,
        commands: ChatCommandHandler,
    ) -> Self {
        Self {
            transport,
            convert_voice,
            commands,
        }
    }

    pub async fn dispatch(&self, event: InboundEvent) -> Result<DispatchOutcome, ApplicationError> {
        match event {
            InboundEvent::Command { chat_id, command } => {
                tracing::debug!(chat_id = %chat_id, command = command.name(), "chat command");
                self.transport
                    .send_text(chat_id, self.commands.reply(command))
                    .await?;
                Ok(DispatchOutcome::Replied(command))
            }
            InboundEvent::Voice {
                requester,
                chat_id,
                source,
            } => {
                let converted = self
                    .convert_voice
                    .convert_voice(ConvertVoiceRequest {
                        requester_id: requester.as_str().to_string(),
                        chat_id: chat_id.0,
                        file_id: source.file_id,
                        format: source.format,
                        duration_secs: source.duration_secs,
                    })
                    .await;
                match converted {
                    Ok(report) => Ok(DispatchOutcome::Converted(report)),
                    Err(err) => {
                        // Pipeline failures notify on their own; only rejected requests land here.
                        if let Err(send_err) = self
                            .transport
                            .send_text(chat_id, self.commands.failure_notice())
                            .await
                        {
                            tracing::warn!(
                                chat_id = %chat_id,
                                error = %send_err,
                                "could not send failure notice"
                            );
                        }
                        Err(err)
                    }
                }
            }
            InboundEvent::Unsupported { chat_id, kind } => {
                tracing::debug!(chat_id = ?chat_id, kind, "ignoring unsupported update");
                Ok(DispatchOutcome::Ignored)
            }
        }
    }
}
