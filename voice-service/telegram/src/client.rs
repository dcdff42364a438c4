use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use voice_domain::{
    AudioClip, ChatId, ChatTransportPort, ClipSource, ContainerFormat, DomainError, MessageRef,
};

use crate::api::{
    ApiResponse, DeleteMessageBody, GetFileBody, GetUpdatesBody, Message, SendMessageBody,
    TelegramFile, Update,
};
use crate::TelegramError;

const ALLOWED_UPDATES: &[&str] = &["message"];
/// Slack on top of the long-poll wait before the HTTP request itself times out.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Not `Debug`: the token must stay out of logs.
#[derive(Clone)]
pub struct TelegramClientConfig {
    pub token: String,
    pub api_base_url: String,
    pub request_timeout: Duration,
}

pub struct TelegramClient {
    http: Client,
    api_base: String,
    file_base: String,
}

impl TelegramClient {
    pub fn new(config: TelegramClientConfig) -> Result<Self, TelegramError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TelegramError::Setup(err.without_url().to_string()))?;
        let base = config.api_base_url.trim_end_matches('/');

        Ok(Self {
            http,
            api_base: format!("{base}/bot{}", config.token),
            file_base: format!("{base}/file/bot{}", config.token),
        })
    }

    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdatesBody {
            offset,
            timeout: poll_timeout_secs,
            allowed_updates: ALLOWED_UPDATES,
        };
        let response = self
            .http
            .post(self.method_url("getUpdates"))
            .timeout(Duration::from_secs(poll_timeout_secs) + POLL_GRACE)
            .json(&body)
            .send()
            .await?;
        unwrap_envelope("getUpdates", response.json().await?)
    }

    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile, TelegramError> {
        self.call("getFile", &GetFileBody { file_id }).await
    }

    pub async fn download(&self, file: &TelegramFile) -> Result<Vec<u8>, TelegramError> {
        let file_path = file
            .file_path
            .as_deref()
            .ok_or_else(|| TelegramError::NotDownloadable {
                file_id: file.file_id.clone(),
            })?;
        let response = self
            .http
            .get(format!("{}/{file_path}", self.file_base))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TelegramError::Download {
                status: response.status().as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<Message, TelegramError> {
        self.call(
            "sendMessage",
            &SendMessageBody {
                chat_id: chat_id.0,
                text,
            },
        )
        .await
    }

    /// Ogg/Opus goes out as a voice note, anything else as a regular audio file.
    pub async fn send_audio_clip(
        &self,
        chat_id: ChatId,
        clip: AudioClip,
        caption: &str,
    ) -> Result<Message, TelegramError> {
        let (method, field) = match clip.format() {
            ContainerFormat::OggOpus => ("sendVoice", "voice"),
            ContainerFormat::Wav => ("sendAudio", "audio"),
        };
        let format = clip.format();
        let part = Part::bytes(clip.into_bytes())
            .file_name(format!("voice.{}", format.extension()))
            .mime_str(format.mime_type())
            .map_err(|err| TelegramError::Setup(format!("invalid mime type: {err}")))?;
        let form = Form::new()
            .text("chat_id", chat_id.0.to_string())
            .text("caption", caption.to_string())
            .part(field, part);

        let response = self
            .http
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await?;
        unwrap_envelope(method, response.json().await?)
    }

    pub async fn remove_message(&self, message: MessageRef) -> Result<bool, TelegramError> {
        self.call(
            "deleteMessage",
            &DeleteMessageBody {
                chat_id: message.chat_id.0,
                message_id: message.message_id,
            },
        )
        .await
    }

    async fn call<B, T>(&self, method: &'static str, body: &B) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        unwrap_envelope(method, response.json().await?)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base)
    }
}

pub(crate) fn unwrap_envelope<T>(
    method: &'static str,
    envelope: ApiResponse<T>,
) -> Result<T, TelegramError> {
    if !envelope.ok {
        return Err(TelegramError::Api {
            code: envelope.error_code.unwrap_or_default(),
            description: envelope
                .description
                .unwrap_or_else(|| "no description".to_string()),
        });
    }
    envelope
        .result
        .ok_or(TelegramError::MissingResult { method })
}

fn message_ref(message: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(message.chat.id),
        message_id: message.message_id,
    }
}

#[async_trait]
impl ChatTransportPort for TelegramClient {
    async fn fetch_clip(&self, source: &ClipSource) -> Result<AudioClip, DomainError> {
        let file = self
            .get_file(&source.file_id)
            .await
            .map_err(TelegramError::into_fetch_error)?;
        let bytes = self
            .download(&file)
            .await
            .map_err(TelegramError::into_fetch_error)?;
        tracing::debug!(
            file_id = %source.file_id,
            bytes = bytes.len(),
            "telegram file downloaded"
        );
        Ok(AudioClip::new(bytes, source.format))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, DomainError> {
        let message = self
            .send_message(chat_id, text)
            .await
            .map_err(TelegramError::into_send_error)?;
        Ok(message_ref(&message))
    }

    async fn send_voice(
        &self,
        chat_id: ChatId,
        clip: AudioClip,
        caption: &str,
    ) -> Result<MessageRef, DomainError> {
        let message = self
            .send_audio_clip(chat_id, clip, caption)
            .await
            .map_err(TelegramError::into_send_error)?;
        Ok(message_ref(&message))
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), DomainError> {
        self.remove_message(message)
            .await
            .map(|_| ())
            .map_err(TelegramError::into_send_error)
    }
}
