use serde::{Deserialize, Serialize};
use validator::Validate;

use voice_domain::{ChatId, ClipSource, ContainerFormat, ConversionRequest, RequesterId};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConvertVoiceRequest {
    #[validate(length(min = 1, max = 64))]
    pub requester_id: String,
    pub chat_id: i64,
    #[validate(length(min = 1, max = 256))]
    pub file_id: String,
    pub format: ContainerFormat,
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

impl ConvertVoiceRequest {
    pub fn into_conversion(self) -> ConversionRequest {
        ConversionRequest::new(
            RequesterId::new(self.requester_id),
            ChatId(self.chat_id),
            ClipSource {
                file_id: self.file_id,
                format: self.format,
                duration_secs: self.duration_secs,
            },
        )
    }
}
