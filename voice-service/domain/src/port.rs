use std::path::Path;

use async_trait::async_trait;

use crate::{
    AudioClip, ChatId, CleanupWarning, ClipSource, ContainerFormat, DomainError, MessageRef,
    RequesterId, SampleBuffer, ScratchPaths, ShiftParameters,
};

/// Per-request scratch space. Implementations are called from blocking worker threads.
pub trait ScratchStorage: Send + Sync {
    fn allocate(
        &self,
        requester: &RequesterId,
        format: ContainerFormat,
    ) -> Result<ScratchPaths, DomainError>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), DomainError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, DomainError>;

    /// Removes whatever exists at `paths`; missing files are not an error.
    fn release(&self, paths: &ScratchPaths) -> Vec<CleanupWarning>;
}

/// Blocking codec; callers offload it from the async runtime.
pub trait AudioCodecPort: Send + Sync {
    fn decode(
        &self,
        clip: &AudioClip,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<SampleBuffer, DomainError>;

    fn encode(
        &self,
        buffer: &SampleBuffer,
        target: ContainerFormat,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<AudioClip, DomainError>;
}

/// Blocking, CPU-bound pitch transform.
pub trait PitchShiftPort: Send + Sync {
    fn shift(
        &self,
        buffer: &SampleBuffer,
        params: &ShiftParameters,
    ) -> Result<SampleBuffer, DomainError>;
}

#[async_trait]
pub trait ChatTransportPort: Send + Sync {
    async fn fetch_clip(&self, source: &ClipSource) -> Result<AudioClip, DomainError>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, DomainError>;

    async fn send_voice(
        &self,
        chat_id: ChatId,
        clip: AudioClip,
        caption: &str,
    ) -> Result<MessageRef, DomainError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), DomainError>;
}
