use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use validator::Validate;

use voice_domain::{
    AudioClip, AudioCodecPort, ChatTransportPort, CleanupWarning, ContainerFormat,
    ConversionOutcome, ConversionReport, ConversionRequest, ConversionStage, ConversionState,
    DomainError, MessageRef, PitchShiftPort, ScratchSession, ScratchStorage, ShiftParameters,
};

use crate::{ApplicationError, BotMessages, ConvertVoiceRequest};

#[async_trait]
pub trait ConvertVoiceUseCase: Send + Sync {
    /// Runs one request to completion. Pipeline failures are contained: they are
    /// reported to the user and in the returned report, not as an `Err`.
    async fn convert_voice(
        &self,
        request: ConvertVoiceRequest,
    ) -> Result<ConversionReport, ApplicationError>;
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub shift: ShiftParameters,
    pub output_format: ContainerFormat,
    /// Upper bound for decode + shift + encode together. `None` disables it.
    pub transform_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            shift: ShiftParameters::default(),
            output_format: ContainerFormat::OggOpus,
            transform_timeout: None,
        }
    }
}

pub struct ConvertVoiceUseCaseImpl {
    transport: Arc<dyn ChatTransportPort>,
    storage: Arc<dyn ScratchStorage>,
    codec: Arc<dyn AudioCodecPort>,
    shifter: Arc<dyn PitchShiftPort>,
    messages: Arc<BotMessages>,
    settings: PipelineSettings,
}

impl ConvertVoiceUseCaseImpl {
    pub fn new(
        transport: Arc<dyn ChatTransportPort>,
        storage: Arc<dyn ScratchStorage>,
        codec: Arc<dyn AudioCodecPort>,
        shifter: Arc<dyn PitchShiftPort>,
        messages: Arc<BotMessages>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transport,
            storage,
            codec,
            shifter,
            messages,
            settings,
        }
    }

    async fn run_stages(
        &self,
        request: &ConversionRequest,
        session: &Arc<ScratchSession>,
        tracker: &mut StateTracker,
    ) -> Result<(), DomainError> {
        tracker.enter(ConversionStage::Downloading);
        let clip = self.transport.fetch_clip(&request.source).await?;
        tracing::info!(
            request_id = %request.request_id,
            requester_id = %request.requester,
            bytes = clip.len(),
            format = %clip.format(),
            "voice clip downloaded"
        );

        let deadline = self
            .settings
            .transform_timeout
            .map(|timeout| Instant::now() + timeout);

        tracker.enter(ConversionStage::Decoding);
        let codec = self.codec.clone();
        let scratch = session.clone();
        let decoded = offload(ConversionStage::Decoding, deadline, move || {
            codec.decode(&clip, scratch.storage(), scratch.paths())
        })
        .await?;

        tracker.enter(ConversionStage::Shifting);
        let shifter = self.shifter.clone();
        let params = self.settings.shift;
        let shifted = offload(ConversionStage::Shifting, deadline, move || {
            shifter.shift(&decoded, &params)
        })
        .await?;

        tracker.enter(ConversionStage::Encoding);
        let codec = self.codec.clone();
        let scratch = session.clone();
        let target = self.settings.output_format;
        let encoded = offload(ConversionStage::Encoding, deadline, move || {
            codec.encode(&shifted, target, scratch.storage(), scratch.paths())
        })
        .await?;

        tracker.enter(ConversionStage::Delivering);
        self.deliver(request, encoded).await?;
        Ok(())
    }

    async fn deliver(&self, request: &ConversionRequest, clip: AudioClip) -> Result<(), DomainError> {
        let bytes = clip.len();
        self.transport
            .send_voice(request.chat_id, clip, &self.messages.caption)
            .await?;
        tracing::info!(
            request_id = %request.request_id,
            requester_id = %request.requester,
            bytes,
            "converted clip delivered"
        );
        Ok(())
    }

    async fn notify(&self, request: &ConversionRequest, text: &str) -> Option<MessageRef> {
        match self.transport.send_text(request.chat_id, text).await {
            Ok(message) => Some(message),
            Err(err) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    requester_id = %request.requester,
                    error = %err,
                    "could not send notice"
                );
                None
            }
        }
    }

    async fn retract(&self, request: &ConversionRequest, message: MessageRef) {
        if let Err(err) = self.transport.delete_message(message).await {
            tracing::debug!(
                request_id = %request.request_id,
                error = %err,
                "could not delete processing notice"
            );
        }
    }
}

#[async_trait]
impl ConvertVoiceUseCase for ConvertVoiceUseCaseImpl {
    async fn convert_voice(
        &self,
        request: ConvertVoiceRequest,
    ) -> Result<ConversionReport, ApplicationError> {
        request.validate()?;
        let request = request.into_conversion();

        let mut tracker = StateTracker::new(&request);
        tracker.enter(ConversionStage::Received);
        tracing::info!(
            request_id = %request.request_id,
            requester_id = %request.requester,
            chat_id = %request.chat_id,
            declared_duration_secs = ?request.source.duration_secs,
            "voice conversion received"
        );

        let processing_notice = self.notify(&request, &self.messages.processing).await;

        let (result, cleanup_warnings) = match ScratchSession::allocate(
            self.storage.clone(),
            &request.requester,
            request.source.format,
        ) {
            Ok(session) => {
                let session = Arc::new(session);
                let result = self.run_stages(&request, &session, &mut tracker).await;
                (result, release(&request, session))
            }
            Err(err) => (Err(err), Some(Vec::new())),
        };

        let outcome = match result {
            Ok(()) => {
                if let Some(message) = processing_notice {
                    self.retract(&request, message).await;
                }
                ConversionOutcome::Delivered
            }
            Err(err) => {
                let stage = tracker.fail();
                tracing::error!(
                    request_id = %request.request_id,
                    requester_id = %request.requester,
                    stage = %stage,
                    error_kind = %err.kind(),
                    error = %err,
                    "voice conversion failed"
                );
                ConversionOutcome::Failed {
                    stage,
                    kind: err.kind(),
                }
            }
        };

        let cleaned = cleanup_warnings.is_some();
        let cleanup_warnings = cleanup_warnings.unwrap_or_default();
        if cleaned {
            tracker.clean();
        }
        if matches!(outcome, ConversionOutcome::Failed { .. }) {
            self.notify(&request, &self.messages.failure).await;
        }

        tracing::info!(
            request_id = %request.request_id,
            requester_id = %request.requester,
            delivered = matches!(outcome, ConversionOutcome::Delivered),
            cleanup_warnings = cleanup_warnings.len(),
            "voice conversion finished"
        );

        Ok(ConversionReport {
            request_id: request.request_id,
            requester: request.requester,
            states: tracker.into_states(),
            outcome,
            cleanup_warnings,
        })
    }
}

/// Runs CPU-bound work on the blocking pool. Past `deadline` the stage fails with
/// `DomainError::Timeout`, but only after the worker has finished, so nothing it
/// captured (scratch session included) outlives the call.
async fn offload<T, F>(
    stage: ConversionStage,
    deadline: Option<Instant>,
    work: F,
) -> Result<T, DomainError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(work);
    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(stage = %stage, "time limit exceeded, waiting for worker to finish");
                if let Err(err) = handle.await {
                    tracing::error!(stage = %stage, error = %err, "worker task failed after time limit");
                }
                return Err(DomainError::timeout(stage.as_str()));
            }
        },
        None => handle.await,
    };
    joined.map_err(|err| DomainError::internal_error(format!("worker task failed: {err}")))?
}

/// Returns `None` when the session is still shared and nothing was removed.
fn release(
    request: &ConversionRequest,
    session: Arc<ScratchSession>,
) -> Option<Vec<CleanupWarning>> {
    let warnings = match Arc::try_unwrap(session) {
        Ok(session) => session.release(),
        Err(_) => {
            tracing::error!(
                request_id = %request.request_id,
                requester_id = %request.requester,
                "scratch space still shared after all stages returned"
            );
            return None;
        }
    };
    for warning in &warnings {
        tracing::warn!(
            request_id = %request.request_id,
            requester_id = %request.requester,
            path = %warning.path.display(),
            reason = %warning.reason,
            "scratch cleanup warning"
        );
    }
    Some(warnings)
}

struct StateTracker {
    request_id: String,
    states: Vec<ConversionState>,
    current: ConversionStage,
}

impl StateTracker {
    fn new(request: &ConversionRequest) -> Self {
        Self {
            request_id: request.request_id.to_string(),
            states: Vec::with_capacity(8),
            current: ConversionStage::Received,
        }
    }

    fn enter(&mut self, stage: ConversionStage) {
        tracing::debug!(request_id = %self.request_id, stage = %stage, "conversion stage entered");
        self.current = stage;
        self.states.push(ConversionState::Active(stage));
    }

    fn fail(&mut self) -> ConversionStage {
        self.states.push(ConversionState::Failed(self.current));
        self.current
    }

    fn clean(&mut self) {
        self.states.push(ConversionState::Cleaned);
    }

    fn into_states(self) -> Vec<ConversionState> {
        self.states
    }
}
