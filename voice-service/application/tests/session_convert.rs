use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use voice_application::{
    ApplicationError, BotDispatcher, BotMessages, ChatCommand, ChatCommandHandler,
    ConvertVoiceRequest, ConvertVoiceUseCase, ConvertVoiceUseCaseImpl, DispatchOutcome,
    InboundEvent, PipelineSettings,
};
use voice_domain::{
    AudioClip, AudioCodecPort, ChatId, ChatTransportPort, ClipSource, ContainerFormat,
    ConversionOutcome, ConversionStage, ConversionState, DomainError, ErrorKind, MessageRef,
    RequesterId, SampleBuffer, ScratchPaths, ScratchStorage, ShiftParameters,
};
use voice_infra::codec::{buffer_to_wav_bytes, wav_bytes_to_buffer};
use voice_infra::{
    FfmpegCodecAdapter, FfmpegCodecConfig, FsScratchStorage, InMemoryScratchStorage,
    PhaseVocoderConfig, PhaseVocoderShifter,
};

#[derive(Default)]
struct RecordingTransport {
    clips: Mutex<HashMap<String, AudioClip>>,
    texts: Mutex<Vec<(ChatId, String)>>,
    voices: Mutex<Vec<(ChatId, AudioClip, String)>>,
    deleted: Mutex<Vec<MessageRef>>,
    next_message_id: AtomicI64,
}

impl RecordingTransport {
    fn with_clip(file_id: &str, clip: AudioClip) -> Self {
        let transport = Self::default();
        transport
            .clips
            .lock()
            .unwrap()
            .insert(file_id.to_string(), clip);
        transport
    }

    fn texts(&self) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn voices(&self) -> Vec<(ChatId, AudioClip, String)> {
        self.voices.lock().unwrap().clone()
    }

    fn next_ref(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl ChatTransportPort for RecordingTransport {
    async fn fetch_clip(&self, source: &ClipSource) -> Result<AudioClip, DomainError> {
        self.clips
            .lock()
            .unwrap()
            .get(&source.file_id)
            .cloned()
            .ok_or_else(|| DomainError::transport_fetch("unknown file"))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef, DomainError> {
        self.texts
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(self.next_ref(chat_id))
    }

    async fn send_voice(
        &self,
        chat_id: ChatId,
        clip: AudioClip,
        caption: &str,
    ) -> Result<MessageRef, DomainError> {
        self.voices
            .lock()
            .unwrap()
            .push((chat_id, clip, caption.to_string()));
        Ok(self.next_ref(chat_id))
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), DomainError> {
        self.deleted.lock().unwrap().push(message);
        Ok(())
    }
}

/// Writes every scratch path before delegating, so cleanup has real files to remove.
struct ScratchFillingCodec {
    inner: FfmpegCodecAdapter,
}

impl AudioCodecPort for ScratchFillingCodec {
    fn decode(
        &self,
        clip: &AudioClip,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<SampleBuffer, DomainError> {
        scratch.write(&paths.input, clip.bytes())?;
        scratch.write(&paths.intermediate, clip.bytes())?;
        self.inner.decode(clip, scratch, paths)
    }

    fn encode(
        &self,
        buffer: &SampleBuffer,
        target: ContainerFormat,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<AudioClip, DomainError> {
        let clip = self.inner.encode(buffer, target, scratch, paths)?;
        scratch.write(&paths.output, clip.bytes())?;
        Ok(clip)
    }
}

/// Writes the input file, then blocks longer than any sane time limit.
struct StallingCodec {
    stall: Duration,
    finished: Arc<AtomicBool>,
}

impl AudioCodecPort for StallingCodec {
    fn decode(
        &self,
        clip: &AudioClip,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<SampleBuffer, DomainError> {
        scratch.write(&paths.input, clip.bytes())?;
        std::thread::sleep(self.stall);
        self.finished.store(true, Ordering::SeqCst);
        Ok(SampleBuffer::new(vec![0.0; 4096], SAMPLE_RATE))
    }

    fn encode(
        &self,
        _buffer: &SampleBuffer,
        _target: ContainerFormat,
        _scratch: &dyn ScratchStorage,
        _paths: &ScratchPaths,
    ) -> Result<AudioClip, DomainError> {
        Err(DomainError::encode("not reached"))
    }
}

const SAMPLE_RATE: u32 = 16_000;

fn sine_wav(freq_hz: f32, seconds: f32) -> AudioClip {
    let len = (SAMPLE_RATE as f32 * seconds) as usize;
    let samples = (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * freq_hz * i as f32 / SAMPLE_RATE as f32).sin())
        .collect();
    let bytes = buffer_to_wav_bytes(&SampleBuffer::new(samples, SAMPLE_RATE)).expect("wav");
    AudioClip::new(bytes, ContainerFormat::Wav)
}

fn dominant_frequency(buffer: &SampleBuffer) -> f32 {
    let n = buffer.len();
    let mut spectrum: Vec<Complex<f32>> =
        buffer.samples.iter().map(|s| Complex::new(*s, 0.0)).collect();
    FftPlanner::<f32>::new()
        .plan_fft_forward(n)
        .process(&mut spectrum);
    let mut best = (0usize, 0.0f32);
    for (bin, value) in spectrum.iter().enumerate().take(n / 2).skip(1) {
        if value.norm() > best.1 {
            best = (bin, value.norm());
        }
    }
    best.0 as f32 * buffer.sample_rate_hz as f32 / n as f32
}

fn wav_settings() -> PipelineSettings {
    PipelineSettings {
        shift: ShiftParameters::default(),
        output_format: ContainerFormat::Wav,
        transform_timeout: None,
    }
}

fn usecase(
    transport: Arc<RecordingTransport>,
    storage: Arc<dyn ScratchStorage>,
    codec: Arc<dyn AudioCodecPort>,
) -> ConvertVoiceUseCaseImpl {
    ConvertVoiceUseCaseImpl::new(
        transport,
        storage,
        codec,
        Arc::new(PhaseVocoderShifter::new(PhaseVocoderConfig::default()).expect("shifter")),
        Arc::new(BotMessages::default()),
        wav_settings(),
    )
}

fn wav_codec() -> Arc<dyn AudioCodecPort> {
    Arc::new(FfmpegCodecAdapter::new(FfmpegCodecConfig::default()))
}

fn request(file_id: &str) -> ConvertVoiceRequest {
    ConvertVoiceRequest {
        requester_id: "4242".to_string(),
        chat_id: 77,
        file_id: file_id.to_string(),
        format: ContainerFormat::Wav,
        duration_secs: Some(2),
    }
}

#[tokio::test]
async fn two_second_clip_comes_back_higher_with_same_duration() {
    let transport = Arc::new(RecordingTransport::with_clip("clip-1", sine_wav(220.0, 2.0)));
    let storage = Arc::new(InMemoryScratchStorage::new());
    let usecase = usecase(transport.clone(), storage.clone(), wav_codec());

    let report = usecase
        .convert_voice(request("clip-1"))
        .await
        .expect("request accepted");

    assert!(report.is_delivered());
    assert_eq!(
        report.states,
        vec![
            ConversionState::Active(ConversionStage::Received),
            ConversionState::Active(ConversionStage::Downloading),
            ConversionState::Active(ConversionStage::Decoding),
            ConversionState::Active(ConversionStage::Shifting),
            ConversionState::Active(ConversionStage::Encoding),
            ConversionState::Active(ConversionStage::Delivering),
            ConversionState::Cleaned,
        ]
    );

    let voices = transport.voices();
    assert_eq!(voices.len(), 1);
    let (chat_id, clip, caption) = &voices[0];
    assert_eq!(*chat_id, ChatId(77));
    assert_eq!(caption, &BotMessages::default().caption);

    let output = wav_bytes_to_buffer(clip.bytes()).expect("output decodes");
    assert_eq!(output.sample_rate_hz, SAMPLE_RATE);
    assert!((output.duration_secs() - 2.0).abs() < 0.13);
    let measured = dominant_frequency(&output);
    assert!(measured > 250.0, "dominant frequency {measured} Hz not raised");

    assert!(storage.is_empty());
    assert_eq!(transport.texts(), vec![BotMessages::default().processing]);
    assert_eq!(transport.deleted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn decode_failure_sends_one_notice_and_no_audio() {
    let garbage = AudioClip::new(b"not audio at all".to_vec(), ContainerFormat::Wav);
    let transport = Arc::new(RecordingTransport::with_clip("broken", garbage));
    let storage = Arc::new(InMemoryScratchStorage::new());
    let usecase = usecase(transport.clone(), storage.clone(), wav_codec());

    let report = usecase
        .convert_voice(request("broken"))
        .await
        .expect("failure is contained");

    assert_eq!(
        report.outcome,
        ConversionOutcome::Failed {
            stage: ConversionStage::Decoding,
            kind: ErrorKind::Decode,
        }
    );
    assert_eq!(
        &report.states[report.states.len() - 2..],
        &[
            ConversionState::Failed(ConversionStage::Decoding),
            ConversionState::Cleaned
        ]
    );

    let failure = BotMessages::default().failure;
    let notices = transport
        .texts()
        .into_iter()
        .filter(|text| *text == failure)
        .count();
    assert_eq!(notices, 1);
    assert!(transport.voices().is_empty());
    assert!(storage.is_empty());
}

#[tokio::test]
async fn download_failure_is_reported_at_downloading_stage() {
    let transport = Arc::new(RecordingTransport::default());
    let usecase = usecase(
        transport.clone(),
        Arc::new(InMemoryScratchStorage::new()),
        wav_codec(),
    );

    let report = usecase
        .convert_voice(request("missing"))
        .await
        .expect("failure is contained");

    assert_eq!(
        report.outcome,
        ConversionOutcome::Failed {
            stage: ConversionStage::Downloading,
            kind: ErrorKind::TransportFetch,
        }
    );
    assert!(transport.voices().is_empty());
    let texts = transport.texts();
    assert_eq!(texts.last(), Some(&BotMessages::default().failure));
    assert!(texts.iter().all(|text| !text.contains("unknown file")));
}

#[tokio::test]
async fn clip_shorter_than_analysis_window_fails_at_shifting() {
    let transport = Arc::new(RecordingTransport::with_clip("tiny", sine_wav(300.0, 0.05)));
    let usecase = usecase(
        transport.clone(),
        Arc::new(InMemoryScratchStorage::new()),
        wav_codec(),
    );

    let report = usecase
        .convert_voice(request("tiny"))
        .await
        .expect("failure is contained");

    assert_eq!(
        report.outcome,
        ConversionOutcome::Failed {
            stage: ConversionStage::Shifting,
            kind: ErrorKind::InsufficientSamples,
        }
    );
    assert!(transport.voices().is_empty());
}

#[tokio::test]
async fn scratch_files_are_gone_after_success_and_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(FsScratchStorage::new(dir.path()).expect("storage"));
    let codec: Arc<dyn AudioCodecPort> = Arc::new(ScratchFillingCodec {
        inner: FfmpegCodecAdapter::new(FfmpegCodecConfig::default()),
    });

    let transport = Arc::new(RecordingTransport::with_clip("ok", sine_wav(200.0, 1.0)));
    transport.clips.lock().unwrap().insert(
        "bad".to_string(),
        AudioClip::new(vec![1, 2, 3, 4], ContainerFormat::Wav),
    );
    let usecase = usecase(transport.clone(), storage.clone(), codec);

    let paths = storage
        .allocate(&RequesterId::new("4242"), ContainerFormat::Wav)
        .expect("paths");

    let ok = usecase.convert_voice(request("ok")).await.expect("ok");
    assert!(ok.is_delivered());
    assert!(paths.iter().all(|path| !path.exists()));

    let bad = usecase.convert_voice(request("bad")).await.expect("bad");
    assert!(!bad.is_delivered());
    assert_eq!(bad.final_state(), Some(ConversionState::Cleaned));
    assert!(paths.iter().all(|path| !path.exists()));
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_any_work() {
    let transport = Arc::new(RecordingTransport::default());
    let usecase = usecase(
        transport.clone(),
        Arc::new(InMemoryScratchStorage::new()),
        wav_codec(),
    );

    let mut bad = request("clip");
    bad.requester_id = String::new();
    let err = usecase.convert_voice(bad).await.expect_err("validation");
    assert!(matches!(err, ApplicationError::Validation(_)));
    assert!(transport.texts().is_empty());
}

#[tokio::test]
async fn dispatcher_answers_commands_and_routes_voice() {
    let transport = Arc::new(RecordingTransport::with_clip("voice", sine_wav(180.0, 1.0)));
    let convert: Arc<dyn ConvertVoiceUseCase> = Arc::new(usecase(
        transport.clone(),
        Arc::new(InMemoryScratchStorage::new()),
        wav_codec(),
    ));
    let messages = Arc::new(BotMessages::default());
    let dispatcher = BotDispatcher::new(
        transport.clone(),
        convert,
        ChatCommandHandler::new(messages.clone()),
    );

    let outcome = dispatcher
        .dispatch(InboundEvent::Command {
            chat_id: ChatId(5),
            command: ChatCommand::Help,
        })
        .await
        .expect("help");
    assert!(matches!(outcome, DispatchOutcome::Replied(ChatCommand::Help)));
    assert_eq!(transport.texts(), vec![messages.help.clone()]);

    let outcome = dispatcher
        .dispatch(InboundEvent::Voice {
            requester: RequesterId::new("5"),
            chat_id: ChatId(5),
            source: ClipSource {
                file_id: "voice".to_string(),
                format: ContainerFormat::Wav,
                duration_secs: Some(1),
            },
        })
        .await
        .expect("voice");
    match outcome {
        DispatchOutcome::Converted(report) => assert!(report.is_delivered()),
        other => panic!("unexpected outcome {other:?}"),
    }

    let outcome = dispatcher
        .dispatch(InboundEvent::Unsupported {
            chat_id: Some(ChatId(5)),
            kind: "sticker",
        })
        .await
        .expect("ignored");
    assert!(matches!(outcome, DispatchOutcome::Ignored));
}

#[tokio::test]
async fn time_limit_fails_request_only_after_scratch_is_gone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Arc::new(FsScratchStorage::new(dir.path()).expect("storage"));
    let finished = Arc::new(AtomicBool::new(false));
    let transport = Arc::new(RecordingTransport::with_clip(
        "slow",
        AudioClip::new(b"OggS voice".to_vec(), ContainerFormat::OggOpus),
    ));
    let usecase = ConvertVoiceUseCaseImpl::new(
        transport.clone(),
        storage.clone(),
        Arc::new(StallingCodec {
            stall: Duration::from_millis(600),
            finished: finished.clone(),
        }),
        Arc::new(PhaseVocoderShifter::new(PhaseVocoderConfig::default()).expect("shifter")),
        Arc::new(BotMessages::default()),
        PipelineSettings {
            transform_timeout: Some(Duration::from_millis(100)),
            ..PipelineSettings::default()
        },
    );

    let mut slow = request("slow");
    slow.format = ContainerFormat::OggOpus;
    let report = usecase.convert_voice(slow).await.expect("failure is contained");

    assert_eq!(
        report.outcome,
        ConversionOutcome::Failed {
            stage: ConversionStage::Decoding,
            kind: ErrorKind::Timeout,
        }
    );
    assert_eq!(report.final_state(), Some(ConversionState::Cleaned));
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);

    let failure = BotMessages::default().failure;
    assert_eq!(
        transport
            .texts()
            .into_iter()
            .filter(|text| *text == failure)
            .count(),
        1
    );
    assert!(transport.voices().is_empty());
}

#[tokio::test]
async fn rejected_voice_event_still_gets_one_failure_notice() {
    let transport = Arc::new(RecordingTransport::default());
    let messages = Arc::new(BotMessages::default());
    let dispatcher = BotDispatcher::new(
        transport.clone(),
        Arc::new(usecase(
            transport.clone(),
            Arc::new(InMemoryScratchStorage::new()),
            wav_codec(),
        )),
        ChatCommandHandler::new(messages.clone()),
    );

    let err = dispatcher
        .dispatch(InboundEvent::Voice {
            requester: RequesterId::new(""),
            chat_id: ChatId(9),
            source: ClipSource {
                file_id: "voice".to_string(),
                format: ContainerFormat::OggOpus,
                duration_secs: None,
            },
        })
        .await
        .expect_err("empty requester is rejected");

    assert!(matches!(err, ApplicationError::Validation(_)));
    assert_eq!(transport.texts(), vec![messages.failure.clone()]);
    assert!(transport.voices().is_empty());
}
