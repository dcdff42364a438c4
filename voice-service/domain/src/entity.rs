use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DomainError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    /// Compressed voice note: Opus packets in an Ogg container.
    OggOpus,
    /// Uncompressed RIFF/WAVE.
    Wav,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::OggOpus => "ogg",
            ContainerFormat::Wav => "wav",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ContainerFormat::OggOpus => "audio/ogg",
            ContainerFormat::Wav => "audio/wav",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::OggOpus => f.write_str("ogg_opus"),
            ContainerFormat::Wav => f.write_str("wav"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    bytes: Vec<u8>,
    format: ContainerFormat,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>, format: ContainerFormat) -> Self {
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Mono waveform in the normalized `[-1.0, 1.0]` range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate_hz as f32
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let energy: f64 = self.samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum();
        (energy / self.samples.len() as f64).sqrt() as f32
    }

    /// Checks the invariants every buffer handed to the transform stage must hold.
    pub fn ensure_transformable(&self) -> Result<(), DomainError> {
        if self.sample_rate_hz == 0 {
            return Err(DomainError::transform("sample rate must be greater than zero"));
        }
        if self.samples.is_empty() {
            return Err(DomainError::transform("sample buffer is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShiftParameters {
    pub semitones: f32,
    #[serde(default)]
    pub time_stretch: Option<f32>,
}

impl ShiftParameters {
    pub const DEFAULT_SEMITONES: f32 = 4.0;

    pub fn new(semitones: f32) -> Self {
        Self {
            semitones,
            time_stretch: None,
        }
    }

    pub fn with_time_stretch(mut self, rate: f32) -> Self {
        self.time_stretch = Some(rate);
        self
    }

    pub fn frequency_ratio(&self) -> f32 {
        2f32.powf(self.semitones / 12.0)
    }

    /// Stretch rate to apply after the shift, `None` when it would be a no-op.
    pub fn effective_time_stretch(&self) -> Option<f32> {
        self.time_stretch.filter(|rate| (rate - 1.0).abs() > f32::EPSILON)
    }

    pub fn is_identity(&self) -> bool {
        self.semitones == 0.0 && self.effective_time_stretch().is_none()
    }
}

impl Default for ShiftParameters {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEMITONES)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequesterId(String);

impl RequesterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name safe form of the identity.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: i64,
}

/// Where an inbound clip can be fetched from, as announced by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipSource {
    pub file_id: String,
    pub format: ContainerFormat,
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub request_id: Uuid,
    pub requester: RequesterId,
    pub chat_id: ChatId,
    pub source: ClipSource,
}

impl ConversionRequest {
    pub fn new(requester: RequesterId, chat_id: ChatId, source: ClipSource) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            requester,
            chat_id,
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    pub input: PathBuf,
    pub intermediate: PathBuf,
    pub output: PathBuf,
}

impl ScratchPaths {
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.input, &self.intermediate, &self.output].into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStage {
    Received,
    Downloading,
    Decoding,
    Shifting,
    Encoding,
    Delivering,
}

impl ConversionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionStage::Received => "received",
            ConversionStage::Downloading => "downloading",
            ConversionStage::Decoding => "decoding",
            ConversionStage::Shifting => "shifting",
            ConversionStage::Encoding => "encoding",
            ConversionStage::Delivering => "delivering",
        }
    }
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum ConversionState {
    Active(ConversionStage),
    Failed(ConversionStage),
    Cleaned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ConversionOutcome {
    Delivered,
    Failed {
        stage: ConversionStage,
        kind: ErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to remove {}: {}", self.path.display(), self.reason)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionReport {
    pub request_id: Uuid,
    pub requester: RequesterId,
    pub states: Vec<ConversionState>,
    pub outcome: ConversionOutcome,
    pub cleanup_warnings: Vec<CleanupWarning>,
}

impl ConversionReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Delivered)
    }

    pub fn final_state(&self) -> Option<ConversionState> {
        self.states.last().copied()
    }
}
