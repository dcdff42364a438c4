use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use validator::Validate;
use voice_domain::{ContainerFormat, ShiftParameters};

pub type AppConfig = VoiceConfig;

const ENV_PREFIX: &str = "VOICE_SERVICE";
const TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
const RUN_ENV_VAR: &str = "RUN_ENV";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("configuration could not be loaded: {0}")]
    Load(#[from] config::ConfigError),

    #[error("bot token is missing, set TELEGRAM_BOT_TOKEN or telegram.token")]
    MissingToken,

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("logging setup failed: {0}")]
    Logging(String),
}

impl From<validator::ValidationErrors> for ConfigurationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ConfigurationError::Invalid(errors.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct VoiceConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scratch: ScratchConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    #[validate(nested)]
    pub pitch: PitchConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Long-poll wait handed to `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: default_api_base_url(),
            poll_timeout_secs: default_poll_timeout_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScratchConfig {
    #[serde(default = "default_scratch_directory")]
    pub directory: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            directory: default_scratch_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_opus_bitrate_kbps")]
    pub opus_bitrate_kbps: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            opus_bitrate_kbps: default_opus_bitrate_kbps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PitchConfig {
    #[serde(default = "default_semitones")]
    #[validate(range(min = -24.0, max = 24.0))]
    pub semitones: f32,
    #[serde(default)]
    #[validate(range(min = 0.25, max = 4.0))]
    pub time_stretch: Option<f32>,
    #[serde(default = "default_window_size")]
    #[validate(range(min = 16, max = 65536))]
    pub window_size: usize,
    #[serde(default = "default_hop_size")]
    #[validate(range(min = 1))]
    pub hop_size: usize,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            semitones: default_semitones(),
            time_stretch: None,
            window_size: default_window_size(),
            hop_size: default_hop_size(),
        }
    }
}

impl PitchConfig {
    pub fn shift_parameters(&self) -> ShiftParameters {
        let params = ShiftParameters::new(self.semitones);
        match self.time_stretch {
            Some(factor) => params.with_time_stretch(factor),
            None => params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_output_format")]
    pub output_format: ContainerFormat,
    /// Budget for decode, shift and encode together; 0 disables it.
    #[serde(default)]
    pub transform_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_format: default_output_format(),
            transform_timeout_ms: 0,
        }
    }
}

impl PipelineConfig {
    pub fn transform_timeout(&self) -> Option<Duration> {
        (self.transform_timeout_ms > 0).then(|| Duration::from_millis(self.transform_timeout_ms))
    }
}

/// Optional overrides for the user-facing texts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default)]
    pub welcome: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub processing: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub failure: Option<String>,
}

impl VoiceConfig {
    /// Checks ranges and requires a bot token.
    pub fn validate_all(&self) -> Result<(), ConfigurationError> {
        self.validate()?;

        match self.telegram.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => {}
            _ => return Err(ConfigurationError::MissingToken),
        }
        if self.pitch.hop_size * 2 > self.pitch.window_size {
            return Err(ConfigurationError::Invalid(
                "pitch.hop_size cannot exceed half of pitch.window_size".to_string(),
            ));
        }
        if self.codec.opus_bitrate_kbps == 0 {
            return Err(ConfigurationError::Invalid(
                "codec.opus_bitrate_kbps must be positive".to_string(),
            ));
        }
        if self.telegram.poll_timeout_secs == 0 || self.telegram.request_timeout_ms == 0 {
            return Err(ConfigurationError::Invalid(
                "telegram timeouts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `config/default`, `config/<RUN_ENV>`, `VOICE_SERVICE__*` variables and
/// `TELEGRAM_BOT_TOKEN`, later sources winning.
pub fn load_config() -> Result<VoiceConfig, ConfigurationError> {
    let run_env = std::env::var(RUN_ENV_VAR).unwrap_or_else(|_| "development".to_string());
    let config = load_config_from(
        Path::new("config"),
        &run_env,
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
        std::env::var(TOKEN_VAR).ok(),
    )?;
    tracing::debug!(run_env = %run_env, "configuration loaded");
    Ok(config)
}

fn load_config_from(
    config_dir: &Path,
    run_env: &str,
    environment: Environment,
    token: Option<String>,
) -> Result<VoiceConfig, ConfigurationError> {
    let settings = Config::builder()
        .add_source(Config::try_from(&VoiceConfig::default())?)
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(environment)
        .set_override_option("telegram.token", token.filter(|t| !t.trim().is_empty()))?
        .build()?;
    Ok(settings.try_deserialize()?)
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn setup_logging(config: &LoggingConfig) -> Result<(), ConfigurationError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|err| ConfigurationError::Logging(err.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
    installed.map_err(|err| ConfigurationError::Logging(err.to_string()))
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scratch_directory() -> PathBuf {
    PathBuf::from("temp_audio")
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_opus_bitrate_kbps() -> u32 {
    32
}

fn default_semitones() -> f32 {
    ShiftParameters::DEFAULT_SEMITONES
}

fn default_window_size() -> usize {
    2048
}

fn default_hop_size() -> usize {
    512
}

fn default_output_format() -> ContainerFormat {
    ContainerFormat::OggOpus
}
