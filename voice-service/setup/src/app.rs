use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use voice_application::{
    BotDispatcher, BotMessages, ChatCommandHandler, ConvertVoiceUseCase, ConvertVoiceUseCaseImpl,
    PipelineSettings,
};
use voice_configuration::{AppConfig, MessagesConfig};
use voice_domain::{AudioCodecPort, ChatTransportPort, PitchShiftPort, ScratchStorage};
use voice_infra::{
    FfmpegCodecAdapter, FfmpegCodecConfig, FsScratchStorage, PhaseVocoderConfig,
    PhaseVocoderShifter,
};
use voice_telegram::{run_polling, TelegramClient, TelegramClientConfig};

pub async fn build_and_run(config: AppConfig) -> Result<(), Error> {
    let app = Application::new(config)?;
    app.run(shutdown_signal()).await
}

pub struct Application {
    pub config: AppConfig,
    pub dispatcher: Arc<BotDispatcher>,
    client: Arc<TelegramClient>,
    scratch: Arc<FsScratchStorage>,
}

impl Application {
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        tracing::info!(
            semitones = config.pitch.semitones,
            time_stretch = ?config.pitch.time_stretch,
            output_format = %config.pipeline.output_format,
            scratch_dir = %config.scratch.directory.display(),
            "initializing voice conversion bot"
        );

        let token = config
            .telegram
            .token
            .clone()
            .context("telegram bot token is not configured")?;
        let client = Arc::new(
            TelegramClient::new(TelegramClientConfig {
                token,
                api_base_url: config.telegram.api_base_url.clone(),
                request_timeout: Duration::from_millis(config.telegram.request_timeout_ms),
            })
            .context("building telegram client")?,
        );

        let scratch = Arc::new(
            FsScratchStorage::new(&config.scratch.directory).context("preparing scratch space")?,
        );
        let stale = scratch.purge();
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), "stale scratch files could not be removed");
        }

        let codec: Arc<dyn AudioCodecPort> = Arc::new(FfmpegCodecAdapter::new(FfmpegCodecConfig {
            ffmpeg_path: config.codec.ffmpeg_path.clone(),
            opus_bitrate_kbps: config.codec.opus_bitrate_kbps,
        }));
        let shifter: Arc<dyn PitchShiftPort> = Arc::new(
            PhaseVocoderShifter::new(PhaseVocoderConfig {
                window_size: config.pitch.window_size,
                hop_size: config.pitch.hop_size,
            })
            .context("configuring pitch shifter")?,
        );

        let messages = Arc::new(bot_messages(&config.messages));
        let transport: Arc<dyn ChatTransportPort> = client.clone();
        let storage: Arc<dyn ScratchStorage> = scratch.clone();
        let convert_voice: Arc<dyn ConvertVoiceUseCase> = Arc::new(ConvertVoiceUseCaseImpl::new(
            transport.clone(),
            storage,
            codec,
            shifter,
            messages.clone(),
            PipelineSettings {
                shift: config.pitch.shift_parameters(),
                output_format: config.pipeline.output_format,
                transform_timeout: config.pipeline.transform_timeout(),
            },
        ));
        let dispatcher = Arc::new(BotDispatcher::new(
            transport,
            convert_voice,
            ChatCommandHandler::new(messages),
        ));

        Ok(Self {
            config,
            dispatcher,
            client,
            scratch,
        })
    }

    /// Polls until `shutdown` resolves, then clears whatever is left in scratch.
    pub async fn run<S>(self, shutdown: S) -> Result<(), Error>
    where
        S: std::future::Future<Output = ()>,
    {
        run_polling(
            self.client.clone(),
            self.dispatcher.clone(),
            self.config.telegram.poll_timeout_secs,
            shutdown,
        )
        .await;

        let leftovers = self.scratch.purge();
        for warning in &leftovers {
            tracing::warn!(
                path = %warning.path.display(),
                reason = %warning.reason,
                "scratch file left behind at shutdown"
            );
        }
        tracing::info!("voice conversion bot stopped");
        Ok(())
    }
}

/// Default texts with configured overrides applied.
pub fn bot_messages(overrides: &MessagesConfig) -> BotMessages {
    let defaults = BotMessages::default();
    BotMessages {
        welcome: overrides.welcome.clone().unwrap_or(defaults.welcome),
        help: overrides.help.clone().unwrap_or(defaults.help),
        processing: overrides.processing.clone().unwrap_or(defaults.processing),
        caption: overrides.caption.clone().unwrap_or(defaults.caption),
        failure: overrides.failure.clone().unwrap_or(defaults.failure),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(error = %err, "cannot listen for shutdown signal"),
    }
}
