use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use voice_domain::{
    AudioClip, AudioCodecPort, ContainerFormat, DomainError, SampleBuffer, ScratchPaths,
    ScratchStorage,
};

use crate::audio::{f32_to_i16, mix_to_mono};

#[derive(Debug, Clone)]
pub struct FfmpegCodecConfig {
    pub ffmpeg_path: PathBuf,
    pub opus_bitrate_kbps: u32,
}

impl Default for FfmpegCodecConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            opus_bitrate_kbps: 32,
        }
    }
}

/// WAV is handled in memory; Ogg/Opus goes through an intermediate WAV on scratch
/// storage and an `ffmpeg` transcode.
pub struct FfmpegCodecAdapter {
    config: FfmpegCodecConfig,
}

impl FfmpegCodecAdapter {
    pub fn new(config: FfmpegCodecConfig) -> Self {
        Self { config }
    }

    fn run_ffmpeg(&self, input: &Path, output: &Path, codec_args: &[&str]) -> Result<(), String> {
        let result = Command::new(&self.config.ffmpeg_path)
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(input)
            .args(codec_args)
            .arg(output)
            .output()
            .map_err(|err| {
                format!(
                    "failed to run {}: {err}",
                    self.config.ffmpeg_path.display()
                )
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!("ffmpeg exited with {}: {}", result.status, stderr.trim()));
        }
        Ok(())
    }
}

impl AudioCodecPort for FfmpegCodecAdapter {
    fn decode(
        &self,
        clip: &AudioClip,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<SampleBuffer, DomainError> {
        if clip.is_empty() {
            return Err(DomainError::decode("input clip is empty"));
        }

        let buffer = match clip.format() {
            ContainerFormat::Wav => wav_bytes_to_buffer(clip.bytes())?,
            ContainerFormat::OggOpus => {
                scratch.write(&paths.input, clip.bytes())?;
                self.run_ffmpeg(
                    &paths.input,
                    &paths.intermediate,
                    &["-vn", "-ac", "1", "-acodec", "pcm_s16le", "-f", "wav"],
                )
                .map_err(DomainError::decode)?;
                let wav = scratch.read(&paths.intermediate)?;
                wav_bytes_to_buffer(&wav)?
            }
        };

        tracing::debug!(
            format = %clip.format(),
            input_bytes = clip.len(),
            samples = buffer.len(),
            sample_rate_hz = buffer.sample_rate_hz,
            "clip decoded"
        );
        Ok(buffer)
    }

    fn encode(
        &self,
        buffer: &SampleBuffer,
        target: ContainerFormat,
        scratch: &dyn ScratchStorage,
        paths: &ScratchPaths,
    ) -> Result<AudioClip, DomainError> {
        let wav = buffer_to_wav_bytes(buffer)?;
        let bytes = match target {
            ContainerFormat::Wav => wav,
            ContainerFormat::OggOpus => {
                scratch.write(&paths.intermediate, &wav)?;
                let bitrate = format!("{}k", self.config.opus_bitrate_kbps);
                self.run_ffmpeg(
                    &paths.intermediate,
                    &paths.output,
                    &["-ac", "1", "-c:a", "libopus", "-b:a", bitrate.as_str(), "-f", "ogg"],
                )
                .map_err(DomainError::encode)?;
                scratch.read(&paths.output)?
            }
        };

        if bytes.is_empty() {
            return Err(DomainError::encode("encoder produced no output"));
        }

        tracing::debug!(
            format = %target,
            samples = buffer.len(),
            output_bytes = bytes.len(),
            "clip encoded"
        );
        Ok(AudioClip::new(bytes, target))
    }
}

pub fn wav_bytes_to_buffer(bytes: &[u8]) -> Result<SampleBuffer, DomainError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|err| DomainError::decode(format!("invalid wav container: {err}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(DomainError::decode("wav header declares no audio"));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DomainError::decode(format!("wav sample read failed: {err}")))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| DomainError::decode(format!("wav sample read failed: {err}")))?
        }
    };

    let samples = mix_to_mono(&interleaved, spec.channels as usize);
    if samples.is_empty() {
        return Err(DomainError::decode("wav container holds no samples"));
    }
    Ok(SampleBuffer::new(samples, spec.sample_rate))
}

pub fn buffer_to_wav_bytes(buffer: &SampleBuffer) -> Result<Vec<u8>, DomainError> {
    if buffer.is_empty() {
        return Err(DomainError::encode("sample buffer is empty"));
    }
    if buffer.sample_rate_hz == 0 {
        return Err(DomainError::encode("sample rate must be greater than zero"));
    }
    if let Some(index) = buffer.samples.iter().position(|s| !s.is_finite()) {
        return Err(DomainError::encode(format!(
            "non-finite sample at index {index}"
        )));
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate_hz,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + buffer.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|err| DomainError::encode(format!("wav writer init failed: {err}")))?;
        for sample in &buffer.samples {
            writer
                .write_sample(f32_to_i16(*sample))
                .map_err(|err| DomainError::encode(format!("wav write failed: {err}")))?;
        }
        writer
            .finalize()
            .map_err(|err| DomainError::encode(format!("wav finalize failed: {err}")))?;
    }
    Ok(cursor.into_inner())
}
