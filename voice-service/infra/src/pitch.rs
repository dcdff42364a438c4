use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use voice_domain::{DomainError, PitchShiftPort, SampleBuffer, ShiftParameters};

use crate::audio::{fix_length, normalize_peak, resample_to_len};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseVocoderConfig {
    pub window_size: usize,
    pub hop_size: usize,
}

impl Default for PhaseVocoderConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 512,
        }
    }
}

impl PhaseVocoderConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.window_size < 16 || self.window_size % 2 != 0 {
            return Err(DomainError::validation(
                "phase vocoder window size must be even and at least 16",
            ));
        }
        if self.hop_size == 0 || self.hop_size > self.window_size / 2 {
            return Err(DomainError::validation(
                "phase vocoder hop size must be within (0, window_size / 2]",
            ));
        }
        Ok(())
    }
}

/// Pitch shifting by phase-vocoder time stretch followed by resampling back to
/// the original length, so duration is preserved while every partial moves by
/// the same frequency ratio.
pub struct PhaseVocoderShifter {
    config: PhaseVocoderConfig,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

type Frame = Vec<Complex<f32>>;

impl PhaseVocoderShifter {
    pub fn new(config: PhaseVocoderConfig) -> Result<Self, DomainError> {
        config.validate()?;
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(config.window_size);
        let inverse = planner.plan_fft_inverse(config.window_size);
        Ok(Self {
            config,
            window: hann_window(config.window_size),
            forward,
            inverse,
        })
    }

    pub fn config(&self) -> PhaseVocoderConfig {
        self.config
    }

    /// Changes duration by `1 / rate` without touching pitch.
    pub fn time_stretch(&self, samples: &[f32], rate: f32) -> Result<Vec<f32>, DomainError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(DomainError::transform("time stretch rate must be positive"));
        }
        if samples.len() < self.config.window_size {
            return Err(DomainError::InsufficientSamples {
                required: self.config.window_size,
                actual: samples.len(),
            });
        }

        let frames = self.stft(samples);
        let stretched = self.phase_vocoder(&frames, f64::from(rate));
        let output_len = (samples.len() as f64 / f64::from(rate)).round() as usize;
        Ok(self.istft(&stretched, output_len))
    }

    fn stft(&self, samples: &[f32]) -> Vec<Frame> {
        let n_fft = self.config.window_size;
        let hop = self.config.hop_size;
        let pad = n_fft / 2;

        let mut padded = vec![0.0f32; samples.len() + n_fft];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = 1 + (padded.len() - n_fft) / hop;
        let mut frames = Vec::with_capacity(n_frames);
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

        for frame_idx in 0..n_frames {
            let start = frame_idx * hop;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            self.forward.process(&mut buffer);
            frames.push(buffer[..=n_fft / 2].to_vec());
        }

        frames
    }

    fn phase_vocoder(&self, frames: &[Frame], rate: f64) -> Vec<Frame> {
        let n_fft = self.config.window_size;
        let n_bins = n_fft / 2 + 1;
        let zero_frame = vec![Complex::new(0.0f32, 0.0); n_bins];

        let phi_advance: Vec<f64> = (0..n_bins)
            .map(|k| 2.0 * PI * self.config.hop_size as f64 * k as f64 / n_fft as f64)
            .collect();
        let mut phase_acc: Vec<f64> = frames[0].iter().map(|c| f64::from(c.arg())).collect();

        let n_steps = (frames.len() as f64 / rate).ceil() as usize;
        let mut output = Vec::with_capacity(n_steps);

        for step_idx in 0..n_steps {
            let step = step_idx as f64 * rate;
            let base = step.floor() as usize;
            if base >= frames.len() {
                break;
            }
            let alpha = step - base as f64;
            let left = &frames[base];
            let right = frames.get(base + 1).unwrap_or(&zero_frame);

            let mut frame = Vec::with_capacity(n_bins);
            for k in 0..n_bins {
                let magnitude =
                    (1.0 - alpha) * f64::from(left[k].norm()) + alpha * f64::from(right[k].norm());
                frame.push(Complex::from_polar(magnitude as f32, phase_acc[k] as f32));

                let mut delta = f64::from(right[k].arg()) - f64::from(left[k].arg()) - phi_advance[k];
                delta -= 2.0 * PI * (delta / (2.0 * PI)).round();
                phase_acc[k] += phi_advance[k] + delta;
            }
            output.push(frame);
        }

        output
    }

    fn istft(&self, frames: &[Frame], length: usize) -> Vec<f32> {
        let n_fft = self.config.window_size;
        let hop = self.config.hop_size;
        let pad = n_fft / 2;

        let total = n_fft + hop * frames.len().saturating_sub(1);
        let mut output = vec![0.0f32; total];
        let mut window_sum = vec![0.0f32; total];
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        let scale = 1.0 / n_fft as f32;

        for (frame_idx, frame) in frames.iter().enumerate() {
            buffer[..=n_fft / 2].copy_from_slice(frame);
            for k in 1..n_fft / 2 {
                buffer[n_fft - k] = frame[k].conj();
            }
            self.inverse.process(&mut buffer);

            let start = frame_idx * hop;
            for i in 0..n_fft {
                let w = self.window[i];
                output[start + i] += buffer[i].re * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (sample, norm) in output.iter_mut().zip(&window_sum) {
            if *norm > 1e-8 {
                *sample /= norm;
            }
        }

        let trimmed = output.into_iter().skip(pad).collect();
        fix_length(trimmed, length)
    }
}

impl PitchShiftPort for PhaseVocoderShifter {
    fn shift(
        &self,
        buffer: &SampleBuffer,
        params: &ShiftParameters,
    ) -> Result<SampleBuffer, DomainError> {
        buffer.ensure_transformable()?;
        if !params.semitones.is_finite() {
            return Err(DomainError::transform("semitone offset must be finite"));
        }
        if params.is_identity() {
            return Ok(buffer.clone());
        }
        if buffer.len() < self.config.window_size {
            return Err(DomainError::InsufficientSamples {
                required: self.config.window_size,
                actual: buffer.len(),
            });
        }

        let mut samples = if params.semitones == 0.0 {
            buffer.samples.clone()
        } else {
            let rate = 1.0 / params.frequency_ratio();
            let stretched = self.time_stretch(&buffer.samples, rate)?;
            resample_to_len(&stretched, buffer.len())
        };

        if let Some(rate) = params.effective_time_stretch() {
            samples = self.time_stretch(&samples, rate)?;
        }

        if samples.iter().any(|s| !s.is_finite()) {
            return Err(DomainError::transform("pitch shift produced non-finite samples"));
        }
        let normalized = normalize_peak(&mut samples);

        tracing::debug!(
            semitones = params.semitones,
            time_stretch = ?params.effective_time_stretch(),
            sample_rate_hz = buffer.sample_rate_hz,
            input_samples = buffer.len(),
            output_samples = samples.len(),
            normalized,
            "pitch shift completed"
        );

        Ok(SampleBuffer::new(samples, buffer.sample_rate_hz))
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos()) as f32)
        .collect()
}
