//! Sample-level helpers shared by the codec and the pitch engine.

/// Scales the buffer down when its peak leaves `[-1.0, 1.0]`. Returns whether it did.
pub fn normalize_peak(samples: &mut [f32]) -> bool {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if peak <= 1.0 || !peak.is_finite() {
        return false;
    }
    let scale = 1.0 / peak;
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
    true
}

/// Linear interpolation onto exactly `output_len` points spanning the input.
pub fn resample_to_len(samples: &[f32], output_len: usize) -> Vec<f32> {
    if output_len == 0 || samples.is_empty() {
        return Vec::new();
    }
    if samples.len() == output_len {
        return samples.to_vec();
    }
    if samples.len() == 1 {
        return vec![samples[0]; output_len];
    }

    let step = samples.len() as f64 / output_len as f64;
    let max_source_idx = samples.len() - 1;
    let mut output = Vec::with_capacity(output_len);

    for out_idx in 0..output_len {
        let source_pos = out_idx as f64 * step;
        let left_idx = (source_pos.floor() as usize).min(max_source_idx);
        let right_idx = (left_idx + 1).min(max_source_idx);
        let frac = (source_pos - left_idx as f64) as f32;

        let left = samples[left_idx];
        let right = samples[right_idx];
        output.push(left * (1.0 - frac) + right * frac);
    }

    output
}

/// Truncates or zero-pads to `len`.
pub fn fix_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}

pub fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}
