//! Signal-processing primitives shared by the pipeline stages: level math,
//! rate conversion, and the preprocessing chain (normalize, trim, denoise).

use crate::error::AudioError;
use crate::types::Waveform;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

/// Silence trim threshold, in dB below the waveform's peak.
pub const TRIM_THRESHOLD_DB: f32 = 20.0;
/// Leading window used to estimate the noise floor.
pub const NOISE_WINDOW_SECS: f32 = 0.5;
/// Spectral-subtraction over-subtraction factor.
const OVER_SUBTRACTION: f32 = 2.0;
/// Floor as a fraction of the original magnitude. Keeping a sliver of the
/// original spectrum avoids the musical-noise artifacts a hard zero causes.
const SPECTRAL_FLOOR: f32 = 0.1;

const STFT_SIZE: usize = 1024;
const STFT_HOP: usize = 256;

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / samples.len() as f64).sqrt() as f32
}

pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

pub fn lin_to_db(value: f32) -> f32 {
    20.0 * value.max(1e-6).log10()
}

/// Convert between sample rates. Decimation runs a short FIR low-pass first
/// so high-frequency content does not alias into the band of interest;
/// interpolation is linear, which is fine for speech-length material.
pub fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return input.to_vec();
    }

    let ratio = to_rate as f32 / from_rate as f32;
    let filtered = if from_rate > to_rate {
        let cutoff = (to_rate as f32 * 0.5 / from_rate as f32).min(0.499);
        let taps = decimation_taps(from_rate, to_rate);
        fir_filter(input, &windowed_sinc_taps(cutoff, taps))
    } else {
        input.to_vec()
    };

    linear_interpolate(&filtered, ratio)
}

/// Tap count scaled to the decimation ratio; short for near-equal rates,
/// longer when collapsing 44.1/48 kHz captures down to the canonical rate.
fn decimation_taps(from_rate: u32, to_rate: u32) -> usize {
    let ratio = from_rate as f32 / to_rate as f32;
    let mut taps = (ratio * 4.0).ceil().max(11.0) as usize;
    if taps % 2 == 0 {
        taps += 1;
    }
    taps
}

/// Hamming-windowed sinc low-pass, normalized to unity gain at DC.
fn windowed_sinc_taps(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let center = (taps - 1) as f32 / 2.0;
    let mut coeffs: Vec<f32> = (0..taps)
        .map(|n| {
            let phase = 2.0 * PI * normalized_cutoff * (n as f32 - center);
            let sinc = if phase.abs() < 1e-6 {
                2.0 * normalized_cutoff
            } else {
                2.0 * normalized_cutoff * phase.sin() / phase
            };
            let hamming = if taps > 1 {
                0.54 - 0.46 * (PI * n as f32 / center).cos()
            } else {
                1.0
            };
            sinc * hamming
        })
        .collect();

    let dc_gain: f32 = coeffs.iter().sum();
    if dc_gain.abs() > f32::EPSILON {
        coeffs.iter_mut().for_each(|c| *c /= dc_gain);
    }
    coeffs
}

fn fir_filter(input: &[f32], coeffs: &[f32]) -> Vec<f32> {
    if input.is_empty() || coeffs.len() <= 1 {
        return input.to_vec();
    }
    let half = coeffs.len() / 2;
    let mut output = Vec::with_capacity(input.len());
    for n in 0..input.len() {
        let mut acc = 0.0;
        for (k, coeff) in coeffs.iter().enumerate() {
            if let Some(idx) = (n + k).checked_sub(half) {
                if let Some(sample) = input.get(idx) {
                    acc += *sample * coeff;
                }
            }
        }
        output.push(acc);
    }
    output
}

fn linear_interpolate(input: &[f32], ratio: f32) -> Vec<f32> {
    let output_len = (input.len() as f32 * ratio).round() as usize;
    (0..output_len)
        .map(|i| {
            let position = i as f32 / ratio;
            let idx = position as usize;
            match (input.get(idx), input.get(idx + 1)) {
                (Some(&a), Some(&b)) => a + (b - a) * (position - idx as f32),
                (Some(&a), None) => a,
                _ => input.last().copied().unwrap_or(0.0),
            }
        })
        .collect()
}

/// Frequency of the strongest spectral bin, DC excluded. Analyzes up to the
/// middle 16k samples so long recordings stay cheap.
pub fn dominant_frequency(samples: &[f32], sample_rate: u32) -> f32 {
    const NFFT: usize = 16_384;
    if samples.is_empty() || sample_rate == 0 {
        return 0.0;
    }
    let take = samples.len().min(NFFT);
    let start = (samples.len() - take) / 2;
    let mut buf: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); NFFT];
    for (n, &sample) in samples[start..start + take].iter().enumerate() {
        let window = 0.5 - 0.5 * ((2.0 * PI * n as f32) / (take.max(2) - 1) as f32).cos();
        buf[n] = Complex::new(sample * window, 0.0);
    }
    let mut planner = FftPlanner::<f32>::new();
    planner.plan_fft_forward(NFFT).process(&mut buf);

    let mut best_bin = 0usize;
    let mut best_mag = 0.0f32;
    for (bin, value) in buf.iter().enumerate().take(NFFT / 2).skip(1) {
        let mag = value.norm();
        if mag > best_mag {
            best_mag = mag;
            best_bin = bin;
        }
    }
    best_bin as f32 * sample_rate as f32 / NFFT as f32
}

/// Scale so the peak hits full scale. Silence is left untouched.
pub fn normalize(samples: &[f32]) -> Vec<f32> {
    let peak = peak(samples);
    if peak <= f32::EPSILON {
        return samples.to_vec();
    }
    samples.iter().map(|s| s / peak).collect()
}

/// Drop leading/trailing frames whose RMS sits more than `threshold_db`
/// below the loudest frame. Returns the kept sample range.
fn trim_bounds(samples: &[f32], threshold_db: f32) -> Option<(usize, usize)> {
    if samples.is_empty() {
        return None;
    }
    let frame = STFT_SIZE.min(samples.len());
    let hop = STFT_HOP.min(frame);
    let mut frame_db = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + frame).min(samples.len());
        frame_db.push(lin_to_db(rms(&samples[start..end])));
        if end == samples.len() {
            break;
        }
        start += hop;
    }
    let loudest = frame_db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let keep = |db: &f32| *db > loudest - threshold_db;

    let first = frame_db.iter().position(keep)?;
    let last = frame_db.iter().rposition(keep)?;
    let begin = first * hop;
    let end = (last * hop + frame).min(samples.len());
    // A waveform that is effectively all silence trims to nothing.
    if lin_to_db(peak(samples)) < -60.0 {
        return None;
    }
    Some((begin, end))
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / n as f32).cos())
        .collect()
}

/// Spectral subtraction: estimate the noise floor from the leading window,
/// over-subtract it from every frame, and floor the result at a fraction of
/// the original magnitude.
fn denoise(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    if samples.len() < STFT_SIZE {
        return samples.to_vec();
    }

    // The leading window is only a usable noise estimate when it is clearly
    // quieter than the rest of the signal. When it sits within ~6 dB of the
    // overall level it is speech, and subtracting it would gut every bin.
    let lead_len = ((NOISE_WINDOW_SECS * sample_rate as f32) as usize)
        .clamp(STFT_SIZE, samples.len());
    if rms(&samples[..lead_len]) > 0.5 * rms(samples) {
        return samples.to_vec();
    }

    let window = hann_window(STFT_SIZE);
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(STFT_SIZE);
    let inverse = planner.plan_fft_inverse(STFT_SIZE);

    let frame_count = (samples.len() - STFT_SIZE) / STFT_HOP + 1;
    let mut spectra: Vec<Vec<Complex<f32>>> = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        let offset = i * STFT_HOP;
        let mut buf: Vec<Complex<f32>> = samples[offset..offset + STFT_SIZE]
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        forward.process(&mut buf);
        spectra.push(buf);
    }

    let noise_frames = ((NOISE_WINDOW_SECS * sample_rate as f32 / STFT_HOP as f32).ceil()
        as usize)
        .clamp(1, spectra.len());
    let mut noise_mag = vec![0.0f32; STFT_SIZE];
    for spectrum in spectra.iter().take(noise_frames) {
        for (bin, value) in spectrum.iter().enumerate() {
            noise_mag[bin] += value.norm();
        }
    }
    for value in noise_mag.iter_mut() {
        *value /= noise_frames as f32;
    }

    let mut output = vec![0.0f32; samples.len()];
    let mut weight = vec![0.0f32; samples.len()];
    for (i, spectrum) in spectra.iter_mut().enumerate() {
        for (bin, value) in spectrum.iter_mut().enumerate() {
            let mag = value.norm();
            let clean = (mag - OVER_SUBTRACTION * noise_mag[bin]).max(SPECTRAL_FLOOR * mag);
            if mag > f32::EPSILON {
                *value *= clean / mag;
            }
        }
        inverse.process(spectrum);
        let offset = i * STFT_HOP;
        for (n, value) in spectrum.iter().enumerate() {
            let sample = value.re / STFT_SIZE as f32;
            output[offset + n] += sample * window[n];
            weight[offset + n] += window[n] * window[n];
        }
    }
    // Positions the window never covered (the tail past the last full frame,
    // and the zero-weighted window edges) keep the input sample unchanged.
    for (n, sample) in output.iter_mut().enumerate() {
        if weight[n] > 1e-6 {
            *sample /= weight[n];
        } else {
            *sample = samples[n];
        }
    }
    output
}

/// Clean a waveform for segmentation: peak-normalize, trim surrounding
/// silence, then subtract the estimated noise floor. Pure; returns a new
/// waveform. Fails with `EmptyAfterTrim` when nothing audible remains.
pub fn preprocess(wave: &Waveform) -> Result<Waveform, AudioError> {
    let normalized = normalize(&wave.samples);
    let (begin, end) =
        trim_bounds(&normalized, TRIM_THRESHOLD_DB).ok_or(AudioError::EmptyAfterTrim)?;
    if begin >= end {
        return Err(AudioError::EmptyAfterTrim);
    }
    let trimmed = &normalized[begin..end];
    let cleaned = denoise(trimmed, wave.sample_rate);
    Ok(Waveform::new(cleaned, wave.sample_rate))
}
