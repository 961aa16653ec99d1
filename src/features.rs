//! Coarse spectral features used to characterize a voice: fundamental
//! frequency, spectral centroid, and MFCCs. These feed the stub synthesizer,
//! not a trained model, so the emphasis is on stability over precision.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::f32::consts::PI;

const F0_MIN_HZ: f32 = 50.0;
const F0_MAX_HZ: f32 = 500.0;
const FRAME_SIZE: usize = 1024;
const FRAME_HOP: usize = 512;
pub const MFCC_COUNT: usize = 13;
const MEL_FILTERS: usize = 26;

/// Pitch estimate via normalized autocorrelation, evaluated over several
/// windows through the signal with the median taken for robustness against
/// local octave errors. Returns 0.0 for unvoiced/degenerate input.
pub fn fundamental_frequency(samples: &[f32], sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    let min_lag = (sample_rate as f32 / F0_MAX_HZ) as usize;
    let max_lag = (sample_rate as f32 / F0_MIN_HZ) as usize;
    let window = (max_lag * 2).max(2048);
    if samples.len() < window || min_lag == 0 {
        return 0.0;
    }

    let window_count = ((samples.len() - window) / window + 1).min(16).max(1);
    let step = if window_count > 1 {
        (samples.len() - window) / (window_count - 1)
    } else {
        0
    };

    let mut estimates = Vec::with_capacity(window_count);
    for w in 0..window_count {
        let frame = &samples[w * step..w * step + window];
        if let Some(lag) = best_autocorrelation_lag(frame, min_lag, max_lag) {
            estimates.push(sample_rate as f32 / lag as f32);
        }
    }
    if estimates.is_empty() {
        return 0.0;
    }
    estimates.sort_by(f32::total_cmp);
    estimates[estimates.len() / 2]
}

fn best_autocorrelation_lag(frame: &[f32], min_lag: usize, max_lag: usize) -> Option<usize> {
    let energy: f32 = frame.iter().map(|s| s * s).sum();
    if energy < 1e-6 {
        return None;
    }
    let mut best_lag = None;
    let mut best_score = 0.0f32;
    for lag in min_lag..=max_lag.min(frame.len() - 1) {
        let mut acc = 0.0f32;
        for i in 0..frame.len() - lag {
            acc += frame[i] * frame[i + lag];
        }
        let score = acc / energy;
        if score > best_score {
            best_score = score;
            best_lag = Some(lag);
        }
    }
    // Below this the frame correlates with nothing periodic.
    if best_score < 0.3 {
        return None;
    }
    best_lag
}

fn frame_spectra(samples: &[f32], _sample_rate: u32) -> Vec<Vec<f32>> {
    if samples.len() < FRAME_SIZE {
        return Vec::new();
    }
    let window: Vec<f32> = (0..FRAME_SIZE)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / FRAME_SIZE as f32).cos())
        .collect();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_SIZE);

    let frame_count = (samples.len() - FRAME_SIZE) / FRAME_HOP + 1;
    let mut spectra = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        let offset = i * FRAME_HOP;
        let mut buf: Vec<Complex<f32>> = samples[offset..offset + FRAME_SIZE]
            .iter()
            .zip(&window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buf);
        spectra.push(
            buf.iter()
                .take(FRAME_SIZE / 2 + 1)
                .map(|c| c.norm())
                .collect(),
        );
    }
    spectra
}

/// Frequency-domain center of mass, averaged over frames with signal.
/// Correlates with perceived brightness.
pub fn spectral_centroid(samples: &[f32], sample_rate: u32) -> f32 {
    let spectra = frame_spectra(samples, sample_rate);
    if spectra.is_empty() {
        return 0.0;
    }
    let bin_hz = sample_rate as f32 / FRAME_SIZE as f32;
    let mut total = 0.0f32;
    let mut counted = 0usize;
    for magnitudes in &spectra {
        let energy: f32 = magnitudes.iter().sum();
        if energy < 1e-6 {
            continue;
        }
        let weighted: f32 = magnitudes
            .iter()
            .enumerate()
            .map(|(bin, &mag)| bin as f32 * bin_hz * mag)
            .sum();
        total += weighted / energy;
        counted += 1;
    }
    if counted == 0 {
        0.0
    } else {
        total / counted as f32
    }
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank over the magnitude-spectrum bins.
fn mel_filterbank(sample_rate: u32) -> Vec<Vec<(usize, f32)>> {
    let bins = FRAME_SIZE / 2 + 1;
    let bin_hz = sample_rate as f32 / FRAME_SIZE as f32;
    let mel_max = hz_to_mel(sample_rate as f32 / 2.0);
    let centers: Vec<f32> = (0..MEL_FILTERS + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (MEL_FILTERS + 1) as f32))
        .collect();

    let mut filters = Vec::with_capacity(MEL_FILTERS);
    for f in 0..MEL_FILTERS {
        let (lo, mid, hi) = (centers[f], centers[f + 1], centers[f + 2]);
        let mut taps = Vec::new();
        for bin in 0..bins {
            let freq = bin as f32 * bin_hz;
            let weight = if freq > lo && freq <= mid {
                (freq - lo) / (mid - lo).max(1e-6)
            } else if freq > mid && freq < hi {
                (hi - freq) / (hi - mid).max(1e-6)
            } else {
                0.0
            };
            if weight > 0.0 {
                taps.push((bin, weight));
            }
        }
        filters.push(taps);
    }
    filters
}

/// Mean MFCC vector (13 coefficients) over the signal: mel filterbank on the
/// power spectrum, log energies, then a DCT-II.
pub fn mfcc(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let spectra = frame_spectra(samples, sample_rate);
    if spectra.is_empty() {
        return vec![0.0; MFCC_COUNT];
    }
    let filters = mel_filterbank(sample_rate);

    let mut mean = vec![0.0f32; MFCC_COUNT];
    for magnitudes in &spectra {
        let log_energies: Vec<f32> = filters
            .iter()
            .map(|taps| {
                let energy: f32 = taps
                    .iter()
                    .map(|&(bin, weight)| magnitudes[bin] * magnitudes[bin] * weight)
                    .sum();
                (energy + 1e-10).ln()
            })
            .collect();
        for (k, slot) in mean.iter_mut().enumerate() {
            let coeff: f32 = log_energies
                .iter()
                .enumerate()
                .map(|(n, &e)| {
                    e * (PI * k as f32 * (n as f32 + 0.5) / MEL_FILTERS as f32).cos()
                })
                .sum();
            *slot += coeff;
        }
    }
    for value in mean.iter_mut() {
        *value /= spectra.len() as f32;
    }
    mean
}
