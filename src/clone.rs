//! Voice profile extraction and the placeholder synthesizer. A real model
//! backend would slot in behind [`synthesize`]; until then output is a shaped
//! harmonic stack so downstream plumbing can be exercised end to end.

use std::f32::consts::PI;

use crate::error::{AudioError, Result};
use crate::features;
use crate::types::{VoiceCharacteristics, VoiceSampleSet, Waveform, CANONICAL_SAMPLE_RATE};

const DEFAULT_F0_HZ: f32 = 150.0;
const PLACEHOLDER_SIMILARITY: f32 = 0.8;
const MIN_SYNTH_SECS: f32 = 3.0;
const SECS_PER_CHAR: f32 = 0.1;
const SYNTH_PEAK: f32 = 0.8;

/// Pools pitch, centroid, and MFCC features across every retained sample,
/// weighted by duration so long clear takes dominate short ones.
pub fn characterize(set: &VoiceSampleSet) -> Result<VoiceCharacteristics> {
    if set.is_empty() {
        return Err(AudioError::NoSamples);
    }

    let mut f0_sum = 0.0f32;
    let mut f0_weight = 0.0f32;
    let mut centroid_sum = 0.0f32;
    let mut centroid_weight = 0.0f32;
    let mut mfcc_sum = vec![0.0f32; features::MFCC_COUNT];
    let mut mfcc_weight = 0.0f32;

    for sample in &set.samples {
        let wave = &sample.waveform;
        let weight = sample.duration_secs.max(0.1);

        let f0 = features::fundamental_frequency(&wave.samples, wave.sample_rate);
        if f0 > 0.0 {
            f0_sum += f0 * weight;
            f0_weight += weight;
        }
        let centroid = features::spectral_centroid(&wave.samples, wave.sample_rate);
        if centroid > 0.0 {
            centroid_sum += centroid * weight;
            centroid_weight += weight;
        }
        let coeffs = features::mfcc(&wave.samples, wave.sample_rate);
        for (slot, value) in mfcc_sum.iter_mut().zip(&coeffs) {
            *slot += value * weight;
        }
        mfcc_weight += weight;
    }

    let fundamental_hz = if f0_weight > 0.0 {
        f0_sum / f0_weight
    } else {
        DEFAULT_F0_HZ
    };
    let spectral_centroid_hz = if centroid_weight > 0.0 {
        centroid_sum / centroid_weight
    } else {
        0.0
    };
    for value in mfcc_sum.iter_mut() {
        *value /= mfcc_weight;
    }

    Ok(VoiceCharacteristics {
        fundamental_hz,
        spectral_centroid_hz,
        mfcc: mfcc_sum,
        // No reference model to compare against, so this is a nominal figure
        // until a real cloning backend replaces the stub synthesizer.
        similarity_score: PLACEHOLDER_SIMILARITY,
    })
}

/// Stub synthesis: harmonics at the profile's fundamental with a brightness
/// tilt from the centroid, a decaying envelope, and slow amplitude
/// modulation, normalized to a fixed peak. Duration scales with text length
/// with a floor so short phrases still produce audible output.
pub fn synthesize(profile: &VoiceCharacteristics, text: &str) -> Waveform {
    let rate = CANONICAL_SAMPLE_RATE;
    let duration = (text.chars().count() as f32 * SECS_PER_CHAR).max(MIN_SYNTH_SECS);
    let total = (duration * rate as f32) as usize;

    let f0 = if profile.fundamental_hz > 0.0 {
        profile.fundamental_hz
    } else {
        DEFAULT_F0_HZ
    };
    // Brighter voices get more energy in the upper harmonics.
    let brightness = if profile.spectral_centroid_hz > 0.0 {
        (profile.spectral_centroid_hz / 2000.0).clamp(0.5, 2.0)
    } else {
        1.0
    };
    let harmonics = [
        (1.0f32, 1.0f32),
        (2.0, 0.3 * brightness),
        (3.0, 0.1 * brightness),
    ];

    let mut samples = Vec::with_capacity(total);
    for n in 0..total {
        let t = n as f32 / rate as f32;
        let mut value = 0.0f32;
        for &(mult, amp) in &harmonics {
            value += amp * (2.0 * PI * f0 * mult * t).sin();
        }
        let envelope = (-0.5 * t).exp();
        let modulation = 1.0 + 0.1 * (2.0 * PI * 5.0 * t).sin();
        samples.push(value * envelope * modulation);
    }

    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let scale = SYNTH_PEAK / peak;
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }

    Waveform {
        samples,
        sample_rate: rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features;
    use crate::types::VoiceSample;

    fn tone_sample(freq: f32, secs: f32, quality: f32) -> VoiceSample {
        let rate = CANONICAL_SAMPLE_RATE;
        let samples: Vec<f32> = (0..(secs * rate as f32) as usize)
            .map(|n| 0.6 * (2.0 * PI * freq * n as f32 / rate as f32).sin())
            .collect();
        VoiceSample {
            waveform: Waveform {
                samples,
                sample_rate: rate,
            },
            path: None,
            duration_secs: secs,
            quality,
            transcription: None,
        }
    }

    #[test]
    fn empty_set_is_rejected() {
        let set = VoiceSampleSet {
            samples: Vec::new(),
            total_candidates: 0,
        };
        assert!(matches!(characterize(&set), Err(AudioError::NoSamples)));
    }

    #[test]
    fn characterize_recovers_pitch_and_quality() {
        let set = VoiceSampleSet {
            samples: vec![tone_sample(220.0, 3.0, 0.8), tone_sample(220.0, 4.0, 0.6)],
            total_candidates: 2,
        };
        let profile = characterize(&set).unwrap();
        assert!((profile.fundamental_hz - 220.0).abs() < 10.0);
        assert_eq!(profile.similarity_score, PLACEHOLDER_SIMILARITY);
        assert_eq!(profile.mfcc.len(), features::MFCC_COUNT);
    }

    #[test]
    fn synthesis_duration_scales_with_text() {
        let profile = VoiceCharacteristics {
            fundamental_hz: 180.0,
            spectral_centroid_hz: 1200.0,
            mfcc: vec![0.0; features::MFCC_COUNT],
            similarity_score: 0.5,
        };
        let short = synthesize(&profile, "hi");
        assert!((short.duration_secs() - 3.0).abs() < 0.01);

        let text: String = std::iter::repeat('a').take(100).collect();
        let long = synthesize(&profile, &text);
        assert!((long.duration_secs() - 10.0).abs() < 0.01);
    }

    #[test]
    fn synthesis_is_normalized_and_pitched() {
        let profile = VoiceCharacteristics {
            fundamental_hz: 200.0,
            spectral_centroid_hz: 0.0,
            mfcc: vec![0.0; features::MFCC_COUNT],
            similarity_score: 0.5,
        };
        let wave = synthesize(&profile, "hello there");
        let peak = wave.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - SYNTH_PEAK).abs() < 1e-3);

        let f0 = features::fundamental_frequency(&wave.samples, wave.sample_rate);
        assert!((f0 - 200.0).abs() < 10.0, "got {f0} Hz");
    }

    #[test]
    fn degenerate_profile_falls_back_to_default_pitch() {
        let profile = VoiceCharacteristics {
            fundamental_hz: 0.0,
            spectral_centroid_hz: 0.0,
            mfcc: Vec::new(),
            similarity_score: 0.0,
        };
        let wave = synthesize(&profile, "x");
        let f0 = features::fundamental_frequency(&wave.samples, wave.sample_rate);
        assert!((f0 - DEFAULT_F0_HZ).abs() < 10.0);
    }
}
