//! End-to-end pipeline test on synthetic audio: preprocess a noisy
//! multi-burst recording, segment it into ranked samples, persist and reload
//! them, characterize the voice, and synthesize from the profile.

use std::f32::consts::PI;
use std::path::PathBuf;

use voiceforge::segment::{self, SegmentConfig};
use voiceforge::types::{Waveform, CANONICAL_SAMPLE_RATE};
use voiceforge::{clone, dsp, features, wav};

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "voiceforge_{tag}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 1 s lead-in, three 4 s voiced bursts at 220 Hz separated by 2 s of
/// near-silence, with a low noise floor throughout.
fn burst_recording() -> Waveform {
    let rate = CANONICAL_SAMPLE_RATE;
    let mut noise_state = 0x2545_f491u32;
    let mut noise = move || {
        noise_state = noise_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (noise_state >> 16) as f32 / 65_535.0 * 0.004 - 0.002
    };

    let mut samples: Vec<f32> = (0..rate as usize).map(|_| noise()).collect();
    for burst in 0..3 {
        for n in 0..(4 * rate) as usize {
            let t = n as f32 / rate as f32;
            let tone = 0.5 * (2.0 * PI * 220.0 * t).sin() + 0.15 * (2.0 * PI * 440.0 * t).sin();
            samples.push(tone + noise());
        }
        if burst < 2 {
            samples.extend((0..(2 * rate) as usize).map(|_| noise()));
        }
    }
    samples.extend((0..rate as usize).map(|_| noise()));

    Waveform {
        samples,
        sample_rate: rate,
    }
}

#[test]
fn capture_to_synthesis_pipeline() {
    let raw = burst_recording();
    let cleaned = dsp::preprocess(&raw).expect("preprocess");
    assert!(cleaned.duration_secs() > 10.0, "trim should keep the bursts");
    assert!(cleaned.duration_secs() <= raw.duration_secs());

    let cfg = SegmentConfig::default();
    let mut set = segment::segment_and_rank(&cleaned, &cfg, None);
    assert_eq!(set.len(), 3, "three bursts should survive as samples");
    for pair in set.samples.windows(2) {
        assert!(pair[0].quality >= pair[1].quality, "ranking must be descending");
    }
    for sample in &set.samples {
        assert!(sample.duration_secs >= cfg.min_duration_secs);
        assert!(sample.duration_secs <= cfg.max_duration_secs);
    }

    let dir = temp_dir("pipeline");
    let written = segment::write_samples(&mut set, &dir).expect("write samples");
    assert_eq!(written.len(), 3);
    for path in &written {
        assert!(path.exists());
    }

    let reloaded = segment::load_samples(&dir).expect("reload samples");
    assert_eq!(reloaded.len(), 3);

    let profile = clone::characterize(&reloaded).expect("characterize");
    assert!(
        (profile.fundamental_hz - 220.0).abs() < 15.0,
        "pitch should survive the round trip, got {}",
        profile.fundamental_hz
    );
    assert!(profile.similarity_score > 0.0);

    let speech = clone::synthesize(&profile, "breaking news from the test suite");
    assert!(speech.duration_secs() >= 3.0);
    let f0 = features::fundamental_frequency(&speech.samples, speech.sample_rate);
    assert!(
        (f0 - profile.fundamental_hz).abs() < 15.0,
        "synthesis should speak at the profile pitch, got {f0}"
    );

    let out = dir.join("synth.wav");
    wav::write_waveform(&out, &speech).expect("write synth");
    let back = wav::read_waveform(&out).expect("read synth");
    assert_eq!(back.sample_rate, CANONICAL_SAMPLE_RATE);
    assert_eq!(back.samples.len(), speech.samples.len());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn silent_recording_produces_no_samples() {
    let rate = CANONICAL_SAMPLE_RATE;
    let silence = Waveform {
        samples: vec![0.0; (rate * 5) as usize],
        sample_rate: rate,
    };
    assert!(dsp::preprocess(&silence).is_err(), "all-silence cannot be prepared");

    let set = segment::segment_and_rank(&silence, &SegmentConfig::default(), None);
    assert!(set.is_empty());
    assert_eq!(set.total_candidates, 0);
}
