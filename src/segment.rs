//! Silence-based segmentation and ranking: split a cleaned waveform into
//! candidate utterances, score them, and keep the best few for voice
//! characterization.

use crate::dsp;
use crate::stt::Transcriber;
use crate::types::{Transcription, VoiceSample, VoiceSampleSet, Waveform};
use crate::wav;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Analysis frame for the silence detector.
const FRAME_SECS: f32 = 0.02;

#[derive(Debug, Clone)]
pub struct SegmentConfig {
    pub min_duration_secs: f32,
    pub max_duration_secs: f32,
    /// Maximum number of samples retained after ranking.
    pub cap: usize,
    /// Contiguous quiet time required to count as a boundary.
    pub min_silence_secs: f32,
    /// Silence threshold, in dB below the waveform's overall level.
    pub silence_margin_db: f32,
    /// Silence retained around each chunk so word onsets are not clipped.
    pub pad_secs: f32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 3.0,
            max_duration_secs: 10.0,
            cap: 10,
            min_silence_secs: 0.5,
            silence_margin_db: 16.0,
            pad_secs: 0.25,
        }
    }
}

/// Quality heuristic in [0, 1]: too-quiet and clipped chunks both score low.
pub fn chunk_quality(samples: &[f32]) -> f32 {
    let rms = dsp::rms(samples);
    let peak = dsp::peak(samples);
    ((rms * 5.0).min(1.0) * (peak * 2.0).min(1.0)).clamp(0.0, 1.0)
}

/// Sample ranges of silence-delimited chunks, padded into the surrounding
/// quiet. The threshold is relative to the waveform's own loudness, so the
/// same margin works for quiet and hot recordings alike.
fn chunk_ranges(wave: &Waveform, cfg: &SegmentConfig) -> Vec<(usize, usize)> {
    let samples = &wave.samples;
    if samples.is_empty() || wave.sample_rate == 0 {
        return Vec::new();
    }

    let frame_len = ((FRAME_SECS * wave.sample_rate as f32) as usize).max(1);
    let threshold_db = dsp::lin_to_db(dsp::rms(samples)) - cfg.silence_margin_db;
    let min_silence_frames =
        ((cfg.min_silence_secs / FRAME_SECS).round() as usize).max(1);

    let silent: Vec<bool> = samples
        .chunks(frame_len)
        .map(|frame| dsp::lin_to_db(dsp::rms(frame)) < threshold_db)
        .collect();

    // Walk the frame labels; a silent run shorter than the minimum belongs
    // to the chunk around it.
    let mut ranges = Vec::new();
    let mut chunk_start: Option<usize> = None;
    let mut silence_run = 0usize;
    for (i, &is_silent) in silent.iter().enumerate() {
        if is_silent {
            silence_run += 1;
            if silence_run == min_silence_frames {
                if let Some(start) = chunk_start.take() {
                    // Run just crossed the threshold; the chunk ended where
                    // the run began.
                    let end = i + 1 - silence_run;
                    if end > start {
                        ranges.push((start, end));
                    }
                }
            }
        } else {
            silence_run = 0;
            if chunk_start.is_none() {
                chunk_start = Some(i);
            }
        }
    }
    if let Some(start) = chunk_start {
        let end = silent.len() - silence_run.min(silent.len() - start);
        if end > start {
            ranges.push((start, end));
        }
    }

    let pad = (cfg.pad_secs * wave.sample_rate as f32) as usize;
    ranges
        .into_iter()
        .map(|(first, last)| {
            let begin = (first * frame_len).saturating_sub(pad);
            let end = (last * frame_len + pad).min(samples.len());
            (begin, end)
        })
        .collect()
}

/// Split at silence boundaries, filter by duration, score, and keep the top
/// `cap` chunks. Zero usable chunks yields an empty set, not an error, so
/// the caller can explain "no usable samples" distinctly from real failures.
///
/// When a transcriber is supplied each retained sample is transcribed;
/// a failed transcription keeps the sample with empty text and zero
/// confidence.
pub fn segment_and_rank(
    wave: &Waveform,
    cfg: &SegmentConfig,
    transcriber: Option<&dyn Transcriber>,
) -> VoiceSampleSet {
    let ranges = chunk_ranges(wave, cfg);
    let mut candidates: Vec<VoiceSample> = Vec::new();
    for (begin, end) in ranges {
        let chunk = &wave.samples[begin..end];
        let duration = chunk.len() as f32 / wave.sample_rate as f32;
        if duration < cfg.min_duration_secs || duration > cfg.max_duration_secs {
            continue;
        }
        candidates.push(VoiceSample {
            waveform: Waveform::new(chunk.to_vec(), wave.sample_rate),
            path: None,
            duration_secs: duration,
            quality: chunk_quality(chunk),
            transcription: None,
        });
    }

    let total_candidates = candidates.len();
    candidates.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    candidates.truncate(cfg.cap);

    if let Some(transcriber) = transcriber {
        for sample in candidates.iter_mut() {
            sample.transcription = match transcriber.transcribe(&sample.waveform) {
                Ok(result) => Some(result),
                Err(err) => {
                    warn!("sample transcription failed (keeping sample): {err:#}");
                    Some(Transcription {
                        text: String::new(),
                        confidence: 0.0,
                    })
                }
            };
        }
    }

    debug!(
        "segmentation kept {} of {} candidate chunks",
        candidates.len(),
        total_candidates
    );

    VoiceSampleSet {
        samples: candidates,
        total_candidates,
    }
}

/// Persist each sample as `sample_NNN.wav` under `dir`, recording the path
/// on the sample.
pub fn write_samples(set: &mut VoiceSampleSet, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(set.samples.len());
    for (i, sample) in set.samples.iter_mut().enumerate() {
        let path = dir.join(format!("sample_{i:03}.wav"));
        wav::write_waveform(&path, &sample.waveform)?;
        sample.path = Some(path.clone());
        written.push(path);
    }
    Ok(written)
}

/// Load every WAV under `dir` (sorted by name) back into a sample set, for
/// characterization of a previously written directory.
pub fn load_samples(dir: &Path) -> anyhow::Result<VoiceSampleSet> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.extension().map(|e| e == "wav").unwrap_or(false))
        .collect();
    paths.sort();

    let mut samples = Vec::with_capacity(paths.len());
    for path in paths {
        let waveform = wav::read_waveform(&path)?;
        let duration_secs = waveform.duration_secs();
        let quality = chunk_quality(&waveform.samples);
        samples.push(VoiceSample {
            waveform,
            path: Some(path),
            duration_secs,
            quality,
            transcription: None,
        });
    }
    let total_candidates = samples.len();
    Ok(VoiceSampleSet {
        samples,
        total_candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::testing::FakeTranscriber;
    use crate::types::CANONICAL_SAMPLE_RATE;
    use std::f32::consts::PI;

    fn burst_recording(rate: u32) -> Waveform {
        // 1 s lead-in, three 4 s bursts separated by 2 s silences, 1 s tail.
        let tone = |secs: f32| -> Vec<f32> {
            (0..(secs * rate as f32) as usize)
                .map(|n| 0.5 * (2.0 * PI * 330.0 * n as f32 / rate as f32).sin())
                .collect()
        };
        let silence = |secs: f32| vec![0.0f32; (secs * rate as f32) as usize];

        let mut samples = silence(1.0);
        for i in 0..3 {
            samples.extend(tone(4.0));
            if i < 2 {
                samples.extend(silence(2.0));
            }
        }
        samples.extend(silence(1.0));
        Waveform::new(samples, rate)
    }

    #[test]
    fn three_bursts_become_three_accepted_chunks() {
        let wave = burst_recording(CANONICAL_SAMPLE_RATE);
        let set = segment_and_rank(&wave, &SegmentConfig::default(), None);
        assert_eq!(set.len(), 3);
        for sample in &set.samples {
            assert!(sample.duration_secs >= 3.0 && sample.duration_secs <= 10.0);
        }
    }

    #[test]
    fn chunks_respect_duration_bounds_and_cap() {
        let wave = burst_recording(CANONICAL_SAMPLE_RATE);
        let cfg = SegmentConfig {
            cap: 2,
            ..SegmentConfig::default()
        };
        let set = segment_and_rank(&wave, &cfg, None);
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_candidates, 3);
    }

    #[test]
    fn scores_are_non_increasing() {
        let wave = burst_recording(CANONICAL_SAMPLE_RATE);
        let set = segment_and_rank(&wave, &SegmentConfig::default(), None);
        for pair in set.samples.windows(2) {
            assert!(pair[0].quality >= pair[1].quality);
        }
        for sample in &set.samples {
            assert!((0.0..=1.0).contains(&sample.quality));
        }
    }

    #[test]
    fn too_short_bursts_yield_an_empty_set_not_an_error() {
        let rate = CANONICAL_SAMPLE_RATE;
        // Single 1 s burst: below the 3 s minimum.
        let mut samples = vec![0.0f32; rate as usize];
        samples.extend(
            (0..rate as usize).map(|n| 0.5 * (2.0 * PI * 330.0 * n as f32 / rate as f32).sin()),
        );
        samples.extend(vec![0.0f32; rate as usize]);
        let set = segment_and_rank(
            &Waveform::new(samples, rate),
            &SegmentConfig::default(),
            None,
        );
        assert!(set.is_empty());
        assert_eq!(set.total_candidates, 0);
    }

    #[test]
    fn failed_transcription_keeps_sample_with_empty_text() {
        let wave = burst_recording(CANONICAL_SAMPLE_RATE);
        let stt = FakeTranscriber {
            text: String::new(),
            confidence: 0.0,
            fail: true,
        };
        let set = segment_and_rank(&wave, &SegmentConfig::default(), Some(&stt));
        assert_eq!(set.len(), 3);
        for sample in &set.samples {
            let transcription = sample.transcription.as_ref().expect("placeholder kept");
            assert!(transcription.text.is_empty());
            assert_eq!(transcription.confidence, 0.0);
        }
    }

    #[test]
    fn successful_transcription_is_attached() {
        let wave = burst_recording(CANONICAL_SAMPLE_RATE);
        let stt = FakeTranscriber {
            text: "hello there".into(),
            confidence: 0.9,
            fail: false,
        };
        let set = segment_and_rank(&wave, &SegmentConfig::default(), Some(&stt));
        assert!(set
            .samples
            .iter()
            .all(|s| s.transcription.as_ref().map(|t| t.text.as_str()) == Some("hello there")));
    }

    #[test]
    fn quality_penalizes_quiet_chunks() {
        let loud: Vec<f32> = (0..4096).map(|n| 0.5 * (n as f32 * 0.2).sin()).collect();
        let quiet: Vec<f32> = loud.iter().map(|s| s * 0.1).collect();
        assert!(chunk_quality(&loud) > chunk_quality(&quiet));
    }
}
