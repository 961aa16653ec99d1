//! Waveform file I/O. Writes the canonical uncompressed PCM container
//! (16-bit mono WAV) and reads back 16-bit or float files of any channel
//! count and rate, downmixing and resampling to the canonical rate.

use crate::dsp;
use crate::types::{Waveform, CANONICAL_SAMPLE_RATE};
use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Write mono 16-bit PCM at the waveform's own rate.
pub fn write_waveform(path: &Path, wave: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: wave.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create wav file '{}'", path.display()))?;
    for &sample in &wave.samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(quantized)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Read a WAV file, downmix to mono, and resample to the canonical rate.
pub fn read_waveform(path: &Path) -> Result<Waveform> {
    read_waveform_at(path, CANONICAL_SAMPLE_RATE)
}

/// Like `read_waveform` but targeting an explicit rate; used by tests and by
/// callers that need device-rate material.
pub fn read_waveform_at(path: &Path, target_rate: u32) -> Result<Waveform> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open wav file '{}'", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    let samples = dsp::resample(&mono, spec.sample_rate, target_rate);
    Ok(Waveform::new(samples, target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::f32::consts::PI;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_wav(name: &str) -> std::path::PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        env::temp_dir().join(format!("voiceforge_{name}_{unique}.wav"))
    }

    #[test]
    fn round_trip_preserves_rate_and_samples_within_quantization() {
        let rate = CANONICAL_SAMPLE_RATE;
        let samples: Vec<f32> = (0..rate as usize / 2)
            .map(|n| 0.6 * (2.0 * PI * 220.0 * n as f32 / rate as f32).sin())
            .collect();
        let wave = Waveform::new(samples.clone(), rate);

        let path = temp_wav("round_trip");
        write_waveform(&path, &wave).expect("write");
        let restored = read_waveform(&path).expect("read");
        let _ = std::fs::remove_file(&path);

        assert_eq!(restored.sample_rate, rate);
        assert_eq!(restored.samples.len(), samples.len());
        let max_err = samples
            .iter()
            .zip(&restored.samples)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        // 16-bit quantization step is ~3e-5.
        assert!(max_err < 1e-3, "round trip error {max_err}");
    }

    #[test]
    fn stereo_files_are_downmixed_to_mono() {
        let path = temp_wav("stereo");
        let spec = WavSpec {
            channels: 2,
            sample_rate: CANONICAL_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).expect("create");
        for _ in 0..1000 {
            writer.write_sample(16_384i16).expect("left");
            writer.write_sample(-16_384i16).expect("right");
        }
        writer.finalize().expect("finalize");

        let restored = read_waveform(&path).expect("read");
        let _ = std::fs::remove_file(&path);
        assert_eq!(restored.samples.len(), 1000);
        assert!(restored.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn higher_rate_input_is_resampled_to_canonical() {
        let source_rate = 44_100u32;
        let samples: Vec<f32> = (0..source_rate as usize)
            .map(|n| 0.4 * (2.0 * PI * 440.0 * n as f32 / source_rate as f32).sin())
            .collect();
        let path = temp_wav("resample");
        write_waveform(&path, &Waveform::new(samples, source_rate)).expect("write");

        let restored = read_waveform(&path).expect("read");
        let _ = std::fs::remove_file(&path);
        assert_eq!(restored.sample_rate, CANONICAL_SAMPLE_RATE);
        assert!((restored.duration_secs() - 1.0).abs() < 0.01);
        // The tone must survive the rate conversion.
        let freq = dsp::dominant_frequency(&restored.samples, restored.sample_rate);
        assert!((freq - 440.0).abs() < 10.0, "got {freq} Hz");
    }
}
