//! Data carriers exchanged between pipeline stages. A `Waveform` is the unit
//! of exchange; each stage returns a new one rather than mutating in place.

use serde::Serialize;
use std::path::PathBuf;

/// Canonical sample rate used by every processing stage. Device captures and
/// file reads are resampled to this before anything downstream sees them.
pub const CANONICAL_SAMPLE_RATE: u32 = 22_050;

/// Samples per blocking device read.
pub const FRAME_SIZE: usize = 1024;

/// Mono PCM plus its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// One fixed-size block of mono samples read from a device, still at the
/// device's native rate. Owned solely by the capture loop that produced it.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Describes one capturable input. Enumerated fresh on each query so device
/// hot-plug never serves stale entries.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub channels: u16,
    pub default_sample_rate: u32,
}

/// Latest level reading published by the monitor. `rms` and `peak` are
/// normalized to [0, 1] against full scale on the post-gain signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelSnapshot {
    pub rms: f32,
    pub peak: f32,
    pub clipping: bool,
    pub gain: f32,
}

/// Terminal summary attached to a completed recording.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AudioStats {
    pub rms: f32,
    pub peak: f32,
    /// Crest factor in dB (peak over RMS), a coarse dynamic-range figure.
    pub dynamic_range_db: f32,
    pub dominant_frequency_hz: f32,
    pub clipping: bool,
}

/// One silence-delimited candidate utterance cut from a source waveform.
#[derive(Debug, Clone)]
pub struct VoiceSample {
    pub waveform: Waveform,
    /// Set once the sample has been persisted to disk.
    pub path: Option<PathBuf>,
    pub duration_secs: f32,
    /// Quality heuristic in [0, 1]; higher is better.
    pub quality: f32,
    pub transcription: Option<Transcription>,
}

/// Ranked, capped set of the best samples from one source waveform. This is
/// the unit handed to voice characterization.
#[derive(Debug, Clone, Default)]
pub struct VoiceSampleSet {
    pub samples: Vec<VoiceSample>,
    /// Candidate chunks that passed the duration filter, before capping.
    pub total_candidates: usize,
}

impl VoiceSampleSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Output of an external speech-to-text collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
}

/// Coarse voice characteristics derived from a sample set; parameterizes one
/// synthesis call and is not persisted beyond it.
#[derive(Debug, Clone, Serialize)]
pub struct VoiceCharacteristics {
    pub fundamental_hz: f32,
    pub spectral_centroid_hz: f32,
    pub mfcc: Vec<f32>,
    pub similarity_score: f32,
}

/// Caller-owned session state: the selected device and gain, passed
/// explicitly into monitor/recorder calls instead of living in globals.
#[derive(Debug, Clone, Default)]
pub struct AudioSessionContext {
    pub device: Option<DeviceDescriptor>,
    pub gain: f32,
}

impl AudioSessionContext {
    pub fn new(device: Option<DeviceDescriptor>, gain: f32) -> Self {
        Self { device, gain }
    }

    /// Gain is a positive multiplier; zero or negative configs fall back to unity.
    pub fn effective_gain(&self) -> f32 {
        if self.gain > 0.0 {
            self.gain
        } else {
            1.0
        }
    }
}
