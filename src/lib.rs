pub mod clone;
pub mod config;
pub mod device;
pub mod dsp;
pub mod error;
pub mod features;
pub mod monitor;
pub mod recorder;
pub mod script;
pub mod segment;
pub mod stt;
pub mod tts;
pub mod types;
pub mod wav;

pub use error::{AudioError, Result};
pub use monitor::LevelMonitor;
pub use recorder::{Recording, RecordingJob, RecordingOutcome};
pub use types::{
    AudioSessionContext, AudioStats, DeviceDescriptor, LevelSnapshot, Transcription,
    VoiceCharacteristics, VoiceSample, VoiceSampleSet, Waveform, CANONICAL_SAMPLE_RATE,
};
