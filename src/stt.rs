//! Boundary to an external speech-to-text collaborator. The segmenter calls
//! through this trait per sample; failures are per-call and never fatal to
//! the surrounding pipeline.

use crate::types::{Transcription, Waveform};
use anyhow::Result;

pub trait Transcriber {
    fn transcribe(&self, audio: &Waveform) -> Result<Transcription>;
}
