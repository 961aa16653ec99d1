//! Text-to-speech dispatch. Concrete engines live behind [`TtsBackend`];
//! provider selection mirrors the quality ladder the rest of the pipeline
//! assumes, and a silence-emitting fallback guarantees some output exists.

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::Context;

use crate::types::CANONICAL_SAMPLE_RATE;

const FALLBACK_SECS_PER_WORD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TtsProvider {
    /// A voice cloned from the user's own samples.
    Cloned,
    /// Commercial high-quality synthesis.
    Premium,
    /// Commercial standard-quality synthesis.
    Standard,
    /// Built-in last resort; always available.
    Fallback,
}

impl TtsProvider {
    pub fn label(self) -> &'static str {
        match self {
            TtsProvider::Cloned => "cloned",
            TtsProvider::Premium => "premium",
            TtsProvider::Standard => "standard",
            TtsProvider::Fallback => "fallback",
        }
    }
}

/// Picks the best available provider: cloned beats premium beats standard,
/// with the fallback always usable when nothing else is.
pub fn resolve_auto(available: &[TtsProvider]) -> TtsProvider {
    for preferred in [
        TtsProvider::Cloned,
        TtsProvider::Premium,
        TtsProvider::Standard,
    ] {
        if available.contains(&preferred) {
            return preferred;
        }
    }
    TtsProvider::Fallback
}

pub trait TtsBackend {
    /// Renders `text` with the given voice, returning complete WAV bytes.
    fn synthesize(&self, text: &str, voice_id: &str) -> anyhow::Result<Vec<u8>>;
}

/// Emits 500 ms of silence per word so downstream consumers still receive a
/// well-formed WAV of plausible duration when every real engine is down.
pub struct SilenceFallback;

impl TtsBackend for SilenceFallback {
    fn synthesize(&self, text: &str, _voice_id: &str) -> anyhow::Result<Vec<u8>> {
        let words = text.split_whitespace().count().max(1);
        let total = (words as f32 * FALLBACK_SECS_PER_WORD * CANONICAL_SAMPLE_RATE as f32) as u32;

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: CANONICAL_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("creating in-memory WAV writer")?;
            for _ in 0..total {
                writer.write_sample(0i16).context("writing silence")?;
            }
            writer.finalize().context("finalizing WAV")?;
        }
        Ok(cursor.into_inner())
    }
}

/// Routes synthesis requests to the selected provider, walking down the
/// quality ladder when an engine fails.
pub struct TtsEngine {
    backends: HashMap<TtsProvider, Box<dyn TtsBackend>>,
}

impl TtsEngine {
    pub fn new() -> Self {
        let mut backends: HashMap<TtsProvider, Box<dyn TtsBackend>> = HashMap::new();
        backends.insert(TtsProvider::Fallback, Box::new(SilenceFallback));
        TtsEngine { backends }
    }

    pub fn register(&mut self, provider: TtsProvider, backend: Box<dyn TtsBackend>) {
        self.backends.insert(provider, backend);
    }

    pub fn available(&self) -> Vec<TtsProvider> {
        let mut providers: Vec<TtsProvider> = self.backends.keys().copied().collect();
        providers.sort();
        providers
    }

    /// Synthesizes with `provider` (or the best available when `None`),
    /// falling through to lower tiers on error. Returns the provider that
    /// actually produced the audio.
    pub fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        provider: Option<TtsProvider>,
    ) -> anyhow::Result<(TtsProvider, Vec<u8>)> {
        let start = provider.unwrap_or_else(|| resolve_auto(&self.available()));
        let ladder = [
            TtsProvider::Cloned,
            TtsProvider::Premium,
            TtsProvider::Standard,
            TtsProvider::Fallback,
        ];

        let mut last_err = None;
        for &candidate in ladder.iter().skip_while(|&&p| p != start) {
            let Some(backend) = self.backends.get(&candidate) else {
                continue;
            };
            match backend.synthesize(text, voice_id) {
                Ok(bytes) => return Ok((candidate, bytes)),
                Err(err) => {
                    log::warn!("tts provider {} failed: {err}", candidate.label());
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no tts backend available")))
    }
}

impl Default for TtsEngine {
    fn default() -> Self {
        Self::new()
    }
}
