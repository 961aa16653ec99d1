//! Bounded-duration capture session. Runs on the caller's thread (or its own
//! via `RecordingJob`), applies gain as frames arrive, reports progress over
//! a non-blocking channel, and always hands back whatever was captured.

use crate::device::InputStream;
use crate::dsp;
use crate::error::AudioError;
use crate::types::{AudioSessionContext, AudioStats, Waveform, CANONICAL_SAMPLE_RATE, FRAME_SIZE};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Minimum cadence for progress reports.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Periodic report sent while a recording is in flight.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Progress {
    pub elapsed_secs: f64,
    pub remaining_secs: f64,
    /// Post-gain RMS of the most recent frame, in [0, 1].
    pub level: f32,
    pub gain: f32,
}

/// How the session ended. An early stop and a mid-capture stream failure are
/// both terminal states that still carry the partial waveform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    Completed,
    Stopped,
    Failed(String),
}

/// A finished capture: canonical-rate mono audio plus summary statistics.
#[derive(Debug, Clone)]
pub struct Recording {
    pub waveform: Waveform,
    pub stats: AudioStats,
    pub outcome: RecordingOutcome,
}

/// Apply gain to one frame, clamping at full scale. Sets the clip flag when
/// any post-gain sample exceeds unity; amplitudes never wrap.
fn apply_gain(frame: &[f32], gain: f32, clipped: &mut bool) -> Vec<f32> {
    frame
        .iter()
        .map(|&sample| {
            let boosted = sample * gain;
            if boosted.abs() > 1.0 {
                *clipped = true;
            }
            boosted.clamp(-1.0, 1.0)
        })
        .collect()
}

/// Summary statistics over a completed (post-gain) waveform.
fn compute_stats(samples: &[f32], sample_rate: u32, clipping: bool) -> AudioStats {
    let rms = dsp::rms(samples).min(1.0);
    let peak = dsp::peak(samples).min(1.0);
    AudioStats {
        rms,
        peak,
        dynamic_range_db: dsp::lin_to_db(peak) - dsp::lin_to_db(rms),
        dominant_frequency_hz: dsp::dominant_frequency(samples, sample_rate),
        clipping,
    }
}

/// Capture for up to `duration`. Blocks the calling thread; use
/// `RecordingJob::spawn` to run on a dedicated one.
///
/// Progress messages go out on `progress` with `try_send` so a slow consumer
/// can never stall the capture loop. Setting `stop` finalizes on the frames
/// captured so far; that is a normal `Stopped` outcome, not an error.
pub fn record(
    ctx: &AudioSessionContext,
    duration: Duration,
    progress: Option<Sender<Progress>>,
    stop: Option<Arc<AtomicBool>>,
) -> Result<Recording, AudioError> {
    let mut stream = InputStream::open(ctx.device.as_ref(), FRAME_SIZE)?;
    let device_rate = stream.sample_rate();
    let gain = ctx.effective_gain();
    let target_samples = (duration.as_secs_f64() * f64::from(device_rate)) as usize;

    debug!(
        "recording up to {:.1}s at {device_rate} Hz, gain {gain}",
        duration.as_secs_f64()
    );

    let mut captured: Vec<f32> = Vec::with_capacity(target_samples);
    let mut clipped = false;
    let mut outcome = RecordingOutcome::Completed;
    let mut last_report = std::time::Instant::now();

    while captured.len() < target_samples {
        if let Some(flag) = &stop {
            if flag.load(Ordering::Relaxed) {
                outcome = RecordingOutcome::Stopped;
                break;
            }
        }
        let frame = match stream.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                // Session is over, but the partial audio is preserved.
                if captured.is_empty() {
                    stream.close();
                    return Err(err);
                }
                warn!("recording ended early: {err}");
                outcome = RecordingOutcome::Failed(err.to_string());
                break;
            }
        };

        let boosted = apply_gain(&frame.samples, gain, &mut clipped);
        let frame_level = dsp::rms(&boosted).min(1.0);
        captured.extend(boosted);

        if let Some(sender) = &progress {
            if last_report.elapsed() >= PROGRESS_INTERVAL {
                last_report = std::time::Instant::now();
                let elapsed = captured.len() as f64 / f64::from(device_rate);
                let report = Progress {
                    elapsed_secs: elapsed,
                    remaining_secs: (duration.as_secs_f64() - elapsed).max(0.0),
                    level: frame_level,
                    gain,
                };
                match sender.try_send(report) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }
        }
    }

    stream.close();

    if captured.is_empty() {
        return Err(AudioError::StreamReadError(
            "no samples captured; check microphone permissions and availability".into(),
        ));
    }

    let samples = dsp::resample(&captured, device_rate, CANONICAL_SAMPLE_RATE);
    let stats = compute_stats(&samples, CANONICAL_SAMPLE_RATE, clipped);
    Ok(Recording {
        waveform: Waveform::new(samples, CANONICAL_SAMPLE_RATE),
        stats,
        outcome,
    })
}

/// A recording running on its own thread, polled rather than called back.
/// The UI layer decides how to render the progress it reads here.
pub struct RecordingJob {
    progress_rx: Receiver<Progress>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<Recording, AudioError>>>,
}

impl RecordingJob {
    pub fn spawn(ctx: AudioSessionContext, duration: Duration) -> Self {
        let (progress_tx, progress_rx) = bounded(8);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::spawn(move || {
            record(&ctx, duration, Some(progress_tx), Some(thread_stop))
        });
        Self {
            progress_rx,
            stop,
            handle: Some(handle),
        }
    }

    /// Latest progress report, or `None` when nothing new arrived. Drains
    /// the channel so a slow poller always sees the freshest state.
    pub fn poll_progress(&self) -> Option<Progress> {
        let mut latest = None;
        while let Ok(report) = self.progress_rx.try_recv() {
            latest = Some(report);
        }
        latest
    }

    /// Ask the capture loop to finalize early on the frames read so far.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
    }

    /// Wait for the session and take its result.
    pub fn finish(mut self) -> Result<Recording, AudioError> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(AudioError::StreamReadError(
                    "recording thread panicked".into(),
                ))
            }),
            None => Err(AudioError::StreamReadError(
                "recording already finished".into(),
            )),
        }
    }
}
