//! Thin wrapper around the host audio subsystem. The cpal callback thread
//! downmixes to mono and pushes fixed-size frames into a bounded channel;
//! `read_frame` blocks on the receiving end so callers never touch cpal.

use crate::error::AudioError;
use crate::types::{AudioFrame, DeviceDescriptor};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frames buffered between the cpal callback and the reader before the pump
/// starts dropping. Generous enough to absorb scheduling hiccups.
const CHANNEL_CAPACITY: usize = 64;

/// Enumerate every device exposing at least one input channel. Fails softly:
/// an unavailable host audio subsystem yields an empty list, never an error.
pub fn list_devices() -> Vec<DeviceDescriptor> {
    let host = cpal::default_host();
    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(err) => {
            warn!("input device enumeration failed: {err}");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for (index, device) in devices.enumerate() {
        let Ok(config) = device.default_input_config() else {
            continue;
        };
        if config.channels() == 0 {
            continue;
        }
        found.push(DeviceDescriptor {
            index,
            name: device
                .name()
                .unwrap_or_else(|_| format!("input #{index}")),
            channels: config.channels(),
            default_sample_rate: config.sample_rate().0,
        });
    }
    found
}

/// Resolve a descriptor back to a concrete cpal device, or the host default
/// when none was selected.
fn resolve_device(selected: Option<&DeviceDescriptor>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match selected {
        Some(descriptor) => {
            let mut devices = host
                .input_devices()
                .map_err(|err| AudioError::DeviceUnavailable(err.to_string()))?;
            devices
                .find(|d| d.name().map(|n| n == descriptor.name).unwrap_or(false))
                .ok_or_else(|| {
                    AudioError::DeviceUnavailable(format!(
                        "input device '{}' not found",
                        descriptor.name
                    ))
                })
        }
        None => host.default_input_device().ok_or_else(|| {
            AudioError::DeviceUnavailable("no default input device available".into())
        }),
    }
}

/// Accumulates downmixed samples and emits exactly `frame_size`-sample frames.
/// Runs on the cpal callback thread, so it only ever `try_send`s.
struct FramePump {
    frame_size: usize,
    pending: Vec<f32>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

impl FramePump {
    fn new(frame_size: usize, sender: Sender<Vec<f32>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            frame_size: frame_size.max(1),
            pending: Vec::with_capacity(frame_size),
            sender,
            dropped,
        }
    }

    fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        downmix_into(&mut self.pending, data, channels, convert);
        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            match self.sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Average interleaved channels into mono while converting to f32. A
/// trailing partial frame (a torn callback buffer) is averaged over the
/// channels it actually contains.
fn downmix_into<T, F>(buf: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        buf.extend(data.iter().map(|&s| convert(s)));
        return;
    }
    buf.reserve(data.len() / channels + 1);
    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().map(|&s| convert(s)).sum();
        buf.push(sum / frame.len() as f32);
    }
}

/// An open capture stream delivering fixed-size mono frames at the device's
/// native rate. Closing is idempotent and also happens on drop.
pub struct InputStream {
    stream: Option<cpal::Stream>,
    frames: Receiver<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
    sample_rate: u32,
    frame_size: usize,
}

impl InputStream {
    /// Open the selected (or default) input device. Errors preserve the host
    /// subsystem's own message for diagnostics.
    pub fn open(
        selected: Option<&DeviceDescriptor>,
        frame_size: usize,
    ) -> Result<Self, AudioError> {
        let device = resolve_device(selected)?;
        let default_config = device
            .default_input_config()
            .map_err(|err| AudioError::DeviceUnavailable(err.to_string()))?;
        let format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let sample_rate = config.sample_rate.0;
        let channels = usize::from(config.channels.max(1));

        debug!(
            "opening input stream: format={format:?} rate={sample_rate}Hz channels={channels} frame={frame_size}"
        );

        let (sender, frames) = bounded::<Vec<f32>>(CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicUsize::new(0));
        let pump = Arc::new(Mutex::new(FramePump::new(
            frame_size,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| warn!("audio stream error: {err}");
        let stream = match format {
            SampleFormat::F32 => {
                let pump = pump.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = pump.lock() {
                            pump.push(data, channels, |sample| sample);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let pump = pump.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = pump.lock() {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let pump = pump.clone();
                device.build_input_stream(
                    &config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = pump.lock() {
                            pump.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(AudioError::DeviceUnavailable(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| AudioError::DeviceUnavailable(err.to_string()))?;

        stream
            .play()
            .map_err(|err| AudioError::DeviceUnavailable(err.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            frames,
            dropped,
            sample_rate,
            frame_size,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Frames the pump had to discard because the reader fell behind.
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Blocking read of exactly one frame. A read on a closed or stalled
    /// stream is fatal to the session; callers must not substitute silence.
    pub fn read_frame(&self) -> Result<AudioFrame, AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::StreamReadError("stream is closed".into()));
        }
        // One frame takes frame_size / sample_rate seconds to fill; anything
        // past a few seconds means the device went away.
        let timeout = Duration::from_secs(2);
        match self.frames.recv_timeout(timeout) {
            Ok(samples) => Ok(AudioFrame {
                samples,
                sample_rate: self.sample_rate,
            }),
            Err(RecvTimeoutError::Timeout) => Err(AudioError::StreamReadError(
                "timed out waiting for audio frames; device may have been disconnected".into(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::StreamReadError(
                "audio callback stopped delivering frames".into(),
            )),
        }
    }

    /// Release the underlying stream. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                debug!("failed to pause audio stream on close: {err}");
            }
            drop(stream);
        }
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        self.close();
    }
}
