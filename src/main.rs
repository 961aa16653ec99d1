use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use voiceforge::config::{AppConfig, Command};
use voiceforge::types::{AudioSessionContext, DeviceDescriptor};
use voiceforge::{clone, device, dsp, recorder, script, segment, wav, LevelMonitor};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = AppConfig::parse();
    config.validate()?;

    let ctx = session_context(&config)?;
    match config.command.clone() {
        Command::Devices { json } => cmd_devices(json),
        Command::Monitor { duration } => cmd_monitor(&ctx, duration),
        Command::Record {
            duration,
            output,
            raw,
        } => cmd_record(ctx, duration, &output, raw),
        Command::Prepare { input, output } => cmd_prepare(&input, &output),
        Command::Samples {
            input,
            out_dir,
            manifest,
            min_duration,
            max_duration,
            cap,
        } => cmd_samples(&input, &out_dir, manifest.as_deref(), min_duration, max_duration, cap),
        Command::Clone {
            samples,
            text,
            output,
        } => cmd_clone(&samples, &text, &output),
        Command::Script {
            topic,
            duration,
            style,
            timing,
        } => cmd_script(&topic, duration, style, timing),
    }
}

/// Resolves `--device`/`--gain` into the session context handed to the
/// capture entry points. A named device must match an enumerated one.
fn session_context(config: &AppConfig) -> Result<AudioSessionContext> {
    let descriptor = match &config.device {
        Some(name) => Some(find_device(name)?),
        None => None,
    };
    Ok(AudioSessionContext::new(descriptor, config.gain))
}

fn find_device(name: &str) -> Result<DeviceDescriptor> {
    let devices = device::list_devices();
    let needle = name.to_lowercase();
    devices
        .into_iter()
        .find(|d| d.name.to_lowercase().contains(&needle))
        .with_context(|| format!("no input device matching \"{name}\""))
}

fn cmd_devices(json: bool) -> Result<()> {
    let devices = device::list_devices();
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }
    if devices.is_empty() {
        println!("No input devices detected.");
        return Ok(());
    }
    for d in &devices {
        println!(
            "[{}] {} ({} ch, {} Hz)",
            d.index, d.name, d.channels, d.default_sample_rate
        );
    }
    Ok(())
}

fn cmd_monitor(ctx: &AudioSessionContext, duration: Option<f32>) -> Result<()> {
    let mut monitor = LevelMonitor::start(ctx)?;
    println!("Monitoring input level (Ctrl-C to stop)...");

    let started = Instant::now();
    loop {
        std::thread::sleep(Duration::from_millis(100));
        if let Some(fault) = monitor.fault() {
            monitor.stop();
            bail!("monitor stopped: {fault}");
        }
        let level = monitor.current_level();
        print!("\r{}", render_meter(level.rms, level.peak, level.clipping));
        io::stdout().flush().ok();

        if let Some(limit) = duration {
            if started.elapsed().as_secs_f32() >= limit {
                break;
            }
        }
    }
    monitor.stop();
    println!();
    Ok(())
}

fn render_meter(rms: f32, peak: f32, clipping: bool) -> String {
    const WIDTH: usize = 40;
    let rms_db = dsp::lin_to_db(rms);
    let peak_db = dsp::lin_to_db(peak);
    // Scale -60 dBFS..0 dBFS across the bar.
    let filled = (((rms_db + 60.0) / 60.0).clamp(0.0, 1.0) * WIDTH as f32) as usize;
    let bar: String = (0..WIDTH).map(|i| if i < filled { '#' } else { '-' }).collect();
    let clip = if clipping { " CLIP" } else { "     " };
    format!("[{bar}] rms {rms_db:6.1} dB  peak {peak_db:6.1} dB{clip}")
}

fn cmd_record(ctx: AudioSessionContext, duration: f32, output: &Path, raw: bool) -> Result<()> {
    println!("Recording for {duration:.1}s...");
    let job = recorder::RecordingJob::spawn(ctx, Duration::from_secs_f32(duration));

    while !job.is_finished() {
        if let Some(progress) = job.poll_progress() {
            print!(
                "\r{:5.1}s elapsed, {:5.1}s left  level {:6.1} dB",
                progress.elapsed_secs,
                progress.remaining_secs,
                dsp::lin_to_db(progress.level)
            );
            io::stdout().flush().ok();
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    let recording = job.finish()?;
    if let recorder::RecordingOutcome::Failed(message) = &recording.outcome {
        bail!("recording failed: {message}");
    }

    let wave = if raw {
        recording.waveform
    } else {
        dsp::preprocess(&recording.waveform)?
    };
    wav::write_waveform(output, &wave)?;

    let stats = &recording.stats;
    println!(
        "Wrote {} ({:.1}s, rms {:.3}, peak {:.3}, dominant {:.0} Hz{})",
        output.display(),
        wave.duration_secs(),
        stats.rms,
        stats.peak,
        stats.dominant_frequency_hz,
        if stats.clipping { ", CLIPPED" } else { "" }
    );
    Ok(())
}

fn cmd_prepare(input: &Path, output: &Path) -> Result<()> {
    let wave = wav::read_waveform(input)
        .with_context(|| format!("reading {}", input.display()))?;
    let cleaned = dsp::preprocess(&wave)?;
    wav::write_waveform(output, &cleaned)?;
    println!(
        "Prepared {} -> {} ({:.1}s -> {:.1}s)",
        input.display(),
        output.display(),
        wave.duration_secs(),
        cleaned.duration_secs()
    );
    Ok(())
}

#[derive(Serialize)]
struct ManifestEntry {
    path: PathBuf,
    duration_secs: f32,
    quality: f32,
    transcription: Option<String>,
}

fn cmd_samples(
    input: &Path,
    out_dir: &Path,
    manifest: Option<&Path>,
    min_duration: f32,
    max_duration: f32,
    cap: usize,
) -> Result<()> {
    let wave = wav::read_waveform(input)
        .with_context(|| format!("reading {}", input.display()))?;

    let cfg = segment::SegmentConfig {
        min_duration_secs: min_duration,
        max_duration_secs: max_duration,
        cap,
        ..Default::default()
    };
    let mut set = segment::segment_and_rank(&wave, &cfg, None);
    if set.is_empty() {
        println!(
            "No usable samples: {} candidate chunk(s) found, none within {min_duration:.1}-{max_duration:.1}s.",
            set.total_candidates
        );
        return Ok(());
    }

    let written = segment::write_samples(&mut set, out_dir)?;
    println!(
        "Kept {} of {} candidate chunks in {}",
        written.len(),
        set.total_candidates,
        out_dir.display()
    );
    for sample in &set.samples {
        if let Some(path) = &sample.path {
            println!(
                "  {}  {:.1}s  quality {:.2}",
                path.display(),
                sample.duration_secs,
                sample.quality
            );
        }
    }

    if let Some(manifest_path) = manifest {
        let entries: Vec<ManifestEntry> = set
            .samples
            .iter()
            .filter_map(|s| {
                s.path.as_ref().map(|path| ManifestEntry {
                    path: path.clone(),
                    duration_secs: s.duration_secs,
                    quality: s.quality,
                    transcription: s.transcription.as_ref().map(|t| t.text.clone()),
                })
            })
            .collect();
        let json = serde_json::to_string_pretty(&entries)?;
        std::fs::write(manifest_path, json)
            .with_context(|| format!("writing {}", manifest_path.display()))?;
        println!("Manifest written to {}", manifest_path.display());
    }
    Ok(())
}

fn cmd_clone(samples_dir: &Path, text: &str, output: &Path) -> Result<()> {
    let set = segment::load_samples(samples_dir)
        .with_context(|| format!("loading samples from {}", samples_dir.display()))?;
    let profile = clone::characterize(&set)?;
    println!(
        "Voice profile from {} sample(s): f0 {:.0} Hz, centroid {:.0} Hz, similarity {:.2}",
        set.len(),
        profile.fundamental_hz,
        profile.spectral_centroid_hz,
        profile.similarity_score
    );

    let wave = clone::synthesize(&profile, text);
    wav::write_waveform(output, &wave)?;
    println!(
        "Synthesized {:.1}s to {}",
        wave.duration_secs(),
        output.display()
    );
    Ok(())
}

fn cmd_script(topic: &str, duration: u32, style: script::ScriptStyle, timing: bool) -> Result<()> {
    let text = script::generate_script(topic, duration, style, None);
    println!("{text}");
    if timing {
        let metrics = script::analyze_timing(&text);
        println!();
        println!(
            "{} words, ~{:.1}s at {:.0} wpm",
            metrics.word_count, metrics.estimated_duration_secs, metrics.words_per_minute
        );
    }
    Ok(())
}
