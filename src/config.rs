//! Command-line parsing and validation helpers.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::script::ScriptStyle;

const MAX_GAIN: f32 = 16.0;
const MAX_RECORD_SECS: f32 = 600.0;
const MAX_SCRIPT_SECS: u32 = 3600;
const DEFAULT_RECORD_SECS: f32 = 10.0;
const DEFAULT_SAMPLE_CAP: usize = 10;

/// CLI options for the voice capture and cloning pipeline. Validated values
/// keep the audio worker threads within sane bounds.
#[derive(Debug, Parser, Clone)]
#[command(name = "voiceforge", about = "Voice capture, analysis, and cloning pipeline", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name (substring match)
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Input gain multiplier applied to captured samples
    #[arg(long, global = true, default_value_t = 1.0, allow_negative_numbers = true)]
    pub gain: f32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List input-capable audio devices
    Devices {
        /// Emit the device list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a live input level meter
    Monitor {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long)]
        duration: Option<f32>,
    },
    /// Record from the microphone to a WAV file
    Record {
        /// Recording length in seconds
        #[arg(long, default_value_t = DEFAULT_RECORD_SECS)]
        duration: f32,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,

        /// Skip normalization, trimming, and denoising
        #[arg(long)]
        raw: bool,
    },
    /// Preprocess an existing WAV (normalize, trim, denoise)
    Prepare {
        /// Input WAV path
        input: PathBuf,

        /// Output WAV path
        output: PathBuf,
    },
    /// Segment a recording into ranked voice samples
    Samples {
        /// Input WAV path
        input: PathBuf,

        /// Directory to write the ranked samples into
        #[arg(long, default_value = "voice_samples")]
        out_dir: PathBuf,

        /// Write a JSON manifest of the retained samples
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Minimum sample length in seconds
        #[arg(long, default_value_t = 3.0)]
        min_duration: f32,

        /// Maximum sample length in seconds
        #[arg(long, default_value_t = 10.0)]
        max_duration: f32,

        /// Keep at most this many samples
        #[arg(long, default_value_t = DEFAULT_SAMPLE_CAP)]
        cap: usize,
    },
    /// Characterize a sample directory and synthesize speech from it
    Clone {
        /// Directory of WAV samples produced by `samples`
        #[arg(long)]
        samples: PathBuf,

        /// Text to synthesize
        #[arg(long)]
        text: String,

        /// Output WAV path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Generate a news-style script and timing estimate
    Script {
        /// Topic or headline to cover
        topic: String,

        /// Target spoken duration in seconds
        #[arg(long, default_value_t = 30)]
        duration: u32,

        /// Delivery style
        #[arg(long, value_enum, default_value_t = ScriptStyle::Professional)]
        style: ScriptStyle,

        /// Print timing metrics for the generated script
        #[arg(long)]
        timing: bool,
    },
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || self.gain <= 0.0 {
            bail!("--gain must be a positive number, got {}", self.gain);
        }
        if self.gain > MAX_GAIN {
            bail!("--gain must be at most {MAX_GAIN}, got {}", self.gain);
        }

        match &self.command {
            Command::Monitor {
                duration: Some(duration),
            } => {
                if !duration.is_finite() || *duration <= 0.0 {
                    bail!("--duration must be positive, got {duration}");
                }
            }
            Command::Record { duration, .. } => {
                if !duration.is_finite() || *duration <= 0.0 {
                    bail!("--duration must be positive, got {duration}");
                }
                if *duration > MAX_RECORD_SECS {
                    bail!(
                        "--duration must be at most {MAX_RECORD_SECS} seconds, got {duration}"
                    );
                }
            }
            Command::Samples {
                min_duration,
                max_duration,
                cap,
                ..
            } => {
                if !min_duration.is_finite() || *min_duration <= 0.0 {
                    bail!("--min-duration must be positive, got {min_duration}");
                }
                if !max_duration.is_finite() || *max_duration <= *min_duration {
                    bail!(
                        "--max-duration must exceed --min-duration ({min_duration}), got {max_duration}"
                    );
                }
                if *cap == 0 {
                    bail!("--cap must be at least 1");
                }
            }
            Command::Clone { text, .. } => {
                if text.trim().is_empty() {
                    bail!("--text must not be empty");
                }
            }
            Command::Script {
                topic, duration, ..
            } => {
                if topic.trim().is_empty() {
                    bail!("topic must not be empty");
                }
                if *duration == 0 || *duration > MAX_SCRIPT_SECS {
                    bail!(
                        "--duration must be between 1 and {MAX_SCRIPT_SECS} seconds, got {duration}"
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        AppConfig::try_parse_from(std::iter::once("voiceforge").chain(args.iter().copied()))
            .expect("argument parse")
    }

    #[test]
    fn defaults_pass_validation() {
        let cfg = parse(&["record", "--output", "take.wav"]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.gain, 1.0);
    }

    #[test]
    fn nonpositive_gain_is_rejected() {
        let cfg = parse(&["--gain", "0", "devices"]);
        assert!(cfg.validate().is_err());
        let cfg = parse(&["--gain", "-2", "devices"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn excessive_record_duration_is_rejected() {
        let cfg = parse(&["record", "--duration", "601", "--output", "x.wav"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn inverted_sample_bounds_are_rejected() {
        let cfg = parse(&[
            "samples",
            "in.wav",
            "--min-duration",
            "5",
            "--max-duration",
            "4",
        ]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_cap_is_rejected() {
        let cfg = parse(&["samples", "in.wav", "--cap", "0"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_clone_text_is_rejected() {
        let cfg = parse(&[
            "clone",
            "--samples",
            "dir",
            "--text",
            "  ",
            "--output",
            "out.wav",
        ]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn script_style_parses() {
        let cfg = parse(&["script", "storm warning", "--style", "dramatic"]);
        assert!(cfg.validate().is_ok());
        match cfg.command {
            Command::Script { style, .. } => assert_eq!(style, ScriptStyle::Dramatic),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
