//! Script generation seam. External generators (an LLM, a newsroom feed)
//! implement [`ScriptSource`]; when none is wired in or the source fails we
//! fall back to a deterministic template so the pipeline never stalls.

use serde::Serialize;

/// Average news-anchor speaking rate used for sizing and timing estimates.
pub const WORDS_PER_MINUTE: f32 = 155.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScriptStyle {
    Professional,
    Casual,
    Dramatic,
    Modern,
    Classic,
}

impl ScriptStyle {
    /// Tone hint handed to script sources when building their prompt.
    pub fn tone(self) -> &'static str {
        match self {
            ScriptStyle::Professional => "formal, authoritative news-anchor tone",
            ScriptStyle::Casual => "conversational, engaging, friendly tone",
            ScriptStyle::Dramatic => "dramatic, persuasive tone with emphasis",
            ScriptStyle::Modern => "modern, polished tone for a younger audience",
            ScriptStyle::Classic => "classic, traditional, trustworthy tone",
        }
    }
}

pub trait ScriptSource {
    fn generate(
        &self,
        topic: &str,
        target_words: usize,
        style: ScriptStyle,
    ) -> anyhow::Result<String>;
}

/// Word budget for a spoken duration at the standard rate.
pub fn target_word_count(duration_secs: u32) -> usize {
    ((duration_secs as f32 * WORDS_PER_MINUTE) / 60.0) as usize
}

/// Generates a script for `topic`, preferring `source` and falling back to
/// the built-in template if the source is absent or errors.
pub fn generate_script(
    topic: &str,
    duration_secs: u32,
    style: ScriptStyle,
    source: Option<&dyn ScriptSource>,
) -> String {
    let target_words = target_word_count(duration_secs);
    if let Some(source) = source {
        match source.generate(topic, target_words, style) {
            Ok(script) => return clean_script(&script),
            Err(err) => log::warn!("script source failed, using fallback: {err}"),
        }
    }
    fallback_script(topic)
}

/// Deterministic breaking-news template used when no generator is available.
pub fn fallback_script(topic: &str) -> String {
    format!(
        "This just in: {topic}. This developing story is drawing attention \
         from around the world. Our team is tracking the latest updates and \
         will bring you more details as they are confirmed. Stay with us for \
         continuing coverage of this important story."
    )
}

/// Strips stage directions, bracketed notes, and a leading "Script:" label,
/// then collapses runs of whitespace.
pub fn clean_script(raw: &str) -> String {
    let mut text = raw.trim();
    for label in ["Script:", "script:", "SCRIPT:"] {
        if let Some(rest) = text.strip_prefix(label) {
            text = rest.trim_start();
            break;
        }
    }

    let mut cleaned = String::with_capacity(text.len());
    let mut depth_square = 0usize;
    let mut depth_round = 0usize;
    for ch in text.chars() {
        match ch {
            '[' => depth_square += 1,
            ']' => depth_square = depth_square.saturating_sub(1),
            '(' => depth_round += 1,
            ')' => depth_round = depth_round.saturating_sub(1),
            _ if depth_square == 0 && depth_round == 0 => cleaned.push(ch),
            _ => {}
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptTiming {
    pub word_count: usize,
    pub estimated_duration_secs: f32,
    pub estimated_duration_minutes: f32,
    pub words_per_minute: f32,
}

pub fn analyze_timing(script: &str) -> ScriptTiming {
    let word_count = script.split_whitespace().count();
    let estimated_duration_secs = (word_count as f32 / WORDS_PER_MINUTE) * 60.0;
    ScriptTiming {
        word_count,
        estimated_duration_secs: (estimated_duration_secs * 10.0).round() / 10.0,
        estimated_duration_minutes: (estimated_duration_secs / 60.0 * 100.0).round() / 100.0,
        words_per_minute: WORDS_PER_MINUTE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedSource(Option<&'static str>);

    impl ScriptSource for CannedSource {
        fn generate(
            &self,
            _topic: &str,
            _target_words: usize,
            _style: ScriptStyle,
        ) -> anyhow::Result<String> {
            match self.0 {
                Some(text) => Ok(text.to_string()),
                None => anyhow::bail!("upstream unavailable"),
            }
        }
    }

    #[test]
    fn word_budget_matches_speaking_rate() {
        assert_eq!(target_word_count(60), 155);
        assert_eq!(target_word_count(30), 77);
    }

    #[test]
    fn source_output_is_cleaned() {
        let source = CannedSource(Some("Script:  [pause] Good   evening (smiles) viewers."));
        let script = generate_script("storm", 30, ScriptStyle::Professional, Some(&source));
        assert_eq!(script, "Good evening viewers.");
    }

    #[test]
    fn failed_source_falls_back_to_template() {
        let source = CannedSource(None);
        let script = generate_script("flooding", 30, ScriptStyle::Dramatic, Some(&source));
        assert!(script.starts_with("This just in: flooding."));
    }

    #[test]
    fn no_source_uses_template_directly() {
        let script = generate_script("elections", 30, ScriptStyle::Casual, None);
        assert!(script.contains("elections"));
        assert!(script.contains("continuing coverage"));
    }

    #[test]
    fn timing_analysis_counts_words() {
        let timing = analyze_timing("one two three four five");
        assert_eq!(timing.word_count, 5);
        assert!((timing.estimated_duration_secs - 1.9).abs() < 0.11);
        assert_eq!(timing.words_per_minute, WORDS_PER_MINUTE);
    }

    #[test]
    fn nested_brackets_are_removed() {
        assert_eq!(clean_script("a [b [c] d] e"), "a e");
        assert_eq!(clean_script("stray ] here"), "stray here");
    }
}
