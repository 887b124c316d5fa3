//! Duration parsing
//!
//! Converts free-text durations ("5 phút", "90s", "1 min 30 sec", "45") into
//! whole seconds and derives the number of 8-second scenes to request.

use regex::Regex;
use std::sync::OnceLock;

/// Length of one generated video scene, in seconds.
pub const SCENE_DURATION_SECS: u64 = 8;

/// Longest accepted duration (24 hours). Longer inputs are rejected.
pub const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

fn minutes_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:phút|minute|min|m)").expect("minutes pattern")
    })
}

fn seconds_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:giây|second|sec|s)").expect("seconds pattern")
    })
}

fn plain_number_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("number pattern"))
}

fn first_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Parses a free-text duration into seconds.
///
/// A minutes component and a seconds component are summed when both are
/// present. A bare number is read as seconds. Returns `None` for empty or
/// unparsable input, for totals that round to zero and for totals above
/// [`MAX_DURATION_SECS`].
pub fn parse_duration_to_seconds(text: &str) -> Option<u64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut total = 0.0_f64;

    if let Some(minutes) = first_number(minutes_pattern(), trimmed) {
        total += minutes * 60.0;
    }
    if let Some(seconds) = first_number(seconds_pattern(), trimmed) {
        total += seconds;
    }

    if total == 0.0 && plain_number_pattern().is_match(trimmed) {
        total = trimmed.parse::<f64>().unwrap_or(0.0);
    }

    if !total.is_finite() || total <= 0.0 || total > MAX_DURATION_SECS as f64 {
        return None;
    }

    let rounded = total.round() as u64;
    (rounded > 0).then_some(rounded)
}

/// Number of scenes needed to cover `seconds`, rounding half up.
///
/// Saturates at `u32::MAX` instead of wrapping.
pub fn scenes_for(seconds: u64) -> u32 {
    let scenes = seconds.saturating_add(SCENE_DURATION_SECS / 2) / SCENE_DURATION_SECS;
    u32::try_from(scenes).unwrap_or(u32::MAX)
}
