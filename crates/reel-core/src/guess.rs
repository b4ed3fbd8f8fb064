//! Title guessing from release-style file and folder names.
//!
//! Extracts a display title plus year and season/episode markers from names
//! like `[Group] Show Name S02E05 (1080p).mkv`. Guessed titles are only
//! defaults; user-locked titles are never overwritten.

use std::sync::LazyLock;

use regex::Regex;

static SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bS(\d{1,2})[ ._-]?E(\d{1,3})\b").expect("valid regex")
});
static CROSS_EPISODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})x(\d{2,3})\b").expect("valid regex"));
static SEASON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bseason[ ._-]?(\d{1,2})\b").expect("valid regex"));
static EPISODE_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ep|episode)[ ._-]?(\d{1,3})\b").expect("valid regex")
});
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("valid regex"));
static TECH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(480p|720p|1080p|2160p|4k|x264|x265|h\.?264|h\.?265|hevc|10bit|bluray|blu-ray|brrip|bdrip|webrip|web-dl|webdl|hdtv|dvdrip|aac|ac3|dts)\b",
    )
    .expect("valid regex")
});
static LEADING_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[[^\]]*\]\s*").expect("valid regex"));
// Extensions start with a letter so trailing years are not mistaken for one.
static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z][A-Za-z0-9]{1,3}$").expect("valid regex"));

/// What could be read out of a file or folder name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Guess {
    pub title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl Guess {
    /// Episode markers are a strong hint the item is a series, not a movie.
    pub fn looks_like_tv(&self) -> bool {
        self.season.is_some() || self.episode.is_some()
    }
}

/// Guess title, year, and season/episode from a file or folder name.
pub fn guess_name(name: &str) -> Guess {
    let stem = EXTENSION.replace(name, "");
    let stem = LEADING_GROUP.replace(&stem, "");
    let stem = stem.as_ref();

    let mut season = None;
    let mut episode = None;
    let mut cut = stem.len();

    if let Some(caps) = SEASON_EPISODE.captures(&stem) {
        season = caps[1].parse().ok();
        episode = caps[2].parse().ok();
        cut = cut.min(caps.get(0).map(|m| m.start()).unwrap_or(cut));
    } else if let Some(caps) = CROSS_EPISODE.captures(&stem) {
        season = caps[1].parse().ok();
        episode = caps[2].parse().ok();
        cut = cut.min(caps.get(0).map(|m| m.start()).unwrap_or(cut));
    } else {
        if let Some(caps) = SEASON_WORD.captures(&stem) {
            season = caps[1].parse().ok();
            cut = cut.min(caps.get(0).map(|m| m.start()).unwrap_or(cut));
        }
        if let Some(caps) = EPISODE_WORD.captures(&stem) {
            episode = caps[1].parse().ok();
            cut = cut.min(caps.get(0).map(|m| m.start()).unwrap_or(cut));
        }
    }

    let mut year = None;
    if let Some(caps) = YEAR.captures_iter(&stem).last() {
        year = caps[1].parse().ok();
        cut = cut.min(caps.get(0).map(|m| m.start()).unwrap_or(cut));
    }

    if let Some(m) = TECH_TOKEN.find(&stem) {
        cut = cut.min(m.start());
    }

    let raw_title = &stem[..cut];
    let mut title = clean_separators(raw_title);
    if title.is_empty() {
        title = clean_separators(stem);
    }

    Guess {
        title,
        year,
        season,
        episode,
    }
}

/// Replace dot/underscore separators with spaces and strip trailing dashes
/// and bracket remnants.
fn clean_separators(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == '(' || c == '[' || c.is_whitespace())
        .to_string()
}
