//! Season/episode extraction from free-text program descriptions.
//!
//! The Finnish feeds bury episode information in prose ("Kausi 2, jakso
//! 5/12."); an ordered rule list picks it out, later rules overwriting
//! earlier matches. No match at all is a valid outcome.

use regex::Regex;

/// Extracted season/episode numbers; 0 means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeInfo {
    pub season: u32,
    pub episode: u32,
    pub episode_count: u32,
}

impl EpisodeInfo {
    pub fn from_description(description: &str) -> Self {
        let mut info = Self::default();

        // Bare "N/M" episode/total.
        if let Ok(re) = Regex::new(r"(\d+)/(\d+)[., ]?") {
            if let Some(caps) = re.captures(description) {
                info.episode = parse_group(&caps, 1);
                info.episode_count = parse_group(&caps, 2);
            }
        }

        // "osa N" / "jakso N" keyword.
        if let Ok(re) = Regex::new(r"(?i)(?:osa|jakso) (\d+)") {
            if let Some(caps) = re.captures(description) {
                info.episode = parse_group(&caps, 1);
            }
        }

        // "N. kausi" keyword.
        if let Ok(re) = Regex::new(r"(?i)(\d+)[., ]? kausi") {
            if let Some(caps) = re.captures(description) {
                info.season = parse_group(&caps, 1);
            }
        }

        // Combined "jakso N/M" / "osa N/M".
        if let Ok(re) = Regex::new(r"(?i)(?:jakso |osa )(\d+)/(\d+)[., ]?") {
            if let Some(caps) = re.captures(description) {
                info.episode = parse_group(&caps, 1);
                info.episode_count = parse_group(&caps, 2);
            }
        }

        // Combined "kausi S, jakso E[/M]"; overwrites season and episode
        // together, episode count only when the total is present.
        if let Ok(re) = Regex::new(r"(?i)kausi (\d+)[,.] (?:jakso |osa )?(\d+)(?:/(\d+))?[., ]?") {
            if let Some(caps) = re.captures(description) {
                info.season = parse_group(&caps, 1);
                info.episode = parse_group(&caps, 2);
                if caps.get(3).is_some() {
                    info.episode_count = parse_group(&caps, 3);
                }
            }
        }

        info
    }
}

fn parse_group(caps: &regex::Captures<'_>, index: usize) -> u32 {
    caps.get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}
