//! # Track Matcher
//!
//! Picks one destination candidate for a source record.
//!
//! Tiers, checked in order and case-insensitively:
//!
//! 1. **Exact**: artist and title both equal.
//! 2. **Similar**: after stripping punctuation, each of artist and title is
//!    contained in its counterpart (either direction).
//! 3. **Fallback**: the first search result.
//!
//! The matcher is deliberately permissive: any non-empty result list yields a
//! match. Only an empty list leaves the record unmatched.

use bridge_traits::catalog::{CandidateMatch, SourceRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Similar,
    Fallback,
}

impl MatchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchTier::Exact => "exact",
            MatchTier::Similar => "similar",
            MatchTier::Fallback => "fallback",
        }
    }
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A selected candidate and the tier that selected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMatch {
    pub candidate: CandidateMatch,
    pub tier: MatchTier,
}

/// Match tallies for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStats {
    pub exact: usize,
    pub similar: usize,
    pub fallback: usize,
}

impl MatchStats {
    pub fn record(&mut self, tier: MatchTier) {
        match tier {
            MatchTier::Exact => self.exact += 1,
            MatchTier::Similar => self.similar += 1,
            MatchTier::Fallback => self.fallback += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.exact + self.similar + self.fallback
    }
}

fn normalize(value: &str) -> String {
    PUNCTUATION
        .replace_all(&value.to_lowercase(), "")
        .trim()
        .to_string()
}

/// Containment in either direction after punctuation stripping.
pub fn similar(left: &str, right: &str) -> bool {
    let left = normalize(left);
    let right = normalize(right);
    left.contains(&right) || right.contains(&left)
}

fn exact(record: &SourceRecord, candidate: &CandidateMatch) -> bool {
    candidate.artist.to_lowercase() == record.artist.to_lowercase()
        && candidate.title.to_lowercase() == record.title.to_lowercase()
}

/// Best candidate for `record`, or `None` when `candidates` is empty.
pub fn best_match(record: &SourceRecord, candidates: &[CandidateMatch]) -> Option<TrackMatch> {
    let first = candidates.first()?;

    if let Some(candidate) = candidates.iter().find(|c| exact(record, c)) {
        return Some(TrackMatch {
            candidate: candidate.clone(),
            tier: MatchTier::Exact,
        });
    }

    if let Some(candidate) = candidates
        .iter()
        .find(|c| similar(&c.artist, &record.artist) && similar(&c.title, &record.title))
    {
        return Some(TrackMatch {
            candidate: candidate.clone(),
            tier: MatchTier::Similar,
        });
    }

    Some(TrackMatch {
        candidate: first.clone(),
        tier: MatchTier::Fallback,
    })
}
