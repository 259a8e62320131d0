//! Text rendering for command results.

use bridge_traits::catalog::{SourceRecord, SourceUser, TimePeriod};
use chrono::{TimeZone, Utc};
use core_sync::{ConversionResult, Job};
use std::fmt;

/// Unmatched records listed after a run; the rest are summarized.
pub const UNMATCHED_SHOWN: usize = 10;

const RULE: &str = "==================================================";

pub fn conversion_result(result: &ConversionResult) -> String {
    ResultReport(result).to_string()
}

/// Numbered track list; play counts are shown when the source reports them.
pub fn preview(records: &[SourceRecord]) -> String {
    PreviewList(records).to_string()
}

pub fn user_info(user: &SourceUser) -> String {
    UserReport(user).to_string()
}

pub fn periods() -> String {
    let mut out = String::from("Available time periods for top tracks:\n");
    for period in TimePeriod::ALL {
        out.push_str(&format!("   {:<8} - {}\n", period.as_str(), period.label()));
    }
    out
}

/// One line per job: id, status, progress and message.
pub fn job_line(job: &Job) -> String {
    let line = format!(
        "{}  {:<9} {:>3}%  {}  {}",
        job.id,
        job.status,
        job.progress,
        job.created_at.format("%Y-%m-%d %H:%M"),
        job.message
    );
    match &job.error {
        Some(error) => format!("{} ({})", line, error),
        None => line,
    }
}

struct ResultReport<'a>(&'a ConversionResult);

impl fmt::Display for ResultReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        writeln!(f, "Conversion complete")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Playlist: {}", result.playlist.name)?;
        writeln!(f, "URL: {}", result.playlist.url)?;
        writeln!(f, "Statistics:")?;
        writeln!(f, "   Last.fm tracks: {}", result.total_source_records)?;
        writeln!(f, "   Found on Spotify: {}", result.matched_count)?;
        writeln!(f, "   Added to playlist: {}", result.added_count)?;
        if result.skipped_duplicates > 0 {
            writeln!(f, "   Already present: {}", result.skipped_duplicates)?;
        }
        writeln!(f, "   Match rate: {:.1}%", result.match_rate)?;
        if result.truncated {
            writeln!(f, "   Playlist is full, some tracks were not added")?;
        }

        if result.unmatched.is_empty() {
            return Ok(());
        }
        writeln!(f, "\nTracks not found on Spotify ({}):", result.unmatched.len())?;
        for record in result.unmatched.iter().take(UNMATCHED_SHOWN) {
            writeln!(f, "   - {} - {}", record.artist, record.title)?;
        }
        if result.unmatched.len() > UNMATCHED_SHOWN {
            writeln!(f, "   ... and {} more", result.unmatched.len() - UNMATCHED_SHOWN)?;
        }
        Ok(())
    }
}

struct PreviewList<'a>(&'a [SourceRecord]);

impl fmt::Display for PreviewList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Preview ({} tracks):", self.0.len())?;
        for (i, record) in self.0.iter().enumerate() {
            write!(f, "{:3}. {} - {}", i + 1, record.artist, record.title)?;
            if record.play_count > 0 {
                write!(f, " ({} plays)", record.play_count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

struct UserReport<'a>(&'a SourceUser);

impl fmt::Display for UserReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = self.0;
        let registered = user
            .registered
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string());

        writeln!(f, "Last.fm User: {}", user.username)?;
        writeln!(f, "   Real Name: {}", user.real_name.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "   Country: {}", user.country.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "   Playcount: {}", group_thousands(user.play_count))?;
        writeln!(f, "   Registered: {}", registered.as_deref().unwrap_or("N/A"))?;
        writeln!(f, "   Profile URL: {}", user.url)
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::catalog::PlaylistRef;
    use core_sync::MatchStats;

    fn result_with_unmatched(count: usize) -> ConversionResult {
        ConversionResult {
            playlist: PlaylistRef {
                id: "pl".into(),
                url: "https://open.spotify.com/playlist/pl".into(),
                name: "Mix".into(),
                owner_id: "me".into(),
                is_public: true,
            },
            total_source_records: 20,
            matched_count: 20 - count,
            added_count: 20 - count,
            unmatched: (0..count)
                .map(|i| SourceRecord::new(format!("Artist {}", i), format!("Song {}", i)))
                .collect(),
            match_rate: (20 - count) as f64 / 20.0 * 100.0,
            skipped_duplicates: 0,
            truncated: false,
            match_stats: MatchStats::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_unmatched_list_is_capped() {
        let text = conversion_result(&result_with_unmatched(13));

        assert!(text.contains("Tracks not found on Spotify (13):"));
        assert!(text.contains("Artist 9 - Song 9"));
        assert!(!text.contains("Artist 10 - Song 10"));
        assert!(text.contains("... and 3 more"));
        assert!(text.contains("Match rate: 35.0%"));
    }

    #[test]
    fn test_full_match_has_no_unmatched_section() {
        let text = conversion_result(&result_with_unmatched(0));
        assert!(!text.contains("not found"));
        assert!(!text.contains("more"));
    }

    #[test]
    fn test_preview_numbers_and_play_counts() {
        let mut first = SourceRecord::new("Nina Simone", "Sinnerman");
        first.play_count = 42;
        let second = SourceRecord::new("Can", "Vitamin C");

        let text = preview(&[first, second]);

        assert!(text.contains("  1. Nina Simone - Sinnerman (42 plays)"));
        assert!(text.contains("  2. Can - Vitamin C\n"));
    }

    #[test]
    fn test_periods_lists_all_six() {
        let text = periods();
        assert_eq!(text.lines().count(), 7);
        assert!(text.contains("7day     - 7 days"));
        assert!(text.contains("12month  - 12 months"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_user_info_fills_missing_fields() {
        let user = SourceUser {
            username: "rj".into(),
            real_name: None,
            country: Some("UK".into()),
            play_count: 150316,
            registered: Some(1_037_793_040),
            url: "https://www.last.fm/user/rj".into(),
        };

        let text = user_info(&user);

        assert!(text.contains("Real Name: N/A"));
        assert!(text.contains("Country: UK"));
        assert!(text.contains("Playcount: 150,316"));
        assert!(text.contains("Registered: 2002-11-20"));
    }
}
