//! Search query construction.
//!
//! The search endpoint rejects queries longer than 250 characters, so the
//! structured query shortens the title first (at a word boundary when it
//! can) and only touches the artist when the artist alone is too long.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest `q` the search endpoint accepts.
pub const MAX_QUERY_CHARS: usize = 250;

/// Room kept for the ` track:` separator.
const SEPARATOR_SLACK: usize = 10;

const ARTIST_PREFIX: &str = "artist:";

/// Anything that is not a word character or whitespace.
static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// `(feat. X)`, `[Remastered 2011]` and similar qualifiers.
static QUALIFIERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("static regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

fn take_chars(value: &str, count: usize) -> String {
    value.chars().take(count).collect()
}

/// Shorten `(artist, title)` so that `artist:{artist} track:{title}` fits
/// the query ceiling.
///
/// The title budget is `250 - len("artist:" + artist) - 10`. An over-long
/// title is cut to the budget and then back to its last space, if any. When
/// the artist leaves no budget, the artist is cut and the title dropped.
pub fn truncate_for_query(artist: &str, title: &str) -> (String, String) {
    let artist_len = ARTIST_PREFIX.len() + artist.chars().count();
    let budget = MAX_QUERY_CHARS.saturating_sub(artist_len + SEPARATOR_SLACK);

    if budget == 0 {
        let artist_budget = MAX_QUERY_CHARS - ARTIST_PREFIX.len() - SEPARATOR_SLACK;
        return (take_chars(artist, artist_budget), String::new());
    }

    if title.chars().count() <= budget {
        return (artist.to_string(), title.to_string());
    }

    let cut = take_chars(title, budget);
    let shortened = match cut.rfind(' ') {
        Some(idx) => cut[..idx].to_string(),
        None => cut,
    };
    (artist.to_string(), shortened)
}

/// `artist:{artist} track:{title}`, length-capped.
pub fn structured_query(artist: &str, title: &str) -> String {
    let (artist, title) = truncate_for_query(artist, title);
    if title.is_empty() {
        format!("{}{}", ARTIST_PREFIX, artist)
    } else {
        format!("{}{} track:{}", ARTIST_PREFIX, artist, title)
    }
}

/// Drop punctuation and trim.
pub fn strip_punctuation(value: &str) -> String {
    PUNCTUATION.replace_all(value, "").trim().to_string()
}

/// Free-text `"{artist} {title}"` with qualifiers and punctuation removed.
pub fn fuzzy_query(artist: &str, title: &str) -> String {
    let title = QUALIFIERS.replace_all(title, " ");
    let combined = format!(
        "{} {}",
        PUNCTUATION.replace_all(artist, ""),
        PUNCTUATION.replace_all(&title, "")
    );
    let collapsed = WHITESPACE.replace_all(combined.trim(), " ").to_string();
    take_chars(&collapsed, MAX_QUERY_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_query_untouched() {
        assert_eq!(
            structured_query("ABBA", "Dancing Queen"),
            "artist:ABBA track:Dancing Queen"
        );
    }

    #[test]
    fn test_long_title_cut_at_word_boundary() {
        let artist = "Artist";
        let title = "word ".repeat(60);
        let (_, shortened) = truncate_for_query(artist, &title);

        let budget = MAX_QUERY_CHARS - "artist:Artist".len() - SEPARATOR_SLACK;
        assert!(shortened.chars().count() <= budget);
        assert!(shortened.ends_with("word"));
        assert!(structured_query(artist, &title).chars().count() <= MAX_QUERY_CHARS);
    }

    #[test]
    fn test_long_title_without_spaces_is_hard_cut() {
        let title = "x".repeat(400);
        let (_, shortened) = truncate_for_query("A", &title);

        assert_eq!(
            shortened.len(),
            MAX_QUERY_CHARS - "artist:A".len() - SEPARATOR_SLACK
        );
    }

    #[test]
    fn test_oversized_artist_drops_title() {
        let artist = "a".repeat(300);
        let query = structured_query(&artist, "Song");

        assert!(!query.contains("track:"));
        assert!(query.chars().count() <= MAX_QUERY_CHARS);
    }

    #[test]
    fn test_fuzzy_query_strips_qualifiers_and_punctuation() {
        assert_eq!(
            fuzzy_query("Guns N' Roses", "Sweet Child O' Mine (Remastered) [Live]"),
            "Guns N Roses Sweet Child O Mine"
        );
        assert_eq!(
            fuzzy_query("Daft Punk", "Get Lucky (feat. Pharrell Williams)"),
            "Daft Punk Get Lucky"
        );
    }

    #[test]
    fn test_fuzzy_query_keeps_unicode_words() {
        assert_eq!(fuzzy_query("Björk", "Jóga!"), "Björk Jóga");
    }

    #[test]
    fn test_strip_punctuation() {
        assert_eq!(strip_punctuation("  Mr. Brightside! "), "Mr Brightside");
    }
}
