//! Filename sanitizer for loosely-named release files
//!
//! Turns names like:
//! - "Le.Film.2019.mkv"
//! - "Title (2020) [1080p].mkv"
//! - "Show.S02E05.720p-GROUP.mkv"
//!
//! into a clean search title plus a year (movies) or season/episode (TV).
//! Everything here is pure text processing.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Runs of anything that is not a letter, an ASCII digit or whitespace
static SPECIAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}0-9\s]+").expect("valid special chars regex"));

/// Resolution markers such as 720p, 1080p, 2160p or 1080i
static QUALITY_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d{3,4}[pi]\b").expect("valid quality regex"));

/// Leading title followed by the first 4-digit run
static MOVIE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)(\d{4})").expect("valid movie regex"));

/// Leading title, optional season marker and number, optional episode marker,
/// then an episode number of at least two digits
static TV_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)[sS]?(\d+)?[eExX]?(\d{2,})").expect("valid tv regex")
});

/// Season used when the filename carries no season number
pub const DEFAULT_SEASON: u32 = 1;

/// Parsed movie filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMovie {
    pub title: String,
    pub year: Option<u32>,
}

/// Parsed TV episode filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEpisode {
    pub title: String,
    pub season: u32,
    pub episode: u32,
}

/// Strip the extension, fold accents, blank out tags and punctuation,
/// drop resolution markers and collapse whitespace.
pub fn clean_filename(filename: &str) -> String {
    let stem = strip_extension(filename);
    let folded = remove_accents(stem);
    let spaced = SPECIAL_CHARS.replace_all(&folded, " ");
    tidy(&spaced)
}

/// Parse a movie filename into a title and an optional release year
pub fn sanitize_movie_filename(filename: &str) -> ParsedMovie {
    let cleaned = clean_filename(filename);

    let parsed = match MOVIE_YEAR.captures(&cleaned) {
        Some(caps) => ParsedMovie {
            title: tidy(&caps[1]),
            year: caps[2].parse().ok(),
        },
        None => ParsedMovie {
            title: cleaned.clone(),
            year: None,
        },
    };

    debug!(filename, title = %parsed.title, year = ?parsed.year, "Sanitized movie filename");
    parsed
}

/// Parse a TV filename into a show title, season and episode number.
///
/// When nothing matches the whole cleaned name is the title, the season is
/// [`DEFAULT_SEASON`] and the episode is 0.
pub fn sanitize_tv_filename(filename: &str) -> ParsedEpisode {
    let cleaned = clean_filename(filename);

    let parsed = match TV_EPISODE.captures(&cleaned) {
        Some(caps) => ParsedEpisode {
            title: tidy(&caps[1]),
            season: caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(DEFAULT_SEASON),
            episode: caps[3].parse().unwrap_or(0),
        },
        None => ParsedEpisode {
            title: cleaned.clone(),
            season: DEFAULT_SEASON,
            episode: 0,
        },
    };

    debug!(
        filename,
        title = %parsed.title,
        season = parsed.season,
        episode = parsed.episode,
        "Sanitized TV filename"
    );
    parsed
}

/// Drop resolution markers and collapse whitespace. Also applied to captured
/// titles, since cutting a name short can expose a marker like "720p".
fn tidy(s: &str) -> String {
    let without_quality = QUALITY_MARKERS.replace_all(s, " ");
    without_quality.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove the last `.ext` suffix, if any
fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) => &filename[..idx],
        None => filename,
    }
}

/// Decompose and drop combining marks so "é" matches "e"
fn remove_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_movie_with_year_and_tags() {
        let parsed = sanitize_movie_filename("Title (2020) [1080p].mkv");
        assert_eq!(parsed.title, "Title");
        assert_eq!(parsed.year, Some(2020));
    }

    #[test]
    fn test_movie_dotted_name() {
        let parsed = sanitize_movie_filename("Le.Film.2019.mkv");
        assert_eq!(parsed.title, "Le Film");
        assert_eq!(parsed.year, Some(2019));
    }

    #[test]
    fn test_movie_first_year_wins() {
        let parsed = sanitize_movie_filename("Blade.Runner.2049.2017.mkv");
        assert_eq!(parsed.title, "Blade Runner");
        assert_eq!(parsed.year, Some(2049));
    }

    #[test]
    fn test_movie_without_year() {
        let parsed = sanitize_movie_filename("Some_Movie-GROUP.mp4");
        assert_eq!(parsed.title, "Some Movie GROUP");
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_movie_resolution_is_not_a_year() {
        let parsed = sanitize_movie_filename("Another Movie 1080p.mkv");
        assert_eq!(parsed.title, "Another Movie");
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_movie_accents_are_folded() {
        let parsed = sanitize_movie_filename("Amélie.Poulain.2001.avi");
        assert_eq!(parsed.title, "Amelie Poulain");
        assert_eq!(parsed.year, Some(2001));
    }

    #[test]
    fn test_tv_season_and_episode() {
        let parsed = sanitize_tv_filename("Show.S02E05.mkv");
        assert_eq!(parsed.title, "Show");
        assert_eq!(parsed.season, 2);
        assert_eq!(parsed.episode, 5);
    }

    #[test]
    fn test_tv_default_season() {
        let parsed = sanitize_tv_filename("Show.E05.mkv");
        assert_eq!(parsed.title, "Show");
        assert_eq!(parsed.season, DEFAULT_SEASON);
        assert_eq!(parsed.episode, 5);
    }

    #[test]
    fn test_tv_cross_notation() {
        let parsed = sanitize_tv_filename("The Office 3x12 720p.mkv");
        assert_eq!(parsed.title, "The Office");
        assert_eq!(parsed.season, 3);
        assert_eq!(parsed.episode, 12);
    }

    #[test]
    fn test_tv_unmatched_keeps_whole_title() {
        let parsed = sanitize_tv_filename("Just A Title.mkv");
        assert_eq!(parsed.title, "Just A Title");
        assert_eq!(parsed.season, DEFAULT_SEASON);
        assert_eq!(parsed.episode, 0);
    }

    #[test]
    fn test_clean_filename_strips_noise() {
        assert_eq!(
            clean_filename("[Group] Série  Été - 720p (VOSTFR).mkv"),
            "Group Serie Ete VOSTFR"
        );
    }

    proptest! {
        #[test]
        fn prop_clean_is_idempotent(name in "[A-Za-z0-9éèàç ._()\\[\\]-]{0,40}") {
            let once = clean_filename(&name);
            prop_assert_eq!(clean_filename(&once), once);
        }

        #[test]
        fn prop_movie_title_is_stable(name in "[A-Za-z0-9éèàç ._()\\[\\]-]{0,40}") {
            let title = sanitize_movie_filename(&name).title;
            prop_assert_eq!(sanitize_movie_filename(&title).title, title);
        }

        #[test]
        fn prop_movie_year_is_extracted(
            title in "[A-Z][a-z]{2,10}",
            year in 1900u32..2100,
        ) {
            let parsed = sanitize_movie_filename(&format!("{title} ({year}) [1080p].mkv"));
            prop_assert!(parsed.title.contains(&title));
            prop_assert_eq!(parsed.year, Some(year));
        }
    }
}
