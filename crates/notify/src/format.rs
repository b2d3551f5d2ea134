//! Text helpers for build-result emails: log excerpts and durations.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};

/// Characters of build output kept for an email excerpt.
pub const LOG_TAIL_CHARS: usize = 4096;

/// SGR colour sequences, plus the bare `[31m` residue left when the
/// escape byte was already stripped upstream. A bare residue followed by
/// `]` is bracketed text such as `[5m]` and is kept.
static SGR_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;]*m|\[[0-9]{1,3}(?:;[0-9]{1,3})*m(\])?").expect("SGR pattern is valid")
});

fn strip_sgr(line: &str) -> std::borrow::Cow<'_, str> {
    SGR_ESCAPE.replace_all(line, |caps: &Captures<'_>| {
        if caps.get(1).is_some() {
            caps[0].to_string()
        } else {
            String::new()
        }
    })
}

/// Body format of an outgoing email.
///
/// Deserializes like [`From<&str>`]: unknown values mean HTML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum EmailFormat {
    Plaintext,
    #[default]
    Html,
}

impl EmailFormat {
    fn line_end(self) -> &'static str {
        match self {
            Self::Plaintext => "\n",
            Self::Html => "<br>\n",
        }
    }
}

/// Only `"plaintext"` selects plaintext; every other value means HTML.
impl From<&str> for EmailFormat {
    fn from(value: &str) -> Self {
        if value == "plaintext" {
            Self::Plaintext
        } else {
            Self::Html
        }
    }
}

impl From<String> for EmailFormat {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl FromStr for EmailFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for EmailFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plaintext => f.write_str("plaintext"),
            Self::Html => f.write_str("html"),
        }
    }
}

/// Format the tail of a job's merged stdout/stderr for an email body.
///
/// Keeps the last [`LOG_TAIL_CHARS`] characters, trims surrounding
/// whitespace, strips colour escapes and prefixes every line with a
/// space. Lines end in `\n` for plaintext and `<br>\n` for HTML.
pub fn format_stdmerged(stdmerged: &str, format: impl Into<EmailFormat>) -> String {
    let line_end = format.into().line_end();

    let total = stdmerged.chars().count();
    let skip = total.saturating_sub(LOG_TAIL_CHARS);
    let start = stdmerged
        .char_indices()
        .nth(skip)
        .map_or(stdmerged.len(), |(idx, _)| idx);

    let tail = stdmerged[start..].trim();
    if tail.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(tail.len() + tail.lines().count() * (1 + line_end.len()));
    for line in tail.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        out.push(' ');
        out.push_str(&strip_sgr(line));
        out.push_str(line_end);
    }
    out
}

/// Human-readable duration between two millisecond timestamps.
///
/// Over a minute renders as `"2m 5s"`, otherwise as `"45s"`. A finish
/// before the start counts as zero.
pub fn elapsed_time(start_ms: i64, finish_ms: i64) -> String {
    let secs = finish_ms.saturating_sub(start_ms).max(0) as f64 / 1000.0;

    if secs > 60.0 {
        format!("{}m {}s", (secs / 60.0).floor() as u64, (secs % 60.0).round() as u64)
    } else {
        format!("{}s", secs.round() as u64)
    }
}

/// [`elapsed_time`] for `chrono` timestamps.
pub fn elapsed_between(start: DateTime<Utc>, finish: DateTime<Utc>) -> String {
    elapsed_time(start.timestamp_millis(), finish.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plaintext_lines_get_prefix_and_newline() {
        assert_eq!(format_stdmerged("line1\nline2", "plaintext"), " line1\n line2\n");
    }

    #[test]
    fn html_lines_get_break() {
        assert_eq!(
            format_stdmerged("line1\nline2", EmailFormat::Html),
            " line1<br>\n line2<br>\n"
        );
    }

    #[test]
    fn unknown_format_is_html() {
        assert_eq!(format_stdmerged("ok", "markdown"), " ok<br>\n");
        assert_eq!(EmailFormat::from("PLAINTEXT"), EmailFormat::Html);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            format_stdmerged("\n\n  npm test\n\n", "plaintext"),
            " npm test\n"
        );
    }

    #[test]
    fn inner_blank_lines_are_kept() {
        assert_eq!(format_stdmerged("a\n\nb", "plaintext"), " a\n \n b\n");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(format_stdmerged("", "plaintext"), "");
        assert_eq!(format_stdmerged(" \n\t ", "html"), "");
    }

    #[test]
    fn colour_escapes_are_stripped() {
        assert_eq!(
            format_stdmerged("\u{1b}[31mred text\u{1b}[0m", "plaintext"),
            " red text\n"
        );
    }

    #[test]
    fn compound_and_bare_escapes_are_stripped() {
        assert_eq!(
            format_stdmerged("\u{1b}[1;32mPASS\u{1b}[m [90m3 tests[39m", "plaintext"),
            " PASS 3 tests\n"
        );
    }

    #[test]
    fn brackets_in_regular_text_survive() {
        assert_eq!(
            format_stdmerged("items[0] = map[model]", "plaintext"),
            " items[0] = map[model]\n"
        );
    }

    #[test]
    fn bracketed_durations_survive() {
        assert_eq!(
            format_stdmerged("retry after [5m] elapsed", "plaintext"),
            " retry after [5m] elapsed\n"
        );
        assert_eq!(
            format_stdmerged("\u{1b}[33mwarn\u{1b}[0m backoff [10m]", "plaintext"),
            " warn backoff [10m]\n"
        );
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(format_stdmerged("a\r\nb\r\n", "plaintext"), " a\n b\n");
    }

    #[test]
    fn oversized_input_keeps_only_the_tail() {
        let buffer = "a".repeat(5000);
        let out = format_stdmerged(&buffer, "html");
        assert_eq!(out, format!(" {}<br>\n", "a".repeat(LOG_TAIL_CHARS)));
    }

    #[test]
    fn truncation_keeps_the_last_lines() {
        let log: String = (0..2000).map(|i| format!("step {i}\n")).collect();
        let out = format_stdmerged(&log, "plaintext");
        assert!(out.ends_with(" step 1999\n"));
        assert!(!out.contains(" step 1\n"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let buffer = format!("{}{}", "x".repeat(10), "é".repeat(LOG_TAIL_CHARS));
        let out = format_stdmerged(&buffer, "plaintext");
        assert_eq!(out, format!(" {}\n", "é".repeat(LOG_TAIL_CHARS)));
    }

    #[test]
    fn format_parsing_and_display() {
        assert_eq!("plaintext".parse::<EmailFormat>(), Ok(EmailFormat::Plaintext));
        assert_eq!(EmailFormat::Plaintext.to_string(), "plaintext");
        assert_eq!(EmailFormat::default(), EmailFormat::Html);
    }

    #[test]
    fn elapsed_under_a_minute() {
        assert_eq!(elapsed_time(0, 45_000), "45s");
        assert_eq!(elapsed_time(1_000, 1_400), "0s");
        assert_eq!(elapsed_time(0, 1_500), "2s");
    }

    #[test]
    fn elapsed_over_a_minute() {
        assert_eq!(elapsed_time(0, 90_000), "1m 30s");
        assert_eq!(elapsed_time(0, 125_000), "2m 5s");
    }

    #[test]
    fn exactly_sixty_seconds_stays_in_seconds() {
        assert_eq!(elapsed_time(0, 60_000), "60s");
        assert_eq!(elapsed_time(0, 60_400), "1m 0s");
    }

    #[test]
    fn negative_elapsed_is_zero() {
        assert_eq!(elapsed_time(10_000, 5_000), "0s");
    }

    #[test]
    fn elapsed_between_datetimes() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let finish = Utc.with_ymd_and_hms(2024, 3, 1, 12, 3, 20).unwrap();
        assert_eq!(elapsed_between(start, finish), "3m 20s");
    }
}
