// src/ingest/mod.rs
pub mod dedup;
pub mod filter;
pub mod providers;
pub mod score;
pub mod types;
pub mod vocab;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};

use crate::error::IngestError;

pub use filter::{FilterStats, FilterStatus, IngestionFilter};
pub use types::{ItemOutcome, NewsItem, NewsSource, RawNewsItem, RejectReason, Rejection};

/// Normalize text: decode entities, strip tags, straighten quotes, collapse whitespace.
/// Output is capped at `max_chars` characters.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. nbsp)
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

/// Hex SHA-256 of title + content.
pub fn content_hash(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(content.as_bytes());
    hex(&hasher.finalize())
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// First `max` characters of a title, for log lines and diagnostics.
pub fn title_prefix(title: &str, max: usize) -> String {
    title.chars().take(max).collect()
}

/// Resolve a published-at string into the reference timezone.
///
/// Missing or blank timestamps resolve to `now`. Strings carrying an offset are
/// converted; naive strings are read as local time in `tz`.
pub fn parse_published_at(
    raw: Option<&str>,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<DateTime<Tz>, IngestError> {
    let s = match raw.map(str::trim) {
        None | Some("") => return Ok(now.with_timezone(&tz)),
        Some(s) => s,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&tz));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&tz));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_in(tz, naive).ok_or_else(|| IngestError::InvalidTimestamp(s.to_string()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return local_in(tz, naive).ok_or_else(|| IngestError::InvalidTimestamp(s.to_string()));
        }
    }
    Err(IngestError::InvalidTimestamp(s.to_string()))
}

/// Local wall-clock time in `tz`; DST gaps resolve to the earliest valid instant.
fn local_in(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 15, 0, 0).unwrap()
    }

    #[test]
    fn normalize_text_strips_markup_and_ws() {
        let s = "  <b>Solar</b>&nbsp;&nbsp;stocks  “surge”\n\tagain ";
        assert_eq!(normalize_text(s, 100), "Solar stocks \"surge\" again");
    }

    #[test]
    fn normalize_text_caps_length() {
        assert_eq!(normalize_text("abcdef", 3), "abc");
    }

    #[test]
    fn content_hash_is_stable() {
        let a = content_hash("Title", "Body");
        assert_eq!(a, content_hash("Title", "Body"));
        assert_ne!(a, content_hash("Title", "Body!"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn offset_timestamps_are_converted() {
        let ny = chrono_tz::America::New_York;
        let dt = parse_published_at(Some("2025-03-04T15:00:00Z"), ny, now()).unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.timezone(), ny);
    }

    #[test]
    fn naive_timestamps_use_reference_timezone() {
        let ny = chrono_tz::America::New_York;
        let dt = parse_published_at(Some("2025-03-04 10:15:00"), ny, now()).unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 15);
        assert_eq!(dt.with_timezone(&Utc).hour(), 15);
    }

    #[test]
    fn rfc2822_and_missing_timestamps() {
        let ny = chrono_tz::America::New_York;
        let dt = parse_published_at(Some("Tue, 04 Mar 2025 15:30:00 +0000"), ny, now()).unwrap();
        assert_eq!(dt.hour(), 10);
        let dt = parse_published_at(None, ny, now()).unwrap();
        assert_eq!(dt.with_timezone(&Utc), now());
    }

    #[test]
    fn garbage_timestamp_is_an_error() {
        let ny = chrono_tz::America::New_York;
        let err = parse_published_at(Some("yesterday-ish"), ny, now()).unwrap_err();
        assert_eq!(err, IngestError::InvalidTimestamp("yesterday-ish".into()));
    }
}
