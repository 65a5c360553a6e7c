use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TRACK_URI_RE: Regex = Regex::new(r"^spotify:(track|episode):([A-Za-z0-9]+)$").unwrap();
    static ref OPEN_LINK_RE: Regex =
        Regex::new(r"^https?://open\.spotify\.com/(track|episode)/([A-Za-z0-9]+)").unwrap();
}

/// Render a millisecond duration as `h:m:s` (or `m:s` below one hour) by
/// integer division. No rounding, no zero padding: `0` -> "0:0",
/// `61_000` -> "1:1", `3_600_000` -> "1:0:0".
pub fn format_duration(duration_ms: u64) -> String {
    let total_secs = duration_ms / 1000;
    let seconds = total_secs % 60;
    let minutes = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    if hours > 0 {
        format!("{}:{}:{}", hours, minutes, seconds)
    } else {
        format!("{}:{}", minutes, seconds)
    }
}

/// Recognize a play query that is already a playable reference rather than
/// free text: either a `spotify:track:...`/`spotify:episode:...` URI or an
/// `open.spotify.com` share link. Returns the canonical URI when matched.
pub fn parse_play_uri(query: &str) -> Option<String> {
    let query = query.trim();
    if TRACK_URI_RE.is_match(query) {
        return Some(query.to_string());
    }
    OPEN_LINK_RE
        .captures(query)
        .map(|cap| format!("spotify:{}:{}", &cap[1], &cap[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_boundaries() {
        assert_eq!(format_duration(0), "0:0");
        assert_eq!(format_duration(61_000), "1:1");
        assert_eq!(format_duration(3_600_000), "1:0:0");
        assert_eq!(format_duration(125_000), "2:5");
        // truncation, never rounding
        assert_eq!(format_duration(59_999), "0:59");
    }

    #[test]
    fn recognizes_uris_and_links() {
        assert_eq!(
            parse_play_uri("spotify:track:2TpxZ7JUBn3uw46aR7qd6V").as_deref(),
            Some("spotify:track:2TpxZ7JUBn3uw46aR7qd6V")
        );
        assert_eq!(
            parse_play_uri("https://open.spotify.com/episode/abc123?si=xyz").as_deref(),
            Some("spotify:episode:abc123")
        );
        assert_eq!(parse_play_uri("never gonna give you up"), None);
        // album links are collections, not directly queueable
        assert_eq!(parse_play_uri("https://open.spotify.com/album/abc123"), None);
    }
}
