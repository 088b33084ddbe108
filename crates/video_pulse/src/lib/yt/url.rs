//! YouTube URL validation.
//!
//! Accepts `youtube.com/watch?v=`, `youtu.be/` and `youtube.com/shorts/`
//! links, with or without scheme and `www.`.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

static YOUTUBE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/|youtube\.com/shorts/)([\w-]+)")
        .unwrap()
});

pub fn validate_url(url: &str) -> bool {
    YOUTUBE_URL_RE.is_match(url.trim())
}

/// Extracts the video id from a supported YouTube URL.
pub fn extract_video_id(url: &str) -> Result<&str, Error> {
    YOUTUBE_URL_RE
        .captures(url.trim())
        .and_then(|cap| cap.get(4))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::InvalidUrl(url.to_string()))
}
