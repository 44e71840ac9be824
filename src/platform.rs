use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::EngineError;

/// Streaming platforms the engine knows how to open. `Social` entries pass
/// the allow-list but have no first-class embed support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Platform {
    YouTube,
    Twitch,
    Vimeo,
    Streamable,
    DirectFile,
    Social,
}

/// Result of URL normalization. `limited` marks the degraded mode where the
/// platform is accepted but the URL passes through unchanged.
#[derive(Debug, Clone)]
pub struct Embed {
    pub url: String,
    pub platform: Platform,
    pub limited: bool,
}

// Order matters: the embed hosts (player.twitch.tv, player.vimeo.com) must
// re-classify to their platform so normalization stays idempotent.
static PLATFORM_RULES: Lazy<Vec<(Platform, Regex)>> = Lazy::new(|| {
    vec![
        (
            Platform::YouTube,
            Regex::new(r"(?i)(youtube\.com/(watch\?|live/|shorts/|embed/)|youtu\.be/)").unwrap(),
        ),
        (
            Platform::Twitch,
            Regex::new(r"(?i)(player\.)?twitch\.tv/").unwrap(),
        ),
        (
            Platform::Vimeo,
            Regex::new(r"(?i)(player\.)?vimeo\.com/").unwrap(),
        ),
        (
            Platform::Streamable,
            Regex::new(r"(?i)streamable\.com/").unwrap(),
        ),
        (
            Platform::DirectFile,
            Regex::new(r"(?i)\.(mp4|webm|ogg|mov|m3u8)(\?\S*)?$").unwrap(),
        ),
        (
            Platform::Social,
            // `x.com` needs a boundary or every domain ending in `x` matches.
            Regex::new(r"(?i)(twitter\.com|(//|\.)x\.com|instagram\.com|facebook\.com|tiktok\.com)/")
                .unwrap(),
        ),
    ]
});

pub fn classify(url: &str) -> Option<Platform> {
    PLATFORM_RULES
        .iter()
        .find(|(_, re)| re.is_match(url))
        .map(|(p, _)| *p)
}

pub fn is_supported(url: &str) -> bool {
    classify(url).is_some()
}

/// Rewrites a supported URL into its embeddable form. The muted-autoplay
/// variant is what lurk tabs use.
pub fn to_embeddable(url: &str, autoplay_muted: bool) -> Result<Embed, EngineError> {
    let platform =
        classify(url).ok_or_else(|| EngineError::Extraction(url.to_string()))?;

    let embed_url = match platform {
        Platform::YouTube => {
            let id = extract_youtube_id(url)?;
            let mut out = format!(
                "https://www.youtube.com/embed/{}?rel=0&modestbranding=1&controls=1&showinfo=0",
                urlencoding::encode(&id)
            );
            if autoplay_muted {
                out.push_str("&autoplay=1&mute=1");
            }
            out
        }
        Platform::Twitch => {
            let mut out = match extract_twitch_id(url)? {
                TwitchId::Video(id) => {
                    format!("https://player.twitch.tv/?video={}&parent=localhost", id)
                }
                TwitchId::Channel(name) => format!(
                    "https://player.twitch.tv/?channel={}&parent=localhost",
                    urlencoding::encode(&name)
                ),
            };
            if autoplay_muted {
                out.push_str("&muted=true&autoplay=true");
            }
            out
        }
        Platform::Vimeo => {
            let id = extract_vimeo_id(url)?;
            let mut out = format!("https://player.vimeo.com/video/{}", id);
            if autoplay_muted {
                out.push_str("?autoplay=1&muted=1");
            }
            out
        }
        Platform::Streamable => {
            let code = extract_streamable_code(url)?;
            let mut out = format!("https://streamable.com/e/{}", code);
            if autoplay_muted {
                out.push_str("?autoplay=1&muted=1");
            }
            out
        }
        // A direct file plays inline as-is.
        Platform::DirectFile => url.to_string(),
        // Accepted as a URL but not embeddable: pass through, flag it.
        Platform::Social => {
            return Ok(Embed {
                url: url.to_string(),
                platform,
                limited: true,
            })
        }
    };

    Ok(Embed {
        url: embed_url,
        platform,
        limited: false,
    })
}

enum TwitchId {
    Channel(String),
    Video(String),
}

/// Slice after the first occurrence of `marker`.
fn after<'a>(url: &'a str, marker: &str) -> Option<&'a str> {
    url.find(marker).map(|i| &url[i + marker.len()..])
}

/// Identifier terminators across all the platforms' URL shapes.
fn take_id(s: &str) -> &str {
    s.split(['?', '&', '/', '#']).next().unwrap_or("")
}

fn nonempty(id: &str, url: &str) -> Result<String, EngineError> {
    if id.is_empty() {
        Err(EngineError::Extraction(url.to_string()))
    } else {
        Ok(id.to_string())
    }
}

fn extract_youtube_id(url: &str) -> Result<String, EngineError> {
    let raw = after(url, "v=")
        .or_else(|| after(url, "youtu.be/"))
        .or_else(|| after(url, "live/"))
        .or_else(|| after(url, "shorts/"))
        .or_else(|| after(url, "embed/"))
        .ok_or_else(|| EngineError::Extraction(url.to_string()))?;
    nonempty(take_id(raw), url)
}

fn extract_twitch_id(url: &str) -> Result<TwitchId, EngineError> {
    // Embed form first so re-normalization finds the same identifier.
    if let Some(raw) = after(url, "channel=") {
        return Ok(TwitchId::Channel(nonempty(take_id(raw), url)?));
    }
    if let Some(raw) = after(url, "video=") {
        return Ok(TwitchId::Video(nonempty(take_id(raw), url)?));
    }
    if let Some(raw) = after(url, "twitch.tv/videos/") {
        return Ok(TwitchId::Video(nonempty(take_id(raw), url)?));
    }
    if let Some(raw) = after(url, "twitch.tv/") {
        return Ok(TwitchId::Channel(nonempty(take_id(raw), url)?));
    }
    Err(EngineError::Extraction(url.to_string()))
}

fn extract_vimeo_id(url: &str) -> Result<String, EngineError> {
    let raw = after(url, "player.vimeo.com/video/")
        .or_else(|| after(url, "vimeo.com/"))
        .ok_or_else(|| EngineError::Extraction(url.to_string()))?;
    nonempty(take_id(raw), url)
}

fn extract_streamable_code(url: &str) -> Result<String, EngineError> {
    let raw = after(url, "streamable.com/e/")
        .or_else(|| after(url, "streamable.com/"))
        .ok_or_else(|| EngineError::Extraction(url.to_string()))?;
    nonempty(take_id(raw), url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_watch_embed() {
        let embed = to_embeddable("https://youtube.com/watch?v=abc123", false).unwrap();
        assert_eq!(
            embed.url,
            "https://www.youtube.com/embed/abc123?rel=0&modestbranding=1&controls=1&showinfo=0"
        );
        assert_eq!(embed.platform, Platform::YouTube);
        assert!(!embed.limited);
    }

    #[test]
    fn test_youtube_muted_autoplay_variant() {
        let embed = to_embeddable("https://youtu.be/abc123", true).unwrap();
        assert!(embed.url.contains("/embed/abc123?"));
        assert!(embed.url.ends_with("&autoplay=1&mute=1"));
    }

    #[test]
    fn test_youtube_watch_with_extra_query() {
        let embed = to_embeddable("https://www.youtube.com/watch?v=xyz&t=12s", false).unwrap();
        assert!(embed.url.contains("/embed/xyz?"));
    }

    #[test]
    fn test_youtube_live_and_shorts() {
        let live = to_embeddable("https://youtube.com/live/stream1", false).unwrap();
        assert!(live.url.contains("/embed/stream1?"));
        let shorts = to_embeddable("https://youtube.com/shorts/clip9", false).unwrap();
        assert!(shorts.url.contains("/embed/clip9?"));
    }

    #[test]
    fn test_youtube_missing_id_is_extraction_error() {
        let err = to_embeddable("https://youtube.com/watch?list=PL123", false).unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }

    #[test]
    fn test_twitch_channel_and_video() {
        let chan = to_embeddable("https://twitch.tv/somechannel", false).unwrap();
        assert!(chan.url.contains("player.twitch.tv/?channel=somechannel"));
        let vid = to_embeddable("https://www.twitch.tv/videos/123456", true).unwrap();
        assert!(vid.url.contains("?video=123456"));
        assert!(vid.url.contains("muted=true"));
    }

    #[test]
    fn test_vimeo_and_streamable() {
        let v = to_embeddable("https://vimeo.com/998877", false).unwrap();
        assert_eq!(v.url, "https://player.vimeo.com/video/998877");
        let s = to_embeddable("https://streamable.com/ab12cd", false).unwrap();
        assert_eq!(s.url, "https://streamable.com/e/ab12cd");
    }

    #[test]
    fn test_direct_file_passthrough() {
        let f = to_embeddable("https://cdn.example.com/clip.mp4", false).unwrap();
        assert_eq!(f.url, "https://cdn.example.com/clip.mp4");
        assert_eq!(f.platform, Platform::DirectFile);
        assert!(!f.limited);
    }

    #[test]
    fn test_social_is_limited_not_error() {
        let e = to_embeddable("https://twitter.com/someone/status/1", false).unwrap();
        assert!(e.limited);
        assert_eq!(e.url, "https://twitter.com/someone/status/1");
        assert_eq!(e.platform, Platform::Social);
    }

    #[test]
    fn test_unsupported_rejected() {
        assert!(!is_supported("https://example.com/page"));
        assert!(!is_supported("https://mybox.com/page"));
        assert!(!is_supported("not a url"));
        assert!(to_embeddable("https://example.com/page", false).is_err());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for (url, muted) in [
            ("https://youtube.com/watch?v=abc123", false),
            ("https://twitch.tv/somechannel", false),
            ("https://vimeo.com/12345", false),
            ("https://streamable.com/zz99", false),
        ] {
            let once = to_embeddable(url, muted).unwrap();
            let twice = to_embeddable(&once.url, muted).unwrap();
            assert_eq!(once.url, twice.url, "re-normalizing {url} drifted");
        }
    }
}
