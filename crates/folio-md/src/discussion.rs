//! Classification of off-site discussion links.

/// Label used for discussion hosts missing from the table.
pub const UNKNOWN_PLATFORM: &str = "???";

/// Known discussion platforms, matched by URL prefix in order.
const PLATFORMS: &[(&str, &str)] = &[
    ("https://codeforces.com", "Codeforces"),
    ("https://www.reddit.com", "Reddit"),
    ("https://old.reddit.com", "Reddit"),
    ("https://t.me", "Telegram"),
    ("https://news.ycombinator.com", "Hacker News"),
    ("https://lobste.rs", "Lobsters"),
    ("https://habr.com", "Habr"),
];

/// A discussion URL together with its platform label.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Discussion {
    pub url: String,
    pub platform: &'static str,
}

impl Discussion {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let platform = classify(&url);
        Self { url, platform }
    }
}

/// Map a discussion URL to the display label of its platform.
pub fn classify(url: &str) -> &'static str {
    PLATFORMS
        .iter()
        .find(|(prefix, _)| is_rooted_at(url, prefix))
        .map_or(UNKNOWN_PLATFORM, |&(_, label)| label)
}

/// `https://t.me/x` is rooted at `https://t.me`, `https://t.meow.com` is not.
fn is_rooted_at(url: &str, prefix: &str) -> bool {
    match url.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#', ':']),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_platforms() {
        assert_eq!(classify("https://codeforces.com/blog/entry/1"), "Codeforces");
        assert_eq!(classify("https://www.reddit.com/r/rust/comments/x"), "Reddit");
        assert_eq!(classify("https://old.reddit.com/r/rust"), "Reddit");
        assert_eq!(classify("https://t.me/alisa_rummages/42"), "Telegram");
        assert_eq!(classify("https://news.ycombinator.com/item?id=1"), "Hacker News");
        assert_eq!(classify("https://lobste.rs/s/abc"), "Lobsters");
        assert_eq!(classify("https://habr.com/ru/articles/1/"), "Habr");
    }

    #[test]
    fn unknown_hosts_get_placeholder() {
        assert_eq!(classify("https://example.com/post"), UNKNOWN_PLATFORM);
        assert_eq!(classify("https://t.meow.example/x"), UNKNOWN_PLATFORM);
        assert_eq!(classify("http://www.reddit.com/r/rust"), UNKNOWN_PLATFORM);
    }

    #[test]
    fn discussion_keeps_url() {
        let discussion = Discussion::new("https://t.me/channel/1");
        assert_eq!(discussion.url, "https://t.me/channel/1");
        assert_eq!(discussion.platform, "Telegram");
    }
}
