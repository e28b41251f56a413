//! Post registry and index listing.

use std::fmt::Display;

use chrono::{DateTime, Utc};
use folio_md::{Article, Discussion, RenderError, Renderer};
use serde::Serialize;

/// Articles whose canonical page is not the directory index.
const LANDING_PAGES: &[(&str, &str)] = &[("webp-the-webpage-compression-format", "index.html")];

/// Every article of the site. Only constructible from a complete, fully
/// parsed collection.
#[derive(Debug, Clone, Default)]
pub struct PostRegistry {
    articles: Vec<Article>,
}

/// One entry of the index page and the feed.
#[derive(Debug, Clone, Serialize)]
pub struct ListingEntry {
    pub title: String,
    pub path: String,
    /// Absolute URL of the article page
    pub link: String,
    pub time: String,
    #[serde(skip)]
    pub time_value: DateTime<Utc>,
    /// Rendered intro
    pub excerpt_html: String,
    /// Intro with markup stripped
    pub excerpt_text: String,
    pub discussions: Vec<Discussion>,
}

impl PostRegistry {
    /// Collect parse results into a registry. Fails if any article failed to
    /// parse, naming every failure.
    pub fn collect<I, E>(results: I) -> Result<Self, AggregationError>
    where
        I: IntoIterator<Item = (String, Result<Article, E>)>,
        E: Display,
    {
        let mut articles = Vec::new();
        let mut failures = Vec::new();

        for (path, result) in results {
            match result {
                Ok(article) => articles.push(article),
                Err(e) => failures.push((path, e.to_string())),
            }
        }

        if failures.is_empty() {
            Ok(Self { articles })
        } else {
            Err(AggregationError { failures })
        }
    }

    pub fn from_articles(articles: Vec<Article>) -> Self {
        Self { articles }
    }

    /// All articles, drafts included, in encounter order.
    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    /// Non-draft articles, newest first. Articles with the same time keep
    /// their encounter order.
    pub fn published(&self) -> Vec<&Article> {
        let mut published: Vec<&Article> = self.articles.iter().filter(|a| !a.draft).collect();
        published.sort_by(|a, b| b.time_value.cmp(&a.time_value));
        published
    }

    /// Build the index listing, rendering each intro as an excerpt.
    pub fn listing(
        &self,
        renderer: &Renderer<'_>,
        base_url: &str,
    ) -> Result<Vec<ListingEntry>, RenderError> {
        self.published()
            .into_iter()
            .map(|article| {
                let excerpt = renderer.render_excerpt(&article.intro)?;
                Ok(ListingEntry {
                    title: article.title.clone(),
                    path: article.path.clone(),
                    link: canonical_link(base_url, &article.path),
                    time: article.time_display.clone(),
                    time_value: article.time_value,
                    excerpt_html: excerpt.to_html(),
                    excerpt_text: excerpt.to_plain_text(),
                    discussions: article.discussions.clone(),
                })
            })
            .collect()
    }
}

/// Absolute URL of an article page.
pub fn canonical_link(base_url: &str, path: &str) -> String {
    let suffix = LANDING_PAGES
        .iter()
        .find(|(landing, _)| *landing == path)
        .map_or("", |&(_, suffix)| suffix);
    format!("{}/{}/{}", base_url.trim_end_matches('/'), path.trim_matches('/'), suffix)
}

/// Aggregation was attempted while some articles had failed to parse.
#[derive(Debug, thiserror::Error)]
#[error("Cannot aggregate posts, {} article(s) failed: {}", failures.len(), describe(failures))]
pub struct AggregationError {
    pub failures: Vec<(String, String)>,
}

fn describe(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(path, message)| format!("{path}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_md::{Highlighter, ToolchainError, Typesetter};
    use pretty_assertions::assert_eq;

    struct NoTypesetter;

    impl Typesetter for NoTypesetter {
        fn typeset(&self, _tex: &str) -> Result<String, ToolchainError> {
            Ok("<svg></svg>".to_string())
        }
    }

    fn article(path: &str, time: &str, draft: bool) -> Article {
        let source = format!(
            "---\ntitle: Post {path}\ntime: {time}\ndraft: {draft}\nintro: Intro of *{path}*.\n---\nBody\n"
        );
        Article::parse(path, &source).unwrap()
    }

    #[test]
    fn lists_newest_first_without_drafts() {
        let registry = PostRegistry::from_articles(vec![
            article("first", "1 Jan 2024", false),
            article("fifth", "5 Jan 2024", false),
            article("tenth", "10 Jan 2024", true),
        ]);

        let paths: Vec<&str> = registry.published().iter().map(|a| a.path.as_str()).collect();

        assert_eq!(paths, vec!["fifth", "first"]);
        assert_eq!(registry.articles().len(), 3);
    }

    #[test]
    fn equal_times_keep_encounter_order() {
        let registry = PostRegistry::from_articles(vec![
            article("b", "1 Jan 2024", false),
            article("a", "1 Jan 2024", false),
            article("c", "2 Jan 2024", false),
        ]);

        for _ in 0..3 {
            let paths: Vec<&str> = registry.published().iter().map(|a| a.path.as_str()).collect();
            assert_eq!(paths, vec!["c", "b", "a"]);
        }
    }

    #[test]
    fn collect_fails_on_any_parse_error() {
        let results = vec![
            ("good".to_string(), Article::parse("good", "---\ntitle: A\ntime: 1 Jan 2024\n---\n")),
            ("bad".to_string(), Article::parse("bad", "no front matter")),
        ];

        let error = PostRegistry::collect(results).unwrap_err();

        assert_eq!(error.failures.len(), 1);
        assert_eq!(error.failures[0].0, "bad");
        assert!(error.to_string().contains("bad: Malformed source"));
    }

    #[test]
    fn listing_renders_excerpts() {
        let highlighter = Highlighter::new();
        let renderer = Renderer::new(&highlighter, &NoTypesetter);
        let registry = PostRegistry::from_articles(vec![article("post", "1 Jan 2024", false)]);

        let listing = registry.listing(&renderer, "https://example.com/blog/").unwrap();

        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].link, "https://example.com/blog/post/");
        assert_eq!(listing[0].excerpt_html, "<p>Intro of <em>post</em>.</p>\n");
        assert_eq!(listing[0].excerpt_text, "Intro of post.");
    }

    #[test]
    fn canonical_links() {
        assert_eq!(
            canonical_link("https://example.com/blog", "ru/the-ram-myth"),
            "https://example.com/blog/ru/the-ram-myth/"
        );
        assert_eq!(
            canonical_link("https://example.com/blog/", "webp-the-webpage-compression-format"),
            "https://example.com/blog/webp-the-webpage-compression-format/index.html"
        );
    }
}
