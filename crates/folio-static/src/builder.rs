//! Static site builder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use walkdir::WalkDir;

use folio_md::{
    Article, ArticleError, DirectoryAssets, Highlighter, LatexToolchain, RenderError, Renderer,
    Typesetter,
};

use crate::feed::{Feed, FeedError, SiteInfo};
use crate::registry::{canonical_link, AggregationError, PostRegistry};
use crate::templates::{ArticlePage, IndexPage, TemplateEngine, TranslationLink};

/// Name of the article source file inside each article directory.
const SOURCE_FILE: &str = "index.md";

/// Configuration for building the site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory holding one subdirectory per article
    pub content_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Locale subdirectories of `content_dir` that hold translated articles
    pub locales: Vec<String>,

    pub site: SiteInfo,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            locales: vec!["ru".to_string()],
            site: SiteInfo::default(),
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of article pages generated
    pub pages: usize,

    /// Number of articles on the index page and in the feed
    pub listed: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// An article source found in the content directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Article path, e.g. `the-ram-myth` or `ru/the-ram-myth`
    pub path: String,
    pub file: PathBuf,
}

/// Errors that can occur during build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Failed to read content: {0}")]
    ReadError(String),

    #[error("{path}: {source}")]
    Article { path: String, source: ArticleError },

    #[error("Failed to render {path}: {source}")]
    Render { path: String, source: RenderError },

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("Failed to write output: {0}")]
    WriteError(String),
}

/// Builds article pages, the index page and the feed.
pub struct SiteBuilder {
    config: BuildConfig,
    highlighter: Highlighter,
    typesetter: Box<dyn Typesetter>,
    templates: TemplateEngine,
}

impl SiteBuilder {
    /// Create a builder that typesets diagrams with the system LaTeX toolchain.
    pub fn new(config: BuildConfig) -> Self {
        Self::with_typesetter(config, Box::new(LatexToolchain::new()))
    }

    pub fn with_typesetter(config: BuildConfig, typesetter: Box<dyn Typesetter>) -> Self {
        Self {
            config,
            highlighter: Highlighter::new(),
            typesetter,
            templates: TemplateEngine::new(),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&self.highlighter, self.typesetter.as_ref())
    }

    /// Build every article, then the index page and the feed.
    ///
    /// Nothing is aggregated unless every article parsed.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        let sources = self.discover()?;
        tracing::info!(
            "Found {} articles in {}",
            sources.len(),
            self.config.content_dir.display()
        );

        let registry = self.parse_all(&sources)?;

        let results: Vec<Result<PathBuf, BuildError>> = registry
            .articles()
            .par_iter()
            .map(|article| self.write_page(article))
            .collect();

        let mut pages = 0;
        for result in results {
            result?;
            pages += 1;
        }
        tracing::info!("Built {} article pages", pages);

        let listed = self.write_aggregates(&registry)?;

        Ok(BuildResult {
            pages,
            listed,
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Build a single article page from its directory. Drafts are built too.
    pub fn build_article(&self, dir: &Path) -> Result<PathBuf, BuildError> {
        let source = SourceFile {
            path: self.article_path(dir)?,
            file: dir.join(SOURCE_FILE),
        };
        let article = self.parse(&source)?;
        self.write_page(&article)
    }

    /// Rebuild the index page and the feed without touching article pages.
    pub fn build_index(&self) -> Result<usize, BuildError> {
        let sources = self.discover()?;
        let registry = self.parse_all(&sources)?;
        self.write_aggregates(&registry)
    }

    /// Find `<slug>/index.md` in the content directory and in each locale
    /// directory, in a stable order.
    pub fn discover(&self) -> Result<Vec<SourceFile>, BuildError> {
        let content_dir = &self.config.content_dir;
        if !content_dir.is_dir() {
            return Err(BuildError::ReadError(format!(
                "Content directory not found: {}",
                content_dir.display()
            )));
        }

        let mut roots = vec![(content_dir.clone(), String::new())];
        for locale in &self.config.locales {
            let dir = content_dir.join(locale);
            if dir.is_dir() {
                roots.push((dir, format!("{locale}/")));
            } else {
                tracing::debug!("Locale directory {} does not exist", dir.display());
            }
        }

        let mut sources = Vec::new();
        for (root, prefix) in roots {
            for entry in WalkDir::new(&root)
                .min_depth(1)
                .max_depth(1)
                .follow_links(true)
                .sort_by_file_name()
            {
                let entry = entry.map_err(|e| BuildError::ReadError(e.to_string()))?;
                let file = entry.path().join(SOURCE_FILE);
                if !entry.file_type().is_dir() || !file.is_file() {
                    continue;
                }

                let name = entry.file_name().to_string_lossy();
                sources.push(SourceFile {
                    path: format!("{prefix}{name}"),
                    file,
                });
            }
        }

        Ok(sources)
    }

    fn parse_all(&self, sources: &[SourceFile]) -> Result<PostRegistry, BuildError> {
        let results: Vec<(String, Result<Article, BuildError>)> = sources
            .par_iter()
            .map(|source| (source.path.clone(), self.parse(source)))
            .collect();

        for (_, result) in &results {
            if let Err(e) = result {
                tracing::error!("{}", e);
            }
        }

        Ok(PostRegistry::collect(results)?)
    }

    fn parse(&self, source: &SourceFile) -> Result<Article, BuildError> {
        let text = fs::read_to_string(&source.file)
            .map_err(|e| BuildError::ReadError(format!("{}: {}", source.file.display(), e)))?;

        Article::parse(source.path.clone(), &text).map_err(|e| BuildError::Article {
            path: source.path.clone(),
            source: e,
        })
    }

    fn article_path(&self, dir: &Path) -> Result<String, BuildError> {
        let relative = dir.strip_prefix(&self.config.content_dir).unwrap_or(dir);
        let path = relative
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        if path.is_empty() {
            return Err(BuildError::ReadError(format!(
                "Not an article directory: {}",
                dir.display()
            )));
        }
        Ok(path)
    }

    /// Render one article and write `<output_dir>/<path>/index.html`.
    fn write_page(&self, article: &Article) -> Result<PathBuf, BuildError> {
        let renderer = self.renderer();
        let render_error = |source| BuildError::Render {
            path: article.path.clone(),
            source,
        };

        let assets = DirectoryAssets::new(self.config.content_dir.join(&article.path));
        let body = renderer
            .render_article(article, &assets)
            .map_err(render_error)?;
        let description = renderer
            .render_excerpt(&article.intro)
            .map_err(render_error)?
            .to_plain_text();

        let page = ArticlePage {
            title: article.title.clone(),
            description,
            path: article.path.clone(),
            link: canonical_link(&self.config.site.base_url, &article.path),
            root: relative_root(&article.path),
            locale: article.locale().to_string(),
            time: article.time_display.clone(),
            draft: article.draft,
            discussions: article.discussions.clone(),
            translations: article
                .translations
                .iter()
                .map(|(language, url)| TranslationLink {
                    language: language.clone(),
                    url: url.clone(),
                })
                .collect(),
            body: body.to_html(),
            site_title: self.config.site.title.clone(),
        };

        let html = self
            .templates
            .render_article(&page)
            .map_err(|e| BuildError::TemplateError(e.to_string()))?;

        let dir = self.config.output_dir.join(&article.path);
        fs::create_dir_all(&dir).map_err(|e| BuildError::WriteError(e.to_string()))?;
        let output = dir.join("index.html");
        fs::write(&output, html).map_err(|e| BuildError::WriteError(e.to_string()))?;

        tracing::debug!("Wrote {}", output.display());
        Ok(output)
    }

    /// Write `index.html` and `rss.xml`, returning the number of listed articles.
    fn write_aggregates(&self, registry: &PostRegistry) -> Result<usize, BuildError> {
        let site = &self.config.site;
        let listing = registry
            .listing(&self.renderer(), &site.base_url)
            .map_err(|source| BuildError::Render {
                path: "index".to_string(),
                source,
            })?;

        let index = self
            .templates
            .render_index(&IndexPage {
                site_title: site.title.clone(),
                description: site.description.clone(),
                feed_url: site.feed_url(),
                entries: listing.clone(),
            })
            .map_err(|e| BuildError::TemplateError(e.to_string()))?;
        let feed = Feed::write(site, &listing, Utc::now())?;

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;
        fs::write(self.config.output_dir.join("index.html"), index)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;
        fs::write(self.config.output_dir.join("rss.xml"), feed)
            .map_err(|e| BuildError::WriteError(e.to_string()))?;

        tracing::info!(
            "Listed {} of {} articles",
            listing.len(),
            registry.articles().len()
        );
        Ok(listing.len())
    }
}

/// Relative path from an article page back to the blog root, which is the
/// output directory itself.
fn relative_root(path: &str) -> String {
    let depth = path.split('/').filter(|part| !part.is_empty()).count();
    vec![".."; depth.max(1)].join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_md::ToolchainError;
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    struct StubTypesetter;

    impl Typesetter for StubTypesetter {
        fn typeset(&self, _tex: &str) -> Result<String, ToolchainError> {
            Ok("<svg><path d=\"M0 0\"/></svg>".to_string())
        }
    }

    fn write_article(root: &Path, path: &str, header: &str, body: &str) {
        let dir = root.join(path);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SOURCE_FILE), format!("---\n{header}\n---\n{body}")).unwrap();
    }

    fn site(temp: &TempDir) -> (PathBuf, PathBuf, SiteBuilder) {
        let content = temp.path().join("content");
        let out = temp.path().join("out");
        fs::create_dir_all(&content).unwrap();

        let config = BuildConfig {
            content_dir: content.clone(),
            output_dir: out.clone(),
            site: SiteInfo {
                base_url: "https://example.com/blog/".to_string(),
                ..SiteInfo::default()
            },
            ..BuildConfig::default()
        };
        (content, out, SiteBuilder::with_typesetter(config, Box::new(StubTypesetter)))
    }

    #[test]
    fn builds_pages_index_and_feed() {
        let temp = tempdir().unwrap();
        let (content, out, builder) = site(&temp);
        write_article(
            &content,
            "first",
            "title: First\ntime: 1 Jan 2024\nintro: The first one.",
            "# Hello\n\n| a |\n|---|\n| 1 |\n",
        );
        write_article(&content, "fifth", "title: Fifth\ntime: 5 Jan 2024", "Body\n");
        write_article(
            &content,
            "tenth",
            "title: Tenth\ntime: 10 Jan 2024\ndraft: true",
            "Body\n",
        );
        write_article(
            &content,
            "ru/first",
            "title: Первый\ntime: 2 января 2024",
            "Текст\n",
        );

        let result = builder.build().unwrap();

        assert_eq!(result.pages, 4);
        assert_eq!(result.listed, 3);

        let page = fs::read_to_string(out.join("first/index.html")).unwrap();
        assert!(page.contains("<div class=\"table-wrapper\"><table>"));
        assert!(page.contains("content=\"The first one.\""));
        assert!(out.join("tenth/index.html").exists());
        let ru = fs::read_to_string(out.join("ru/first/index.html")).unwrap();
        assert!(ru.contains("<html lang=\"ru\">"));

        let index = fs::read_to_string(out.join("index.html")).unwrap();
        let fifth = index.find(">Fifth<").unwrap();
        let ru_first = index.find(">Первый<").unwrap();
        let first = index.find(">First<").unwrap();
        assert!(fifth < ru_first && ru_first < first);
        assert!(!index.contains("Tenth"));

        let feed = fs::read_to_string(out.join("rss.xml")).unwrap();
        assert_eq!(feed.matches("<item>").count(), 3);
        assert!(!feed.contains("Tenth"));
        assert!(feed.contains("<link>https://example.com/blog/ru/first/</link>"));
    }

    #[test]
    fn one_broken_article_stops_aggregation() {
        let temp = tempdir().unwrap();
        let (content, out, builder) = site(&temp);
        write_article(&content, "good", "title: Good\ntime: 1 Jan 2024", "Body\n");
        let broken = content.join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(SOURCE_FILE), "no header here").unwrap();

        let error = builder.build().unwrap_err();

        match error {
            BuildError::Aggregation(e) => {
                assert_eq!(e.failures.len(), 1);
                assert_eq!(e.failures[0].0, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.join("index.html").exists());
        assert!(!out.join("rss.xml").exists());
    }

    #[test]
    fn builds_single_draft_article() {
        let temp = tempdir().unwrap();
        let (content, out, builder) = site(&temp);
        write_article(
            &content,
            "wip",
            "title: Work in progress\ntime: 1 Jan 2024\ndraft: true",
            "```tikz\n% alt A triangle\n\\draw (0,0) -- (1,0) -- (0,1) -- cycle;\n```\n",
        );

        let output = builder.build_article(&content.join("wip")).unwrap();

        assert_eq!(output, out.join("wip/index.html"));
        let page = fs::read_to_string(output).unwrap();
        assert!(page.contains("<title>A triangle</title>"));
        assert!(page.contains("noindex"));
    }

    #[test]
    fn index_only_build_skips_pages() {
        let temp = tempdir().unwrap();
        let (content, out, builder) = site(&temp);
        write_article(&content, "post", "title: Post\ntime: 1 Jan 2024", "Body\n");

        let listed = builder.build_index().unwrap();

        assert_eq!(listed, 1);
        assert!(out.join("index.html").exists());
        assert!(out.join("rss.xml").exists());
        assert!(!out.join("post/index.html").exists());
    }

    #[test]
    fn discovery_ignores_loose_files_and_locale_roots() {
        let temp = tempdir().unwrap();
        let (content, _out, builder) = site(&temp);
        write_article(&content, "b", "title: B\ntime: 1 Jan 2024", "");
        write_article(&content, "a", "title: A\ntime: 1 Jan 2024", "");
        write_article(&content, "ru/a", "title: A\ntime: 1 Jan 2024", "");
        fs::write(content.join("README.md"), "notes").unwrap();
        fs::create_dir_all(content.join("assets")).unwrap();

        let paths: Vec<String> = builder
            .discover()
            .unwrap()
            .into_iter()
            .map(|source| source.path)
            .collect();

        assert_eq!(paths, vec!["a", "b", "ru/a"]);
    }

    #[test]
    fn relative_roots() {
        assert_eq!(relative_root("post"), "..");
        assert_eq!(relative_root("ru/post"), "../..");
    }
}
