//! Template engine for rendering article and index pages.

use minijinja::Environment;
use serde::Serialize;

use folio_md::Discussion;

use crate::registry::ListingEntry;

/// A link to the same article in another language.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationLink {
    pub language: String,
    pub url: String,
}

/// Context for rendering an article page.
#[derive(Debug, Clone, Serialize)]
pub struct ArticlePage {
    pub title: String,
    /// Intro as plain text, for meta tags
    pub description: String,
    pub path: String,
    /// Absolute URL of the page
    pub link: String,
    /// Relative path from the page to the blog root, e.g. `../..`
    pub root: String,
    /// `en_US` or `ru_RU`
    pub locale: String,
    pub time: String,
    pub draft: bool,
    pub discussions: Vec<Discussion>,
    pub translations: Vec<TranslationLink>,
    /// Rendered article body HTML
    pub body: String,
    pub site_title: String,
}

/// Context for rendering the index page.
#[derive(Debug, Clone, Serialize)]
pub struct IndexPage {
    pub site_title: String,
    pub description: String,
    pub feed_url: String,
    pub entries: Vec<ListingEntry>,
}

/// Template engine using minijinja.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new template engine with the built-in templates.
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_template("base.html", BASE_TEMPLATE)
            .expect("Failed to add base template");
        env.add_template("article.html", ARTICLE_TEMPLATE)
            .expect("Failed to add article template");
        env.add_template("index.html", INDEX_TEMPLATE)
            .expect("Failed to add index template");

        Self { env }
    }

    pub fn render_article(&self, page: &ArticlePage) -> Result<String, minijinja::Error> {
        self.env.get_template("article.html")?.render(page)
    }

    pub fn render_index(&self, page: &IndexPage) -> Result<String, minijinja::Error> {
        self.env.get_template("index.html")?.render(page)
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

const BASE_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="{% block lang %}en{% endblock %}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{% block title %}{{ site_title }}{% endblock %}</title>
  {% block meta %}{% endblock %}
</head>
<body>
  {% block content %}{% endblock %}
</body>
</html>
"##;

const ARTICLE_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block lang %}{{ locale[:2] }}{% endblock %}
{% block title %}{{ title }} | {{ site_title }}{% endblock %}
{% block meta %}
  <meta name="description" content="{{ description }}">
  <meta property="og:title" content="{{ title }}">
  <meta property="og:description" content="{{ description }}">
  <meta property="og:type" content="article">
  <meta property="og:url" content="{{ link }}">
  <meta property="og:locale" content="{{ locale }}">
  <link rel="canonical" href="{{ link }}">
  <link rel="alternate" type="application/rss+xml" href="{{ root }}/rss.xml">
  <link rel="stylesheet" href="{{ root }}/style.css">
  {% if draft %}<meta name="robots" content="noindex">{% endif %}
{% endblock %}
{% block content %}
  <header>
    <a href="{{ root }}/">{{ site_title }}</a>
  </header>
  <main>
    <article>
      <h1>{{ title }}</h1>
      <p class="meta">
        <time>{{ time }}</time>
        {%- for discussion in discussions %}
        <a class="discussion" href="{{ discussion.url }}">Discussion on {{ discussion.platform }}</a>
        {%- endfor %}
        {%- for translation in translations %}
        <a class="translation" href="{{ translation.url }}" hreflang="{{ translation.language }}">{{ translation.language }}</a>
        {%- endfor %}
      </p>
      {{ body | safe }}
    </article>
  </main>
{% endblock %}
"##;

const INDEX_TEMPLATE: &str = r##"{% extends "base.html" %}
{% block meta %}
  <meta name="description" content="{{ description }}">
  <link rel="alternate" type="application/rss+xml" title="{{ site_title }}" href="{{ feed_url }}">
  <link rel="stylesheet" href="style.css">
{% endblock %}
{% block content %}
  <main>
    <h1>{{ site_title }}</h1>
    {%- for entry in entries %}
    <div class="post-entry">
      <h2><a href="{{ entry.path }}/">{{ entry.title }}</a></h2>
      <time>{{ entry.time }}</time>
      {{ entry.excerpt_html | safe }}
      <p>
        <a href="{{ entry.path }}/">Keep reading</a>
      </p>
    </div>
    {%- endfor %}
  </main>
{% endblock %}
"##;
