//! Article records decoded from front matter.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::diagram::DiagramThemes;
use crate::discussion::Discussion;
use crate::frontmatter::{split, FrontmatterError};

/// Formats accepted for the `time` header, tried in order.
const TIME_FORMATS: &[&str] = &[
    "%d %b %Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%Y-%m-%d",
    "%d.%m.%Y",
];

/// Russian genitive month names, as used by translated articles.
const RUSSIAN_MONTHS: &[(&str, &str)] = &[
    ("января", "Jan"),
    ("февраля", "Feb"),
    ("марта", "Mar"),
    ("апреля", "Apr"),
    ("мая", "May"),
    ("июня", "Jun"),
    ("июля", "Jul"),
    ("августа", "Aug"),
    ("сентября", "Sep"),
    ("октября", "Oct"),
    ("ноября", "Nov"),
    ("декабря", "Dec"),
];

/// A parsed blog article.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// Relative identifier, e.g. `the-ram-myth` or `ru/the-ram-myth`
    pub path: String,

    /// Article title (required)
    pub title: String,

    /// Markdown excerpt shown on the index page and in the feed
    pub intro: String,

    /// Publication time as written by the author
    pub time_display: String,

    /// Publication time parsed from `time_display`, used for ordering
    pub time_value: DateTime<Utc>,

    /// Drafts are buildable but never listed
    pub draft: bool,

    /// Off-site discussion links, in header order
    pub discussions: Vec<Discussion>,

    /// Language label to URL
    pub translations: BTreeMap<String, String>,

    /// TikZ preamble fragments shared by every diagram in the article
    pub diagram_themes: DiagramThemes,

    /// Header keys this schema does not know about
    pub extensions: BTreeMap<String, Value>,

    /// Markdown body after the header
    pub body: String,
}

/// The header schema. Required fields are optional here so that their
/// absence is reported as a schema violation rather than a YAML error.
#[derive(Debug, Deserialize)]
struct Header {
    title: Option<String>,
    time: Option<String>,
    #[serde(default)]
    intro: Option<String>,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    discussion: Option<OneOrMany>,
    #[serde(default)]
    translations: BTreeMap<String, String>,
    #[serde(default, rename = "tikzThemes")]
    tikz_themes: DiagramThemes,
    #[serde(flatten)]
    extensions: BTreeMap<String, Value>,
}

/// `discussion` used to be a single URL and later became a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(url) => vec![url],
            Self::Many(urls) => urls,
        }
    }
}

impl Article {
    /// Parse an article from its full source text.
    pub fn parse(path: impl Into<String>, source: &str) -> Result<Self, ArticleError> {
        let (header, body) = split(source)?;
        Ok(Self::from_header(path, header, body)?)
    }

    /// Build an article from an already decoded header mapping.
    pub fn from_header(
        path: impl Into<String>,
        header: Mapping,
        body: &str,
    ) -> Result<Self, SchemaError> {
        let path = path.into();
        if path.is_empty() {
            return Err(SchemaError::EmptyPath);
        }

        let header: Header = serde_yaml::from_value(Value::Mapping(header))
            .map_err(|e| SchemaError::InvalidField(e.to_string()))?;

        let title = header.title.ok_or(SchemaError::MissingField("title"))?;
        if title.trim().is_empty() {
            return Err(SchemaError::EmptyField("title"));
        }

        let time_display = header.time.ok_or(SchemaError::MissingField("time"))?;
        let time_value = parse_time(&time_display)
            .ok_or_else(|| SchemaError::InvalidTime(time_display.clone()))?;

        let discussions = header
            .discussion
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .map(Discussion::new)
            .collect();

        Ok(Self {
            path,
            title,
            intro: header.intro.unwrap_or_default(),
            time_display,
            time_value,
            draft: header.draft,
            discussions,
            translations: header.translations,
            diagram_themes: header.tikz_themes,
            extensions: header.extensions,
            body: body.to_string(),
        })
    }

    /// Open Graph locale of the article, derived from its path.
    pub fn locale(&self) -> &'static str {
        if self.path.starts_with("ru/") {
            "ru_RU"
        } else {
            "en_US"
        }
    }
}

/// Parse a free-text publication date into midnight UTC of that day.
pub fn parse_time(display: &str) -> Option<DateTime<Utc>> {
    let mut normalized = display.trim().to_string();
    for (russian, english) in RUSSIAN_MONTHS {
        if normalized.contains(russian) {
            normalized = normalized.replace(russian, english);
            break;
        }
    }
    // "26 Dec 2024 г." is how the Russian articles write years
    let normalized = normalized.trim_end_matches("г.").trim();

    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(normalized, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

/// Errors that can occur when building an article.
#[derive(Debug, thiserror::Error)]
pub enum ArticleError {
    #[error("Malformed source: {0}")]
    MalformedSource(#[from] FrontmatterError),

    #[error("Schema violation: {0}")]
    SchemaViolation(#[from] SchemaError),
}

/// Header fields that do not satisfy the article schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Article path is empty")]
    EmptyPath,

    #[error("Required field `{0}` is missing")]
    MissingField(&'static str),

    #[error("Required field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("Cannot parse time `{0}`")]
    InvalidTime(String),

    #[error("Invalid header field: {0}")]
    InvalidField(String),
}
