//! Site generation for the blog.
//!
//! Collects parsed articles into a registry, renders article pages and the
//! index page through templates, and writes the RSS feed.

pub mod builder;
pub mod feed;
pub mod registry;
pub mod templates;

pub use builder::{BuildConfig, BuildError, BuildResult, SiteBuilder, SourceFile};
pub use feed::{Feed, FeedError, SiteInfo};
pub use registry::{canonical_link, AggregationError, ListingEntry, PostRegistry};
pub use templates::TemplateEngine;
