//! RSS 2.0 feed writer.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;

use crate::registry::ListingEntry;

/// Site-wide metadata used by the index page and the feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteInfo {
    pub title: String,
    /// Absolute URL of the blog root, e.g. `https://example.com/blog/`
    pub base_url: String,
    pub description: String,
    pub copyright: String,
    /// RSS author, `email (Name)`
    pub author: String,
    /// Minutes a feed reader may cache the feed
    pub ttl: u32,
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            title: "Blog".to_string(),
            base_url: "http://localhost/".to_string(),
            description: String::new(),
            copyright: String::new(),
            author: String::new(),
            ttl: 60,
        }
    }
}

impl SiteInfo {
    pub fn feed_url(&self) -> String {
        format!("{}/rss.xml", self.base_url.trim_end_matches('/'))
    }
}

/// The RSS feed of published articles.
pub struct Feed;

impl Feed {
    /// Serialize `entries`, already in listing order, as an RSS 2.0 document.
    pub fn write(
        site: &SiteInfo,
        entries: &[ListingEntry],
        build_time: DateTime<Utc>,
    ) -> Result<String, FeedError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
        write(&mut writer, Event::Start(rss))?;
        write(&mut writer, Event::Start(BytesStart::new("channel")))?;

        text_element(&mut writer, "title", &site.title)?;
        text_element(&mut writer, "link", &site.base_url)?;
        text_element(&mut writer, "description", &site.description)?;
        if !site.copyright.is_empty() {
            text_element(&mut writer, "copyright", &site.copyright)?;
        }
        if !site.author.is_empty() {
            text_element(&mut writer, "managingEditor", &site.author)?;
            text_element(&mut writer, "webMaster", &site.author)?;
        }
        text_element(&mut writer, "lastBuildDate", &build_time.to_rfc2822())?;
        text_element(&mut writer, "ttl", &site.ttl.to_string())?;

        let feed_url = site.feed_url();
        let mut atom_link = BytesStart::new("atom:link");
        atom_link.push_attribute(("href", feed_url.as_str()));
        atom_link.push_attribute(("rel", "self"));
        atom_link.push_attribute(("type", "application/rss+xml"));
        write(&mut writer, Event::Empty(atom_link))?;

        for entry in entries {
            write_item(&mut writer, site, entry)?;
        }

        write(&mut writer, Event::End(BytesEnd::new("channel")))?;
        write(&mut writer, Event::End(BytesEnd::new("rss")))?;

        let mut xml = String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| FeedError::Xml(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }
}

fn write_item(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    site: &SiteInfo,
    entry: &ListingEntry,
) -> Result<(), FeedError> {
    write(writer, Event::Start(BytesStart::new("item")))?;

    text_element(writer, "title", &entry.title)?;
    text_element(writer, "link", &entry.link)?;
    text_element(writer, "description", &entry.excerpt_text)?;
    if !site.author.is_empty() {
        text_element(writer, "author", &site.author)?;
    }
    if let Some(discussion) = entry.discussions.first() {
        text_element(writer, "comments", &discussion.url)?;
    }

    let mut guid = BytesStart::new("guid");
    guid.push_attribute(("isPermaLink", "true"));
    write(writer, Event::Start(guid))?;
    write(writer, Event::Text(BytesText::new(&entry.link)))?;
    write(writer, Event::End(BytesEnd::new("guid")))?;

    text_element(writer, "pubDate", &entry.time_value.to_rfc2822())?;

    write(writer, Event::End(BytesEnd::new("item")))
}

fn text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), FeedError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), FeedError> {
    writer
        .write_event(event)
        .map_err(|e| FeedError::Xml(e.to_string()))
}

/// Errors that can occur while writing the feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to write feed XML: {0}")]
    Xml(String),
}
