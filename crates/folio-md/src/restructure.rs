//! Structural rewrites of rendered articles.
//!
//! Markdown has no way to express side-note groups, side headers or media
//! embeds, so the rendered tree goes through a fixed sequence of passes:
//!
//! 1. [`close_aside_groups`] merges adjacent side-note groups and pulls the
//!    following flow into the group, up to an `<aside-inline-here />` marker.
//! 2. [`wrap_tables`] puts every table into a horizontally scrollable wrapper.
//! 3. [`hoist_asides`] moves a heading below the side-notes that follow it.
//! 4. [`side_headers`] folds an `<h3>` into the paragraph that follows it.
//! 5. [`rewrite_media`] turns image references into their embeddings.
//!
//! Every pass recurses into element children.

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagram::ToolchainError;
use crate::dom::{Document, Element, Node};
use crate::media::{embed, AssetSource};

static INSERTION_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<aside-inline-here\s*/?>(?:</aside-inline-here>)?$").expect("valid regex")
});

const ASIDE_GROUP_CLASS: &str = "aside-group";
const TABLE_WRAPPER_CLASS: &str = "table-wrapper";
const SIDE_HEADER_LEVEL: u8 = 3;

/// Applies every restructuring pass in order.
pub struct Restructurer<'a> {
    assets: &'a dyn AssetSource,
}

impl<'a> Restructurer<'a> {
    pub fn new(assets: &'a dyn AssetSource) -> Self {
        Self { assets }
    }

    pub fn apply(&self, document: Document) -> Result<Document, ToolchainError> {
        let nodes = close_aside_groups(document.nodes);
        let nodes = wrap_tables(nodes);
        let nodes = hoist_asides(nodes);
        let nodes = side_headers(nodes);
        let nodes = rewrite_media(nodes, self.assets)?;
        Ok(Document::new(nodes))
    }
}

fn is_aside_group(node: &Node) -> bool {
    node.as_element()
        .is_some_and(|e| e.is("div") && e.has_class(ASIDE_GROUP_CLASS))
}

fn is_heading(node: &Node) -> bool {
    node.as_element().is_some_and(|e| e.heading_level().is_some())
}

/// An `<aside-inline-here />` marker, either as an HTML block or inline.
fn is_insertion_point(node: &Node) -> bool {
    matches!(node, Node::Raw(html) if INSERTION_POINT.is_match(html.trim()))
}

/// Append a paragraph with the given attributes and inline content, unless
/// the content is blank. Whitespace at the split edges is trimmed.
fn push_paragraph(out: &mut Vec<Node>, attrs: &[(String, String)], mut children: Vec<Node>) {
    while children.last().is_some_and(Node::is_blank) {
        children.pop();
    }
    let leading = children.iter().take_while(|child| child.is_blank()).count();
    children.drain(..leading);
    if children.is_empty() {
        return;
    }

    if let Some(Node::Text(text)) = children.last_mut() {
        text.truncate(text.trim_end().len());
    }
    if let Some(Node::Text(text)) = children.first_mut() {
        *text = text.trim_start().to_string();
    }

    let mut paragraph = Element::new("p");
    paragraph.attrs = attrs.to_vec();
    out.push(paragraph.with_children(children).into());
}

/// Split paragraphs at inline insertion point markers, leaving each marker
/// between the paragraph halves.
fn lift_insertion_points(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());

    for node in nodes {
        let paragraph = match node {
            Node::Element(element)
                if element.is("p") && element.children.iter().any(is_insertion_point) =>
            {
                element
            }
            other => {
                out.push(other);
                continue;
            }
        };

        let mut part = Vec::new();
        for child in paragraph.children {
            if is_insertion_point(&child) {
                push_paragraph(&mut out, &paragraph.attrs, std::mem::take(&mut part));
                out.push(child);
            } else {
                part.push(child);
            }
        }
        push_paragraph(&mut out, &paragraph.attrs, part);
    }

    out
}

/// Apply `pass` to the children of every element in `nodes`.
fn map_children(nodes: Vec<Node>, pass: fn(Vec<Node>) -> Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(mut element) => {
                element.children = pass(std::mem::take(&mut element.children));
                Node::Element(element)
            }
            other => other,
        })
        .collect()
}

/// Merge adjacent aside groups and extend each group over the following
/// siblings until an insertion point marker, the next group (or the heading
/// that introduces it), or the end of the parent.
pub fn close_aside_groups(nodes: Vec<Node>) -> Vec<Node> {
    let nodes = lift_insertion_points(nodes);
    let mut queue: VecDeque<Node> = map_children(nodes, close_aside_groups).into();
    let mut out = Vec::with_capacity(queue.len());

    while let Some(node) = queue.pop_front() {
        if is_insertion_point(&node) {
            tracing::debug!("Dropping aside insertion point outside of an aside group");
            continue;
        }

        let mut group = match node {
            Node::Element(element) if element.is("div") && element.has_class(ASIDE_GROUP_CLASS) => {
                element
            }
            other => {
                out.push(other);
                continue;
            }
        };

        while queue.front().is_some_and(is_aside_group) {
            if let Some(Node::Element(next)) = queue.pop_front() {
                group.children.extend(next.children);
            }
        }

        while let Some(next) = queue.front() {
            if is_insertion_point(next) {
                queue.pop_front();
                break;
            }
            if is_aside_group(next)
                || (is_heading(next) && queue.get(1).is_some_and(is_aside_group))
            {
                break;
            }
            if let Some(next) = queue.pop_front() {
                group.children.push(next);
            }
        }

        out.push(Node::Element(group));
    }

    out
}

/// Wrap every table in a scrollable container. Tables that already sit in
/// one are left alone.
pub fn wrap_tables(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Element(element) if element.is("table") => Element::new("div")
                .with_attr("class", TABLE_WRAPPER_CLASS)
                .with_child(Node::Element(element))
                .into(),
            Node::Element(element) if element.is("div") && element.has_class(TABLE_WRAPPER_CLASS) => {
                Node::Element(element)
            }
            Node::Element(mut element) => {
                element.children = wrap_tables(std::mem::take(&mut element.children));
                Node::Element(element)
            }
            other => other,
        })
        .collect()
}

/// Move a heading that is directly followed by an aside group into that
/// group, right after its asides, so the side-notes are laid out next to the
/// heading they annotate.
pub fn hoist_asides(nodes: Vec<Node>) -> Vec<Node> {
    let mut queue: VecDeque<Node> = map_children(nodes, hoist_asides).into();
    let mut out = Vec::with_capacity(queue.len());

    while let Some(node) = queue.pop_front() {
        let heading_level = node.as_element().and_then(Element::heading_level);
        let (Some(level), Some(true)) = (heading_level, queue.front().map(is_aside_group)) else {
            out.push(node);
            continue;
        };
        let (Node::Element(mut heading), Some(Node::Element(mut group))) = (node, queue.pop_front())
        else {
            continue;
        };

        heading.set_attr("role", "heading");
        heading.set_attr("aria-level", level.to_string());

        let asides = group
            .children
            .iter()
            .take_while(|child| child.is_element("aside"))
            .count();
        group.children.insert(asides, Node::Element(heading));
        out.push(Node::Element(group));
    }

    out
}

/// Turn an `<h3>` followed by a paragraph into an inline side header at the
/// start of that paragraph.
pub fn side_headers(nodes: Vec<Node>) -> Vec<Node> {
    let mut queue: VecDeque<Node> = map_children(nodes, side_headers).into();
    let mut out = Vec::with_capacity(queue.len());

    while let Some(node) = queue.pop_front() {
        let is_side_header = node
            .as_element()
            .is_some_and(|e| e.heading_level() == Some(SIDE_HEADER_LEVEL))
            && queue.front().is_some_and(|next| next.is_element("p"));
        if !is_side_header {
            out.push(node);
            continue;
        }
        let (Node::Element(heading), Some(Node::Element(paragraph))) = (node, queue.pop_front())
        else {
            continue;
        };

        let mut header = Element::new("span")
            .with_attr("class", "side-header")
            .with_attr("role", "heading")
            .with_attr("aria-level", SIDE_HEADER_LEVEL.to_string());
        if let Some(id) = heading.attr("id") {
            header.set_attr("id", id);
        }
        let header = header.with_child(Element::new("span").with_children(heading.children).into());

        let mut children = vec![Node::Element(header)];
        children.extend(paragraph.children);

        let mut merged = Element::new("p").with_attr("class", "next-group");
        for (name, value) in paragraph.attrs {
            if name != "class" {
                merged.set_attr(name, value);
            }
        }
        out.push(merged.with_children(children).into());
    }

    out
}

/// Replace every image with its media embedding. Embeddings are block
/// content, so a paragraph holding images is split around them.
pub fn rewrite_media(
    nodes: Vec<Node>,
    assets: &dyn AssetSource,
) -> Result<Vec<Node>, ToolchainError> {
    let mut out = Vec::with_capacity(nodes.len());

    for node in nodes {
        let mut element = match node {
            Node::Element(element) => element,
            other => {
                out.push(other);
                continue;
            }
        };

        if element.is("div") && element.has_class("diagram") {
            out.push(Node::Element(element));
            continue;
        }
        if element.is("img") {
            out.push(embed(&element, assets)?);
            continue;
        }
        if element.is("p") && element.children.iter().any(|child| child.is_element("img")) {
            split_paragraph(element, assets, &mut out)?;
            continue;
        }

        element.children = rewrite_media(std::mem::take(&mut element.children), assets)?;
        out.push(Node::Element(element));
    }

    Ok(out)
}

fn split_paragraph(
    paragraph: Element,
    assets: &dyn AssetSource,
    out: &mut Vec<Node>,
) -> Result<(), ToolchainError> {
    let mut part = Vec::new();
    for child in paragraph.children {
        match child {
            Node::Element(image) if image.is("img") => {
                push_paragraph(out, &paragraph.attrs, std::mem::take(&mut part));
                out.push(embed(&image, assets)?);
            }
            other => part.push(other),
        }
    }
    push_paragraph(out, &paragraph.attrs, part);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::tests::FakeTypesetter;
    use crate::diagram::DiagramThemes;
    use crate::highlight::Highlighter;
    use crate::media::MemoryAssets;
    use crate::render::Renderer;
    use pretty_assertions::assert_eq;

    fn render(markdown: &str) -> Document {
        let highlighter = Highlighter::new();
        let typesetter = FakeTypesetter::default();
        Renderer::new(&highlighter, &typesetter)
            .render(markdown, &DiagramThemes::default())
            .unwrap()
    }

    fn html(nodes: Vec<Node>) -> String {
        Document::new(nodes).to_html()
    }

    #[test]
    fn merges_consecutive_asides_and_closes_at_marker() {
        let document = render(
            "::: aside\nOne.\n:::\n::: aside\nTwo.\n:::\n\nBeside the notes.\n\n<aside-inline-here />\n\nAfter.\n",
        );

        let nodes = close_aside_groups(document.nodes);

        assert_eq!(
            html(nodes),
            "<div class=\"aside-group\"><aside><p>One.</p>\n</aside>\n<aside><p>Two.</p>\n</aside>\n<p>Beside the notes.</p>\n</div>\n<p>After.</p>\n"
        );
    }

    #[test]
    fn group_without_marker_extends_to_end() {
        let document = render("::: aside\nNote.\n:::\n\nFirst.\n\nSecond.\n");

        let nodes = close_aside_groups(document.nodes);

        assert_eq!(nodes.len(), 1);
        assert!(html(nodes).ends_with("<p>Second.</p>\n</div>\n"));
    }

    #[test]
    fn next_group_stops_absorption() {
        let document = render("::: aside\nA.\n:::\n\nText.\n\n### Next\n\n::: aside\nB.\n:::\n\nMore.\n");

        let nodes = close_aside_groups(document.nodes);

        assert_eq!(nodes.len(), 3);
        assert!(nodes[1].is_element("h3"));
    }

    #[test]
    fn lone_marker_paragraph_is_dropped() {
        let document = Document::new(vec![Element::new("p")
            .with_child(Node::raw("<aside-inline-here />"))
            .into()]);

        assert!(close_aside_groups(document.nodes).is_empty());
    }

    #[test]
    fn marker_ending_a_paragraph_closes_group() {
        let document = render("::: aside\nNote.\n:::\n\nBeside.\n<aside-inline-here />\n\nAfter.\n");

        let output = Restructurer::new(&MemoryAssets::new())
            .apply(document)
            .unwrap()
            .to_html();

        assert_eq!(
            output,
            "<div class=\"aside-group\"><aside><p>Note.</p>\n</aside>\n<p>Beside.</p>\n</div>\n<p>After.</p>\n"
        );
    }

    #[test]
    fn marker_inside_paragraph_splits_it() {
        let document = render("::: aside\nNote.\n:::\n\nBeside <aside-inline-here /> below.\n");

        let nodes = close_aside_groups(document.nodes);

        assert_eq!(
            html(nodes),
            "<div class=\"aside-group\"><aside><p>Note.</p>\n</aside>\n<p>Beside</p>\n</div>\n<p>below.</p>\n"
        );
    }

    #[test]
    fn wraps_tables_once() {
        let document = render("| a |\n|---|\n| 1 |\n\n> | b |\n> |---|\n> | 2 |\n");

        let once = wrap_tables(document.nodes);
        let twice = wrap_tables(once.clone());

        assert_eq!(once, twice);
        let output = html(once);
        assert_eq!(output.matches("<div class=\"table-wrapper\"><table>").count(), 2);
        assert_eq!(output.matches("</table>\n</div>").count(), 2);
    }

    #[test]
    fn hoists_heading_below_asides() {
        let document = render("## Section\n\n::: aside\nNote.\n:::\n\nBody.\n");

        let nodes = hoist_asides(close_aside_groups(document.nodes));

        assert_eq!(
            html(nodes),
            "<div class=\"aside-group\"><aside><p>Note.</p>\n</aside>\n<h2 role=\"heading\" aria-level=\"2\">Section</h2>\n<p>Body.</p>\n</div>\n"
        );
    }

    #[test]
    fn folds_h3_into_paragraph() {
        let document = render("### Minor\n\nParagraph text.\n\n## Major\n\nOther.\n");

        let nodes = side_headers(document.nodes);

        assert_eq!(
            html(nodes),
            "<p class=\"next-group\"><span class=\"side-header\" role=\"heading\" aria-level=\"3\"><span>Minor</span></span>Paragraph text.</p>\n<h2>Major</h2>\n<p>Other.</p>\n"
        );
    }

    #[test]
    fn hoisted_heading_becomes_side_header() {
        let document = render("### Minor\n\n::: aside\nNote.\n:::\n\nText.\n");

        let output = Restructurer::new(&MemoryAssets::new())
            .apply(document)
            .unwrap()
            .to_html();

        assert_eq!(
            output,
            "<div class=\"aside-group\"><aside><p>Note.</p>\n</aside>\n<p class=\"next-group\"><span class=\"side-header\" role=\"heading\" aria-level=\"3\"><span>Minor</span></span>Text.</p>\n</div>\n"
        );
    }

    #[test]
    fn inlines_svg_reference() {
        let assets = MemoryAssets::new().with_file("diagram.svg", "<svg><circle/></svg>");
        let document = render("Before.\n\n![A circle](diagram.svg)\n");

        let nodes = rewrite_media(document.nodes, &assets).unwrap();
        let output = html(nodes);

        assert_eq!(
            output,
            "<p>Before.</p>\n<div class=\"diagram\"><svg><circle/><title>A circle</title></svg></div>\n"
        );
        assert!(!output.contains("<img"));
    }

    #[test]
    fn inline_media_splits_paragraph() {
        let document = render("See ![v](demo.mp4) here.\n");

        let nodes = rewrite_media(document.nodes, &MemoryAssets::new()).unwrap();

        assert_eq!(
            html(nodes),
            "<p>See</p>\n<div class=\"diagram\"><video src=\"demo.mp4\" autoplay=\"\" loop=\"\" muted=\"\" playsinline=\"\" aria-label=\"v\"></video></div>\n<p>here.</p>\n"
        );
    }

    #[test]
    fn images_in_list_items_are_embedded() {
        let document = render("- ![cat](https://example.com/cat.png)\n");

        let output = html(rewrite_media(document.nodes, &MemoryAssets::new()).unwrap());

        assert!(output.starts_with("<ul><li><div class=\"diagram\"><img"));
        assert!(!output.contains("<p>"));
    }

    #[test]
    fn full_pipeline_on_article_body() {
        let assets = MemoryAssets::new();
        let document = render(
            "## Intro\n\n::: aside\nSide.\n:::\n\n| x |\n|---|\n| 1 |\n\n<aside-inline-here />\n\n### Detail\n\nText.\n",
        );

        let output = Restructurer::new(&assets).apply(document).unwrap().to_html();

        assert!(output.starts_with("<div class=\"aside-group\"><aside>"));
        assert!(output.contains("<h2 role=\"heading\" aria-level=\"2\">Intro</h2>\n<div class=\"table-wrapper\"><table>"));
        assert!(output.contains("</table>\n</div>\n</div>\n<p class=\"next-group\">"));
        assert!(!output.contains("aside-inline-here"));
    }
}
