//! Extended Markdown rendering.
//!
//! Markdown is parsed with pulldown-cmark and turned into a [`Document`]
//! tree. On top of CommonMark the renderer understands:
//!
//! - fenced code blocks, highlighted by language, with `tikz` blocks compiled
//!   to diagrams and `expansible` blocks collapsed behind a toggle
//! - `$inline$` and `$$display$$` math, rendered to MathML
//! - `::: aside` containers for side-notes
//! - tables, strikethrough and typographic punctuation

use latex2mathml::DisplayStyle;
use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::article::Article;
use crate::codeblock::{FenceInfo, FenceLanguage};
use crate::diagram::{DiagramCompiler, DiagramThemes, ToolchainError, Typesetter};
use crate::dom::{escape_html, Document, Element, Node};
use crate::highlight::Highlighter;
use crate::math::to_mathml;
use crate::media::AssetSource;
use crate::restructure::Restructurer;

const ASIDE_OPEN: &str = "<!-- folio:aside -->";
const ASIDE_CLOSE: &str = "<!-- folio:/aside -->";

/// Markdown renderer with highlighting, diagrams and math.
pub struct Renderer<'t> {
    highlighter: &'t Highlighter,
    diagrams: DiagramCompiler<'t>,
}

/// State scoped to a single render call.
#[derive(Debug)]
pub struct RenderContext<'a> {
    themes: &'a DiagramThemes,
    expansible_seq: u32,
}

impl<'a> RenderContext<'a> {
    pub fn new(themes: &'a DiagramThemes) -> Self {
        Self {
            themes,
            expansible_seq: 0,
        }
    }

    /// Next expansible block id; the first one is 1.
    fn next_expansible_id(&mut self) -> u32 {
        self.expansible_seq += 1;
        self.expansible_seq
    }
}

impl<'t> Renderer<'t> {
    pub fn new(highlighter: &'t Highlighter, typesetter: &'t dyn Typesetter) -> Self {
        Self {
            highlighter,
            diagrams: DiagramCompiler::new(typesetter),
        }
    }

    /// Render Markdown into a document tree.
    pub fn render(&self, markdown: &str, themes: &DiagramThemes) -> Result<Document, RenderError> {
        let source = expand_containers(markdown);
        let mut builder = TreeBuilder::new(self, RenderContext::new(themes));

        for event in Parser::new_ext(&source, options()) {
            builder.push(event)?;
        }

        Ok(Document::new(builder.finish()))
    }

    /// Render a listing excerpt: no article diagram preamble, no restructuring.
    pub fn render_excerpt(&self, markdown: &str) -> Result<Document, RenderError> {
        self.render(markdown, &DiagramThemes::default())
    }

    /// Render an article body and apply every restructuring pass.
    pub fn render_article(
        &self,
        article: &Article,
        assets: &dyn AssetSource,
    ) -> Result<Document, RenderError> {
        let document = self.render(&article.body, &article.diagram_themes)?;
        Ok(Restructurer::new(assets).apply(document)?)
    }

    fn render_code(
        &self,
        ctx: &mut RenderContext<'_>,
        info: &str,
        code: &str,
    ) -> Result<Node, RenderError> {
        let info = FenceInfo::parse(info);

        let language = match info.language {
            FenceLanguage::Plain => {
                return Ok(Element::new("pre")
                    .with_child(Element::new("code").with_child(Node::text(code)).into())
                    .into());
            }
            FenceLanguage::Diagram => {
                return Ok(Node::raw(self.diagrams.compile(code, ctx.themes)?));
            }
            FenceLanguage::Code(language) => language,
        };

        let block = format!(
            r#"<pre><code class="language-{}">{}</code></pre>"#,
            escape_html(&language),
            self.highlighter.highlight(code, &language)
        );

        if !info.mode.expansible {
            return Ok(Node::raw(block));
        }

        let id = ctx.next_expansible_id();
        Ok(Node::raw(format!(
            r#"<div class="expansible-code"><input type="checkbox" id="expansible{id}"><div class="highlighted">{block}</div><label for="expansible{id}">Expand</label></div>"#
        )))
    }
}

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_MATH
}

fn render_math(latex: &str, style: DisplayStyle) -> Result<Node, RenderError> {
    to_mathml(latex, style)
        .map(Node::Raw)
        .map_err(|e| RenderError::Math {
            latex: latex.to_string(),
            message: e.to_string(),
        })
}

/// Replace `::: aside` / `:::` container lines with sentinel HTML comments
/// that the tree builder turns into aside elements. A container opens with
/// three or more colons followed by `aside` and closes with a colon run at
/// least as long as the one that opened it. Lines inside fenced code are left
/// alone.
fn expand_containers(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut fence: Option<(char, usize)> = None;
    let mut open: Vec<usize> = Vec::new();

    for line in markdown.split_inclusive('\n') {
        let trimmed = line.trim();
        let indent = &line[..line.len() - line.trim_start().len()];

        if let Some((fence_char, fence_len)) = fence {
            let run = trimmed.chars().take_while(|&c| c == fence_char).count();
            if run >= fence_len && trimmed[run * fence_char.len_utf8()..].trim().is_empty() {
                fence = None;
            }
            out.push_str(line);
            continue;
        }

        if let Some(opened) = fence_opening(trimmed) {
            fence = Some(opened);
            out.push_str(line);
            continue;
        }

        let colons = trimmed.chars().take_while(|&c| c == ':').count();
        if colons >= 3 {
            let params = trimmed[colons..].trim();
            if params.split_whitespace().next() == Some("aside") {
                open.push(colons);
                out.push_str(&format!("\n{indent}{ASIDE_OPEN}\n\n"));
                continue;
            }
            if params.is_empty() && open.last().is_some_and(|&len| colons >= len) {
                open.pop();
                out.push_str(&format!("\n{indent}{ASIDE_CLOSE}\n\n"));
                continue;
            }
        }
        out.push_str(line);
    }

    out
}

fn fence_opening(trimmed: &str) -> Option<(char, usize)> {
    let fence_char = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|&c| c == fence_char).count();
    (len >= 3).then_some((fence_char, len))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Element,
    Aside,
    Image,
}

struct Frame {
    element: Element,
    kind: FrameKind,
}

#[derive(Default)]
struct TableState {
    alignments: Vec<Alignment>,
    in_head: bool,
    body_open: bool,
    cell: usize,
}

/// Builds a document tree from pulldown-cmark events.
struct TreeBuilder<'r, 't> {
    renderer: &'r Renderer<'t>,
    ctx: RenderContext<'r>,
    stack: Vec<Frame>,
    tables: Vec<TableState>,
    code: Option<(String, String)>,
    html_block: Option<String>,
}

impl<'r, 't> TreeBuilder<'r, 't> {
    fn new(renderer: &'r Renderer<'t>, ctx: RenderContext<'r>) -> Self {
        Self {
            renderer,
            ctx,
            stack: vec![Frame {
                element: Element::new("#root"),
                kind: FrameKind::Element,
            }],
            tables: Vec::new(),
            code: None,
            html_block: None,
        }
    }

    fn push(&mut self, event: Event<'_>) -> Result<(), RenderError> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag)?,
            Event::Text(text) => {
                if let Some((_, code)) = &mut self.code {
                    code.push_str(&text);
                } else if let Some(html) = &mut self.html_block {
                    html.push_str(&text);
                } else {
                    self.append(Node::text(text.as_ref()));
                }
            }
            Event::Code(code) => self.append(
                Element::new("code")
                    .with_child(Node::text(code.as_ref()))
                    .into(),
            ),
            Event::InlineMath(latex) => self.append(render_math(&latex, DisplayStyle::Inline)?),
            Event::DisplayMath(latex) => self.append(render_math(&latex, DisplayStyle::Block)?),
            Event::Html(html) => match &mut self.html_block {
                Some(block) => block.push_str(&html),
                None => self.append(Node::raw(html.as_ref())),
            },
            Event::InlineHtml(html) => self.append(Node::raw(html.as_ref())),
            Event::SoftBreak => self.append(Node::text("\n")),
            Event::HardBreak => {
                self.append(Element::new("br").into());
                self.append(Node::text("\n"));
            }
            Event::Rule => self.append(Element::new("hr").into()),
            _ => {}
        }
        Ok(())
    }

    fn start(&mut self, tag: Tag<'_>) {
        let element = match tag {
            Tag::Paragraph => Element::new("p"),
            Tag::Heading {
                level, id, classes, ..
            } => {
                let mut heading = Element::new(format!("h{}", level as u8));
                if let Some(id) = id {
                    heading.set_attr("id", id.as_ref());
                }
                if !classes.is_empty() {
                    let classes: Vec<&str> = classes.iter().map(|c| c.as_ref()).collect();
                    heading.set_attr("class", classes.join(" "));
                }
                heading
            }
            Tag::BlockQuote(_) => Element::new("blockquote"),
            Tag::CodeBlock(kind) => {
                let info = match kind {
                    CodeBlockKind::Fenced(info) => info.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((info, String::new()));
                return;
            }
            Tag::HtmlBlock => {
                self.html_block = Some(String::new());
                return;
            }
            Tag::List(Some(start)) => {
                let list = Element::new("ol");
                if start == 1 {
                    list
                } else {
                    list.with_attr("start", start.to_string())
                }
            }
            Tag::List(None) => Element::new("ul"),
            Tag::Item => Element::new("li"),
            Tag::FootnoteDefinition(label) => Element::new("div")
                .with_attr("class", "footnote-definition")
                .with_attr("id", label.as_ref()),
            Tag::Table(alignments) => {
                self.tables.push(TableState {
                    alignments,
                    ..Default::default()
                });
                Element::new("table")
            }
            Tag::TableHead => {
                if let Some(table) = self.tables.last_mut() {
                    table.in_head = true;
                    table.cell = 0;
                }
                self.open(Element::new("thead"), FrameKind::Element);
                Element::new("tr")
            }
            Tag::TableRow => {
                let mut open_body = false;
                if let Some(table) = self.tables.last_mut() {
                    table.cell = 0;
                    open_body = !table.body_open;
                    table.body_open = true;
                }
                if open_body {
                    self.open(Element::new("tbody"), FrameKind::Element);
                }
                Element::new("tr")
            }
            Tag::TableCell => {
                let (name, alignment) = match self.tables.last_mut() {
                    Some(table) => {
                        let alignment = table.alignments.get(table.cell).copied();
                        table.cell += 1;
                        (if table.in_head { "th" } else { "td" }, alignment)
                    }
                    None => ("td", None),
                };
                let cell = Element::new(name);
                match alignment {
                    Some(Alignment::Left) => cell.with_attr("style", "text-align: left"),
                    Some(Alignment::Center) => cell.with_attr("style", "text-align: center"),
                    Some(Alignment::Right) => cell.with_attr("style", "text-align: right"),
                    _ => cell,
                }
            }
            Tag::Emphasis => Element::new("em"),
            Tag::Strong => Element::new("strong"),
            Tag::Strikethrough => Element::new("del"),
            Tag::Link {
                dest_url, title, ..
            } => {
                let link = Element::new("a").with_attr("href", dest_url.as_ref());
                if title.is_empty() {
                    link
                } else {
                    link.with_attr("title", title.as_ref())
                }
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                let image = Element::new("img").with_attr("src", dest_url.as_ref());
                let image = if title.is_empty() {
                    image
                } else {
                    image.with_attr("title", title.as_ref())
                };
                self.open(image, FrameKind::Image);
                return;
            }
            _ => Element::new("span"),
        };
        self.open(element, FrameKind::Element);
    }

    fn end(&mut self, tag: TagEnd) -> Result<(), RenderError> {
        match tag {
            TagEnd::CodeBlock => {
                if let Some((info, code)) = self.code.take() {
                    let node = self.renderer.render_code(&mut self.ctx, &info, &code)?;
                    self.append(node);
                }
            }
            TagEnd::HtmlBlock => {
                if let Some(html) = self.html_block.take() {
                    match html.trim() {
                        ASIDE_OPEN => self.open(Element::new("aside"), FrameKind::Aside),
                        ASIDE_CLOSE => {
                            if self.top_kind() == FrameKind::Aside {
                                self.close();
                            }
                        }
                        _ => self.append(Node::raw(html)),
                    }
                }
            }
            TagEnd::TableHead => {
                self.close_element(); // tr
                self.close_element(); // thead
                if let Some(table) = self.tables.last_mut() {
                    table.in_head = false;
                }
            }
            TagEnd::Table => {
                if self.tables.pop().is_some_and(|t| t.body_open) {
                    self.close_element(); // tbody
                }
                self.close_element();
            }
            _ => self.close_element(),
        }
        Ok(())
    }

    fn open(&mut self, element: Element, kind: FrameKind) {
        self.stack.push(Frame { element, kind });
    }

    fn top_kind(&self) -> FrameKind {
        self.stack.last().map_or(FrameKind::Element, |f| f.kind)
    }

    /// Close the innermost Markdown element, along with any aside left open
    /// inside it.
    fn close_element(&mut self) {
        while self.top_kind() == FrameKind::Aside && self.stack.len() > 1 {
            self.close();
        }
        self.close();
    }

    fn close(&mut self) {
        if self.stack.len() <= 1 {
            return;
        }
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let node = match frame.kind {
            FrameKind::Element => frame.element.into(),
            FrameKind::Aside => Element::new("div")
                .with_attr("class", "aside-group")
                .with_child(frame.element.into())
                .into(),
            FrameKind::Image => {
                let mut image = frame.element;
                let alt = Document::new(std::mem::take(&mut image.children)).to_plain_text();
                let mut attrs = vec![
                    ("src".to_string(), image.attr("src").unwrap_or("").to_string()),
                    ("alt".to_string(), alt),
                ];
                attrs.extend(image.attrs.into_iter().filter(|(key, _)| key != "src"));
                image.attrs = attrs;
                image.into()
            }
        };
        self.append(node);
    }

    fn append(&mut self, node: Node) {
        if let Some(frame) = self.stack.last_mut() {
            frame.element.children.push(node);
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while self.stack.len() > 1 {
            self.close();
        }
        self.stack
            .pop()
            .map(|root| root.element.children)
            .unwrap_or_default()
    }
}

/// Errors that can occur while rendering Markdown.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Toolchain failure: {0}")]
    Toolchain(#[from] ToolchainError),

    #[error("Cannot render math `{latex}`: {message}")]
    Math { latex: String, message: String },
}
