//! Blog article parsing and rendering.
//!
//! This crate splits article sources into front matter and Markdown, renders
//! the Markdown with highlighting, math, TikZ diagrams and side-notes, and
//! restructures the result into the markup the blog's stylesheet expects.

pub mod article;
pub mod codeblock;
pub mod diagram;
pub mod discussion;
pub mod dom;
pub mod frontmatter;
pub mod highlight;
pub mod math;
pub mod media;
pub mod render;
pub mod restructure;

pub use article::{Article, ArticleError, SchemaError};
pub use codeblock::{BlockMode, FenceInfo, FenceLanguage};
pub use diagram::{DiagramCompiler, DiagramThemes, LatexToolchain, Theme, ToolchainError, Typesetter};
pub use discussion::Discussion;
pub use dom::{Document, Element, Node};
pub use frontmatter::FrontmatterError;
pub use highlight::Highlighter;
pub use media::{AssetSource, DirectoryAssets, MemoryAssets};
pub use render::{RenderError, Renderer};
pub use restructure::Restructurer;
