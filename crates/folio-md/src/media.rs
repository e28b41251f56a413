//! Media embedding for image references.
//!
//! Authors write every kind of media as a Markdown image. The reference is
//! dispatched on its source: local SVG files are inlined, local MP4 files
//! become looping videos, YouTube links become embedded players, and
//! everything else stays an image.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::diagram::{inject_title, strip_prologue, ToolchainError};
use crate::dom::{Element, Node};

static YOUTUBE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:[^#]*&)?v=|embed/)|youtu\.be/)([A-Za-z0-9_-]+)[^#]*(?:#(\d+):(\d+))?$",
    )
    .expect("valid regex")
});

/// Fragment that marks a video as containing flashing lights.
const FLASHING_SUFFIX: &str = "#flashing";

const DEFAULT_ASPECT: (u32, u32) = (16, 9);

/// Loads files referenced by an article, such as inlined SVG images.
pub trait AssetSource: Send + Sync {
    fn load(&self, name: &str) -> Result<String, ToolchainError>;
}

/// Assets stored next to the article source.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirectoryAssets {
    fn load(&self, name: &str) -> Result<String, ToolchainError> {
        fs::read_to_string(self.root.join(name)).map_err(|e| ToolchainError::Asset {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Assets held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssets {
    files: HashMap<String, String>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(name.into(), contents.into());
        self
    }
}

impl AssetSource for MemoryAssets {
    fn load(&self, name: &str) -> Result<String, ToolchainError> {
        self.files.get(name).cloned().ok_or_else(|| ToolchainError::Asset {
            name: name.to_string(),
            message: "no such file".to_string(),
        })
    }
}

/// How an image reference is embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    /// Local SVG file, inlined as markup
    InlineSvg { name: String },
    /// Local MP4 file
    Video { src: String, flashing: bool },
    /// YouTube video with a width:height aspect ratio
    YouTube { id: String, aspect: (u32, u32) },
    /// Anything else
    Image,
}

impl Media {
    pub fn classify(src: &str) -> Self {
        if let Some(captures) = YOUTUBE.captures(src) {
            let aspect = match (captures.get(2), captures.get(3)) {
                (Some(w), Some(h)) => match (w.as_str().parse(), h.as_str().parse()) {
                    (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
                    _ => DEFAULT_ASPECT,
                },
                _ => DEFAULT_ASPECT,
            };
            return Self::YouTube {
                id: captures[1].to_string(),
                aspect,
            };
        }

        if src.contains('/') {
            return Self::Image;
        }

        let (file, flashing) = match src.strip_suffix(FLASHING_SUFFIX) {
            Some(file) => (file, true),
            None => (src, false),
        };
        let lower = file.to_ascii_lowercase();

        if lower.ends_with(".svg") && !flashing {
            Self::InlineSvg {
                name: file.to_string(),
            }
        } else if lower.ends_with(".mp4") {
            Self::Video {
                src: file.to_string(),
                flashing,
            }
        } else {
            Self::Image
        }
    }
}

/// Rewrite one `<img>` element into its embedding, wrapped in a
/// `<div class="diagram">`.
pub fn embed(image: &Element, assets: &dyn AssetSource) -> Result<Node, ToolchainError> {
    let src = image.attr("src").unwrap_or("");
    let alt = image.attr("alt").unwrap_or("");

    let children = match Media::classify(src) {
        Media::InlineSvg { name } => {
            let svg = assets.load(&name)?;
            vec![Node::raw(inject_title(&strip_prologue(&svg), alt))]
        }
        Media::Video { src, flashing } => {
            let mut video = Element::new("video").with_attr("src", src);
            if flashing {
                video.set_attr("controls", "");
            } else {
                video.set_attr("autoplay", "");
            }
            video.set_attr("loop", "");
            video.set_attr("muted", "");
            video.set_attr("playsinline", "");
            if !alt.is_empty() {
                video.set_attr("aria-label", alt);
            }

            let mut nodes = Vec::new();
            if flashing {
                nodes.push(
                    Element::new("p")
                        .with_attr("class", "content-warning")
                        .with_child(Node::text("Warning: flashing lights"))
                        .into(),
                );
            }
            nodes.push(video.into());
            nodes
        }
        Media::YouTube { id, aspect } => {
            let (width, height) = aspect;
            vec![Element::new("iframe")
                .with_attr("src", format!("https://www.youtube-nocookie.com/embed/{id}"))
                .with_attr("title", alt)
                .with_attr("style", format!("aspect-ratio: {width} / {height}"))
                .with_attr("frameborder", "0")
                .with_attr(
                    "allow",
                    "accelerometer; autoplay; clipboard-write; encrypted-media; gyroscope; picture-in-picture",
                )
                .with_attr("allowfullscreen", "")
                .with_attr("loading", "lazy")
                .into()]
        }
        Media::Image => {
            let mut image = image.clone();
            if image.attr("title").is_none() {
                image.set_attr("title", alt);
            }
            vec![image.into()]
        }
    };

    Ok(Element::new("div")
        .with_attr("class", "diagram")
        .with_children(children)
        .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use pretty_assertions::assert_eq;

    fn image(src: &str, alt: &str) -> Element {
        Element::new("img").with_attr("src", src).with_attr("alt", alt)
    }

    fn embed_html(src: &str, alt: &str, assets: &dyn AssetSource) -> String {
        Document::new(vec![embed(&image(src, alt), assets).unwrap()]).to_html()
    }

    #[test]
    fn classifies_sources() {
        assert_eq!(
            Media::classify("diagram.svg"),
            Media::InlineSvg {
                name: "diagram.svg".to_string()
            }
        );
        assert_eq!(Media::classify("images/diagram.svg"), Media::Image);
        assert_eq!(
            Media::classify("demo.mp4"),
            Media::Video {
                src: "demo.mp4".to_string(),
                flashing: false
            }
        );
        assert_eq!(
            Media::classify("strobe.mp4#flashing"),
            Media::Video {
                src: "strobe.mp4".to_string(),
                flashing: true
            }
        );
        assert_eq!(
            Media::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ#4:3"),
            Media::YouTube {
                id: "dQw4w9WgXcQ".to_string(),
                aspect: (4, 3)
            }
        );
        assert_eq!(
            Media::classify("https://youtu.be/dQw4w9WgXcQ"),
            Media::YouTube {
                id: "dQw4w9WgXcQ".to_string(),
                aspect: (16, 9)
            }
        );
        assert_eq!(Media::classify("https://example.com/cat.png"), Media::Image);
        assert_eq!(Media::classify("cat.png"), Media::Image);
    }

    #[test]
    fn inlines_svg_files() {
        let assets = MemoryAssets::new().with_file(
            "diagram.svg",
            "<?xml version=\"1.0\"?>\n<svg viewBox=\"0 0 1 1\"><rect/></svg>\n",
        );

        let html = embed_html("diagram.svg", "A box", &assets);

        assert_eq!(
            html,
            "<div class=\"diagram\"><svg viewBox=\"0 0 1 1\"><rect/><title>A box</title></svg>\n</div>\n"
        );
    }

    #[test]
    fn missing_svg_is_an_error() {
        let result = embed(&image("missing.svg", ""), &MemoryAssets::new());

        assert!(matches!(result, Err(ToolchainError::Asset { .. })));
    }

    #[test]
    fn embeds_autoplaying_video() {
        let html = embed_html("demo.mp4", "Demo", &MemoryAssets::new());

        assert_eq!(
            html,
            "<div class=\"diagram\"><video src=\"demo.mp4\" autoplay=\"\" loop=\"\" muted=\"\" playsinline=\"\" aria-label=\"Demo\"></video></div>\n"
        );
    }

    #[test]
    fn flashing_video_has_warning_and_no_autoplay() {
        let html = embed_html("strobe.mp4#flashing", "", &MemoryAssets::new());

        assert!(html.starts_with(
            "<div class=\"diagram\"><p class=\"content-warning\">Warning: flashing lights</p>\n<video src=\"strobe.mp4\" controls=\"\""
        ));
        assert!(!html.contains("autoplay"));
    }

    #[test]
    fn embeds_youtube_with_aspect_ratio() {
        let html = embed_html(
            "https://www.youtube.com/watch?v=abc_DEF-123#21:9",
            "Talk",
            &MemoryAssets::new(),
        );

        assert!(html.contains("src=\"https://www.youtube-nocookie.com/embed/abc_DEF-123\""));
        assert!(html.contains("style=\"aspect-ratio: 21 / 9\""));
        assert!(html.contains("title=\"Talk\""));
    }

    #[test]
    fn plain_images_get_title() {
        let html = embed_html("https://example.com/cat.png", "A cat", &MemoryAssets::new());

        assert_eq!(
            html,
            "<div class=\"diagram\"><img src=\"https://example.com/cat.png\" alt=\"A cat\" title=\"A cat\" /></div>\n"
        );
    }
}
