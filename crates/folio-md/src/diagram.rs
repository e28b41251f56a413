//! TikZ diagram compilation.
//!
//! Every diagram is compiled twice, once per viewing theme, so that the page
//! can swap colors without the author drawing the diagram twice. The actual
//! typesetting is delegated to a [`Typesetter`], which turns a standalone
//! LaTeX document into SVG markup.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::dom::escape_html;

static XML_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\?xml[\s\S]*?\?>").expect("valid regex"));
static DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!DOCTYPE[\s\S]*?>").expect("valid regex"));

/// Viewing theme a diagram is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    /// Themes in output order.
    pub const ALL: [Theme; 2] = [Theme::Light, Theme::Dark];

    pub fn name(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Stroke and text color used when the diagram does not set one.
    pub fn default_color(self) -> &'static str {
        match self {
            Self::Light => "black",
            Self::Dark => "white",
        }
    }
}

/// Per-theme TikZ preamble shared by all diagrams of an article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DiagramThemes {
    #[serde(default)]
    pub light: String,
    #[serde(default)]
    pub dark: String,
}

impl DiagramThemes {
    pub fn preamble(&self, theme: Theme) -> &str {
        match theme {
            Theme::Light => &self.light,
            Theme::Dark => &self.dark,
        }
    }
}

/// Diagram code with its accessible description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagramSource<'a> {
    /// Text from a leading `% alt ...` line, or empty
    pub alt: &'a str,
    /// Full TikZ code, including the alt comment
    pub code: &'a str,
}

impl<'a> DiagramSource<'a> {
    pub fn parse(code: &'a str) -> Self {
        let first_line = code.lines().next().unwrap_or("");
        let alt = first_line.strip_prefix("% alt ").unwrap_or("").trim_end();
        Self { alt, code }
    }
}

/// Turns a standalone LaTeX document into SVG markup.
pub trait Typesetter: Send + Sync {
    fn typeset(&self, tex: &str) -> Result<String, ToolchainError>;
}

/// Typesetter backed by `latex` and `dvisvgm` executables.
#[derive(Debug, Clone)]
pub struct LatexToolchain {
    latex: PathBuf,
    dvisvgm: PathBuf,
}

impl LatexToolchain {
    pub fn new() -> Self {
        Self {
            latex: PathBuf::from("latex"),
            dvisvgm: PathBuf::from("dvisvgm"),
        }
    }

    /// Use explicit executable paths instead of looking them up in `PATH`.
    pub fn with_programs(latex: impl Into<PathBuf>, dvisvgm: impl Into<PathBuf>) -> Self {
        Self {
            latex: latex.into(),
            dvisvgm: dvisvgm.into(),
        }
    }

    fn run(&self, program: &Path, args: &[String], dir: &Path) -> Result<(), ToolchainError> {
        tracing::debug!("Running {} {}", program.display(), args.join(" "));

        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|e| ToolchainError::Io {
                context: format!("failed to spawn {}", program.display()),
                source: e,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut log = String::from_utf8_lossy(&output.stderr).into_owned();
        if log.trim().is_empty() {
            log = String::from_utf8_lossy(&output.stdout).into_owned();
        }
        Err(ToolchainError::Command {
            program: program.display().to_string(),
            status: output.status.to_string(),
            log: tail(&log, 2000).to_string(),
        })
    }
}

impl Default for LatexToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Typesetter for LatexToolchain {
    fn typeset(&self, tex: &str) -> Result<String, ToolchainError> {
        let dir = tempfile::tempdir().map_err(|e| ToolchainError::Io {
            context: "failed to create working directory".to_string(),
            source: e,
        })?;
        let dir = dir.path();

        fs::write(dir.join("diagram.tex"), tex).map_err(|e| ToolchainError::Io {
            context: "failed to write diagram.tex".to_string(),
            source: e,
        })?;

        self.run(
            &self.latex,
            &[
                "-interaction=batchmode".to_string(),
                format!("-output-directory={}", dir.display()),
                "diagram.tex".to_string(),
            ],
            dir,
        )?;
        self.run(
            &self.dvisvgm,
            &[
                "--optimize".to_string(),
                "--no-fonts".to_string(),
                format!("--output={}", dir.join("diagram").display()),
                dir.join("diagram.dvi").display().to_string(),
            ],
            dir,
        )?;

        fs::read_to_string(dir.join("diagram.svg")).map_err(|e| ToolchainError::Io {
            context: "failed to read diagram.svg".to_string(),
            source: e,
        })
    }
}

/// Compiles TikZ code into one inline SVG fragment per theme.
#[derive(Clone, Copy)]
pub struct DiagramCompiler<'t> {
    typesetter: &'t dyn Typesetter,
}

impl<'t> DiagramCompiler<'t> {
    pub fn new(typesetter: &'t dyn Typesetter) -> Self {
        Self { typesetter }
    }

    /// Compile `code` for every theme and concatenate the wrapped fragments.
    pub fn compile(&self, code: &str, themes: &DiagramThemes) -> Result<String, ToolchainError> {
        let source = DiagramSource::parse(code);
        let mut rendered = String::new();

        for theme in Theme::ALL {
            let tex = Self::tex_document(theme, themes.preamble(theme), source.code);
            let svg = self.typesetter.typeset(&tex)?;
            let svg = inject_title(&strip_prologue(&svg), source.alt);
            rendered.push_str(&format!(
                r#"<div class="diagram only-{}">{}</div>"#,
                theme.name(),
                svg
            ));
        }

        Ok(rendered)
    }

    /// Build the standalone LaTeX document for one theme.
    pub fn tex_document(theme: Theme, preamble: &str, code: &str) -> String {
        let color = theme.default_color();
        format!(
            r"\documentclass{{standalone}}
\usepackage[svgnames]{{xcolor}}
\usepackage{{tikz}}
\usepackage[sfdefault]{{roboto}}
\usetikzlibrary{{arrows.meta}}
\usetikzlibrary{{decorations.pathreplacing}}
\usetikzlibrary{{shapes.geometric}}

\begin{{document}}

\begin{{tikzpicture}}[draw={color},text={color}]
{preamble}
{code}
\end{{tikzpicture}}

\end{{document}}"
        )
    }
}

/// Remove the XML declaration and doctype so the SVG can be inlined.
pub fn strip_prologue(svg: &str) -> String {
    let svg = XML_DECLARATION.replace(svg, "");
    DOCTYPE.replace(&svg, "").trim_start().to_string()
}

/// Add a `<title>` as the last child of the root `<svg>` element.
pub fn inject_title(svg: &str, title: &str) -> String {
    match svg.rfind("</svg>") {
        Some(pos) => format!(
            "{}<title>{}</title>{}",
            &svg[..pos],
            escape_html(title),
            &svg[pos..]
        ),
        None => svg.to_string(),
    }
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Failures of the external typesetting toolchain or of asset loading.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {log}")]
    Command {
        program: String,
        status: String,
        log: String,
    },

    #[error("Failed to load asset {name}: {message}")]
    Asset { name: String, message: String },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns canned SVG and records every document it was asked to typeset.
    #[derive(Default)]
    pub(crate) struct FakeTypesetter {
        pub documents: Mutex<Vec<String>>,
    }

    impl Typesetter for FakeTypesetter {
        fn typeset(&self, tex: &str) -> Result<String, ToolchainError> {
            let mut documents = self.documents.lock().unwrap();
            documents.push(tex.to_string());
            Ok(format!(
                "<?xml version='1.0' encoding='UTF-8'?>\n<!DOCTYPE svg PUBLIC '-//W3C//DTD SVG 1.1//EN' 'http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd'>\n<svg version='1.1'><path d='M0 0'/><!-- doc {} --></svg>",
                documents.len()
            ))
        }
    }

    pub(crate) struct FailingTypesetter;

    impl Typesetter for FailingTypesetter {
        fn typeset(&self, _tex: &str) -> Result<String, ToolchainError> {
            Err(ToolchainError::Command {
                program: "latex".to_string(),
                status: "exit status: 1".to_string(),
                log: "! Undefined control sequence.".to_string(),
            })
        }
    }

    #[test]
    fn parses_alt_text() {
        let source = DiagramSource::parse("% alt A triangle\n\\draw (0,0) -- (1,0) -- (0,1) -- cycle;");
        assert_eq!(source.alt, "A triangle");

        let source = DiagramSource::parse("\\draw (0,0) -- (1,1);");
        assert_eq!(source.alt, "");
    }

    #[test]
    fn compiles_one_fragment_per_theme() {
        let typesetter = FakeTypesetter::default();
        let compiler = DiagramCompiler::new(&typesetter);

        let html = compiler
            .compile(
                "% alt A triangle\n\\draw (0,0) -- (1,0) -- (0,1) -- cycle;\n",
                &DiagramThemes::default(),
            )
            .unwrap();

        let light = html.find(r#"<div class="diagram only-light"><svg"#).unwrap();
        let dark = html.find(r#"<div class="diagram only-dark"><svg"#).unwrap();
        assert!(light < dark);
        assert_eq!(html.matches("<title>A triangle</title></svg></div>").count(), 2);
        assert!(!html.contains("<?xml"));
        assert!(!html.contains("<!DOCTYPE"));
    }

    #[test]
    fn binds_theme_color_and_preamble() {
        let typesetter = FakeTypesetter::default();
        let compiler = DiagramCompiler::new(&typesetter);
        let themes = DiagramThemes {
            light: "\\colorlet{accent}{Blue}".to_string(),
            dark: "\\colorlet{accent}{LightBlue}".to_string(),
        };

        compiler.compile("\\draw (0,0) -- (1,1);", &themes).unwrap();

        let documents = typesetter.documents.lock().unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents[0].contains("[draw=black,text=black]"));
        assert!(documents[0].contains("\\colorlet{accent}{Blue}\n\\draw (0,0) -- (1,1);"));
        assert!(documents[1].contains("[draw=white,text=white]"));
        assert!(documents[1].contains("\\colorlet{accent}{LightBlue}"));
        assert!(documents[1].starts_with("\\documentclass{standalone}"));
    }

    #[test]
    fn escapes_alt_text_in_title() {
        let svg = inject_title("<svg></svg>", "x < y & z");
        assert_eq!(svg, "<svg><title>x &lt; y &amp; z</title></svg>");
    }

    #[test]
    fn toolchain_failure_is_propagated() {
        let compiler = DiagramCompiler::new(&FailingTypesetter);

        let result = compiler.compile("\\undefined", &DiagramThemes::default());

        assert!(matches!(result, Err(ToolchainError::Command { .. })));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("short", 10), "short");
        assert_eq!(tail("ааа", 3), "а");
    }
}
