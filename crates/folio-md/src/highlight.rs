//! Syntax highlighting with syntect.

use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::dom::escape_html;

/// Highlights code into `hljs-` prefixed class spans.
pub struct Highlighter {
    syntax_set: SyntaxSet,
}

impl Highlighter {
    /// Create a highlighter with syntect's bundled syntax definitions.
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
        }
    }

    /// Highlight `code`, falling back to escaped text for unknown languages.
    pub fn highlight(&self, code: &str, language: &str) -> String {
        let Some(syntax) = self.find(language) else {
            tracing::warn!("No syntax definition for `{}`, rendering as plain text", language);
            return escape_html(code);
        };

        let mut generator = ClassedHTMLGenerator::new_with_class_style(
            syntax,
            &self.syntax_set,
            ClassStyle::SpacedPrefixed { prefix: "hljs-" },
        );

        for line in LinesWithEndings::from(code) {
            if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
                tracing::warn!("Highlighting `{}` failed: {}", language, e);
                return escape_html(code);
            }
        }

        generator.finalize()
    }

    fn find(&self, language: &str) -> Option<&syntect::parsing::SyntaxReference> {
        self.syntax_set
            .find_syntax_by_token(language)
            .or_else(|| self.syntax_set.find_syntax_by_extension(language))
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_known_language() {
        let highlighter = Highlighter::new();

        let html = highlighter.highlight("fn main() {}\n", "rust");

        assert!(highlighter.find("rust").is_some());
        assert!(html.contains("<span class=\"hljs-"));
        assert!(html.contains("main"));
    }

    #[test]
    fn escapes_unknown_language() {
        let highlighter = Highlighter::new();

        let html = highlighter.highlight("a < b\n", "no-such-language");

        assert!(highlighter.find("no-such-language").is_none());
        assert_eq!(html, "a &lt; b\n");
    }
}
