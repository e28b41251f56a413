//! Code fence info string parsing.

/// What a fenced code block's language tag asks for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FenceLanguage {
    /// No tag: preformatted text without highlighting
    #[default]
    Plain,
    /// `tikz`: compiled to theme-variant SVG diagrams
    Diagram,
    /// Any other tag: syntax highlighted if the highlighter knows it
    Code(String),
}

impl FenceLanguage {
    /// Parse the language from a code fence info string.
    pub fn from_info(info: &str) -> Self {
        match info.split_whitespace().next().unwrap_or("") {
            "" => Self::Plain,
            "tikz" => Self::Diagram,
            lang => Self::Code(lang.to_string()),
        }
    }
}

/// Presentation options following the language tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockMode {
    /// Collapsed behind an "Expand" toggle
    pub expansible: bool,
}

impl BlockMode {
    /// Parse options from a code fence info string.
    pub fn from_info(info: &str) -> Self {
        let expansible = info.split_whitespace().skip(1).any(|word| word == "expansible");
        Self { expansible }
    }
}

/// A fenced code block's parsed info string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FenceInfo {
    pub language: FenceLanguage,
    pub mode: BlockMode,
}

impl FenceInfo {
    pub fn parse(info: &str) -> Self {
        Self {
            language: FenceLanguage::from_info(info),
            mode: BlockMode::from_info(info),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_language() {
        assert_eq!(FenceLanguage::from_info(""), FenceLanguage::Plain);
        assert_eq!(FenceLanguage::from_info("tikz"), FenceLanguage::Diagram);
        assert_eq!(
            FenceLanguage::from_info("rust expansible"),
            FenceLanguage::Code("rust".to_string())
        );
        assert_eq!(
            FenceLanguage::from_info("x86asm"),
            FenceLanguage::Code("x86asm".to_string())
        );
    }

    #[test]
    fn parses_mode() {
        assert!(BlockMode::from_info("rust expansible").expansible);
        assert!(!BlockMode::from_info("rust").expansible);
        assert!(!BlockMode::from_info("expansible").expansible);
    }

    #[test]
    fn parses_info() {
        let info = FenceInfo::parse("cpp expansible");
        assert_eq!(info.language, FenceLanguage::Code("cpp".to_string()));
        assert!(info.mode.expansible);
    }
}
