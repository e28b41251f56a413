//! Front matter extraction.
//!
//! An article starts with a `---` line, a YAML header, and a closing `---`
//! line. Everything after the closing line is the Markdown body.

use serde_yaml::{Mapping, Value};

const DELIMITER: &str = "---";

/// The undecoded header and body of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrontMatter<'a> {
    /// YAML text between the delimiters, without the trailing newline
    pub header: &'a str,
    /// Everything after the closing delimiter line
    pub body: &'a str,
}

/// Split a source file into its raw header and body.
pub fn split_raw(source: &str) -> Result<RawFrontMatter<'_>, FrontmatterError> {
    let mut lines = LineSpans::new(source);

    match lines.next() {
        Some((_, line)) if line == DELIMITER => {}
        _ => return Err(FrontmatterError::MissingOpening),
    }
    let header_start = lines.offset;

    while let Some((line_start, line)) = lines.next() {
        if line == DELIMITER {
            // Drop the newline that precedes the closing delimiter
            let header_end = source[..line_start]
                .strip_suffix('\n')
                .map(|s| s.strip_suffix('\r').unwrap_or(s))
                .map_or(line_start, str::len)
                .max(header_start);
            return Ok(RawFrontMatter {
                header: &source[header_start..header_end],
                body: &source[lines.offset..],
            });
        }
    }

    Err(FrontmatterError::Unclosed)
}

/// Split a source file and decode its header as a YAML mapping.
///
/// An empty header decodes to an empty mapping.
pub fn split(source: &str) -> Result<(Mapping, &str), FrontmatterError> {
    let raw = split_raw(source)?;

    if raw.header.trim().is_empty() {
        return Ok((Mapping::new(), raw.body));
    }

    let value: Value = serde_yaml::from_str(raw.header)
        .map_err(|e| FrontmatterError::InvalidYaml(e.to_string()))?;

    match value {
        Value::Mapping(mapping) => Ok((mapping, raw.body)),
        Value::Null => Ok((Mapping::new(), raw.body)),
        _ => Err(FrontmatterError::NotAMapping),
    }
}

/// Reassemble a header and body into a source file.
pub fn join(header: &str, body: &str) -> String {
    if header.is_empty() {
        format!("{DELIMITER}\n{DELIMITER}\n{body}")
    } else {
        format!("{DELIMITER}\n{header}\n{DELIMITER}\n{body}")
    }
}

/// Iterator over lines with their byte offsets, tolerating `\r\n`.
struct LineSpans<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> LineSpans<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }
}

impl<'a> Iterator for LineSpans<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.source.len() {
            return None;
        }
        let start = self.offset;
        let rest = &self.source[start..];
        let (line, advance) = match rest.find('\n') {
            Some(pos) => (&rest[..pos], pos + 1),
            None => (rest, rest.len()),
        };
        self.offset += advance;
        Some((start, line.strip_suffix('\r').unwrap_or(line)))
    }
}

/// Errors that can occur when splitting front matter.
#[derive(Debug, thiserror::Error)]
pub enum FrontmatterError {
    #[error("Source does not start with a --- line")]
    MissingOpening,

    #[error("Unclosed front matter block - missing closing ---")]
    Unclosed,

    #[error("Invalid YAML in front matter: {0}")]
    InvalidYaml(String),

    #[error("Front matter is not a key-value mapping")]
    NotAMapping,
}
