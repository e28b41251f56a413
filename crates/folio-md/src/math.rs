//! TeX math to MathML.
//!
//! Plain expressions go straight through latex2mathml. Tabular environments
//! (`cases`, `aligned` and the matrix family) are laid out here as
//! `<mtable>`s, with every cell converted on its own.

use std::sync::LazyLock;

use latex2mathml::{latex_to_mathml, DisplayStyle};
use regex::Regex;

const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";

static ENVIRONMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\\begin\{(cases|aligned|align\*?|gathered|matrix|pmatrix|bmatrix|Bmatrix|vmatrix|Vmatrix)\}",
    )
    .expect("valid regex")
});

/// Convert `latex` into a complete `<math>` element.
pub fn to_mathml(latex: &str, style: DisplayStyle) -> Result<String, MathError> {
    if !ENVIRONMENT.is_match(latex) {
        return latex_to_mathml(latex, style).map_err(|e| MathError(e.to_string()));
    }

    let display = match style {
        DisplayStyle::Block => "block",
        DisplayStyle::Inline => "inline",
    };
    Ok(format!(
        r#"<math xmlns="{MATHML_NAMESPACE}" display="{display}"><mrow>{}</mrow></math>"#,
        content(latex)?
    ))
}

/// MathML content for `latex` without the enclosing `<math>` element.
fn content(latex: &str) -> Result<String, MathError> {
    let Some(captures) = ENVIRONMENT.captures(latex) else {
        return fragment(latex);
    };
    let (Some(begin), Some(name)) = (captures.get(0), captures.get(1)) else {
        return fragment(latex);
    };
    let name = name.as_str();

    let (body_end, rest) = find_end(latex, begin.end(), name)
        .ok_or_else(|| MathError(format!("environment `{name}` is never closed")))?;

    let mut out = fragment(&latex[..begin.start()])?;
    out.push_str(&environment(name, &latex[begin.end()..body_end])?);
    out.push_str(&content(&latex[rest..])?);
    Ok(out)
}

fn fragment(latex: &str) -> Result<String, MathError> {
    if latex.trim().is_empty() {
        return Ok(String::new());
    }

    let mathml =
        latex_to_mathml(latex, DisplayStyle::Inline).map_err(|e| MathError(e.to_string()))?;
    let start = mathml.find('>').map_or(0, |pos| pos + 1);
    let end = mathml.rfind("</math>").unwrap_or(mathml.len());
    Ok(mathml.get(start..end).unwrap_or_default().to_string())
}

/// Byte range end of the body of `name` starting at `from`, and the offset
/// just past its `\end`. Nested environments of the same name are skipped.
fn find_end(latex: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let open = format!("\\begin{{{name}}}");
    let close = format!("\\end{{{name}}}");
    let mut depth = 1;
    let mut pos = from;

    loop {
        let next_close = pos + latex[pos..].find(&close)?;
        match latex[pos..].find(&open).map(|offset| pos + offset) {
            Some(next_open) if next_open < next_close => {
                depth += 1;
                pos = next_open + open.len();
            }
            _ => {
                depth -= 1;
                pos = next_close + close.len();
                if depth == 0 {
                    return Some((next_close, pos));
                }
            }
        }
    }
}

fn environment(name: &str, body: &str) -> Result<String, MathError> {
    let (left, right, columnalign) = match name {
        "cases" => ("{", "", Some("left left")),
        "aligned" | "align" | "align*" => ("", "", Some("right left right left right left")),
        "pmatrix" => ("(", ")", None),
        "bmatrix" => ("[", "]", None),
        "Bmatrix" => ("{", "}", None),
        "vmatrix" => ("|", "|", None),
        "Vmatrix" => ("\u{2016}", "\u{2016}", None),
        _ => ("", "", None),
    };

    let mut rows: Vec<&str> = split_top_level(body, "\\\\");
    while rows.last().is_some_and(|row| row.trim().is_empty()) {
        rows.pop();
    }

    let mut table = String::from("<mtable");
    if let Some(columnalign) = columnalign {
        table.push_str(&format!(r#" columnalign="{columnalign}""#));
    }
    table.push('>');
    for row in rows {
        let row = row.trim().trim_start_matches("\\hline").trim();
        table.push_str("<mtr>");
        for cell in split_top_level(row, "&") {
            table.push_str("<mtd><mrow>");
            table.push_str(&content(cell.trim())?);
            table.push_str("</mrow></mtd>");
        }
        table.push_str("</mtr>");
    }
    table.push_str("</mtable>");

    let mut out = String::from("<mrow>");
    if !left.is_empty() {
        out.push_str(&format!(r#"<mo fence="true">{left}</mo>"#));
    }
    out.push_str(&table);
    if !right.is_empty() {
        out.push_str(&format!(r#"<mo fence="true">{right}</mo>"#));
    }
    out.push_str("</mrow>");
    Ok(out)
}

/// Split on `separator` outside braces, nested environments and escapes.
fn split_top_level<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        if depth == 0 && rest.starts_with(separator) {
            parts.push(&text[start..pos]);
            pos += separator.len();
            start = pos;
            continue;
        }
        if rest.starts_with("\\begin{") {
            depth += 1;
            pos += "\\begin".len();
            continue;
        }
        if rest.starts_with("\\end{") {
            depth = depth.saturating_sub(1);
            pos += "\\end".len();
            continue;
        }

        let mut chars = rest.chars();
        let Some(c) = chars.next() else {
            break;
        };
        match c {
            '\\' => {
                pos += 1 + chars.next().map_or(0, char::len_utf8);
                continue;
            }
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        pos += c.len_utf8();
    }

    parts.push(&text[start..]);
    parts
}

/// TeX that cannot be converted.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MathError(String);
