//! Semantic HTML rendering of a document package.
//!
//! This plays the role of a generic, lossy converter: paragraphs become
//! `<p>`, tables become `<table>`, embedded images become inline `<img>`
//! data URIs, and structured-block paragraphs are flattened to `<p>`. No
//! custom attributes survive the conversion — sentinel paragraphs in a
//! marked package come out as ordinary `<p>MARKER_ID_n</p>` elements, which
//! is exactly what the anchor resolver expects to recover and strip.
//!
//! Within a paragraph the text is emitted first and its images after it, so
//! a sentinel's immediately following sibling is always the text element it
//! numbers; cross-document image order is preserved for positional
//! anchoring.

use base64::Engine;
use docaudit_core::Result;
use docaudit_docx::{parse_body, BodyElement, DocxPackage};
use log::debug;
use quick_xml::escape::escape;

/// Fallback MIME type for unrecognized media extensions.
const MIME_OCTET_STREAM: &str = "application/octet-stream";

/// MIME type from a media target's file extension.
fn mime_for(target: &str) -> &'static str {
    let ext = target
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        _ => MIME_OCTET_STREAM,
    }
}

/// Render a package body to a self-contained HTML fragment.
///
/// Unreadable image relationships are omitted from the output, matching the
/// traversal rule's skip semantics so positional image anchoring stays
/// aligned.
///
/// # Errors
///
/// Returns an error if the package has no readable `word/document.xml`.
pub fn render_package(pkg: &DocxPackage) -> Result<String> {
    let document_xml = pkg.document_xml()?;
    let body = parse_body(&document_xml)?;
    let relationships = pkg.relationships()?;

    let mut html = String::new();
    for element in &body {
        match element {
            BodyElement::Paragraph(p) => {
                let text = p.trimmed();
                if !text.is_empty() {
                    html.push_str("<p>");
                    html.push_str(&escape(text));
                    html.push_str("</p>\n");
                }
                for rel in &p.image_rels {
                    let Some(target) = relationships.get(rel) else {
                        continue;
                    };
                    let Some(bytes) = pkg.media_bytes(target) else {
                        debug!("omitting unreadable image target {target}");
                        continue;
                    };
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    html.push_str("<img src=\"data:");
                    html.push_str(mime_for(target));
                    html.push_str(";base64,");
                    html.push_str(&encoded);
                    html.push_str("\" />\n");
                }
            }
            BodyElement::Table(t) => {
                html.push_str("<table><tbody>\n");
                for (row_index, row) in t.rows.iter().enumerate() {
                    let cell_tag = if row_index == 0 { "th" } else { "td" };
                    html.push_str("<tr>");
                    for cell in row {
                        html.push('<');
                        html.push_str(cell_tag);
                        html.push('>');
                        html.push_str(&escape(cell));
                        html.push_str("</");
                        html.push_str(cell_tag);
                        html.push('>');
                    }
                    html.push_str("</tr>\n");
                }
                html.push_str("</tbody></table>\n");
            }
            BodyElement::Block(b) => {
                for text in &b.paragraphs {
                    let text = text.trim();
                    if !text.is_empty() {
                        html.push_str("<p>");
                        html.push_str(&escape(text));
                        html.push_str("</p>\n");
                    }
                }
            }
        }
    }

    Ok(html)
}

/// Wrap a fragment in a standalone page with document-preview styling.
#[must_use = "wraps the fragment in a full HTML page"]
pub fn render_page(fragment: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<style>
body {{
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Roboto', sans-serif;
    padding: 1.5rem;
    background-color: white;
    margin: 0;
}}
table {{
    border-collapse: collapse;
    width: 100%;
    margin-bottom: 1rem;
}}
th, td {{
    border: 1px solid #e5e7eb;
    padding: 0.75rem;
    text-align: left;
}}
tr:nth-child(even) {{
    background-color: #f9fafb;
}}
img {{
    max-width: 100%;
    height: auto;
    display: block;
    margin: 1rem 0;
    border-radius: 8px;
}}
</style>
</head>
<body>
{fragment}
</body>
</html>
"#
    )
}
