//! Marker injection for anchor recovery after lossy HTML rendering.
//!
//! HTML conversion does not preserve custom attributes, so identifiers cannot
//! ride on the elements themselves. Instead, a second copy of the document
//! gets an inert sentinel paragraph (`MARKER_ID_<n>`) inserted immediately
//! before every element that consumes a text or table identifier. The
//! sentinel survives rendering as an ordinary paragraph and is recovered —
//! and stripped — by the anchor resolver through sibling adjacency.
//!
//! Markers carry the id of the *text* unit of their paragraph, never of an
//! image that preceded it inside the same paragraph; image units are matched
//! positionally downstream and get no marker.

use crate::package::{DocxPackage, DOCUMENT_PART};
use crate::walk::TraversalPlan;
use docaudit_core::{AuditError, Result};
use once_cell::sync::Lazy;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

/// Prefix of the sentinel token.
pub const MARKER_PREFIX: &str = "MARKER_ID_";

static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^MARKER_ID_(\d+)$").expect("marker pattern is valid"));

/// The sentinel token carrying an identifier.
#[inline]
#[must_use = "formats the sentinel token"]
pub fn marker_token(id: u32) -> String {
    format!("{MARKER_PREFIX}{id}")
}

/// Parse a sentinel token back into its identifier, if `text` is one.
#[must_use = "parses the sentinel token"]
pub fn marker_id(text: &str) -> Option<u32> {
    MARKER_RE
        .captures(text.trim())
        .and_then(|c| c[1].parse().ok())
}

fn marker_paragraph(id: u32) -> String {
    format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", marker_token(id))
}

/// Tracks inner-paragraph ordinals while inside a top-level structured block.
///
/// Only paragraphs not nested inside another open paragraph count, matching
/// the body parser's ordinal rule.
struct BlockScan {
    units: Vec<(usize, u32)>,
    ordinal: usize,
    para_depth: Option<usize>,
}

/// Insert sentinel paragraphs into `document.xml` per the traversal plan.
///
/// All original bytes stream through untouched; markers are spliced in at
/// element boundaries only.
///
/// # Errors
///
/// Returns an error if the XML is unreadable.
pub fn inject_markers(document_xml: &str, plan: &TraversalPlan) -> Result<String> {
    let mut insertions: Vec<(usize, u32)> = Vec::new();

    let mut reader = Reader::from_str(document_xml);
    reader.trim_text(false);

    let mut in_body = false;
    let mut depth = 0usize;
    let mut element_index = 0usize;
    let mut block: Option<BlockScan> = None;

    loop {
        let pos = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|e| AuditError::Xml(format!("error scanning document.xml: {e}")))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = e.name();
                let name = name.as_ref();
                if !in_body {
                    if name == b"w:body" {
                        in_body = true;
                    }
                    continue;
                }
                if depth == 0 {
                    match name {
                        b"w:p" | b"w:tbl" => {
                            if let Some(id) =
                                plan.slots.get(element_index).and_then(|s| s.unit_id)
                            {
                                insertions.push((pos, id));
                            }
                            element_index += 1;
                        }
                        b"w:sdt" => {
                            let units = plan
                                .slots
                                .get(element_index)
                                .map(|s| s.block_units.clone())
                                .unwrap_or_default();
                            block = Some(BlockScan {
                                units,
                                ordinal: 0,
                                para_depth: None,
                            });
                            element_index += 1;
                        }
                        _ => {}
                    }
                } else if name == b"w:p" {
                    if let Some(scan) = block.as_mut() {
                        if scan.para_depth.is_none() {
                            if let Some(&(_, id)) =
                                scan.units.iter().find(|&&(k, _)| k == scan.ordinal)
                            {
                                insertions.push((pos, id));
                            }
                            scan.ordinal += 1;
                            scan.para_depth = Some(depth);
                        }
                    }
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if !in_body {
                    continue;
                }
                let name = e.name();
                let name = name.as_ref();
                if depth == 0 {
                    if matches!(name, b"w:p" | b"w:tbl" | b"w:sdt") {
                        element_index += 1;
                    }
                } else if name == b"w:p" {
                    if let Some(scan) = block.as_mut() {
                        if scan.para_depth.is_none() {
                            scan.ordinal += 1;
                        }
                    }
                }
            }
            Event::End(e) => {
                if !in_body {
                    continue;
                }
                let name = e.name();
                let name = name.as_ref();
                if name == b"w:body" {
                    in_body = false;
                    continue;
                }
                depth = depth.saturating_sub(1);
                if let Some(scan) = block.as_mut() {
                    if name == b"w:p" && scan.para_depth == Some(depth) {
                        scan.para_depth = None;
                    }
                }
                if depth == 0 {
                    block = None;
                }
            }
            _ => {}
        }
    }

    let mut out = String::with_capacity(document_xml.len() + insertions.len() * 48);
    let mut last = 0;
    for (pos, id) in insertions {
        out.push_str(&document_xml[last..pos]);
        out.push_str(&marker_paragraph(id));
        last = pos;
    }
    out.push_str(&document_xml[last..]);
    Ok(out)
}

/// Produce the marked rendering copy of a package.
///
/// # Errors
///
/// Returns an error if the package has no readable `word/document.xml`.
pub fn marked_package(pkg: &DocxPackage, plan: &TraversalPlan) -> Result<DocxPackage> {
    let marked_xml = inject_markers(&pkg.document_xml()?, plan)?;
    let mut out = pkg.clone();
    out.set_part(DOCUMENT_PART, marked_xml.into_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::parse_body;
    use crate::walk::plan;
    use std::collections::HashSet;

    fn wrap_body(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><w:body>{inner}</w:body></w:document>"#
        )
    }

    fn plan_for(xml: &str, resolvable: &[&str]) -> crate::walk::TraversalPlan {
        let body = parse_body(xml).unwrap();
        let resolvable: HashSet<String> = resolvable.iter().map(ToString::to_string).collect();
        plan(&body, &resolvable)
    }

    fn marker_sequence(xml: &str) -> Vec<u32> {
        Regex::new(r"MARKER_ID_(\d+)")
            .unwrap()
            .captures_iter(xml)
            .map(|c| c[1].parse().unwrap())
            .collect()
    }

    #[test]
    fn test_marker_token_roundtrip() {
        assert_eq!(marker_token(12), "MARKER_ID_12");
        assert_eq!(marker_id("MARKER_ID_12"), Some(12));
        assert_eq!(marker_id("  MARKER_ID_0 "), Some(0));
        assert_eq!(marker_id("MARKER_ID_"), None);
        assert_eq!(marker_id("prefix MARKER_ID_3"), None);
    }

    #[test]
    fn test_markers_match_plan_count_and_order() {
        let xml = wrap_body(
            "<w:p><w:r><w:t>first</w:t></w:r></w:p>\
             <w:p/>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
             <w:p><w:r><w:t>last</w:t></w:r></w:p>",
        );
        let plan = plan_for(&xml, &[]);
        let marked = inject_markers(&xml, &plan).unwrap();

        // Identifier agreement: the marker sequence is exactly the
        // text/table unit id sequence, in order.
        assert_eq!(marker_sequence(&marked), vec![0, 1, 2]);
        assert_eq!(marker_sequence(&marked).len(), plan.marker_count());
    }

    #[test]
    fn test_marker_precedes_its_element() {
        let xml = wrap_body(
            "<w:p><w:r><w:t>alpha</w:t></w:r></w:p>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>beta</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let plan = plan_for(&xml, &[]);
        let marked = inject_markers(&xml, &plan).unwrap();

        let marker0 = marked.find("MARKER_ID_0").unwrap();
        let alpha = marked.find("alpha").unwrap();
        let marker1 = marked.find("MARKER_ID_1").unwrap();
        let tbl = marked.find("<w:tbl>").unwrap();
        assert!(marker0 < alpha);
        assert!(alpha < marker1);
        assert!(marker1 < tbl);
    }

    #[test]
    fn test_marker_carries_text_unit_id_not_image_id() {
        let xml = wrap_body(
            "<w:p>\
             <w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
             <w:r><w:t>caption</w:t></w:r>\
             </w:p>",
        );
        let plan = plan_for(&xml, &["rId5"]);
        let marked = inject_markers(&xml, &plan).unwrap();

        // Image takes id 0 invisibly; the paragraph marker must say 1.
        assert_eq!(marker_sequence(&marked), vec![1]);
    }

    #[test]
    fn test_block_markers_inserted_inside_block() {
        let xml = wrap_body(
            "<w:sdt><w:sdtContent>\
             <w:p><w:r><w:t>Contents</w:t></w:r></w:p>\
             <w:p/>\
             <w:p><w:r><w:t>1. Intro</w:t></w:r></w:p>\
             </w:sdtContent></w:sdt>",
        );
        let plan = plan_for(&xml, &[]);
        let marked = inject_markers(&xml, &plan).unwrap();

        assert_eq!(marker_sequence(&marked), vec![0, 1]);
        // Markers sit inside the sdt content, adjacent to their paragraphs.
        let sdt_open = marked.find("<w:sdtContent>").unwrap();
        let marker0 = marked.find("MARKER_ID_0").unwrap();
        let contents = marked.find("Contents").unwrap();
        assert!(sdt_open < marker0);
        assert!(marker0 < contents);
    }

    #[test]
    fn test_everything_else_streams_through_untouched() {
        let xml = wrap_body(
            "<w:p w:rsidR=\"00AB12CD\"><w:pPr><w:jc w:val=\"center\"/></w:pPr>\
             <w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">kept </w:t></w:r></w:p>",
        );
        let plan = plan_for(&xml, &[]);
        let marked = inject_markers(&xml, &plan).unwrap();

        // Removing the injected sentinel restores the original bytes.
        let restored = marked.replace(&marker_paragraph(0), "");
        assert_eq!(restored, xml);
    }

    #[test]
    fn test_no_units_no_markers() {
        let xml = wrap_body("<w:p/><w:p><w:r><w:t>   </w:t></w:r></w:p>");
        let plan = plan_for(&xml, &[]);
        let marked = inject_markers(&xml, &plan).unwrap();
        assert_eq!(marked, xml);
    }

    #[test]
    fn test_marked_package_replaces_only_document_part() {
        let pkg = DocxPackage::from_parts(vec![
            ("[Content_Types].xml".to_string(), b"<Types/>".to_vec()),
            (
                DOCUMENT_PART.to_string(),
                wrap_body("<w:p><w:r><w:t>x</w:t></w:r></w:p>").into_bytes(),
            ),
        ]);
        let body = parse_body(&pkg.document_xml().unwrap()).unwrap();
        let plan = plan(&body, &HashSet::new());
        let marked = marked_package(&pkg, &plan).unwrap();

        assert!(marked.document_xml().unwrap().contains("MARKER_ID_0"));
        assert_eq!(marked.part("[Content_Types].xml"), pkg.part("[Content_Types].xml"));
        // The source package stays pristine.
        assert!(!pkg.document_xml().unwrap().contains("MARKER_ID_"));
    }
}
