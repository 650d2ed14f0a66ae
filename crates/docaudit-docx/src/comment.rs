//! Native reviewer-comment insertion.
//!
//! Given the pristine original package and a selected issue list, produces a
//! new package with one comment per issue: a definition appended to
//! `word/comments.xml` (created and wired into the content types and
//! relationships when absent, found when present), a `commentRangeStart` at
//! the beginning of the target paragraph's content, a `commentRangeEnd` at
//! its end, and a comment-reference run after that. For an image-run target
//! the range markers sit as immediate siblings around the run.
//!
//! Target resolution is deliberately redundant against an unreliable
//! upstream `element_id`: a whitespace-stripped text match over body
//! elements wins, and only when no text matches is the identifier replayed
//! through the shared traversal plan. A per-issue failure skips that issue;
//! the output package is always produced.

use crate::body::{get_attr, parse_body, BodyElement};
use crate::package::{
    DocxPackage, COMMENTS_PART, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART,
};
use crate::walk::{plan, resolvable_images, TraversalPlan};
use chrono::Utc;
use docaudit_core::{AuditError, Issue, Result};
use log::{debug, warn};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;

const COMMENTS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";
const COMMENTS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
const WML_NAMESPACE: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Comment author metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentAuthor {
    /// Display name shown in the reviewer-comment UI.
    pub name: String,
    /// Short initials shown on collapsed comments.
    pub initials: String,
}

impl Default for CommentAuthor {
    fn default() -> Self {
        Self {
            name: "Review Agent".to_string(),
            initials: "RA".to_string(),
        }
    }
}

/// Writes native reviewer comments into a document package.
#[derive(Debug, Clone, Default)]
pub struct CommentWriter {
    author: CommentAuthor,
}

/// Where a comment range will be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// A top-level body paragraph.
    Paragraph { element: usize },
    /// A paragraph inside a table: the first one whose normalized text
    /// contains `needle`, or simply the first paragraph when `None`.
    TableParagraph {
        element: usize,
        needle: Option<String>,
    },
    /// An inner paragraph of a structured content block, by ordinal.
    BlockParagraph { element: usize, ordinal: usize },
    /// The run holding the n-th readable image of a paragraph.
    ImageRun { element: usize, image_index: usize },
}

/// Insertion points: range start goes in at `start_at`, range end and the
/// reference run at `end_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start_at: usize,
    end_at: usize,
}

impl CommentWriter {
    /// Writer with the default author.
    #[must_use = "creates a comment writer"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with explicit author metadata.
    #[must_use = "creates a comment writer with the given author"]
    pub fn with_author(author: CommentAuthor) -> Self {
        Self { author }
    }

    /// Produce a new package with one native comment per resolvable issue.
    ///
    /// Issues that are missing required fields or whose target cannot be
    /// resolved are skipped individually; they never abort the batch. The
    /// output package is produced even when zero comments were placed.
    ///
    /// # Errors
    ///
    /// Returns an error only for package-level failures (unreadable
    /// document, corrupt comments or content-type parts).
    pub fn annotate(&self, pkg: &DocxPackage, issues: &[Issue]) -> Result<DocxPackage> {
        let mut document_xml = pkg.document_xml()?;
        let body = parse_body(&document_xml)?;
        let relationships = pkg.relationships()?;
        let resolvable = resolvable_images(pkg, &relationships);
        let traversal = plan(&body, &resolvable);

        let existing = existing_comment_count(pkg)?;
        let date = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let mut entries: Vec<String> = Vec::new();
        for issue in issues {
            let Some(text) = comment_text(issue) else {
                warn!("skipping issue without description");
                continue;
            };
            let Some(target) = resolve_target(&body, &traversal, issue) else {
                warn!(
                    "skipping issue with no resolvable target (element_id {})",
                    issue.element_id
                );
                continue;
            };
            let id = u32::try_from(existing + entries.len()).unwrap_or(u32::MAX);
            match insert_comment_range(&document_xml, &target, id, &resolvable) {
                Ok(Some(updated)) => {
                    document_xml = updated;
                    entries.push(comment_entry_xml(id, &self.author, &date, &text));
                }
                Ok(None) => {
                    warn!("comment target not found in document; issue skipped");
                }
                Err(e) => {
                    warn!("failed to place comment: {e}; issue skipped");
                }
            }
        }

        debug!("placed {} of {} selected issues", entries.len(), issues.len());

        let mut out = pkg.clone();
        out.set_part(DOCUMENT_PART, document_xml.into_bytes());
        if !entries.is_empty() {
            upsert_comments_part(&mut out, &entries)?;
            ensure_content_type(&mut out)?;
            ensure_relationship(&mut out)?;
        }
        Ok(out)
    }
}

/// Comment body text, or `None` when the issue lacks the required fields.
fn comment_text(issue: &Issue) -> Option<String> {
    let description = issue.description.trim();
    if description.is_empty() {
        return None;
    }
    let mut text = format!("[{}] {description}", issue.severity);
    let suggestion = issue.suggestion.trim();
    if !suggestion.is_empty() {
        text.push('\n');
        text.push_str("Suggestion: ");
        text.push_str(suggestion);
    }
    Some(text)
}

/// Strip all whitespace for tolerant text comparison.
fn normalize(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// The normalized first non-empty line of a (possibly multi-line) excerpt.
fn anchor_line(original_text: &str) -> Option<String> {
    original_text
        .lines()
        .map(normalize)
        .find(|line| !line.is_empty())
}

/// Resolve an issue to its insertion target: text match first, identifier
/// replay second.
fn resolve_target(
    body: &[BodyElement],
    traversal: &TraversalPlan,
    issue: &Issue,
) -> Option<Target> {
    if let Some(needle) = anchor_line(&issue.original_text) {
        for (element, el) in body.iter().enumerate() {
            match el {
                BodyElement::Paragraph(p) => {
                    if normalize(&p.text).contains(&needle) {
                        return Some(Target::Paragraph { element });
                    }
                }
                BodyElement::Table(t) => {
                    if normalize(&t.full_text()).contains(&needle) {
                        return Some(Target::TableParagraph {
                            element,
                            needle: Some(needle),
                        });
                    }
                }
                BodyElement::Block(_) => {}
            }
        }
    }

    let element_id = issue.resolved_element()?;
    for (element, slots) in traversal.slots.iter().enumerate() {
        if slots.unit_id == Some(element_id) {
            return Some(match body.get(element)? {
                BodyElement::Paragraph(_) => Target::Paragraph { element },
                BodyElement::Table(_) => Target::TableParagraph {
                    element,
                    needle: None,
                },
                BodyElement::Block(_) => return None,
            });
        }
        if let Some(image_index) = slots.image_ids.iter().position(|&id| id == element_id) {
            return Some(Target::ImageRun {
                element,
                image_index,
            });
        }
        if let Some(&(ordinal, _)) = slots
            .block_units
            .iter()
            .find(|&&(_, id)| id == element_id)
        {
            return Some(Target::BlockParagraph { element, ordinal });
        }
    }
    None
}

/// Splice a comment range around the resolved target.
fn insert_comment_range(
    document_xml: &str,
    target: &Target,
    comment_id: u32,
    resolvable: &HashSet<String>,
) -> Result<Option<String>> {
    let Some(span) = locate_insertion(document_xml, target, resolvable)? else {
        return Ok(None);
    };

    let range_start = format!("<w:commentRangeStart w:id=\"{comment_id}\"/>");
    let range_end = format!(
        "<w:commentRangeEnd w:id=\"{comment_id}\"/><w:r><w:commentReference w:id=\"{comment_id}\"/></w:r>"
    );

    let mut out = String::with_capacity(document_xml.len() + range_start.len() + range_end.len());
    out.push_str(&document_xml[..span.start_at]);
    out.push_str(&range_start);
    out.push_str(&document_xml[span.start_at..span.end_at]);
    out.push_str(&range_end);
    out.push_str(&document_xml[span.end_at..]);
    Ok(Some(out))
}

fn locate_insertion(
    document_xml: &str,
    target: &Target,
    resolvable: &HashSet<String>,
) -> Result<Option<Span>> {
    match target {
        Target::Paragraph { element } => {
            let Some(es) = element_span(document_xml, *element)? else {
                return Ok(None);
            };
            if es.empty {
                return Ok(None);
            }
            paragraph_points(document_xml, es.start)
        }
        Target::TableParagraph { element, needle } => {
            let Some(es) = element_span(document_xml, *element)? else {
                return Ok(None);
            };
            let fragment = &document_xml[es.start..es.end];
            let Some(rel) = find_table_paragraph(fragment, needle.as_deref())? else {
                return Ok(None);
            };
            paragraph_points(document_xml, es.start + rel)
        }
        Target::BlockParagraph { element, ordinal } => {
            let Some(es) = element_span(document_xml, *element)? else {
                return Ok(None);
            };
            let fragment = &document_xml[es.start..es.end];
            let Some(rel) = find_block_paragraph(fragment, *ordinal)? else {
                return Ok(None);
            };
            paragraph_points(document_xml, es.start + rel)
        }
        Target::ImageRun {
            element,
            image_index,
        } => {
            let Some(es) = element_span(document_xml, *element)? else {
                return Ok(None);
            };
            let fragment = &document_xml[es.start..es.end];
            let Some(rel) = find_image_run(fragment, *image_index, resolvable)? else {
                return Ok(None);
            };
            Ok(Some(Span {
                start_at: es.start + rel.start_at,
                end_at: es.start + rel.end_at,
            }))
        }
    }
}

/// Byte span of the n-th top-level body element.
#[derive(Debug, Clone, Copy)]
struct ElementSpan {
    start: usize,
    end: usize,
    empty: bool,
}

fn xml_err(e: quick_xml::Error) -> AuditError {
    AuditError::Xml(format!("error scanning document.xml: {e}"))
}

fn element_span(document_xml: &str, wanted: usize) -> Result<Option<ElementSpan>> {
    let mut reader = Reader::from_str(document_xml);
    reader.trim_text(false);

    let mut in_body = false;
    let mut depth = 0usize;
    let mut index = 0usize;
    let mut open: Option<usize> = None;

    loop {
        let pos = reader.buffer_position();
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => return Ok(None),
            Event::Start(e) => {
                let name = e.name();
                let name = name.as_ref();
                if !in_body {
                    if name == b"w:body" {
                        in_body = true;
                    }
                    continue;
                }
                if depth == 0 && matches!(name, b"w:p" | b"w:tbl" | b"w:sdt") {
                    if index == wanted {
                        open = Some(pos);
                    }
                    index += 1;
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if !in_body {
                    continue;
                }
                if depth == 0 && matches!(e.name().as_ref(), b"w:p" | b"w:tbl" | b"w:sdt") {
                    if index == wanted {
                        return Ok(Some(ElementSpan {
                            start: pos,
                            end: reader.buffer_position(),
                            empty: true,
                        }));
                    }
                    index += 1;
                }
            }
            Event::End(e) => {
                if !in_body {
                    continue;
                }
                if e.name().as_ref() == b"w:body" {
                    in_body = false;
                    continue;
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(start) = open {
                        return Ok(Some(ElementSpan {
                            start,
                            end: reader.buffer_position(),
                            empty: false,
                        }));
                    }
                }
            }
            _ => {}
        }
    }
}

/// Insertion points inside the paragraph starting at `para_start`: after the
/// paragraph-properties node when present (else right after the open tag),
/// and just before the closing tag.
fn paragraph_points(document_xml: &str, para_start: usize) -> Result<Option<Span>> {
    let fragment = &document_xml[para_start..];
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut depth = 0usize;
    let mut after_open: Option<usize> = None;
    let mut insert_at: Option<usize> = None;
    let mut first_child_seen = false;
    let mut in_ppr = false;

    loop {
        let pos = reader.buffer_position();
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => return Ok(None),
            Event::Start(e) => {
                if depth == 0 {
                    if e.name().as_ref() != b"w:p" {
                        return Ok(None);
                    }
                    after_open = Some(reader.buffer_position());
                } else if depth == 1 && !first_child_seen {
                    first_child_seen = true;
                    if e.name().as_ref() == b"w:pPr" {
                        in_ppr = true;
                    } else {
                        insert_at = after_open;
                    }
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 1 && !first_child_seen {
                    first_child_seen = true;
                    if e.name().as_ref() == b"w:pPr" {
                        insert_at = Some(reader.buffer_position());
                    } else {
                        insert_at = after_open;
                    }
                }
            }
            Event::Text(e) => {
                let text = e.unescape().unwrap_or_default();
                if depth == 1 && !first_child_seen && !text.trim().is_empty() {
                    first_child_seen = true;
                    insert_at = after_open;
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if in_ppr && depth == 1 && e.name().as_ref() == b"w:pPr" {
                    in_ppr = false;
                    insert_at = Some(reader.buffer_position());
                }
                if depth == 0 {
                    let start_at = insert_at.or(after_open).unwrap_or(0);
                    return Ok(Some(Span {
                        start_at: para_start + start_at,
                        end_at: para_start + pos,
                    }));
                }
            }
            _ => {}
        }
    }
}

/// Offset (within a table fragment) of the first paragraph matching the
/// needle, or of the first non-empty paragraph when no needle is given.
fn find_table_paragraph(fragment: &str, needle: Option<&str>) -> Result<Option<usize>> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut para_start: Option<usize> = None;
    let mut para_depth = 0usize;
    let mut in_text = false;
    let mut text = String::new();

    loop {
        let pos = reader.buffer_position();
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => return Ok(None),
            Event::Start(e) => {
                let name = e.name();
                let name = name.as_ref();
                if para_start.is_none() {
                    if name == b"w:p" {
                        para_start = Some(pos);
                        para_depth = 0;
                        text.clear();
                    }
                } else {
                    para_depth += 1;
                    if name == b"w:t" {
                        in_text = true;
                    }
                }
            }
            Event::Text(e) => {
                if in_text {
                    text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Event::End(e) => {
                let name = e.name();
                let name = name.as_ref();
                if para_start.is_some() {
                    if para_depth > 0 {
                        para_depth -= 1;
                        if name == b"w:t" {
                            in_text = false;
                        }
                    } else if name == b"w:p" {
                        let start = para_start.take();
                        let matched = match needle {
                            Some(n) => normalize(&text).contains(n),
                            None => true,
                        };
                        if matched {
                            return Ok(start);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Offset (within a block fragment) of the inner paragraph with the given
/// ordinal, counting only paragraphs not nested inside another open
/// paragraph (the body parser's ordinal rule). Self-closing paragraphs hold
/// an ordinal but cannot host a range.
fn find_block_paragraph(fragment: &str, ordinal: usize) -> Result<Option<usize>> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut seen = 0usize;
    let mut depth = 0usize;
    let mut para_depth: Option<usize> = None;
    loop {
        let pos = reader.buffer_position();
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => return Ok(None),
            Event::Start(e) => {
                if e.name().as_ref() == b"w:p" && para_depth.is_none() {
                    if seen == ordinal {
                        return Ok(Some(pos));
                    }
                    seen += 1;
                    para_depth = Some(depth);
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if e.name().as_ref() == b"w:p" && para_depth.is_none() {
                    if seen == ordinal {
                        return Ok(None);
                    }
                    seen += 1;
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == b"w:p" && para_depth == Some(depth) {
                    para_depth = None;
                }
            }
            _ => {}
        }
    }
}

/// Span (within a paragraph fragment) of the run holding the n-th readable
/// image, counting images the way the traversal plan does.
fn find_image_run(
    fragment: &str,
    image_index: usize,
    resolvable: &HashSet<String>,
) -> Result<Option<Span>> {
    let mut reader = Reader::from_str(fragment);
    reader.trim_text(false);

    let mut run_start: Option<usize> = None;
    let mut run_depth = 0usize;
    let mut run_blips = 0usize;
    let mut in_drawing = false;
    let mut seen = 0usize;

    loop {
        let pos = reader.buffer_position();
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => return Ok(None),
            Event::Start(e) => {
                let name = e.name();
                let name = name.as_ref();
                if run_start.is_none() {
                    if name == b"w:r" {
                        run_start = Some(pos);
                        run_depth = 0;
                        run_blips = 0;
                    }
                } else {
                    run_depth += 1;
                    match name {
                        b"w:drawing" => in_drawing = true,
                        b"a:blip" if in_drawing => {
                            if get_attr(&e, b"r:embed")
                                .is_some_and(|rel| resolvable.contains(&rel))
                            {
                                run_blips += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Empty(e) => {
                if run_start.is_some() && in_drawing && e.name().as_ref() == b"a:blip" {
                    if get_attr(&e, b"r:embed").is_some_and(|rel| resolvable.contains(&rel)) {
                        run_blips += 1;
                    }
                }
            }
            Event::End(e) => {
                let name = e.name();
                let name = name.as_ref();
                if run_start.is_some() {
                    if run_depth > 0 {
                        run_depth -= 1;
                        if name == b"w:drawing" {
                            in_drawing = false;
                        }
                    } else if name == b"w:r" {
                        let start = run_start.take();
                        if image_index < seen + run_blips {
                            return Ok(start.map(|start_at| Span {
                                start_at,
                                end_at: reader.buffer_position(),
                            }));
                        }
                        seen += run_blips;
                    }
                }
            }
            _ => {}
        }
    }
}

/// Count pre-existing comment definitions.
fn existing_comment_count(pkg: &DocxPackage) -> Result<usize> {
    let Some(data) = pkg.part(COMMENTS_PART) else {
        return Ok(0);
    };
    let xml = String::from_utf8_lossy(data);

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);

    let mut count = 0usize;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"w:comment" => {
                count += 1;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AuditError::Comment(format!(
                    "error parsing comments part: {e}"
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(count)
}

/// One comment definition. Multi-line bodies render as explicit breaks, not
/// literal newline characters.
fn comment_entry_xml(id: u32, author: &CommentAuthor, date: &str, text: &str) -> String {
    let mut runs = String::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            runs.push_str("<w:br/>");
        }
        if !line.is_empty() {
            runs.push_str("<w:t xml:space=\"preserve\">");
            runs.push_str(&escape(line));
            runs.push_str("</w:t>");
        }
    }
    format!(
        "<w:comment w:id=\"{id}\" w:author=\"{}\" w:initials=\"{}\" w:date=\"{date}\"><w:p><w:r>{runs}</w:r></w:p></w:comment>",
        escape(&author.name),
        escape(&author.initials),
    )
}

/// Append definitions to the comments part, creating the part when absent.
fn upsert_comments_part(pkg: &mut DocxPackage, entries: &[String]) -> Result<()> {
    if pkg.has_part(COMMENTS_PART) {
        let xml = pkg.part_str(COMMENTS_PART)?;
        let Some(idx) = xml.rfind("</w:comments>") else {
            return Err(AuditError::Comment(
                "comments part has no closing element".to_string(),
            ));
        };
        let mut out = String::with_capacity(xml.len() + entries.iter().map(String::len).sum::<usize>());
        out.push_str(&xml[..idx]);
        for entry in entries {
            out.push_str(entry);
        }
        out.push_str(&xml[idx..]);
        pkg.set_part(COMMENTS_PART, out.into_bytes());
    } else {
        let mut xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n<w:comments xmlns:w=\"{WML_NAMESPACE}\">"
        );
        for entry in entries {
            xml.push_str(entry);
        }
        xml.push_str("</w:comments>");
        pkg.set_part(COMMENTS_PART, xml.into_bytes());
    }
    Ok(())
}

/// Register the comments content type when not already declared.
fn ensure_content_type(pkg: &mut DocxPackage) -> Result<()> {
    let xml = pkg.part_str(CONTENT_TYPES_PART)?;
    if has_comments_override(&xml) {
        return Ok(());
    }
    let Some(idx) = xml.rfind("</Types>") else {
        return Err(AuditError::Comment(
            "content types part has no closing element".to_string(),
        ));
    };
    let override_xml = format!(
        "<Override PartName=\"/word/comments.xml\" ContentType=\"{COMMENTS_CONTENT_TYPE}\"/>"
    );
    let mut out = String::with_capacity(xml.len() + override_xml.len());
    out.push_str(&xml[..idx]);
    out.push_str(&override_xml);
    out.push_str(&xml[idx..]);
    pkg.set_part(CONTENT_TYPES_PART, out.into_bytes());
    Ok(())
}

fn has_comments_override(content_types_xml: &str) -> bool {
    let mut reader = Reader::from_str(content_types_xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"Override" => {
                if get_attr(&e, b"PartName").as_deref() == Some("/word/comments.xml") {
                    return true;
                }
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
    }
}

/// Relate the comments part to the main document when not already related.
fn ensure_relationship(pkg: &mut DocxPackage) -> Result<()> {
    let Some(data) = pkg.part(DOCUMENT_RELS_PART) else {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\"><Relationship Id=\"rId1\" Type=\"{COMMENTS_REL_TYPE}\" Target=\"comments.xml\"/></Relationships>"
        );
        pkg.set_part(DOCUMENT_RELS_PART, xml.into_bytes());
        return Ok(());
    };
    let xml = String::from_utf8_lossy(data).into_owned();

    let (has_comments_rel, next_rid) = scan_relationships(&xml);
    if has_comments_rel {
        return Ok(());
    }
    let Some(idx) = xml.rfind("</Relationships>") else {
        return Err(AuditError::Comment(
            "relationships part has no closing element".to_string(),
        ));
    };
    let rel_xml = format!(
        "<Relationship Id=\"rId{next_rid}\" Type=\"{COMMENTS_REL_TYPE}\" Target=\"comments.xml\"/>"
    );
    let mut out = String::with_capacity(xml.len() + rel_xml.len());
    out.push_str(&xml[..idx]);
    out.push_str(&rel_xml);
    out.push_str(&xml[idx..]);
    pkg.set_part(DOCUMENT_RELS_PART, out.into_bytes());
    Ok(())
}

/// Whether a comments relationship exists, and the next free `rId` number.
fn scan_relationships(rels_xml: &str) -> (bool, u32) {
    let mut has_comments_rel = false;
    let mut max_rid = 0u32;

    let mut reader = Reader::from_str(rels_xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"Relationship" => {
                if get_attr(&e, b"Type").as_deref() == Some(COMMENTS_REL_TYPE) {
                    has_comments_rel = true;
                }
                if let Some(id) = get_attr(&e, b"Id") {
                    if let Some(n) = id.strip_prefix("rId").and_then(|s| s.parse::<u32>().ok()) {
                        max_rid = max_rid.max(n);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    (has_comments_rel, max_rid + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docaudit_core::{ContentKind, Severity};

    fn wrap_body(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><w:body>{inner}</w:body></w:document>"#
        )
    }

    fn issue(element_id: i64, category: ContentKind, original_text: &str) -> Issue {
        Issue {
            element_id,
            category,
            original_text: original_text.to_string(),
            severity: Severity::Major,
            description: "value disagrees with the summary table".to_string(),
            suggestion: "recompute the fit".to_string(),
        }
    }

    #[test]
    fn test_comment_text_format() {
        let text = comment_text(&issue(0, ContentKind::Text, "0.87")).unwrap();
        assert_eq!(
            text,
            "[Major] value disagrees with the summary table\nSuggestion: recompute the fit"
        );
    }

    #[test]
    fn test_comment_text_requires_description() {
        let mut i = issue(0, ContentKind::Text, "0.87");
        i.description = "   ".to_string();
        assert!(comment_text(&i).is_none());
    }

    #[test]
    fn test_anchor_line_multi_line_excerpt() {
        assert_eq!(anchor_line("\n  \nR² = 0.87\nsecond line"), Some("R²=0.87".to_string()));
        assert_eq!(anchor_line("  \n \t"), None);
    }

    #[test]
    fn test_paragraph_points_after_ppr() {
        let xml = wrap_body(
            "<w:p><w:pPr><w:jc w:val=\"center\"/></w:pPr><w:r><w:t>centered</w:t></w:r></w:p>",
        );
        let es = element_span(&xml, 0).unwrap().unwrap();
        let span = paragraph_points(&xml, es.start).unwrap().unwrap();

        // Range start lands between </w:pPr> and the first run.
        assert_eq!(&xml[span.start_at - 8..span.start_at], "</w:pPr>");
        assert!(xml[span.start_at..].starts_with("<w:r>"));
        assert!(xml[span.end_at..].starts_with("</w:p>"));
    }

    #[test]
    fn test_paragraph_points_without_ppr() {
        let xml = wrap_body("<w:p><w:r><w:t>plain</w:t></w:r></w:p>");
        let es = element_span(&xml, 0).unwrap().unwrap();
        let span = paragraph_points(&xml, es.start).unwrap().unwrap();

        assert!(xml[..span.start_at].ends_with("<w:p>"));
        assert!(xml[span.end_at..].starts_with("</w:p>"));
    }

    #[test]
    fn test_resolve_prefers_text_match_over_identifier() {
        let xml = wrap_body(
            "<w:p><w:r><w:t>R² value reported as 0.87</w:t></w:r></w:p>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>Table 1: Summary</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let body = parse_body(&xml).unwrap();
        let traversal = plan(&body, &HashSet::new());

        // Stale element_id points at the table; the verbatim text lives in
        // the paragraph, and the text match must win.
        let stale = issue(1, ContentKind::Text, "0.87");
        assert_eq!(
            resolve_target(&body, &traversal, &stale),
            Some(Target::Paragraph { element: 0 })
        );
    }

    #[test]
    fn test_resolve_identifier_fallback() {
        let xml = wrap_body(
            "<w:p><w:r><w:t>alpha</w:t></w:r></w:p>\
             <w:tbl><w:tr><w:tc><w:p><w:r><w:t>beta</w:t></w:r></w:p></w:tc></w:tr></w:tbl>",
        );
        let body = parse_body(&xml).unwrap();
        let traversal = plan(&body, &HashSet::new());

        let no_text = issue(1, ContentKind::Table, "not in the document");
        assert_eq!(
            resolve_target(&body, &traversal, &no_text),
            Some(Target::TableParagraph {
                element: 1,
                needle: None
            })
        );
    }

    #[test]
    fn test_resolve_image_run_by_identifier() {
        let xml = wrap_body(
            "<w:p>\
             <w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
             <w:r><w:t>caption</w:t></w:r>\
             </w:p>",
        );
        let body = parse_body(&xml).unwrap();
        let resolvable: HashSet<String> = ["rId5".to_string()].into();
        let traversal = plan(&body, &resolvable);

        let img = issue(0, ContentKind::Image, "");
        assert_eq!(
            resolve_target(&body, &traversal, &img),
            Some(Target::ImageRun {
                element: 0,
                image_index: 0
            })
        );
    }

    #[test]
    fn test_resolve_unresolvable_is_none() {
        let xml = wrap_body("<w:p><w:r><w:t>alpha</w:t></w:r></w:p>");
        let body = parse_body(&xml).unwrap();
        let traversal = plan(&body, &HashSet::new());

        let lost = issue(-1, ContentKind::Text, "");
        assert_eq!(resolve_target(&body, &traversal, &lost), None);
    }

    #[test]
    fn test_insert_range_wraps_paragraph() {
        let xml = wrap_body("<w:p><w:r><w:t>alpha</w:t></w:r></w:p>");
        let updated = insert_comment_range(
            &xml,
            &Target::Paragraph { element: 0 },
            0,
            &HashSet::new(),
        )
        .unwrap()
        .unwrap();

        assert!(updated.contains(
            "<w:p><w:commentRangeStart w:id=\"0\"/><w:r><w:t>alpha</w:t></w:r><w:commentRangeEnd w:id=\"0\"/><w:r><w:commentReference w:id=\"0\"/></w:r></w:p>"
        ));
    }

    #[test]
    fn test_insert_range_around_image_run() {
        let xml = wrap_body(
            "<w:p>\
             <w:r><w:drawing><a:blip r:embed=\"rId5\"/></w:drawing></w:r>\
             <w:r><w:t>caption</w:t></w:r>\
             </w:p>",
        );
        let resolvable: HashSet<String> = ["rId5".to_string()].into();
        let updated = insert_comment_range(
            &xml,
            &Target::ImageRun {
                element: 0,
                image_index: 0,
            },
            2,
            &resolvable,
        )
        .unwrap()
        .unwrap();

        // Range markers sit as siblings around the image run, not inside it.
        let start = updated.find("<w:commentRangeStart w:id=\"2\"/>").unwrap();
        let run = updated.find("<w:r><w:drawing>").unwrap();
        let end = updated.find("<w:commentRangeEnd w:id=\"2\"/>").unwrap();
        let caption_run = updated.find("<w:r><w:t>caption").unwrap();
        assert!(start < run);
        assert!(run < end);
        assert!(end < caption_run);
    }

    #[test]
    fn test_table_paragraph_needle_selects_matching_cell() {
        let xml = wrap_body(
            "<w:tbl>\
             <w:tr><w:tc><w:p><w:r><w:t>Visit</w:t></w:r></w:p></w:tc></w:tr>\
             <w:tr><w:tc><w:p><w:r><w:t>Baseline 42</w:t></w:r></w:p></w:tc></w:tr>\
             </w:tbl>",
        );
        let updated = insert_comment_range(
            &xml,
            &Target::TableParagraph {
                element: 0,
                needle: Some(normalize("Baseline 42")),
            },
            0,
            &HashSet::new(),
        )
        .unwrap()
        .unwrap();

        let start = updated.find("<w:commentRangeStart w:id=\"0\"/>").unwrap();
        let baseline = updated.find("Baseline").unwrap();
        let visit = updated.find("Visit").unwrap();
        assert!(visit < start, "range must skip the non-matching first cell");
        assert!(start < baseline);
    }

    #[test]
    fn test_comment_entry_escapes_and_breaks() {
        let author = CommentAuthor::default();
        let entry = comment_entry_xml(4, &author, "2026-01-01T00:00:00Z", "a < b\nSuggestion: use &le;");
        assert!(entry.contains("w:id=\"4\""));
        assert!(entry.contains("a &lt; b"));
        assert!(entry.contains("<w:br/>"));
        assert!(entry.contains("&amp;le;"));
        assert!(!entry.contains("a < b"));
    }

    #[test]
    fn test_scan_relationships_next_rid() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
            <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
        </Relationships>"#;
        let (has_comments, next) = scan_relationships(xml);
        assert!(!has_comments);
        assert_eq!(next, 8);
    }
}
