//! Body-element parsing for `word/document.xml`.
//!
//! [`parse_body`] reduces the document body to the flat element sequence the
//! traversal rule operates on: top-level paragraphs (text plus embedded image
//! relationships in run order), tables (fully extracted cell text), and
//! structured content blocks (`w:sdt`, e.g. generated indices) with their
//! inner paragraph texts.
//!
//! Element counting here must agree exactly with the offset-scanning passes
//! in `marker` and `comment`: a top-level element is a `w:p`/`w:tbl`/`w:sdt`
//! that is a direct child of `w:body` (depth 0), and a block's inner
//! paragraph is any `w:p` inside the block that is not nested in another
//! open paragraph.

use docaudit_core::{AuditError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// One top-level body element in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyElement {
    /// A body paragraph.
    Paragraph(Paragraph),
    /// A body table.
    Table(Table),
    /// A structured content block containing paragraphs.
    Block(Block),
}

/// A paragraph's accumulated content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    /// Concatenated run text, untrimmed; explicit breaks become newlines.
    pub text: String,
    /// Relationship ids of embedded images, in run order.
    pub image_rels: Vec<String>,
}

impl Paragraph {
    /// The paragraph text with surrounding whitespace removed.
    #[inline]
    #[must_use = "returns the trimmed paragraph text"]
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}

/// A table's extracted cell text, row-major, header row included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Rows of cell text.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Pipe-delimited row-major serialization, one line per row.
    #[must_use = "serializes the table rows"]
    pub fn serialize(&self) -> String {
        self.rows
            .iter()
            .map(|row| format!("| {} |", row.join(" | ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every cell's text concatenated, for whole-table text matching.
    #[must_use = "concatenates all cell text"]
    pub fn full_text(&self) -> String {
        self.rows
            .iter()
            .flat_map(|row| row.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A structured content block's inner paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    /// Inner paragraph texts in document order, empty paragraphs included
    /// (ordinals must line up across the extraction and annotation passes).
    pub paragraphs: Vec<String>,
}

/// Accumulates one table cell's text.
///
/// Every text node reachable from the cell's subtree counts, including text
/// in nested inline elements (fields, hyperlinks) and nested tables.
/// Immediately-repeated fragments are dropped; newlines collapse to spaces
/// at finalization.
#[derive(Debug, Default)]
struct CellBuilder {
    fragments: Vec<String>,
    last_text: Option<String>,
}

impl CellBuilder {
    fn add_text(&mut self, text: &str) {
        if self.last_text.as_deref() == Some(text) {
            return;
        }
        self.fragments.push(text.to_string());
        self.last_text = Some(text.to_string());
    }

    fn add_separator(&mut self) {
        self.fragments.push("\n".to_string());
        self.last_text = None;
    }

    fn finish(self) -> String {
        let joined = self.fragments.concat();
        joined.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// State container for the body walk.
#[derive(Debug, Default)]
struct BodyReader {
    elements: Vec<BodyElement>,

    in_body: bool,
    /// Open elements below `w:body`.
    depth: usize,
    in_text: bool,
    in_instr: bool,
    in_drawing: bool,

    /// Nesting inside the active top-level table.
    tbl_depth: usize,
    table: Option<Table>,
    current_row: Option<Vec<String>>,
    cell: Option<CellBuilder>,

    para: Option<Paragraph>,
    /// Depth at which the open paragraph started, to pair its end tag.
    para_depth: Option<usize>,

    block: Option<Block>,
}

impl BodyReader {
    fn open_paragraph(&mut self) {
        self.para = Some(Paragraph::default());
        self.para_depth = Some(self.depth);
    }

    fn close_paragraph(&mut self) {
        let Some(para) = self.para.take() else { return };
        self.para_depth = None;
        if let Some(block) = self.block.as_mut() {
            block.paragraphs.push(para.text);
        } else {
            self.elements.push(BodyElement::Paragraph(para));
        }
    }

    fn handle_start(&mut self, name: &[u8], e: &quick_xml::events::BytesStart<'_>) {
        match name {
            b"w:p" => {
                // A paragraph opens at body level, or as a block inner
                // paragraph; paragraphs nested inside drawings/textboxes
                // fold into whatever is already open.
                if self.cell.is_none()
                    && self.para.is_none()
                    && (self.depth == 0 || self.block.is_some())
                {
                    self.open_paragraph();
                }
            }
            b"w:tbl" => {
                if self.depth == 0 {
                    self.table = Some(Table::default());
                    self.tbl_depth = 1;
                } else if self.table.is_some() {
                    self.tbl_depth += 1;
                }
            }
            b"w:tr" => {
                if self.tbl_depth == 1 && self.table.is_some() {
                    self.current_row = Some(Vec::new());
                }
            }
            b"w:tc" => {
                if self.tbl_depth == 1 && self.current_row.is_some() {
                    self.cell = Some(CellBuilder::default());
                }
            }
            b"w:sdt" => {
                if self.depth == 0 {
                    self.block = Some(Block::default());
                }
            }
            b"w:t" => self.in_text = true,
            b"w:instrText" => self.in_instr = true,
            b"w:drawing" => self.in_drawing = true,
            b"a:blip" => {
                if let Some(rel_id) = get_attr(e, b"r:embed") {
                    self.handle_blip(rel_id);
                }
            }
            _ => {}
        }
        self.depth += 1;
    }

    fn handle_empty(&mut self, name: &[u8], e: &quick_xml::events::BytesStart<'_>) {
        match name {
            b"w:p" => {
                // A self-closing paragraph still occupies an element or
                // block-ordinal position.
                if self.cell.is_some() {
                    if let Some(cell) = self.cell.as_mut() {
                        cell.add_separator();
                    }
                } else if self.depth == 0 {
                    self.elements
                        .push(BodyElement::Paragraph(Paragraph::default()));
                } else if self.block.is_some() && self.para.is_none() {
                    if let Some(block) = self.block.as_mut() {
                        block.paragraphs.push(String::new());
                    }
                }
            }
            b"w:tbl" if self.depth == 0 => {
                self.elements.push(BodyElement::Table(Table::default()));
            }
            b"w:sdt" if self.depth == 0 => {
                self.elements.push(BodyElement::Block(Block::default()));
            }
            b"w:br" => self.handle_break(),
            b"a:blip" => {
                if let Some(rel_id) = get_attr(e, b"r:embed") {
                    self.handle_blip(rel_id);
                }
            }
            _ => {}
        }
    }

    fn handle_end(&mut self, name: &[u8]) {
        self.depth = self.depth.saturating_sub(1);
        match name {
            b"w:t" => self.in_text = false,
            b"w:instrText" => self.in_instr = false,
            b"w:drawing" => self.in_drawing = false,
            b"w:p" => {
                if self.cell.is_some() {
                    if let Some(cell) = self.cell.as_mut() {
                        cell.add_separator();
                    }
                } else if self.para_depth == Some(self.depth) {
                    self.close_paragraph();
                }
            }
            b"w:tc" => {
                if self.tbl_depth == 1 {
                    if let (Some(row), Some(cell)) =
                        (self.current_row.as_mut(), self.cell.take())
                    {
                        row.push(cell.finish());
                    }
                }
            }
            b"w:tr" => {
                if self.tbl_depth == 1 {
                    if let (Some(table), Some(row)) =
                        (self.table.as_mut(), self.current_row.take())
                    {
                        table.rows.push(row);
                    }
                }
            }
            b"w:tbl" => {
                if self.table.is_some() {
                    self.tbl_depth -= 1;
                    if self.tbl_depth == 0 {
                        if let Some(table) = self.table.take() {
                            self.elements.push(BodyElement::Table(table));
                        }
                    }
                }
            }
            b"w:sdt" => {
                if self.depth == 0 {
                    if let Some(block) = self.block.take() {
                        self.elements.push(BodyElement::Block(block));
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_blip(&mut self, rel_id: String) {
        if !self.in_drawing || self.cell.is_some() || self.block.is_some() {
            return;
        }
        if let Some(para) = self.para.as_mut() {
            para.image_rels.push(rel_id);
        }
    }

    fn handle_break(&mut self) {
        if let Some(cell) = self.cell.as_mut() {
            cell.add_separator();
        } else if let Some(para) = self.para.as_mut() {
            para.text.push('\n');
        }
    }

    fn handle_text(&mut self, text: &str) {
        if !self.in_text || self.in_instr {
            return;
        }
        if let Some(cell) = self.cell.as_mut() {
            cell.add_text(text);
        } else if let Some(para) = self.para.as_mut() {
            para.text.push_str(text);
        }
    }
}

/// Extract an attribute value by key from an element.
#[inline]
pub(crate) fn get_attr(e: &quick_xml::events::BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .find(|a| a.as_ref().ok().map(|x| x.key.as_ref()) == Some(key))
        .and_then(std::result::Result::ok)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// Parse the document body into its top-level element sequence.
///
/// An empty or element-free body yields an empty list, not an error.
///
/// # Errors
///
/// Returns an error only when the XML itself is unreadable.
pub fn parse_body(document_xml: &str) -> Result<Vec<BodyElement>> {
    let mut state = BodyReader::default();

    let mut reader = Reader::from_str(document_xml);
    // DOCX uses xml:space="preserve" for significant whitespace; never trim.
    reader.trim_text(false);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let name = name.as_ref();
                if state.in_body {
                    state.handle_start(name, &e);
                } else if name == b"w:body" {
                    state.in_body = true;
                }
            }
            Ok(Event::Empty(e)) => {
                if state.in_body {
                    let name = e.name();
                    let name = name.as_ref();
                    state.handle_empty(name, &e);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| AuditError::Xml(format!("bad text content: {e}")))?;
                state.handle_text(&text);
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                let name = name.as_ref();
                if name == b"w:body" {
                    state.in_body = false;
                } else if state.in_body {
                    state.handle_end(name);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AuditError::Xml(format!(
                    "error parsing document.xml: {e}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(state.elements)
}
