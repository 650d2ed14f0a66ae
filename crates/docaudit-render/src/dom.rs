//! A minimal mutable node tree for the HTML fragments this workspace emits.
//!
//! The anchor resolver and highlight compositor both need structural
//! mutation (remove a node, set an attribute on a sibling, split a text node
//! around a span), which read-only HTML parsers cannot host. Fragments here
//! are always produced by our own renderer and are well-formed XML, so a
//! small quick-xml-backed tree is sufficient.
//!
//! Whitespace-only text nodes between elements are dropped at parse time;
//! they carry no meaning in these fragments and would otherwise sit between
//! a sentinel and its following sibling.

use docaudit_core::{AuditError, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Element names serialized in self-closing form when childless.
const VOID_ELEMENTS: &[&str] = &["img", "br", "hr"];

/// One fragment node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// An element with attributes and children.
    Element(Element),
    /// A text node (unescaped content).
    Text(String),
}

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Tag name.
    pub name: String,
    /// Attributes in document order.
    pub attrs: Vec<(String, String)>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// A new childless element.
    #[must_use = "creates a new element"]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// An attribute value by name.
    #[must_use = "returns the attribute value if present"]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or replace) an attribute.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.attrs.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value;
        } else {
            self.attrs.push((name.to_string(), value));
        }
    }

    /// Append CSS declarations to the `style` attribute.
    pub fn append_style(&mut self, css: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == "style") {
            Some(entry) => {
                if !entry.1.trim_end().ends_with(';') && !entry.1.is_empty() {
                    entry.1.push(';');
                }
                entry.1.push(' ');
                entry.1.push_str(css);
            }
            None => self.attrs.push(("style".to_string(), css.to_string())),
        }
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use = "returns the concatenated descendant text"]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

fn element_from(e: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| AuditError::Render(format!("invalid attribute: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| AuditError::Render(format!("invalid attribute value: {e}")))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

/// Parse a rendered fragment into a node list.
///
/// # Errors
///
/// Returns an error if the fragment is not well-formed.
pub fn parse_fragment(html: &str) -> Result<Vec<Node>> {
    let mut reader = Reader::from_str(html);
    reader.trim_text(false);

    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();

    fn push_node(root: &mut Vec<Node>, stack: &mut [Element], node: Node) {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        } else {
            root.push(node);
        }
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(element_from(&e)?),
            Ok(Event::Empty(e)) => {
                let el = element_from(&e)?;
                push_node(&mut root, &mut stack, Node::Element(el));
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| AuditError::Render(format!("bad text content: {e}")))?;
                if !text.trim().is_empty() {
                    push_node(&mut root, &mut stack, Node::Text(text.into_owned()));
                }
            }
            Ok(Event::End(_)) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| AuditError::Render("unbalanced end tag".to_string()))?;
                push_node(&mut root, &mut stack, Node::Element(el));
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(AuditError::Render(format!("error parsing fragment: {e}"))),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(AuditError::Render("unclosed element".to_string()));
    }
    Ok(root)
}

/// Serialize a node list back to fragment markup.
#[must_use = "serializes the fragment"]
pub fn serialize_fragment(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(t) => out.push_str(&escape(t)),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.name);
            for (key, value) in &el.attrs {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape(value));
                out.push('"');
            }
            if el.children.is_empty() && VOID_ELEMENTS.contains(&el.name.as_str()) {
                out.push_str(" />");
            } else {
                out.push('>');
                for child in &el.children {
                    write_node(out, child);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

/// Depth-first search for the element carrying the given `id`.
#[must_use = "returns the matching element if present"]
pub fn find_by_id_mut<'a>(nodes: &'a mut [Node], id: &str) -> Option<&'a mut Element> {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.attr("id") == Some(id) {
                return Some(el);
            }
            if let Some(found) = find_by_id_mut(&mut el.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Whether any element in the tree carries the given `id`.
#[must_use = "returns whether the id exists in the tree"]
pub fn contains_id(nodes: &[Node], id: &str) -> bool {
    nodes.iter().any(|node| match node {
        Node::Element(el) => el.attr("id") == Some(id) || contains_id(&el.children, id),
        Node::Text(_) => false,
    })
}

/// The child list that directly contains the element with `id`.
#[must_use = "returns the parent child list if the id exists"]
pub fn parent_children_of<'a>(nodes: &'a mut Vec<Node>, id: &str) -> Option<&'a mut Vec<Node>> {
    let here = nodes
        .iter()
        .any(|n| matches!(n, Node::Element(el) if el.attr("id") == Some(id)));
    if here {
        return Some(nodes);
    }
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if let Some(found) = parent_children_of(&mut el.children, id) {
                return Some(found);
            }
        }
    }
    None
}
