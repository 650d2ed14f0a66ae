//! Issue highlighting over anchored preview HTML.
//!
//! Each issue gets a visual mark at its best-resolved location: an inline
//! span around the exact matching substring when the excerpt is found, or
//! severity styling on the whole anchored element as the fallback. Image
//! issues always take the element-level path. Issues that resolve nowhere
//! are silently dropped from the preview; they still exist in the issue
//! list for comment generation.
//!
//! The pass is pure: the same fragment and issue list always produce the
//! same output.

use crate::anchor::anchor_id;
use crate::dom::{
    contains_id, find_by_id_mut, parent_children_of, parse_fragment, serialize_fragment, Element,
    Node,
};
use docaudit_core::{ContentKind, Issue, Result, Severity};
use log::debug;

/// Fill and accent colors for one severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityPalette {
    /// Background fill.
    pub fill: &'static str,
    /// Border/outline accent.
    pub accent: &'static str,
}

/// Severity → color pair (Critical red, Major amber, Minor blue).
#[inline]
#[must_use = "returns the color pair for this severity"]
pub const fn severity_palette(severity: Severity) -> SeverityPalette {
    match severity {
        Severity::Critical => SeverityPalette {
            fill: "#fee2e2",
            accent: "#ef4444",
        },
        Severity::Major => SeverityPalette {
            fill: "#fef3c7",
            accent: "#f59e0b",
        },
        Severity::Minor => SeverityPalette {
            fill: "#dbeafe",
            accent: "#3b82f6",
        },
    }
}

/// Element names searched in the whole-document fallback scan.
const SEARCH_CONTAINERS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "p", "td", "th", "li"];

/// The per-issue anchor id, `issue-<index>`.
#[inline]
#[must_use = "formats the issue anchor id"]
pub fn issue_id(index: usize) -> String {
    format!("issue-{index}")
}

/// Mark every issue's target region in the fragment, emphasizing the active
/// issue when one is designated.
///
/// # Errors
///
/// Returns an error if the fragment is not well-formed.
pub fn apply_highlights(html: &str, issues: &[Issue], active: Option<usize>) -> Result<String> {
    let mut nodes = parse_fragment(html)?;
    for (index, issue) in issues.iter().enumerate() {
        place_issue(&mut nodes, index, issue);
    }
    if let Some(active_index) = active {
        if let Some(issue) = issues.get(active_index) {
            emphasize_active(&mut nodes, active_index, issue);
        }
    }
    Ok(serialize_fragment(&nodes))
}

fn place_issue(nodes: &mut Vec<Node>, index: usize, issue: &Issue) {
    let palette = severity_palette(issue.severity);
    let anchor = issue
        .resolved_element()
        .map(anchor_id)
        .filter(|id| contains_id(nodes, id));

    // Image issues are always styled at element level; substring search
    // never applies to them.
    if issue.category == ContentKind::Image {
        match anchor.and_then(|id| find_by_id_mut(nodes, &id)) {
            Some(el) => style_element(el, index, palette),
            None => debug!("image issue {index} has no resolvable anchor; not rendered"),
        }
        return;
    }

    if !issue.original_text.is_empty() {
        let found = match &anchor {
            // Search the subtree rooted at the anchor node's parent.
            Some(id) => parent_children_of(nodes, id)
                .is_some_and(|scope| wrap_first_match(scope, &issue.original_text, index, palette)),
            // No anchor: scan every heading/paragraph/cell/list item.
            None => wrap_in_candidates(nodes, &issue.original_text, index, palette),
        };
        if found {
            return;
        }
    }

    match anchor.and_then(|id| find_by_id_mut(nodes, &id)) {
        Some(el) => style_element(el, index, palette),
        None => debug!("issue {index} resolves nowhere; not rendered in preview"),
    }
}

/// Element-level fallback styling. The anchored element takes over the
/// issue id so the preview can scroll to it.
fn style_element(el: &mut Element, index: usize, palette: SeverityPalette) {
    el.append_style(&format!(
        "background-color: {}; border-left: 4px solid {}; padding: 8px;",
        palette.fill, palette.accent
    ));
    el.set_attr("id", issue_id(index));
}

fn highlight_span(index: usize, palette: SeverityPalette) -> Element {
    let mut span = Element::new("span");
    span.set_attr("id", issue_id(index));
    span.set_attr("class", "issue-highlight");
    span.set_attr(
        "style",
        format!(
            "background-color: {}; border-bottom: 2px solid {};",
            palette.fill, palette.accent
        ),
    );
    span
}

/// Wrap the first verbatim occurrence of `needle` found in a text node under
/// `nodes`, in document order.
fn wrap_first_match(
    nodes: &mut Vec<Node>,
    needle: &str,
    index: usize,
    palette: SeverityPalette,
) -> bool {
    let mut i = 0;
    while i < nodes.len() {
        let split = match &nodes[i] {
            Node::Text(text) => text.find(needle).map(|at| {
                (
                    text[..at].to_string(),
                    text[at + needle.len()..].to_string(),
                )
            }),
            Node::Element(_) => None,
        };
        if let Some((before, after)) = split {
            let mut span = highlight_span(index, palette);
            span.children.push(Node::Text(needle.to_string()));

            let mut replacement = Vec::with_capacity(3);
            if !before.is_empty() {
                replacement.push(Node::Text(before));
            }
            replacement.push(Node::Element(span));
            if !after.is_empty() {
                replacement.push(Node::Text(after));
            }
            nodes.splice(i..=i, replacement);
            return true;
        }
        if let Node::Element(el) = &mut nodes[i] {
            if wrap_first_match(&mut el.children, needle, index, palette) {
                return true;
            }
        }
        i += 1;
    }
    false
}

/// Fallback scan: the first heading/paragraph/cell/list-item subtree
/// containing the needle, in document order.
fn wrap_in_candidates(
    nodes: &mut Vec<Node>,
    needle: &str,
    index: usize,
    palette: SeverityPalette,
) -> bool {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if SEARCH_CONTAINERS.contains(&el.name.as_str())
                && el.text_content().contains(needle)
                && wrap_first_match(&mut el.children, needle, index, palette)
            {
                return true;
            }
            if wrap_in_candidates(&mut el.children, needle, index, palette) {
                return true;
            }
        }
    }
    false
}

/// Additive emphasis on the active issue. Never changes which node was
/// chosen.
fn emphasize_active(nodes: &mut Vec<Node>, index: usize, issue: &Issue) {
    let palette = severity_palette(issue.severity);
    if let Some(el) = find_by_id_mut(nodes, &issue_id(index)) {
        el.append_style(&format!(
            "outline: 3px solid {}; outline-offset: 2px;",
            palette.accent
        ));
    }
}
