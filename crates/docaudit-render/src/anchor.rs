//! Anchor resolution over rendered HTML.
//!
//! The renderer is lossy, so identifiers arrive as sentinel `<p>` elements.
//! This pass converts every sentinel into a stable `doc-el-<n>` id on its
//! immediately following sibling element and removes the sentinel itself.
//! Rendered images, which carry no sentinel of their own, are wrapped in a
//! container that receives the anchor id; correspondence is positional (the
//! n-th image unit maps to the n-th rendered image in document order).
//!
//! Resolution failures are silent per node: a sentinel at the end of its
//! sibling list places no anchor, and surplus images stay unwrapped. The
//! preview must remain partially usable.

use crate::dom::{parse_fragment, serialize_fragment, Element, Node};
use docaudit_core::Result;
use docaudit_docx::marker_id;
use log::debug;

/// The anchor id for a content unit.
#[inline]
#[must_use = "formats the anchor id"]
pub fn anchor_id(unit_id: u32) -> String {
    format!("doc-el-{unit_id}")
}

/// Resolve all sentinels and image positions in a rendered fragment.
///
/// `image_ids` is the image unit id sequence in document order, as produced
/// by the walker.
///
/// # Errors
///
/// Returns an error if the fragment is not well-formed.
pub fn resolve_anchors(html: &str, image_ids: &[u32]) -> Result<String> {
    let mut nodes = parse_fragment(html)?;
    strip_markers(&mut nodes);
    let mut seen_images = 0usize;
    wrap_images(&mut nodes, image_ids, &mut seen_images);
    if seen_images != image_ids.len() {
        debug!(
            "rendered {seen_images} images for {} image units; surplus units stay unanchored",
            image_ids.len()
        );
    }
    Ok(serialize_fragment(&nodes))
}

/// Whether this node is a sentinel paragraph, and which id it carries.
fn sentinel_id(node: &Node) -> Option<u32> {
    match node {
        Node::Element(el) if el.name == "p" => marker_id(&el.text_content()),
        _ => None,
    }
}

fn strip_markers(nodes: &mut Vec<Node>) {
    let mut i = 0;
    while i < nodes.len() {
        if let Some(id) = sentinel_id(&nodes[i]) {
            nodes.remove(i);
            // The sentinel's immediately following sibling element becomes
            // the anchor target. No sibling, or another sentinel, means the
            // unit degrades to unanchored.
            match nodes.get_mut(i) {
                Some(next) if sentinel_id(next).is_none() => {
                    if let Node::Element(el) = next {
                        el.set_attr("id", anchor_id(id));
                    } else {
                        debug!("sentinel {id} followed by a non-element; anchor not placed");
                    }
                }
                _ => debug!("sentinel {id} has no following sibling; anchor not placed"),
            }
            // Do not advance: the node now at `i` still needs processing.
        } else {
            if let Node::Element(el) = &mut nodes[i] {
                strip_markers(&mut el.children);
            }
            i += 1;
        }
    }
}

fn wrap_images(nodes: &mut Vec<Node>, image_ids: &[u32], seen: &mut usize) {
    let mut i = 0;
    while i < nodes.len() {
        let is_image = matches!(&nodes[i], Node::Element(el) if el.name == "img");
        if is_image {
            let position = *seen;
            *seen += 1;
            if let Some(&unit_id) = image_ids.get(position) {
                let img = nodes.remove(i);
                let mut wrapper = Element::new("span");
                wrapper.set_attr("class", "doc-image");
                wrapper.set_attr("id", anchor_id(unit_id));
                wrapper.children.push(img);
                nodes.insert(i, Node::Element(wrapper));
            } else {
                debug!("rendered image #{position} has no matching image unit");
            }
            i += 1;
        } else {
            if let Node::Element(el) = &mut nodes[i] {
                wrap_images(&mut el.children, image_ids, seen);
            }
            i += 1;
        }
    }
}
