//! Preview rendering for docaudit: semantic HTML emission, marker → anchor
//! resolution, and issue highlighting.
//!
//! The full preview pipeline for one document:
//!
//! ```ignore
//! let mut walker = ContentWalker::new("images")?;
//! let extraction = walker.walk(&pkg)?;
//! let anchored = render_anchored(&pkg, &extraction)?;
//! let preview = apply_highlights(&anchored, &issues, active)?;
//! ```

pub mod anchor;
pub mod dom;
pub mod highlight;
pub mod html;

pub use anchor::{anchor_id, resolve_anchors};
pub use highlight::{apply_highlights, issue_id, severity_palette, SeverityPalette};
pub use html::{render_package, render_page};

use docaudit_core::Result;
use docaudit_docx::{marked_package, DocxPackage, Extraction};

/// Render a package to anchored preview HTML: mark, render, resolve.
///
/// # Errors
///
/// Returns an error if the package cannot be rendered or the rendered
/// fragment cannot be parsed back.
pub fn render_anchored(pkg: &DocxPackage, extraction: &Extraction) -> Result<String> {
    let marked = marked_package(pkg, &extraction.plan)?;
    let rendered = render_package(&marked)?;
    resolve_anchors(&rendered, &extraction.image_unit_ids())
}
