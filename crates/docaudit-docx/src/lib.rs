//! DOCX handling for docaudit: package access, content walking, marker
//! injection, and native comment writing.
//!
//! # Architecture
//!
//! Manual ZIP + XML parsing (docx-rs is writer-only). DOCX files are ZIP
//! archives containing:
//! - `word/document.xml`: main content (paragraphs, tables, blocks)
//! - `word/_rels/document.xml.rels`: relationships (images)
//! - `word/comments.xml`: reviewer comments (created here when absent)
//! - `[Content_Types].xml`: part content-type registry
//!
//! The extraction and annotation passes all hang off one traversal rule
//! ([`walk::plan`]): the walker materializes content units from it, the
//! marker injector places one sentinel per text/table unit from it, and the
//! comment writer replays it as the identifier fallback. Keeping the rule in
//! one place is what guarantees the three passes agree on identifiers.

pub mod body;
pub mod comment;
pub mod marker;
pub mod package;
pub mod walk;

pub use body::{parse_body, Block, BodyElement, Paragraph, Table};
pub use comment::{CommentAuthor, CommentWriter};
pub use marker::{inject_markers, marked_package, marker_id, marker_token, MARKER_PREFIX};
pub use package::DocxPackage;
pub use walk::{plan, resolvable_images, ContentWalker, Extraction, TraversalPlan};
