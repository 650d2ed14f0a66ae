//! Core types shared across the docaudit workspace.
//!
//! This crate defines the data model the rest of the pipeline is built on:
//!
//! - [`ContentUnit`]: one identifiable piece of document content (a paragraph's
//!   text, a whole table, or an embedded image) with a stable ordinal id.
//! - [`Issue`]: one finding returned by the review collaborator, keyed loosely
//!   to a `ContentUnit` id and more reliably to an excerpt of original text.
//! - [`Analysis`]: a persisted analysis run (issues + derived score), used to
//!   replay results without re-calling the collaborator.
//!
//! The extraction, rendering, and comment-writing crates all join on the
//! `ContentUnit` id, so these types are deliberately small and immutable once
//! produced.

pub mod cache;
pub mod content;
pub mod error;
pub mod issue;

pub use cache::Analysis;
pub use content::{ContentKind, ContentUnit};
pub use error::{AuditError, Result};
pub use issue::{quality_score, Issue, Severity, SeverityCounts, UNRESOLVED_ELEMENT};
