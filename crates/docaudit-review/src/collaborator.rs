//! The review-collaborator seam.

use async_trait::async_trait;
use docaudit_core::{ContentUnit, Issue};

/// An external reviewer of document content.
///
/// Implementations receive one batch of ordered content units and return
/// the issues found in it. Errors are absorbed by the analysis engine: a
/// failing batch degrades to an empty result, never a crash.
#[async_trait]
pub trait ReviewCollaborator: Send + Sync {
    /// Review one batch of content units.
    async fn review(&self, units: &[ContentUnit]) -> anyhow::Result<Vec<Issue>>;
}
