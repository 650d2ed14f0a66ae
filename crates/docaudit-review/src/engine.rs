//! Batched, bounded-concurrency analysis dispatch.
//!
//! The content list is partitioned into fixed-size batches and dispatched
//! concurrently to the collaborator, capped at a small constant regardless
//! of batch count. Results concatenate in batch order. One batch's failure
//! degrades to an empty result for that batch only; sibling batches are
//! unaffected. The collaborator call is the pipeline's sole suspension
//! point.

use crate::collaborator::ReviewCollaborator;
use docaudit_core::{ContentUnit, Issue};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Default number of content units per collaborator call.
pub const DEFAULT_BATCH_SIZE: usize = 12;

/// Upper bound on in-flight collaborator calls.
pub const MAX_CONCURRENT_BATCHES: usize = 4;

/// Analysis dispatch options.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    /// Units per batch (minimum 1).
    pub batch_size: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Run the full analysis over a content list.
///
/// Always returns an issue list; collaborator failures surface as missing
/// results for the affected batches, not as errors.
pub async fn analyze(
    collaborator: &dyn ReviewCollaborator,
    units: &[ContentUnit],
    options: AnalyzeOptions,
) -> Vec<Issue> {
    if units.is_empty() {
        return Vec::new();
    }

    let batch_size = options.batch_size.max(1);
    let batches: Vec<&[ContentUnit]> = units.chunks(batch_size).collect();
    debug!(
        batches = batches.len(),
        batch_size, "dispatching review batches"
    );

    let results: Vec<Vec<Issue>> = stream::iter(batches.into_iter().enumerate().map(
        |(index, batch)| async move {
            match collaborator.review(batch).await {
                Ok(issues) => issues,
                Err(e) => {
                    warn!(batch = index, error = %e, "review batch failed; degrading to empty result");
                    Vec::new()
                }
            }
        },
    ))
    .buffered(MAX_CONCURRENT_BATCHES)
    .collect()
    .await;

    results.concat()
}
