//! Review-collaborator integration for docaudit.
//!
//! The collaborator contract is narrow by design: it consumes the ordered
//! content-unit list and produces issue records. Everything else — batching,
//! bounded concurrency, degradation on failure — lives in [`engine`], and
//! the HTTP multimodal client in [`client`] is just one implementation of
//! the [`ReviewCollaborator`] seam.

pub mod client;
pub mod collaborator;
pub mod engine;

pub use client::VisionReviewClient;
pub use collaborator::ReviewCollaborator;
pub use engine::{analyze, AnalyzeOptions, DEFAULT_BATCH_SIZE, MAX_CONCURRENT_BATCHES};
