//! Persisted analysis results.
//!
//! An [`Analysis`] is the JSON-serialized outcome of one review run. It lets
//! callers replay highlighting and comment generation without re-calling the
//! review collaborator, so every issue field must round-trip losslessly.

use crate::error::Result;
use crate::issue::{quality_score, Issue, SeverityCounts};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One completed analysis run: the issue list plus derived statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    /// Findings in collaborator order.
    pub issues: Vec<Issue>,
    /// Quality score against the 100-point baseline.
    pub quality_score: u32,
    /// Per-severity tallies.
    pub counts: SeverityCounts,
}

impl Analysis {
    /// Build an analysis record from a finished issue list.
    #[must_use = "builds the analysis record"]
    pub fn from_issues(issues: Vec<Issue>) -> Self {
        let quality_score = quality_score(&issues);
        let counts = SeverityCounts::from_issues(&issues);
        Self {
            issues,
            quality_score,
            counts,
        }
    }

    /// Write the analysis to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously saved analysis from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not valid analysis JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
