//! Issue records returned by the review collaborator, and quality scoring.

use crate::content::ContentKind;
use serde::{Deserialize, Deserializer, Serialize};

/// Sentinel `element_id` meaning the collaborator could not (or did not)
/// name a content unit.
pub const UNRESOLVED_ELEMENT: i64 = -1;

/// Severity of a finding, ordinal for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Data contradiction or error that invalidates a conclusion.
    Critical,
    /// Significant inconsistency that needs correction.
    Major,
    /// Minor inconsistency or wording problem.
    Minor,
}

impl Severity {
    /// Score weight deducted from the 100-point baseline per finding.
    #[inline]
    #[must_use = "returns the score weight of this severity"]
    pub const fn weight(self) -> u32 {
        match self {
            Self::Critical => 20,
            Self::Major => 10,
            Self::Minor => 5,
        }
    }
}

impl std::fmt::Display for Severity {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Critical => "Critical",
            Self::Major => "Major",
            Self::Minor => "Minor",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            _ => Err(format!(
                "unknown severity '{s}'. Valid options: Critical, Major, Minor"
            )),
        }
    }
}

/// One finding from the review collaborator.
///
/// `element_id` is collaborator-supplied and may be stale or absent
/// ([`UNRESOLVED_ELEMENT`]); `original_text` is the more reliable anchor for
/// both highlighting and comment placement. Issues are produced once per
/// analysis run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Best-effort reference to a [`crate::ContentUnit`] id.
    #[serde(default = "unresolved", deserialize_with = "de_element_id")]
    pub element_id: i64,
    /// Content category, independent of `element_id`; chooses the highlight
    /// and anchoring strategy.
    #[serde(default)]
    pub category: ContentKind,
    /// Short excerpt that should appear verbatim in the document.
    #[serde(default)]
    pub original_text: String,
    /// Severity, serialized under the collaborator's `issue_type` field name.
    #[serde(rename = "issue_type")]
    pub severity: Severity,
    /// Free-text rationale in the review's working language.
    pub description: String,
    /// Free-text fix suggestion in the review's working language.
    #[serde(default)]
    pub suggestion: String,
}

impl Issue {
    /// The referenced content-unit id, when one was supplied.
    #[inline]
    #[must_use = "returns the referenced element id if resolvable"]
    pub fn resolved_element(&self) -> Option<u32> {
        u32::try_from(self.element_id).ok()
    }
}

const fn unresolved() -> i64 {
    UNRESOLVED_ELEMENT
}

/// Collaborators occasionally return `element_id` as a quoted string; accept
/// both forms, degrading unparseable values to the sentinel.
fn de_element_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct ElementIdVisitor;

    impl serde::de::Visitor<'_> for ElementIdVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("an integer element id or its string form")
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<i64, E> {
            Ok(i64::try_from(v).unwrap_or(UNRESOLVED_ELEMENT))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<i64, E> {
            Ok(v.trim().parse().unwrap_or(UNRESOLVED_ELEMENT))
        }
    }

    deserializer.deserialize_any(ElementIdVisitor)
}

/// Per-severity issue counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// Number of Critical findings.
    pub critical: usize,
    /// Number of Major findings.
    pub major: usize,
    /// Number of Minor findings.
    pub minor: usize,
}

impl SeverityCounts {
    /// Tally issues by severity.
    #[must_use = "tallies issues by severity"]
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut counts = Self::default();
        for issue in issues {
            match issue.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Major => counts.major += 1,
                Severity::Minor => counts.minor += 1,
            }
        }
        counts
    }

    /// Total number of findings.
    #[inline]
    #[must_use = "returns the total finding count"]
    pub const fn total(&self) -> usize {
        self.critical + self.major + self.minor
    }
}

/// Quality score against a 100-point baseline, floored at 0.
///
/// Each finding deducts its severity weight (Critical 20, Major 10, Minor 5).
#[must_use = "computes the document quality score"]
pub fn quality_score(issues: &[Issue]) -> u32 {
    let deduction: u32 = issues.iter().map(|i| i.severity.weight()).sum();
    100u32.saturating_sub(deduction)
}
