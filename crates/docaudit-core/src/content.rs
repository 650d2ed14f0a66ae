//! Content unit types produced by the document walker.

use serde::{Deserialize, Serialize};

/// Kind of an extracted content unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A paragraph's concatenated run text.
    #[default]
    Text,
    /// A whole table, serialized row-major.
    Table,
    /// One embedded image.
    Image,
}

impl std::fmt::Display for ContentKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::Image => "image",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "table" => Ok(Self::Table),
            "image" => Ok(Self::Image),
            _ => Err(format!("unknown content kind: '{s}'")),
        }
    }
}

/// One identifiable piece of document content.
///
/// Ids are assigned in strict document order starting at 0 and are the sole
/// join key between extraction, rendered-HTML anchors, and collaborator
/// issues. Units are immutable once produced: parsing the same document twice
/// with the same traversal rules yields identical id assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Ordinal identifier, unique within one document walk.
    pub id: u32,
    /// Unit kind, determining how `payload` is interpreted.
    pub kind: ContentKind,
    /// Text payload: trimmed run text, pipe-delimited table rows, or the
    /// path of the extracted image file.
    pub payload: String,
}

impl ContentUnit {
    /// Create a text unit.
    #[inline]
    #[must_use = "creates a new text content unit"]
    pub fn text(id: u32, payload: impl Into<String>) -> Self {
        Self {
            id,
            kind: ContentKind::Text,
            payload: payload.into(),
        }
    }

    /// Create a table unit from its row-major serialization.
    #[inline]
    #[must_use = "creates a new table content unit"]
    pub fn table(id: u32, payload: impl Into<String>) -> Self {
        Self {
            id,
            kind: ContentKind::Table,
            payload: payload.into(),
        }
    }

    /// Create an image unit referencing an extracted media file.
    #[inline]
    #[must_use = "creates a new image content unit"]
    pub fn image(id: u32, path: impl Into<String>) -> Self {
        Self {
            id,
            kind: ContentKind::Image,
            payload: path.into(),
        }
    }
}
