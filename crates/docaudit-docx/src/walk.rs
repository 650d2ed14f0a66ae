//! The shared traversal/identifier-assignment rule and the content walker.
//!
//! [`plan`] expresses the identifier rule exactly once, as a pure function
//! over the parsed body. The walker materializes content units from the plan;
//! the marker injector and the comment writer's identifier fallback replay
//! the same plan. Ids therefore agree across all three by construction.
//!
//! Identifier rule, per top-level body element:
//! - paragraph: each readable embedded image takes one id (run order), then
//!   the paragraph text takes one id if non-empty after trimming;
//! - table: exactly one id for the whole table;
//! - structured block: one id per non-empty inner paragraph;
//! - a whitespace-only paragraph without images takes nothing;
//! - an image whose relationship is missing or whose media part is
//!   unreadable is omitted, not counted.

use crate::body::{parse_body, BodyElement};
use crate::package::DocxPackage;
use docaudit_core::{ContentUnit, Result};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// Identifier assignments for one top-level body element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSlots {
    /// Ids of the paragraph's image units, in run order.
    pub image_ids: Vec<u32>,
    /// Id of the paragraph's text unit or the table's unit.
    pub unit_id: Option<u32>,
    /// `(inner paragraph ordinal, id)` pairs for a structured block.
    pub block_units: Vec<(usize, u32)>,
}

/// The complete identifier assignment for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalPlan {
    /// Per-element assignments, indexed like the body element list.
    pub slots: Vec<ElementSlots>,
    /// The exhausted identifier counter (= number of units).
    pub unit_count: u32,
}

impl TraversalPlan {
    /// All assigned ids in document order.
    #[must_use = "collects the assigned ids in document order"]
    pub fn unit_ids(&self) -> Vec<u32> {
        let mut ids = Vec::with_capacity(self.unit_count as usize);
        for slots in &self.slots {
            ids.extend(&slots.image_ids);
            ids.extend(slots.unit_id);
            ids.extend(slots.block_units.iter().map(|&(_, id)| id));
        }
        ids
    }

    /// Ids of image units only, in document order.
    ///
    /// The anchor resolver matches these positionally against rendered
    /// image nodes.
    #[must_use = "collects the image unit ids in document order"]
    pub fn image_unit_ids(&self) -> Vec<u32> {
        self.slots
            .iter()
            .flat_map(|s| s.image_ids.iter().copied())
            .collect()
    }

    /// Number of sentinel markers the injector will place (one per
    /// text/table unit; image units carry no marker).
    #[must_use = "counts the markers the injector will place"]
    pub fn marker_count(&self) -> usize {
        self.slots
            .iter()
            .map(|s| usize::from(s.unit_id.is_some()) + s.block_units.len())
            .sum()
    }
}

/// Relationship ids that resolve to a readable media part.
///
/// An id missing from this set is skipped by every pass that counts images.
#[must_use = "collects the resolvable image relationship ids"]
pub fn resolvable_images(
    pkg: &DocxPackage,
    relationships: &HashMap<String, String>,
) -> HashSet<String> {
    relationships
        .iter()
        .filter(|(_, target)| pkg.media_bytes(target).is_some())
        .map(|(id, _)| id.clone())
        .collect()
}

/// Assign identifiers over a parsed body.
#[must_use = "computes the identifier assignment"]
pub fn plan(body: &[BodyElement], resolvable: &HashSet<String>) -> TraversalPlan {
    let mut slots = Vec::with_capacity(body.len());
    let mut next_id: u32 = 0;

    for element in body {
        let mut element_slots = ElementSlots::default();
        match element {
            BodyElement::Paragraph(p) => {
                for rel in &p.image_rels {
                    if !resolvable.contains(rel) {
                        debug!("skipping unreadable image relationship {rel}");
                        continue;
                    }
                    element_slots.image_ids.push(next_id);
                    next_id += 1;
                }
                if !p.trimmed().is_empty() {
                    element_slots.unit_id = Some(next_id);
                    next_id += 1;
                }
            }
            BodyElement::Table(_) => {
                element_slots.unit_id = Some(next_id);
                next_id += 1;
            }
            BodyElement::Block(b) => {
                for (ordinal, text) in b.paragraphs.iter().enumerate() {
                    if text.trim().is_empty() {
                        continue;
                    }
                    element_slots.block_units.push((ordinal, next_id));
                    next_id += 1;
                }
            }
        }
        slots.push(element_slots);
    }

    TraversalPlan {
        slots,
        unit_count: next_id,
    }
}

/// The result of walking one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Flat ordered content units, ids ascending from 0.
    pub units: Vec<ContentUnit>,
    /// The parsed body the units were derived from.
    pub body: Vec<BodyElement>,
    /// The identifier assignment shared with the annotation passes.
    pub plan: TraversalPlan,
}

impl Extraction {
    /// Image unit ids in document order, for positional anchor resolution.
    #[inline]
    #[must_use = "collects the image unit ids in document order"]
    pub fn image_unit_ids(&self) -> Vec<u32> {
        self.plan.image_unit_ids()
    }
}

/// Walks a document into content units, extracting embedded images to disk.
///
/// The image output directory is append-only per walker and keyed by the
/// walker's own counter, so concurrent walkers over different directories
/// never collide.
#[derive(Debug)]
pub struct ContentWalker {
    image_dir: PathBuf,
    image_count: usize,
}

impl ContentWalker {
    /// Create a walker that extracts images into `image_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(image_dir: impl Into<PathBuf>) -> Result<Self> {
        let image_dir = image_dir.into();
        fs::create_dir_all(&image_dir)?;
        Ok(Self {
            image_dir,
            image_count: 0,
        })
    }

    /// Walk the document and produce its content units.
    ///
    /// # Errors
    ///
    /// Returns an error only for resource-level failures: a package without
    /// `word/document.xml`, unreadable XML, or image files that cannot be
    /// written. Per-image relationship problems are skipped.
    pub fn walk(&mut self, pkg: &DocxPackage) -> Result<Extraction> {
        let document_xml = pkg.document_xml()?;
        let body = parse_body(&document_xml)?;
        let relationships = pkg.relationships()?;
        let resolvable = resolvable_images(pkg, &relationships);
        let plan = plan(&body, &resolvable);

        let mut units = Vec::with_capacity(plan.unit_count as usize);
        for (element, slots) in body.iter().zip(&plan.slots) {
            match element {
                BodyElement::Paragraph(p) => {
                    let mut image_ids = slots.image_ids.iter().copied();
                    for rel in &p.image_rels {
                        if !resolvable.contains(rel) {
                            continue;
                        }
                        let Some(id) = image_ids.next() else { break };
                        let Some(target) = relationships.get(rel) else {
                            continue;
                        };
                        let path = self.extract_image(pkg, target)?;
                        units.push(ContentUnit::image(id, path));
                    }
                    if let Some(id) = slots.unit_id {
                        units.push(ContentUnit::text(id, p.trimmed()));
                    }
                }
                BodyElement::Table(t) => {
                    if let Some(id) = slots.unit_id {
                        units.push(ContentUnit::table(id, t.serialize()));
                    }
                }
                BodyElement::Block(b) => {
                    for &(ordinal, id) in &slots.block_units {
                        units.push(ContentUnit::text(id, b.paragraphs[ordinal].trim()));
                    }
                }
            }
        }

        debug!(
            "walked {} body elements into {} content units",
            body.len(),
            units.len()
        );

        Ok(Extraction { units, body, plan })
    }

    /// Write one media part to the image directory, returning its path.
    fn extract_image(&mut self, pkg: &DocxPackage, target: &str) -> Result<String> {
        let data = pkg.media_bytes(target).ok_or_else(|| {
            // Resolvability is pre-checked, so this indicates a race on the
            // package contents rather than a normal skip.
            warn!("media part disappeared for target {target}");
            docaudit_core::AuditError::Package(format!("missing media part: {target}"))
        })?;

        let ext = target.rsplit('.').next().unwrap_or("bin");
        let filename = format!("img_{}.{ext}", self.image_count);
        let path = self.image_dir.join(filename);
        fs::write(&path, data)?;
        self.image_count += 1;

        Ok(path.to_string_lossy().into_owned())
    }
}
