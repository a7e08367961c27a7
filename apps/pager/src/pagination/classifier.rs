//! Turns a measured block tree into ordered `ContentSection`s.
//!
//! Sections are found from headings: each heading is walked up through its
//! ancestors until one of them looks like a layout group (it carries vertical
//! spacing), and that ancestor becomes the section boundary. The tree is never
//! modified; the result is a derived list that is rebuilt on every recompute.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::block::BlockNode;
use crate::pagination::policy::{PageBreakConfig, SectionRole};
use crate::pagination::spacing::MarginMap;

/// Class prefixes that mark a block as its own vertical layout group.
const SPACING_CLASS_PREFIXES: [&str; 9] = [
    "space-y", "mb-", "mt-", "my-", "p-", "px-", "py-", "pt-", "pb-",
];

/// Id given to the single section of a headerless document.
pub const WHOLE_DOCUMENT_ID: &str = "document";

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// One classified, measured section of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    /// Stable within a pass; stable across passes when the template sets `section_id`.
    pub id: String,
    pub role: SectionRole,
    /// Position in document flow (0-based).
    pub order: usize,
    /// Text of the first heading in the section.
    pub title: String,
    pub measured_height_px: f32,
    /// Offset from the document top, shifted by the not-yet-rendered margin
    /// adjustments above it.
    pub offset_top_px: f32,
    pub indivisible: bool,
    pub margin_adjustment_px: u32,
}

impl ContentSection {
    /// Height the packer consumes: measured box plus the user's extra bottom margin.
    pub fn effective_height_px(&self) -> f32 {
        self.measured_height_px.max(0.0) + self.margin_adjustment_px as f32
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

/// Classifies the top-level sections of `root`.
///
/// `margins` holds the per-section bottom-margin adjustments of the live session;
/// pass an empty map for a clean document. `rendered` holds the adjustments already
/// present in the measured layout. Later offsets are shifted only by the difference,
/// so a re-measured tree is never shifted twice.
pub fn classify_sections(
    root: &BlockNode,
    config: &PageBreakConfig,
    margins: &MarginMap,
    rendered: &MarginMap,
) -> Vec<ContentSection> {
    classify_blocks(root, config, margins, rendered)
        .into_iter()
        .map(|(section, _)| section)
        .collect()
}

/// Same as [`classify_sections`], also returning the block each section
/// was cut from.
pub(crate) fn classify_blocks<'a>(
    root: &'a BlockNode,
    config: &PageBreakConfig,
    margins: &MarginMap,
    rendered: &MarginMap,
) -> Vec<(ContentSection, &'a BlockNode)> {
    let mut heading_paths = Vec::new();
    collect_heading_paths(root, &mut Vec::new(), &mut heading_paths);

    if heading_paths.is_empty() {
        if root.is_empty() {
            return Vec::new();
        }
        debug!("No headings found; treating the whole document as one section");
        return vec![(whole_document_section(root, margins), root)];
    }

    let boundaries = outermost_boundaries(
        heading_paths
            .iter()
            .map(|path| section_boundary(root, path))
            .collect(),
    );

    let mut sections = Vec::with_capacity(boundaries.len());
    let mut shift_px = 0.0_f32;

    for (order, path) in boundaries.iter().enumerate() {
        let node = node_at(root, path);
        let title = first_heading_text(node).unwrap_or_default();
        let role = resolve_role(node, &title);
        let id = node
            .section_id
            .clone()
            .unwrap_or_else(|| format!("section-{order}"));
        let margin_adjustment_px = margins.get(&id).copied().unwrap_or(0);

        let section = ContentSection {
            role,
            order,
            title,
            measured_height_px: node.height_px,
            offset_top_px: node.offset_top_px + shift_px,
            indivisible: config.is_indivisible(role),
            margin_adjustment_px,
            id,
        };
        let already_rendered = rendered.get(&section.id).copied().unwrap_or(0);
        shift_px += margin_adjustment_px as f32 - already_rendered as f32;

        sections.push((section, node));
    }

    debug!(sections = sections.len(), "Classified document sections");
    sections
}

fn whole_document_section(root: &BlockNode, margins: &MarginMap) -> ContentSection {
    let id = root
        .section_id
        .clone()
        .unwrap_or_else(|| WHOLE_DOCUMENT_ID.to_string());
    ContentSection {
        role: resolve_role(root, ""),
        order: 0,
        title: String::new(),
        measured_height_px: root.height_px,
        offset_top_px: 0.0,
        indivisible: true,
        margin_adjustment_px: margins.get(&id).copied().unwrap_or(0),
        id,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// Pre-order walk recording the child-index path of every heading. Overlays are skipped.
fn collect_heading_paths(node: &BlockNode, path: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    for (i, child) in node.children.iter().enumerate() {
        if child.is_overlay() {
            continue;
        }
        path.push(i);
        if child.is_heading() {
            out.push(path.clone());
        }
        collect_heading_paths(child, path, out);
        path.pop();
    }
}

/// Walks up from the heading's parent to the nearest layout group below the root.
/// Falls back to the top-level block containing the heading.
fn section_boundary(root: &BlockNode, heading_path: &[usize]) -> Vec<usize> {
    (1..heading_path.len())
        .rev()
        .map(|depth| &heading_path[..depth])
        .find(|ancestor| is_layout_group(node_at(root, ancestor)))
        .unwrap_or(&heading_path[..1])
        .to_vec()
}

/// Deduplicates boundaries and drops any nested inside another one.
fn outermost_boundaries(mut paths: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
    paths.sort();
    paths.dedup();

    let mut kept: Vec<Vec<usize>> = Vec::with_capacity(paths.len());
    for path in paths {
        match kept.last() {
            Some(outer) if path.starts_with(outer) => {}
            _ => kept.push(path),
        }
    }
    kept
}

fn is_layout_group(node: &BlockNode) -> bool {
    node.spacing.has_vertical()
        || node.class_name.split_whitespace().any(|class| {
            SPACING_CLASS_PREFIXES
                .iter()
                .any(|prefix| class.starts_with(prefix))
        })
}

fn node_at<'a>(root: &'a BlockNode, path: &[usize]) -> &'a BlockNode {
    path.iter().fold(root, |node, &i| &node.children[i])
}

fn first_heading_text(node: &BlockNode) -> Option<String> {
    if node.is_heading() {
        return Some(node.text_content());
    }
    node.children
        .iter()
        .filter(|child| !child.is_overlay())
        .find_map(first_heading_text)
}

/// Role hint precedence: explicit role attribute, then class names, then heading text.
fn resolve_role(node: &BlockNode, title: &str) -> SectionRole {
    node.role_hint
        .as_deref()
        .and_then(SectionRole::from_hint)
        .or_else(|| SectionRole::from_hint(&node.class_name))
        .or_else(|| SectionRole::from_hint(title))
        .unwrap_or(SectionRole::Generic)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
