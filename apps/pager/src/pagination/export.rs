//! Export partitioning: the authoritative split of a document into pages.
//!
//! Independent of the live preview: the tree is cloned (overlays stripped),
//! reclassified, its decorative spacing normalized, and the sections are packed
//! into explicit `Page` values. Unlike the live packer this pass honors the
//! forced breaks (`force_break_after` roles and heading keywords). The result is a self-contained page document for the
//! downstream PDF/DOCX encoders.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::block::BlockNode;
use crate::pagination::classifier::{classify_blocks, ContentSection};
use crate::pagination::packer::log_soft_bounds;
use crate::pagination::policy::PageBreakConfig;
use crate::pagination::spacing::MarginMap;
use crate::pagination::units::PageBudget;

/// Margins above this are compressed in export.
pub const MARGIN_CEILING_PX: f32 = 24.0;
pub const MARGIN_COMPRESSED_PX: f32 = 12.0;
/// Paddings above this are compressed in export.
pub const PADDING_CEILING_PX: f32 = 16.0;
pub const PADDING_COMPRESSED_PX: f32 = 8.0;

/// Tags written to export markup as-is. Anything else becomes a text-less `div`.
const CONTENT_TAGS: [&str; 23] = [
    "div", "section", "article", "header", "footer", "p", "span", "ul", "ol", "li", "h1",
    "h2", "h3", "h4", "h5", "h6", "strong", "em", "a", "table", "tr", "td", "th",
];

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// A section as it appears on an exported page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSection {
    pub section: ContentSection,
    /// Normalized deep clone of the section's block.
    pub content: BlockNode,
    /// Height after normalization plus the user's margin adjustment.
    pub export_height_px: f32,
    pub height_pt: f32,
}

/// One physical page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub sections: Vec<ExportSection>,
    pub total_height_pt: f32,
    /// True only when the page holds a section taller than the budget.
    pub overflows: bool,
    /// True when this page was closed by a forced break.
    pub forced_break: bool,
}

/// The page document handed to the export encoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub margin_allowance_pt: f32,
    pub usable_height_pt: f32,
    pub pages: Vec<Page>,
}

// ────────────────────────────────────────────────────────────────────────────
// Partitioning
// ────────────────────────────────────────────────────────────────────────────

/// Splits `root` into export pages.
///
/// `margins` carries the bottom-margin adjustments made in the live preview; they
/// are kept in export. An empty document yields a single empty page.
pub fn partition_for_export(
    root: &BlockNode,
    config: &PageBreakConfig,
    budget: &PageBudget,
    margins: &MarginMap,
) -> ExportDocument {
    let clean = root.clone_without_overlays();
    let classified = classify_blocks(&clean, config, margins, &MarginMap::new());
    let section_count = classified.len();
    let limit = budget.usable_height_pt();

    let mut pages: Vec<Page> = Vec::new();
    let mut current: Vec<ExportSection> = Vec::new();
    let mut cumulative = 0.0_f32;

    for (i, (section, node)) in classified.into_iter().enumerate() {
        let item = export_section(section, node, budget);
        let h = item.height_pt;

        if config.enable_smart_breaks && !current.is_empty() && cumulative + h > limit {
            close_page(&mut pages, &mut current, &mut cumulative, limit, false);
        }

        let forced = config.enable_smart_breaks
            && (config.forces_break_after(item.section.role)
                || config.forces_break_after_title(&item.section.title));
        cumulative += h;
        current.push(item);

        if forced && i + 1 < section_count {
            close_page(&mut pages, &mut current, &mut cumulative, limit, true);
        }
    }

    if !current.is_empty() || pages.is_empty() {
        close_page(&mut pages, &mut current, &mut cumulative, limit, false);
    }

    let counts: Vec<usize> = pages.iter().map(|p| p.sections.len()).collect();
    log_soft_bounds(&counts, config);

    info!(
        pages = pages.len(),
        sections = section_count,
        "Partitioned document for export"
    );

    ExportDocument {
        page_width_pt: budget.page_width_pt,
        page_height_pt: budget.page_height_pt,
        margin_allowance_pt: budget.margin_allowance_pt,
        usable_height_pt: limit,
        pages,
    }
}

fn export_section(section: ContentSection, node: &BlockNode, budget: &PageBudget) -> ExportSection {
    let mut content = node.clone();
    let reclaimed_px = normalize_spacing(&mut content, true);
    content.spacing.margin_bottom_px += section.margin_adjustment_px as f32;

    let export_height_px =
        (section.measured_height_px - reclaimed_px).max(0.0) + section.margin_adjustment_px as f32;
    if reclaimed_px > 0.0 {
        debug!(
            section_id = %section.id,
            reclaimed_px,
            "Compressed decorative spacing for export"
        );
    }

    ExportSection {
        height_pt: budget.to_points(export_height_px),
        export_height_px,
        content,
        section,
    }
}

fn close_page(
    pages: &mut Vec<Page>,
    current: &mut Vec<ExportSection>,
    cumulative: &mut f32,
    limit: f32,
    forced_break: bool,
) {
    let sections = std::mem::take(current);
    pages.push(Page {
        page_number: pages.len() as u32 + 1,
        overflows: *cumulative > limit,
        total_height_pt: *cumulative,
        sections,
        forced_break,
    });
    *cumulative = 0.0;
}

/// Compresses oversized inline spacing throughout the subtree.
///
/// Returns the pixels reclaimed inside the measured box: paddings everywhere, and
/// margins of descendants. The root's own margins sit outside its measured height.
fn normalize_spacing(node: &mut BlockNode, is_root: bool) -> f32 {
    let spacing = &mut node.spacing;
    let mut reclaimed = 0.0;

    reclaimed += compress(&mut spacing.padding_top_px, PADDING_CEILING_PX, PADDING_COMPRESSED_PX);
    reclaimed += compress(
        &mut spacing.padding_bottom_px,
        PADDING_CEILING_PX,
        PADDING_COMPRESSED_PX,
    );
    let margins = compress(&mut spacing.margin_top_px, MARGIN_CEILING_PX, MARGIN_COMPRESSED_PX)
        + compress(
            &mut spacing.margin_bottom_px,
            MARGIN_CEILING_PX,
            MARGIN_COMPRESSED_PX,
        );
    if !is_root {
        reclaimed += margins;
    }

    for child in &mut node.children {
        reclaimed += normalize_spacing(child, false);
    }
    reclaimed
}

fn compress(value: &mut f32, ceiling: f32, compressed: f32) -> f32 {
    if *value > ceiling {
        let saved = *value - compressed;
        *value = compressed;
        saved
    } else {
        0.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Markup
// ────────────────────────────────────────────────────────────────────────────

impl ExportDocument {
    /// All pages as consecutive `resume-page` containers.
    pub fn to_markup(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.to_markup(self.page_width_pt, self.page_height_pt))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Page {
    /// Statically sized page container holding its sections' markup.
    pub fn to_markup(&self, width_pt: f32, height_pt: f32) -> String {
        let mut out = format!(
            "<div class=\"resume-page\" data-page=\"{}\" style=\"width:{width_pt}pt;height:{height_pt}pt;\
             overflow:hidden;break-after:page\">",
            self.page_number
        );
        for item in &self.sections {
            write_node(&item.content, &mut out);
        }
        out.push_str("</div>");
        out
    }
}

fn write_node(node: &BlockNode, out: &mut String) {
    let tag = safe_tag(&node.tag);
    let trusted = tag.eq_ignore_ascii_case(&node.tag);
    out.push('<');
    out.push_str(tag);
    if !node.class_name.is_empty() {
        out.push_str(" class=\"");
        out.push_str(&escape(&node.class_name));
        out.push('"');
    }
    let s = &node.spacing;
    if s.has_vertical() {
        out.push_str(&format!(
            " style=\"margin-top:{}px;margin-bottom:{}px;padding-top:{}px;padding-bottom:{}px\"",
            s.margin_top_px, s.margin_bottom_px, s.padding_top_px, s.padding_bottom_px
        ));
    }
    out.push('>');
    if let Some(text) = node.text.as_deref().filter(|_| trusted) {
        out.push_str(&escape(text));
    }
    for child in &node.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Lower-cased allow-listed tag, or `div`.
fn safe_tag(tag: &str) -> &'static str {
    CONTENT_TAGS
        .iter()
        .find(|allowed| allowed.eq_ignore_ascii_case(tag))
        .copied()
        .unwrap_or("div")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
