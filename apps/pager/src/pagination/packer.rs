//! Greedy packer: assigns classified sections to pages.
//!
//! Single forward pass. A section that no longer fits starts a new page; a
//! section that is taller than a whole page is never split and simply overflows
//! the page it starts. The live preview ignores `force_break_after`: that policy
//! belongs to the export partitioner, which is the authoritative pass.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pagination::classifier::ContentSection;
use crate::pagination::policy::PageBreakConfig;
use crate::pagination::units::PageBudget;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Document coordinate at which a new page begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBreakPoint {
    /// `offset_top_px` of the first section on the new page.
    pub y_offset_px: f32,
    /// Page starting here; always ≥ 2.
    pub page_number: u32,
}

/// Page assigned to one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPlacement {
    pub section_id: String,
    pub page_number: u32,
}

/// Full output of one packing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationResult {
    pub break_points: Vec<PageBreakPoint>,
    pub placements: Vec<SectionPlacement>,
    pub total_pages: u32,
    pub total_breaks: usize,
    /// Pages whose only section is taller than the budget.
    pub overflowing_pages: Vec<u32>,
}

impl PaginationResult {
    /// Page of a section, if it was part of this pass.
    #[cfg(test)]
    pub fn page_of(&self, section_id: &str) -> Option<u32> {
        self.placements
            .iter()
            .find(|p| p.section_id == section_id)
            .map(|p| p.page_number)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Packing
// ────────────────────────────────────────────────────────────────────────────

/// Packs `sections` onto pages of `budget.usable_height_pt()` points.
pub fn pack_sections(
    sections: &[ContentSection],
    budget: &PageBudget,
    config: &PageBreakConfig,
) -> PaginationResult {
    let limit = budget.usable_height_pt();
    let mut break_points = Vec::new();
    let mut placements = Vec::with_capacity(sections.len());
    let mut overflowing_pages = Vec::new();
    let mut page_counts: Vec<usize> = vec![0];

    let mut cumulative = 0.0_f32;
    let mut page = 1u32;

    for (i, section) in sections.iter().enumerate() {
        let h = budget.to_points(section.effective_height_px());

        if config.enable_smart_breaks && i > 0 && cumulative + h > limit {
            page += 1;
            break_points.push(PageBreakPoint {
                y_offset_px: section.offset_top_px,
                page_number: page,
            });
            page_counts.push(0);
            cumulative = h;
        } else {
            cumulative += h;
        }

        if h > limit && !overflowing_pages.contains(&page) {
            warn!(
                section_id = %section.id,
                height_pt = h,
                budget_pt = limit,
                page,
                "Section taller than a page; allowing overflow"
            );
            overflowing_pages.push(page);
        }

        if let Some(count) = page_counts.last_mut() {
            *count += 1;
        }
        placements.push(SectionPlacement {
            section_id: section.id.clone(),
            page_number: page,
        });
    }

    log_soft_bounds(&page_counts, config);

    let total_breaks = break_points.len();
    debug!(total_pages = page, total_breaks, "Packed sections into pages");

    PaginationResult {
        break_points,
        placements,
        total_pages: page,
        total_breaks,
        overflowing_pages,
    }
}

/// Reports pages outside the soft content bounds. Never changes the packing.
pub(crate) fn log_soft_bounds(page_counts: &[usize], config: &PageBreakConfig) {
    let last = page_counts.len();
    for (i, &count) in page_counts.iter().enumerate() {
        // The final page is allowed to run short.
        if count < config.min_content_per_page && i + 1 < last {
            debug!(page = i + 1, sections = count, "Page below soft content minimum");
        }
        if count > config.max_content_per_page {
            debug!(page = i + 1, sections = count, "Page above soft content maximum");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
