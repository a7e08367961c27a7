//! Maps a page number to a scroll target in the preview.

use serde::{Deserialize, Serialize};

use crate::pagination::indicators::IndicatorLayer;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScrollTarget {
    /// Scroll the document container to its top.
    DocumentTop,
    /// Scroll the page-break indicator at this offset to the top of the viewport.
    Indicator { top_px: f32, page_number: u32 },
}

/// Resolves `page_number` against the current indicators.
///
/// Returns `None` for a page that no longer exists (for example after a
/// recompute removed it); callers treat that as a no-op.
pub fn go_to(page_number: u32, layer: &IndicatorLayer) -> Option<ScrollTarget> {
    match page_number {
        0 => None,
        1 => Some(ScrollTarget::DocumentTop),
        n => layer
            .find_by_label(n)
            .map(|indicator| ScrollTarget::Indicator {
                top_px: indicator.top_px,
                page_number: indicator.page_number,
            }),
    }
}
