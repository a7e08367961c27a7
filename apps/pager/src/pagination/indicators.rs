//! Projects break points into a preview overlay.
//!
//! The overlay is derived data: hosts either render the `IndicatorLayer` model
//! themselves or inject the markup from [`IndicatorLayer::to_markup`]. Every
//! indicator carries the print-exclusion tags the export pipeline filters on.

use serde::{Deserialize, Serialize};

use crate::pagination::packer::PageBreakPoint;

/// Class on the horizontal marker.
pub const INDICATOR_CLASS: &str = "page-break-indicator";
/// Class on the page label inside the marker.
pub const LABEL_CLASS: &str = "page-number-indicator";

/// One overlay marker at a page boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakIndicator {
    /// Absolute offset from the top of the document container.
    pub top_px: f32,
    pub page_number: u32,
    pub label: String,
    /// Always true; indicators never reach printed or exported output.
    pub print_excluded: bool,
}

/// All indicators for the current pass plus the visibility switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorLayer {
    pub visible: bool,
    pub indicators: Vec<BreakIndicator>,
}

pub fn page_label(page_number: u32) -> String {
    format!("Page {page_number}")
}

/// Builds the overlay for `break_points`. Section data is never touched.
pub fn build_indicator_layer(break_points: &[PageBreakPoint], visible: bool) -> IndicatorLayer {
    IndicatorLayer {
        visible,
        indicators: break_points
            .iter()
            .map(|bp| BreakIndicator {
                top_px: bp.y_offset_px,
                page_number: bp.page_number,
                label: page_label(bp.page_number),
                print_excluded: true,
            })
            .collect(),
    }
}

impl IndicatorLayer {
    /// Finds the indicator whose label names `page_number`.
    pub fn find_by_label(&self, page_number: u32) -> Option<&BreakIndicator> {
        let wanted = page_label(page_number);
        self.indicators.iter().find(|i| i.label == wanted)
    }

    /// Absolutely positioned, pointer-transparent overlay markup. Empty when hidden.
    pub fn to_markup(&self) -> String {
        if !self.visible {
            return String::new();
        }
        self.indicators
            .iter()
            .map(|indicator| {
                format!(
                    "<div class=\"{INDICATOR_CLASS} no-print\" data-print-exclude=\"true\" \
                     aria-hidden=\"true\" style=\"position:absolute;top:{top}px;left:0;right:0;\
                     height:3px;pointer-events:none;z-index:1000\">\
                     <div class=\"{LABEL_CLASS}\">{label}</div></div>",
                    top = indicator.top_px,
                    label = indicator.label,
                )
            })
            .collect()
    }
}
