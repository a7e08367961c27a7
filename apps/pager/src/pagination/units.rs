//! Page budget and pixel → point conversion.
//!
//! All values here are calibration constants, not laws. The px→pt factor is
//! deliberately conservative: it under-estimates the space left on a page so that
//! pagination breaks early rather than letting content run past a physical edge.

use serde::{Deserialize, Serialize};

/// A4 portrait height in points.
pub const A4_HEIGHT_PT: f32 = 842.0;
/// A4 portrait width in points.
pub const A4_WIDTH_PT: f32 = 595.0;
/// Vertical allowance reserved for printer margins.
pub const DEFAULT_MARGIN_ALLOWANCE_PT: f32 = 18.0;
/// Pixels → points. Empirical; validate against the target renderer before changing.
pub const DEFAULT_PX_TO_PT: f32 = 0.5;

/// Physical page dimensions plus the conversion used to fill them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBudget {
    pub page_height_pt: f32,
    pub page_width_pt: f32,
    pub margin_allowance_pt: f32,
    pub px_to_pt: f32,
}

impl Default for PageBudget {
    fn default() -> Self {
        Self {
            page_height_pt: A4_HEIGHT_PT,
            page_width_pt: A4_WIDTH_PT,
            margin_allowance_pt: DEFAULT_MARGIN_ALLOWANCE_PT,
            px_to_pt: DEFAULT_PX_TO_PT,
        }
    }
}

impl PageBudget {
    /// Usable vertical space per page, in points.
    pub fn usable_height_pt(&self) -> f32 {
        self.page_height_pt - self.margin_allowance_pt
    }

    /// Converts a measured pixel height to points. Negative input counts as zero.
    pub fn to_points(&self, px: f32) -> f32 {
        px.max(0.0) * self.px_to_pt
    }

    /// Inverse of [`to_points`](Self::to_points), used to build fixtures in points.
    #[cfg(test)]
    pub fn to_pixels(&self, pt: f32) -> f32 {
        pt / self.px_to_pt
    }

    /// Rejects budgets that would make every section overflow or divide by zero.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.px_to_pt.is_finite() && self.px_to_pt > 0.0) {
            return Err(format!("px_to_pt must be positive, got {}", self.px_to_pt));
        }
        if !(self.page_height_pt.is_finite() && self.page_height_pt > 0.0) {
            return Err(format!(
                "page height must be positive, got {}",
                self.page_height_pt
            ));
        }
        if self.margin_allowance_pt < 0.0 || self.margin_allowance_pt >= self.page_height_pt {
            return Err(format!(
                "margin allowance {} must be in [0, page height {})",
                self.margin_allowance_pt, self.page_height_pt
            ));
        }
        Ok(())
    }
}
