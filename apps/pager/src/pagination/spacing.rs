//! Per-section bottom-margin nudges.
//!
//! The margin map is the only pagination state that outlives a recompute. It is
//! written here and read by the classifier on the next pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pagination::classifier::ContentSection;

/// Margin step applied per adjustment, in pixels.
pub const SPACING_STEP_PX: u32 = 10;

/// Section id → extra bottom margin in pixels. Zero entries are not stored.
pub type MarginMap = BTreeMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingDirection {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpacingController {
    margins: MarginMap,
}

impl SpacingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn margins(&self) -> &MarginMap {
        &self.margins
    }

    pub fn margin_for(&self, section_id: &str) -> u32 {
        self.margins.get(section_id).copied().unwrap_or(0)
    }

    /// Moves the bottom margin of `section_id` one step in `direction`, clamped at 0.
    ///
    /// `sections` is the latest classification. An id not present there is stale and
    /// the call is a no-op returning `None`; otherwise the new margin is returned.
    pub fn adjust(
        &mut self,
        section_id: &str,
        direction: SpacingDirection,
        sections: &[ContentSection],
    ) -> Option<u32> {
        if !sections.iter().any(|s| s.id == section_id) {
            debug!(section_id, "Ignoring spacing adjustment for unknown section");
            return None;
        }

        let current = self.margin_for(section_id);
        let next = match direction {
            SpacingDirection::Increase => current.saturating_add(SPACING_STEP_PX),
            SpacingDirection::Decrease => current.saturating_sub(SPACING_STEP_PX),
        };
        self.set(section_id, next);
        Some(next)
    }

    /// Clears the adjustment for one section. Returns true if one was set.
    pub fn reset(&mut self, section_id: &str) -> bool {
        self.margins.remove(section_id).is_some()
    }

    pub fn reset_all(&mut self) {
        self.margins.clear();
    }

    fn set(&mut self, section_id: &str, margin_px: u32) {
        if margin_px == 0 {
            self.margins.remove(section_id);
        } else {
            self.margins.insert(section_id.to_string(), margin_px);
        }
    }
}
