//! Pagination engine: classification, packing, live-preview projection and export.

pub mod classifier;
pub mod export;
pub mod handlers;
pub mod indicators;
pub mod navigator;
pub mod packer;
pub mod policy;
pub mod scheduler;
pub mod session;
pub mod spacing;
pub mod surface;
pub mod units;

use std::time::Duration;

use crate::pagination::policy::PageBreakConfig;
use crate::pagination::scheduler::DEFAULT_DEBOUNCE;
use crate::pagination::units::PageBudget;

/// Engine-wide settings shared by every session and export request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationSettings {
    pub break_config: PageBreakConfig,
    pub budget: PageBudget,
    /// Quiet period the recompute worker waits out before running.
    pub debounce: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            break_config: PageBreakConfig::default(),
            budget: PageBudget::default(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}
