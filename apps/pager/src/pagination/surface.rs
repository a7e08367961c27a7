//! Where the engine gets its measured trees from.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::block::BlockNode;
use crate::pagination::spacing::MarginMap;

/// A measured tree plus the margin adjustments that were already in its layout
/// when it was measured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasuredDocument {
    pub tree: BlockNode,
    pub rendered_margins: MarginMap,
}

impl MeasuredDocument {
    /// A tree measured with no margin adjustments applied.
    pub fn unadjusted(tree: BlockNode) -> Self {
        Self {
            tree,
            rendered_margins: MarginMap::new(),
        }
    }
}

/// Source of the current measured block tree.
///
/// Called once per recompute, after the debounce window, so implementations that
/// drive a real renderer can wait for layout to settle and re-measure here.
#[async_trait]
pub trait LayoutSurface: Send + Sync {
    /// `None` when no tree is available; the recompute is skipped.
    async fn measure(&self) -> Option<MeasuredDocument>;
}

/// Surface backed by the tree most recently posted by the browser.
#[derive(Debug, Default)]
pub struct StoredSurface {
    document: RwLock<Option<MeasuredDocument>>,
}

impl StoredSurface {
    pub fn new(document: MeasuredDocument) -> Self {
        Self {
            document: RwLock::new(Some(document)),
        }
    }

    pub async fn replace(&self, document: MeasuredDocument) {
        *self.document.write().await = Some(document);
    }
}

#[async_trait]
impl LayoutSurface for StoredSurface {
    async fn measure(&self) -> Option<MeasuredDocument> {
        self.document.read().await.clone()
    }
}
