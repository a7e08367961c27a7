//! The measured block tree posted by the rendering surface.
//!
//! Each node mirrors one rendered element: its tag, the class/attribute hints the
//! template attached to it, its measured box and the inline spacing it was laid out
//! with. The engine only ever reads these trees; export works on normalized clones.

use serde::{Deserialize, Serialize};

/// Class names carried by overlay nodes that must never be treated as content.
pub const OVERLAY_CLASSES: [&str; 2] = ["page-break-indicator", "page-number-indicator"];

/// Inline spacing of a block, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spacing {
    #[serde(default)]
    pub margin_top_px: f32,
    #[serde(default)]
    pub margin_bottom_px: f32,
    #[serde(default)]
    pub padding_top_px: f32,
    #[serde(default)]
    pub padding_bottom_px: f32,
}

impl Spacing {
    /// True if any vertical spacing is set.
    pub fn has_vertical(&self) -> bool {
        self.margin_top_px > 0.0
            || self.margin_bottom_px > 0.0
            || self.padding_top_px > 0.0
            || self.padding_bottom_px > 0.0
    }
}

/// One rendered element with its measured layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    /// Element tag, e.g. `div`, `h2`, `ul`.
    pub tag: String,
    /// Space-separated class list as rendered.
    #[serde(default)]
    pub class_name: String,
    /// Explicit role attribute set by the template (`data-role`).
    #[serde(default)]
    pub role_hint: Option<String>,
    /// Explicit stable id set by the template (`data-section-id`).
    #[serde(default)]
    pub section_id: Option<String>,
    /// Direct text content of this node.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub height_px: f32,
    /// Distance from the top of the document container.
    #[serde(default)]
    pub offset_top_px: f32,
    #[serde(default)]
    pub spacing: Spacing,
    #[serde(default)]
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub fn is_heading(&self) -> bool {
        matches!(
            self.tag.to_ascii_lowercase().as_str(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        )
    }

    /// True for indicator overlays that a previous preview pass left in the tree.
    pub fn is_overlay(&self) -> bool {
        self.class_name
            .split_whitespace()
            .any(|class| OVERLAY_CLASSES.contains(&class))
    }

    /// True if nothing was rendered at all.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.height_px <= 0.0 && self.text.is_none()
    }

    /// Concatenated text of this node and its descendants, whitespace-joined.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn collect_text<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(text) = self.text.as_deref() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push(trimmed);
            }
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Deep copy of this subtree with overlay nodes removed.
    pub fn clone_without_overlays(&self) -> BlockNode {
        BlockNode {
            children: self
                .children
                .iter()
                .filter(|child| !child.is_overlay())
                .map(BlockNode::clone_without_overlays)
                .collect(),
            ..self.clone_shallow()
        }
    }

    fn clone_shallow(&self) -> BlockNode {
        BlockNode {
            tag: self.tag.clone(),
            class_name: self.class_name.clone(),
            role_hint: self.role_hint.clone(),
            section_id: self.section_id.clone(),
            text: self.text.clone(),
            height_px: self.height_px,
            offset_top_px: self.offset_top_px,
            spacing: self.spacing,
            children: Vec::new(),
        }
    }
}
