use std::sync::Arc;

use tracing::debug;

use super::PreviewSurface;

/// Vertical scroll geometry captured immediately before a content swap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSnapshot {
    pub document_height: f64,
    pub viewport_height: f64,
    pub scroll_offset: f64,
}

/// Captures and restores the reading position across content replacements.
///
/// Replacing the document wholesale can change its total height; without
/// compensation the reader's relative position would jump. The tracker
/// scrolls to the old offset shifted by however much the document grew or
/// shrank.
pub struct ViewportTracker<S> {
    surface: Arc<S>,
}

impl<S: PreviewSurface> ViewportTracker<S> {
    pub fn new(surface: Arc<S>) -> Self {
        Self { surface }
    }

    pub fn snapshot(&self) -> ScrollSnapshot {
        self.surface.scroll_metrics()
    }

    /// Issues the compensating scroll once the new content has settled.
    pub fn compensate(&self, before: &ScrollSnapshot) {
        let after = self.surface.scroll_metrics();
        let increment = after.document_height - before.document_height;
        let target = before.scroll_offset + increment;
        debug!(
            target: "preview.viewport",
            increment,
            offset = target,
            "compensating scroll after content swap"
        );
        self.surface.scroll_to(target);
    }
}
