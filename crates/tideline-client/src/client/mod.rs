use std::sync::Arc;

use async_trait::async_trait;
use preview_proto::BufferId;
use tracing::debug;

use crate::telemetry;

pub mod viewport;

pub use viewport::{ScrollSnapshot, ViewportTracker};

/// Title separator between filename and directory, as displayed by the page.
pub const TITLE_SEPARATOR: char = '\u{2014}';

/// Narrow interface onto the page displaying the preview.
///
/// The core never touches the DOM, CSS, or any typesetting engine; it only
/// invokes these capabilities and sequences them.
#[async_trait]
pub trait PreviewSurface: Send + Sync {
    /// Sets the document title (the joined filename/dirname form).
    fn set_title(&self, title: &str);

    /// Updates the page's filename caption.
    fn set_heading(&self, filename: &str);

    /// Replaces the displayed content wholesale. Never diffed.
    fn replace_content(&self, html: &str);

    /// Resolves once every image embedded in the current content has
    /// finished loading; resolves immediately when there are none.
    async fn wait_for_images(&self);

    /// Typesets mathematics in the current content. Typesetting may change
    /// element heights, so it completes before scroll compensation runs.
    async fn typeset_math(&self);

    /// Current vertical scroll geometry.
    fn scroll_metrics(&self) -> ScrollSnapshot;

    /// Smoothly scrolls the viewport to the given offset.
    fn scroll_to(&self, offset: f64);

    /// Navigates the page to the view bound to a freshly issued identity.
    fn navigate_to(&self, buffer_id: &BufferId);
}

/// One content update extracted from an `OK` query response.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentUpdate {
    pub filename: String,
    pub dirname: String,
    pub html_part: String,
}

/// Swaps fresh content into the page and settles the viewport.
///
/// Settling means: content replaced, embedded images loaded, math typeset
/// (when enabled), compensating scroll issued. The caller may adopt the
/// update's version marker only after `apply` returns.
pub struct ContentApplier<S> {
    surface: Arc<S>,
    tracker: ViewportTracker<S>,
    mathjax: bool,
}

impl<S: PreviewSurface> ContentApplier<S> {
    pub fn new(surface: Arc<S>, mathjax: bool) -> Self {
        let tracker = ViewportTracker::new(surface.clone());
        Self {
            surface,
            tracker,
            mathjax,
        }
    }

    pub async fn apply(&self, update: &ContentUpdate) {
        let _guard = telemetry::PerfGuard::new("apply.settle");
        let before = self.tracker.snapshot();

        let title = format!(
            "{}{}{}",
            update.filename, TITLE_SEPARATOR, update.dirname
        );
        self.surface.set_title(&title);
        self.surface.set_heading(&update.filename);
        self.surface.replace_content(&update.html_part);

        self.surface.wait_for_images().await;
        if self.mathjax {
            self.surface.typeset_math().await;
        }

        self.tracker.compensate(&before);
        debug!(
            target: "preview.apply",
            filename = %update.filename,
            bytes = update.html_part.len(),
            "content applied and settled"
        );
    }
}
