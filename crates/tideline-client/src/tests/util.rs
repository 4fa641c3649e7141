use std::sync::Mutex;

use async_trait::async_trait;
use preview_proto::BufferId;

use crate::client::{PreviewSurface, ScrollSnapshot};

/// Surface operations observed during a test, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Title(String),
    Heading(String),
    Replace(String),
    WaitImages,
    Typeset,
    Scroll(f64),
    Navigate(String),
}

/// Recording stand-in for the page: logs every capability call and lets
/// tests script how the document height reacts to a content swap.
pub struct RecordingSurface {
    ops: Mutex<Vec<SurfaceOp>>,
    metrics: Mutex<ScrollSnapshot>,
    next_document_height: Mutex<Option<f64>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::with_metrics(1000.0, 600.0, 0.0)
    }

    pub fn with_metrics(document_height: f64, viewport_height: f64, scroll_offset: f64) -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            metrics: Mutex::new(ScrollSnapshot {
                document_height,
                viewport_height,
                scroll_offset,
            }),
            next_document_height: Mutex::new(None),
        }
    }

    /// Document height to report after the next content replacement.
    pub fn set_next_document_height(&self, height: f64) {
        *self.next_document_height.lock().unwrap() = Some(height);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn title(&self) -> Option<String> {
        self.ops()
            .into_iter()
            .rev()
            .find_map(|op| match op {
                SurfaceOp::Title(title) => Some(title),
                _ => None,
            })
    }

    pub fn content(&self) -> Option<String> {
        self.ops()
            .into_iter()
            .rev()
            .find_map(|op| match op {
                SurfaceOp::Replace(html) => Some(html),
                _ => None,
            })
    }

    pub fn navigations(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Navigate(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn push(&self, op: SurfaceOp) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl PreviewSurface for RecordingSurface {
    fn set_title(&self, title: &str) {
        self.push(SurfaceOp::Title(title.to_string()));
    }

    fn set_heading(&self, filename: &str) {
        self.push(SurfaceOp::Heading(filename.to_string()));
    }

    fn replace_content(&self, html: &str) {
        self.push(SurfaceOp::Replace(html.to_string()));
        if let Some(height) = self.next_document_height.lock().unwrap().take() {
            self.metrics.lock().unwrap().document_height = height;
        }
    }

    async fn wait_for_images(&self) {
        self.push(SurfaceOp::WaitImages);
    }

    async fn typeset_math(&self) {
        self.push(SurfaceOp::Typeset);
    }

    fn scroll_metrics(&self) -> ScrollSnapshot {
        *self.metrics.lock().unwrap()
    }

    fn scroll_to(&self, offset: f64) {
        self.push(SurfaceOp::Scroll(offset));
        self.metrics.lock().unwrap().scroll_offset = offset;
    }

    fn navigate_to(&self, buffer_id: &BufferId) {
        self.push(SurfaceOp::Navigate(buffer_id.to_string()));
    }
}
