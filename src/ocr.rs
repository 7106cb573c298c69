//! Recognized-text markup contract.
//!
//! Parsing of OCR markup (hOCR and friends) is a collaborator concern; the
//! pipeline only needs per-page pixel dimensions and word bounding boxes,
//! delivered as a restartable, finite, forward-only sequence. The text-layer
//! pass and the image pass each iterate the source once from the start.

use crate::error::Result;

/// One recognized word with its bounding box in markup pixel space
/// (origin top-left, y grows downward).
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    /// Recognized text content
    pub text: String,
    /// Left edge in pixels
    pub x0: f64,
    /// Top edge in pixels
    pub y0: f64,
    /// Right edge in pixels
    pub x1: f64,
    /// Bottom edge in pixels
    pub y1: f64,
}

impl WordBox {
    /// Width of the box in pixels.
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Height of the box in pixels.
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// One page of recognized text: the page's pixel dimensions as declared by
/// the markup, and its ordered word boxes.
#[derive(Debug, Clone, Default)]
pub struct OcrPage {
    /// Page width in markup pixels
    pub width_px: u32,
    /// Page height in markup pixels
    pub height_px: u32,
    /// Word boxes in reading order
    pub words: Vec<WordBox>,
}

/// A restartable source of recognized-text pages.
///
/// Implementations are expected to be cheap to re-iterate; the pipeline
/// calls [`TextSource::pages`] once per pass.
pub trait TextSource {
    /// Start a fresh iteration over all pages, in page order.
    fn pages(&mut self) -> Result<Box<dyn Iterator<Item = Result<OcrPage>> + '_>>;
}

/// In-memory text source, mainly useful for tests and for callers that have
/// already materialized their markup.
#[derive(Debug, Clone, Default)]
pub struct VecTextSource {
    /// The pages to yield, in order.
    pub pages: Vec<OcrPage>,
}

impl VecTextSource {
    /// Create a source over the given pages.
    pub fn new(pages: Vec<OcrPage>) -> Self {
        Self { pages }
    }
}

impl TextSource for VecTextSource {
    fn pages(&mut self) -> Result<Box<dyn Iterator<Item = Result<OcrPage>> + '_>> {
        Ok(Box::new(self.pages.iter().cloned().map(Ok)))
    }
}
