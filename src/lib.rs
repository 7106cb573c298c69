//! # Bindery
//!
//! Archival PDF assembly for scanned books.
//!
//! Bindery turns a stack of scanned page images plus their OCR word
//! geometry into a compact, accessible PDF/A-3B document. Pages carry an
//! invisible selectable text layer under a mixed-raster-content (MRC)
//! recompression of the scan: a binary text mask over separately-compressed
//! background and foreground layers.
//!
//! ## Pipeline
//!
//! - **Text pass** ([`textlayer`]): one output page per retained input page,
//!   sized from per-page DPI metadata with PDF/A bound recovery, containing
//!   only render-mode-3 text at the OCR word boxes.
//! - **Image pass** ([`imagepipe`]): per-page MRC split and encode through a
//!   pluggable codec, inserted as background underlay and stencil-masked
//!   foreground overlay. Passthrough and pixmap copy modes reuse an
//!   existing document's images instead.
//! - **Finishing** ([`pdfa`], [`tagging`], [`labels`]): sRGB output intent,
//!   XMP metadata with PDF/A identification, per-page figure structure
//!   elements with a chunked parent tree, and page labels from the item's
//!   page-number series.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bindery::{recode, RecodeOptions, ImageMode};
//! use bindery::jp2::KakaduDecoder;
//!
//! # fn main() -> bindery::Result<()> {
//! let mut source = load_hocr("book_hocr.html")?;
//! let codec = MyMrcCodec::default();
//! let decoder = KakaduDecoder::new();
//!
//! let options = RecodeOptions {
//!     out_path: "book.pdf".into(),
//!     image_stack: page_images,
//!     image_mode: ImageMode::Mrc,
//!     ..Default::default()
//! };
//! let summary = recode(&mut source, &codec, &decoder, &options)?;
//! println!("{:.2}x smaller", summary.compression_ratio);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Input models
pub mod ocr;
pub mod scandata;

// Page geometry and tier routing
pub mod geometry;
pub mod tier;

// Rasters and codecs
pub mod gray;
pub mod jp2;
pub mod mrc;

// Document construction
pub mod imagepipe;
pub mod store;
pub mod textlayer;

// Archival finishing
pub mod labels;
pub mod pdfa;
pub mod tagging;

// Orchestration and reporting
pub mod recode;
pub mod telemetry;

pub use error::{Error, Result, RunWarning, WarningSet};
pub use recode::{recode, ImageMode, RecodeOptions, RecodeSummary};
