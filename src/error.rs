//! Error types for the recode pipeline.
//!
//! Fatal conditions abort a run and surface as [`Error`]; recoverable
//! conditions accumulate as [`RunWarning`] codes in a [`WarningSet`] that is
//! returned to the caller alongside a successful result.

use std::collections::BTreeSet;

/// Result type alias for recode pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error conditions. Any of these stops the pipeline immediately.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No valid page geometry found after the full fallback ladder
    #[error(
        "no fitting page boundary for {width_px}x{height_px} px at {dpi} dpi \
         (width {width_pt:.1} pt outside ({min}, {max}))"
    )]
    NoFittingPageBoundary {
        /// Pixel width of the page image
        width_px: u32,
        /// Pixel height of the page image
        height_px: u32,
        /// Last resolution tried, in dots per inch
        dpi: f64,
        /// Resulting page width in PDF points
        width_pt: f64,
        /// Lower PDF/A bound in points
        min: f64,
        /// Upper PDF/A bound in points
        max: f64,
    },

    /// External codec subprocess failed (non-zero exit or stderr output)
    #[error("codec process '{command}' failed: {reason}")]
    CodecFailure {
        /// The command that was invoked
        command: String,
        /// Exit status or captured stderr
        reason: String,
    },

    /// A required input was not supplied or could not be found
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Recognized-text markup source failed irrecoverably
    #[error("markup source error: {0}")]
    MarkupSource(String),

    /// Content stream encoding error
    #[error("content encoding error: {0}")]
    Encode(String),

    /// A document object did not have the expected shape
    #[error("malformed document object: {0}")]
    Malformed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raster decoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Object store error
    #[error("PDF object store error: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Warning codes accumulated over a whole run.
///
/// These never abort processing; the orchestrator returns the full set to the
/// caller at the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunWarning {
    /// A page's initially resolved geometry violated the PDF/A size bounds,
    /// even if a fallback step later recovered a valid geometry
    InvalidPageSize,
    /// The page-number series was only partially parseable
    InvalidPageNumbers,
}

impl std::fmt::Display for RunWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunWarning::InvalidPageSize => write!(f, "invalid-page-size"),
            RunWarning::InvalidPageNumbers => write!(f, "invalid-page-numbers"),
        }
    }
}

/// The accumulated warning codes of one run.
pub type WarningSet = BTreeSet<RunWarning>;
