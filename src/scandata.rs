//! Scan metadata and page-number series records.
//!
//! Scan-management XML and page-number series syntax are parsed by external
//! collaborators; the pipeline consumes their already-resolved form.

use std::collections::{BTreeMap, BTreeSet};

/// Per-item scan metadata, as resolved from the scan-management file.
#[derive(Debug, Clone, Default)]
pub struct ScanData {
    /// 0-based indices of pages to exclude from the output entirely
    pub skip_pages: BTreeSet<usize>,
    /// Per-page DPI overrides, keyed by retained-page index
    pub dpi_per_page: BTreeMap<usize, f64>,
    /// Document-wide DPI; overrides any caller-supplied DPI when present
    pub document_dpi: Option<f64>,
    /// Resolved page-number series, when the item declares page numbers
    pub page_numbers: Option<PageNumberSeries>,
}

/// Numbering style of a page-label range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    /// Arabic decimal numbers (1, 2, 3, ...)
    Decimal,
    /// Lowercase Roman numerals (i, ii, iii, ...)
    RomanLower,
    /// Uppercase Roman numerals (I, II, III, ...)
    RomanUpper,
    /// Lowercase letters (a, b, c, ...)
    AlphaLower,
    /// Uppercase letters (A, B, C, ...)
    AlphaUpper,
    /// No numbering; pages in the range show only the prefix, if any
    None,
}

impl LabelStyle {
    /// PDF name for the /S entry, when the style has one.
    pub fn pdf_name(self) -> Option<&'static [u8]> {
        match self {
            LabelStyle::Decimal => Some(b"D"),
            LabelStyle::RomanLower => Some(b"r"),
            LabelStyle::RomanUpper => Some(b"R"),
            LabelStyle::AlphaLower => Some(b"a"),
            LabelStyle::AlphaUpper => Some(b"A"),
            LabelStyle::None => None,
        }
    }
}

/// One contiguous run of identically-styled page labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRange {
    /// 0-based index of the first page the range applies to
    pub first_page_index: usize,
    /// Numbering style
    pub style: LabelStyle,
    /// Literal prefix prepended to every label in the range
    pub prefix: Option<String>,
    /// Value of the first label in the range (1-based)
    pub start_value: i64,
}

impl LabelRange {
    /// A decimal range starting at the given page with the given first value.
    pub fn decimal(first_page_index: usize, start_value: i64) -> Self {
        Self {
            first_page_index,
            style: LabelStyle::Decimal,
            prefix: None,
            start_value,
        }
    }
}

/// A page-number series resolved by the external series parser.
#[derive(Debug, Clone, Default)]
pub struct PageNumberSeries {
    /// Ordered label ranges, keyed by ascending first page index
    pub ranges: Vec<LabelRange>,
    /// False when parts of the series description could not be parsed;
    /// the recovered ranges are still written
    pub complete: bool,
}
