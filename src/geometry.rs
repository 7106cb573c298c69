//! Page geometry resolution.
//!
//! Scanned page images rarely carry trustworthy resolution information. This
//! module resolves each page's physical size in PDF points from
//! priority-ordered DPI sources (per-page scan metadata, document-level
//! override, heuristic guess) and validates the result against the PDF/A page
//! size bounds, falling back down the ladder when a source produces an
//! impossible page.

use log::debug;

use crate::error::{Error, Result, RunWarning, WarningSet};

/// Smallest page width/height a PDF/A document may declare, in points
/// (exclusive).
pub const PDFA_MIN_UNITS: f64 = 3.0;
/// Largest page width/height a PDF/A document may declare, in points
/// (exclusive).
pub const PDFA_MAX_UNITS: f64 = 14400.0;

/// Physical page format assumed when guessing DPI: European A4, in inches.
pub const DEFAULT_EXPECTED_FORMAT: (f64, f64) = (8.27, 11.69);

/// Acceptable DPI values for the guess heuristic.
pub const DEFAULT_DPI_CANDIDATES: [f64; 5] = [72.0, 96.0, 150.0, 300.0, 600.0];

/// Resolved physical geometry for one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Page width in PDF points (72 pt = 1 in)
    pub width_pt: f64,
    /// Page height in PDF points
    pub height_pt: f64,
    /// Effective pixels-per-inch of the page raster at this size
    pub ppi: f64,
}

impl PageGeometry {
    /// Scale factor from markup pixel space to point space.
    pub fn scale(&self) -> f64 {
        72.0 / self.ppi
    }
}

/// Guess the DPI of a page image from its pixel dimensions.
///
/// Scores every candidate by its combined deviation from the DPI implied by
/// the expected physical format and returns the best match; ties are broken
/// by candidate order.
pub fn guess_dpi(width_px: u32, height_px: u32, expected_format: (f64, f64), candidates: &[f64]) -> f64 {
    let w_dpi = width_px as f64 / expected_format.0;
    let h_dpi = height_px as f64 / expected_format.1;

    let mut best = candidates[0];
    let mut best_diff = f64::INFINITY;
    for &dpi in candidates {
        let diff = (w_dpi - dpi).abs() + (h_dpi - dpi).abs();
        if diff < best_diff {
            best_diff = diff;
            best = dpi;
        }
    }
    best
}

fn width_at(width_px: u32, dpi: f64) -> f64 {
    width_px as f64 / (dpi / 72.0)
}

fn width_valid(width_pt: f64) -> bool {
    width_pt > PDFA_MIN_UNITS && width_pt < PDFA_MAX_UNITS
}

fn geometry_at(width_px: u32, height_px: u32, dpi: f64) -> PageGeometry {
    let width_pt = width_at(width_px, dpi);
    let scale = width_pt / width_px as f64;
    PageGeometry {
        width_pt,
        height_pt: height_px as f64 * scale,
        ppi: 72.0 / scale,
    }
}

/// Resolve a page's geometry from its pixel dimensions and the available DPI
/// sources.
///
/// Source priority: explicit per-page DPI from scan metadata, then the
/// document-level DPI, then a heuristic guess. Whenever the chosen source
/// produces a page width outside the PDF/A bounds, a fallback ladder runs:
/// retry with the document-level DPI (when a distinct one exists), then with
/// the guessed DPI, and finally fail with
/// [`Error::NoFittingPageBoundary`].
///
/// [`RunWarning::InvalidPageSize`] is recorded whenever the *initial*
/// geometry was invalid, regardless of whether a ladder step recovered.
pub fn resolve_geometry(
    width_px: u32,
    height_px: u32,
    per_page_dpi: Option<f64>,
    document_dpi: Option<f64>,
    warnings: &mut WarningSet,
) -> Result<PageGeometry> {
    let mut dpi = match per_page_dpi.or(document_dpi) {
        Some(dpi) => dpi,
        None => guess_dpi(width_px, height_px, DEFAULT_EXPECTED_FORMAT, &DEFAULT_DPI_CANDIDATES),
    };

    let mut width_pt = width_at(width_px, dpi);
    if !width_valid(width_pt) {
        debug!(
            "page size invalid: {}x{} px at {} dpi gives {:.1} pt",
            width_px, height_px, dpi, width_pt
        );

        // The per-page DPI lied to us; try the document-level value first.
        if per_page_dpi.is_some() {
            if let Some(doc_dpi) = document_dpi {
                debug!("retrying with document-level dpi {}", doc_dpi);
                dpi = doc_dpi;
                width_pt = width_at(width_px, dpi);
            }
        }

        if !width_valid(width_pt) {
            dpi = guess_dpi(width_px, height_px, DEFAULT_EXPECTED_FORMAT, &DEFAULT_DPI_CANDIDATES);
            debug!("retrying with guessed dpi {}", dpi);
            width_pt = width_at(width_px, dpi);
        }

        if !width_valid(width_pt) {
            return Err(Error::NoFittingPageBoundary {
                width_px,
                height_px,
                dpi,
                width_pt,
                min: PDFA_MIN_UNITS,
                max: PDFA_MAX_UNITS,
            });
        }

        warnings.insert(RunWarning::InvalidPageSize);
    }

    Ok(geometry_at(width_px, height_px, dpi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_dpi_a4_at_100() {
        // 827x1169 px of an A4 page implies ~100 dpi; 96 is the closest
        // candidate (score |100-96|*2 = 8 vs |100-72|*2 = 56).
        let dpi = guess_dpi(827, 1169, DEFAULT_EXPECTED_FORMAT, &DEFAULT_DPI_CANDIDATES);
        assert_eq!(dpi, 96.0);
    }

    #[test]
    fn test_guess_dpi_a4_at_300() {
        let dpi = guess_dpi(2481, 3507, DEFAULT_EXPECTED_FORMAT, &DEFAULT_DPI_CANDIDATES);
        assert_eq!(dpi, 300.0);
    }

    #[test]
    fn test_guess_dpi_a4_at_600() {
        let dpi = guess_dpi(4962, 7014, DEFAULT_EXPECTED_FORMAT, &DEFAULT_DPI_CANDIDATES);
        assert_eq!(dpi, 600.0);
    }

    #[test]
    fn test_guess_dpi_tie_breaks_by_order() {
        // Equidistant scores keep the earlier candidate.
        let candidates = [100.0, 100.0];
        let dpi = guess_dpi(827, 1169, DEFAULT_EXPECTED_FORMAT, &candidates);
        assert_eq!(dpi, 100.0);
    }

    #[test]
    fn test_resolve_prefers_per_page_dpi() {
        let mut warnings = WarningSet::new();
        let geom = resolve_geometry(3000, 4500, Some(300.0), Some(150.0), &mut warnings).unwrap();
        assert!((geom.width_pt - 720.0).abs() < 1e-9);
        assert!((geom.height_pt - 1080.0).abs() < 1e-9);
        assert!((geom.ppi - 300.0).abs() < 1e-9);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_resolve_falls_back_to_document_dpi() {
        // Per-page DPI of 1 puts a 100 px page at 7200 pt... valid, so use a
        // pathological one: width 1 px at 600 dpi is 0.12 pt, invalid; the
        // document-level 72 dpi doesn't fix it either, nor guessing, so the
        // ladder exhausts.
        let mut warnings = WarningSet::new();
        let err = resolve_geometry(1, 1, Some(600.0), Some(72.0), &mut warnings);
        assert!(matches!(err, Err(Error::NoFittingPageBoundary { .. })));
    }

    #[test]
    fn test_resolve_recovers_and_warns() {
        // 2000 px at 5 dpi would be 28800 pt (invalid); the document-level
        // 150 dpi gives 960 pt which is fine. The initial failure still
        // surfaces as a warning.
        let mut warnings = WarningSet::new();
        let geom = resolve_geometry(2000, 3000, Some(5.0), Some(150.0), &mut warnings).unwrap();
        assert!((geom.width_pt - 960.0).abs() < 1e-9);
        assert!(warnings.contains(&RunWarning::InvalidPageSize));
    }

    #[test]
    fn test_resolve_never_returns_out_of_bounds() {
        let mut warnings = WarningSet::new();
        for &(w, h, dpi) in &[(1u32, 1u32, 600.0), (400_000u32, 500_000u32, 72.0), (827, 1169, 100.0)] {
            match resolve_geometry(w, h, Some(dpi), None, &mut warnings) {
                Ok(geom) => {
                    assert!(geom.width_pt > PDFA_MIN_UNITS && geom.width_pt < PDFA_MAX_UNITS);
                }
                Err(Error::NoFittingPageBoundary { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_guess_when_no_dpi_available() {
        let mut warnings = WarningSet::new();
        let geom = resolve_geometry(2481, 3507, None, None, &mut warnings).unwrap();
        assert!((geom.ppi - 300.0).abs() < 1e-9);
        assert!(warnings.is_empty());
    }
}
