//! End-to-end recode pipeline.
//!
//! Drives the full conversion of one scanned item: text-layer synthesis,
//! image insertion in the selected mode, then the archival finishing passes
//! (output intent, page labels, structure tree, metadata) and the final save.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{info, warn};
use lopdf::Document;
use serde_json::json;

use crate::error::{Error, Result, WarningSet};
use crate::imagepipe::{self, CopyMode, ImagePipelineOptions, RasterSource};
use crate::jp2::RasterDecoder;
use crate::labels;
use crate::mrc::{MrcCodec, TierParams};
use crate::ocr::TextSource;
use crate::pdfa::{self, DocumentMetadata};
use crate::scandata::ScanData;
use crate::tagging;
use crate::telemetry::Reporter;
use crate::textlayer::{self, TextLayerOptions};
use crate::tier::resolve_hq_pages;

/// How page images enter the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageMode {
    /// Copy the source document's encoded images verbatim
    Passthrough,
    /// Decode the source document's images and re-embed them losslessly
    Pixmap,
    /// Full mixed-raster-content recompression
    #[default]
    Mrc,
    /// No images; text layer only
    Skip,
}

/// Settings for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RecodeOptions {
    /// Output file path
    pub out_path: PathBuf,
    /// Existing page-image document to take page sizes and images from
    pub from_pdf: Option<PathBuf>,
    /// One source image file per input page, in page order
    pub image_stack: Vec<PathBuf>,
    /// Image insertion mode
    pub image_mode: ImageMode,
    /// Document-level DPI; a scan-metadata DPI takes precedence
    pub dpi: Option<f64>,
    /// Resolved scan metadata for the item
    pub scandata: Option<ScanData>,
    /// Descriptive metadata written to the document info and XMP
    pub metadata: DocumentMetadata,
    /// High-quality page selection, as a comma-separated list of 1-based
    /// page references (negative values count from the end)
    pub hq_pages: Option<String>,
    /// Convert color sources with the archival grayscale transform
    pub grayscale: bool,
    /// Per-tier encoding parameters
    pub tier: TierParams,
    /// Persist per-page encoded artifacts into this directory
    pub img_dir: Option<PathBuf>,
    /// Flush a timing report every this many processed pages
    pub report_every: Option<usize>,
    /// Stop after this many retained pages
    pub stop_after: Option<usize>,
    /// External progress sink
    pub reporter: Option<Reporter>,
    /// Scratch directory for codec handoff files
    pub tmp_dir: Option<PathBuf>,
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct RecodeSummary {
    /// Non-fatal conditions encountered and recovered from
    pub warnings: WarningSet,
    /// Source bytes divided by output bytes
    pub compression_ratio: f64,
}

/// Run the full pipeline and write the output document.
pub fn recode(
    source: &mut dyn TextSource,
    codec: &dyn MrcCodec,
    decoder: &dyn RasterDecoder,
    options: &RecodeOptions,
) -> Result<RecodeSummary> {
    let mut warnings = WarningSet::new();

    let scandata = options.scandata.clone().unwrap_or_default();
    let document_dpi = scandata.document_dpi.or(options.dpi);

    let from_doc = match &options.from_pdf {
        Some(path) => Some(Document::load(path)?),
        None => None,
    };

    let text_options = TextLayerOptions {
        dpi: document_dpi,
        skip_pages: scandata.skip_pages.clone(),
        dpi_per_page: scandata.dpi_per_page.clone(),
        stop_after: options.stop_after,
    };
    let mut text_doc = textlayer::build_text_layer(
        source,
        &text_options,
        from_doc.as_ref(),
        options.reporter.as_ref(),
        &mut warnings,
    )?;

    // Round-trip the text layer through a temporary file; the image pass
    // works on the reparsed document.
    let mut builder = tempfile::Builder::new();
    builder.prefix("textlayer").suffix(".pdf");
    let text_tmp = match &options.tmp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    text_doc.save(text_tmp.path())?;
    let mut doc = Document::load(text_tmp.path())?;
    drop(text_tmp);

    let page_count = doc.get_pages().len();
    let hq_pages = match &options.hq_pages {
        Some(spec) => resolve_hq_pages(spec, page_count),
        None => vec![false; page_count],
    };

    let image_options = ImagePipelineOptions {
        skip_pages: scandata.skip_pages.clone(),
        img_dir: options.img_dir.clone(),
        report_every: options.report_every,
        stop_after: options.stop_after,
        grayscale: options.grayscale,
        tier: options.tier,
        tmp_dir: options.tmp_dir.clone(),
    };

    match options.image_mode {
        ImageMode::Mrc => {
            let rasters = if !options.image_stack.is_empty() {
                RasterSource::Files(&options.image_stack)
            } else if let Some(from) = &from_doc {
                RasterSource::Document(from)
            } else {
                return Err(Error::MissingInput(
                    "image recompression needs an image stack or a source document".into(),
                ));
            };
            imagepipe::insert_images_mrc(
                &mut doc,
                source,
                &rasters,
                &hq_pages,
                codec,
                decoder,
                &image_options,
                options.reporter.as_ref(),
            )?;
        }
        ImageMode::Passthrough | ImageMode::Pixmap => {
            let from = from_doc.as_ref().ok_or_else(|| {
                Error::MissingInput("image copy modes need a source document".into())
            })?;
            let mode = if options.image_mode == ImageMode::Passthrough {
                CopyMode::Passthrough
            } else {
                CopyMode::Pixmap
            };
            imagepipe::insert_images(from, &mut doc, mode, decoder, &image_options)?;
        }
        ImageMode::Skip => {
            warn!("image insertion skipped; output has text layers only");
        }
    }

    pdfa::write_output_intent(&mut doc)?;

    if let Some(series) = &scandata.page_numbers {
        labels::write_page_labels(&mut doc, series, &mut warnings)?;
    }

    let language = options.metadata.language.first().map(String::as_str);
    tagging::write_structure_tree(&mut doc, language)?;

    pdfa::write_metadata(&mut doc, from_doc.as_ref(), &options.metadata)?;
    pdfa::fixup_info_placeholders(&mut doc)?;

    let save_start = Instant::now();
    doc.compress();
    doc.save(&options.out_path)?;
    let save_seconds = save_start.elapsed().as_secs_f64();
    info!("saved {} in {:.3}s", options.out_path.display(), save_seconds);

    if let Some(reporter) = &options.reporter {
        reporter.report(&json!({
            "time_to_save": (save_seconds * 1000.0) as u64,
        }));
    }

    let source_bytes = source_byte_count(options, &scandata.skip_pages)?;
    let output_bytes = std::fs::metadata(&options.out_path)?.len();
    let compression_ratio = if output_bytes != 0 {
        source_bytes as f64 / output_bytes as f64
    } else {
        0.0
    };
    info!(
        "compressed {} source bytes to {} ({:.2}x)",
        source_bytes, output_bytes, compression_ratio
    );

    Ok(RecodeSummary {
        warnings,
        compression_ratio,
    })
}

/// Total source bytes for the compression ratio: the source document's size,
/// or the summed sizes of the retained stack images.
fn source_byte_count(options: &RecodeOptions, skip_pages: &BTreeSet<usize>) -> Result<u64> {
    if let Some(path) = &options.from_pdf {
        return Ok(std::fs::metadata(path)?.len());
    }

    let mut total = 0u64;
    let mut retained = 0usize;
    for (idx, path) in options.image_stack.iter().enumerate() {
        if skip_pages.contains(&idx) {
            continue;
        }
        if let Some(limit) = options.stop_after {
            if retained >= limit {
                break;
            }
        }
        retained += 1;
        total += file_size(path)?;
    }
    Ok(total)
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image_mode_is_mrc() {
        assert_eq!(ImageMode::default(), ImageMode::Mrc);
    }

    #[test]
    fn test_source_bytes_skip_excluded_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = Vec::new();
        for (i, len) in [10usize, 20, 40].iter().enumerate() {
            let path = dir.path().join(format!("{:06}.img", i));
            std::fs::write(&path, vec![0u8; *len]).unwrap();
            stack.push(path);
        }

        let options = RecodeOptions {
            image_stack: stack,
            ..Default::default()
        };
        let skips: BTreeSet<usize> = [1].into_iter().collect();
        assert_eq!(source_byte_count(&options, &skips).unwrap(), 50);
        assert_eq!(source_byte_count(&options, &BTreeSet::new()).unwrap(), 70);
    }
}
