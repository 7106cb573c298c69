//! Text-only document synthesis.
//!
//! First pipeline pass: lays every retained markup page out as a PDF page
//! containing only invisible text (render mode 3) positioned at the resolved
//! word boxes. The image pass later drops the page rasters underneath and on
//! top of this layer.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use log::{debug, info};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use serde_json::json;

use crate::error::{Error, Result, WarningSet};
use crate::geometry::{resolve_geometry, PageGeometry};
use crate::ocr::{OcrPage, TextSource};
use crate::store;
use crate::telemetry::Reporter;

/// Helvetica average advance width used to fit invisible text to its box,
/// in em units.
const APPROX_GLYPH_WIDTH: f64 = 0.5;

/// Settings for the text-layer pass.
#[derive(Debug, Clone, Default)]
pub struct TextLayerOptions {
    /// Document-level DPI, if known
    pub dpi: Option<f64>,
    /// 0-based page indices excluded from the output
    pub skip_pages: BTreeSet<usize>,
    /// Per-page DPI overrides, keyed by retained-page index
    pub dpi_per_page: BTreeMap<usize, f64>,
    /// Stop after this many retained pages
    pub stop_after: Option<usize>,
}

/// Build a text-only document from the markup source.
///
/// Pages listed in `skip_pages` are counted but excluded from output
/// numbering. When `reference` is given its page rectangles override
/// geometry resolution and only a markup-to-reference scale factor is
/// computed per page. Emits one aggregate `text_pages` timing report for the
/// whole pass.
pub fn build_text_layer(
    source: &mut dyn TextSource,
    options: &TextLayerOptions,
    reference: Option<&Document>,
    reporter: Option<&Reporter>,
    warnings: &mut WarningSet,
) -> Result<Document> {
    let start = Instant::now();

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(Object::Dictionary(invisible_font()));
    let mut font_dict = Dictionary::new();
    font_dict.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(font_dict));
    let resources_id = doc.add_object(Object::Dictionary(resources));

    let reference_pages = reference.map(store::page_ids);

    let mut kids: Vec<Object> = Vec::new();
    let mut skipped = 0usize;

    for (idx, page) in source.pages()?.enumerate() {
        let page = page?;

        if options.skip_pages.contains(&idx) {
            debug!("skipping page {}", idx);
            skipped += 1;
            continue;
        }
        let retained_idx = idx - skipped;

        if let Some(limit) = options.stop_after {
            if retained_idx >= limit {
                break;
            }
        }

        let geometry = match (&reference_pages, reference) {
            (Some(ids), Some(ref_doc)) => {
                // The reference document dictates the page size; the markup
                // dimensions only provide the text scale.
                let ref_id = *ids.get(retained_idx).ok_or_else(|| {
                    Error::MissingInput(format!("reference document has no page {}", retained_idx))
                })?;
                let (width_pt, height_pt) = store::page_media_size(ref_doc, ref_id)?;
                let scale = width_pt / page.width_px as f64;
                PageGeometry {
                    width_pt,
                    height_pt,
                    ppi: 72.0 / scale,
                }
            }
            _ => resolve_geometry(
                page.width_px,
                page.height_px,
                options.dpi_per_page.get(&retained_idx).copied(),
                options.dpi,
                warnings,
            )?,
        };

        let content = page_content(&page, &geometry)?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

        let mut page_dict = Dictionary::new();
        page_dict.set("Type", Object::Name(b"Page".to_vec()));
        page_dict.set("Parent", Object::Reference(pages_id));
        page_dict.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(geometry.width_pt as f32),
                Object::Real(geometry.height_pt as f32),
            ]),
        );
        page_dict.set("Resources", Object::Reference(resources_id));
        page_dict.set("Contents", Object::Reference(content_id));
        let page_id = doc.add_object(Object::Dictionary(page_dict));
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len();

    let mut pages_dict = Dictionary::new();
    pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
    pages_dict.set("Count", Object::Integer(page_count as i64));
    pages_dict.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(Object::Dictionary(catalog));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    info!(
        "text layer: {} pages ({} skipped) in {:.3}s",
        page_count,
        skipped,
        start.elapsed().as_secs_f64()
    );

    if let Some(reporter) = reporter {
        if page_count != 0 {
            let per_page_ms = (start.elapsed().as_secs_f64() / page_count as f64 * 1000.0) as u64;
            reporter.report(&json!({
                "text_pages": { "count": page_count, "time-per": per_page_ms }
            }));
        }
    }

    Ok(doc)
}

/// The invisible-text font resource. Text is never rendered (mode 3), so a
/// standard non-embedded base font suffices for positioning.
fn invisible_font() -> Dictionary {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font
}

/// Encode one page's invisible text content stream.
fn page_content(page: &OcrPage, geometry: &PageGeometry) -> Result<Vec<u8>> {
    let scale = geometry.scale();
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tr", vec![Object::Integer(3)]),
    ];

    for word in &page.words {
        if word.text.is_empty() || word.width() <= 0.0 || word.height() <= 0.0 {
            continue;
        }

        let font_size = word.height() * scale;
        // Stretch horizontally so the invisible glyphs span the box, keeping
        // selection and search geometry faithful to the scan.
        let natural_width = APPROX_GLYPH_WIDTH * font_size * word.text.chars().count() as f64;
        let stretch = if natural_width > 0.0 {
            (word.width() * scale) / natural_width
        } else {
            1.0
        };

        let x = word.x0 * scale;
        let y = geometry.height_pt - word.y1 * scale;

        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Real(font_size as f32)],
        ));
        operations.push(Operation::new(
            "Tm",
            vec![
                Object::Real(stretch as f32),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(1.0),
                Object::Real(x as f32),
                Object::Real(y as f32),
            ],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(word.text.as_str())],
        ));
    }

    operations.push(Operation::new("ET", vec![]));

    Content { operations }
        .encode()
        .map_err(|err| Error::Encode(err.to_string()))
}
