//! Page-image pipeline.
//!
//! Second pipeline pass: routes every retained page's source raster through
//! the MRC decomposition/encoding collaborator and inserts the resulting
//! layers into the text-only document: background under the text,
//! foreground stencil-masked on top. Also provides the passthrough and
//! pixmap-copy modes that reuse a source document's images unchanged.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::DynamicImage;
use log::{debug, info};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde_json::json;

use crate::error::{Error, Result};
use crate::gray::archival_grayscale;
use crate::jp2::{load_page_raster, RasterDecoder};
use crate::mrc::{EncodedImage, LayerCodec, MrcCodec, TierParams};
use crate::ocr::TextSource;
use crate::store;
use crate::telemetry::{Reporter, TimingCollector};

/// Where a page's source raster comes from.
pub enum RasterSource<'a> {
    /// One image file per input page, in page order (skipped pages included)
    Files(&'a [PathBuf]),
    /// An existing page-image-only document; each page's sole image stream
    /// is extracted and decoded
    Document(&'a Document),
}

/// Settings for the image pass.
#[derive(Debug, Clone, Default)]
pub struct ImagePipelineOptions {
    /// 0-based input page indices excluded from the output
    pub skip_pages: BTreeSet<usize>,
    /// Persist per-page encoded artifacts into this directory
    pub img_dir: Option<PathBuf>,
    /// Flush a timing report every this many processed pages
    pub report_every: Option<usize>,
    /// Stop after this many retained pages
    pub stop_after: Option<usize>,
    /// Convert color sources with the archival grayscale transform
    pub grayscale: bool,
    /// Per-tier encoding parameters
    pub tier: TierParams,
    /// Scratch directory for codec handoff files
    pub tmp_dir: Option<PathBuf>,
}

/// Run the MRC pipeline over every retained page of `doc`.
///
/// `hq_pages` holds one tier flag per output page. Raw layers and encoded
/// bytes are dropped as soon as the page's images are inserted.
pub fn insert_images_mrc(
    doc: &mut Document,
    source: &mut dyn TextSource,
    rasters: &RasterSource<'_>,
    hq_pages: &[bool],
    codec: &dyn MrcCodec,
    decoder: &dyn RasterDecoder,
    options: &ImagePipelineOptions,
    reporter: Option<&Reporter>,
) -> Result<()> {
    let page_ids = store::page_ids(doc);

    let mut timing = TimingCollector::new();
    let mut window_start = Instant::now();
    let mut window_pages = 0usize;
    let mut skipped = 0usize;

    for (idx, page) in source.pages()?.enumerate() {
        let page = page?;

        if options.skip_pages.contains(&idx) {
            debug!("images: skipping page {}", idx);
            skipped += 1;
            continue;
        }
        let retained_idx = idx - skipped;

        if let Some(limit) = options.stop_after {
            if retained_idx >= limit {
                break;
            }
        }

        let Some(page_id) = page_ids.get(retained_idx).copied() else {
            break;
        };

        let mut raster = match rasters {
            // The raster stack is indexed by input page, not retained page.
            RasterSource::Files(files) => {
                let path = files.get(idx).ok_or_else(|| {
                    Error::MissingInput(format!("no source image for page {}", idx))
                })?;
                load_page_raster(path, decoder)?
            }
            RasterSource::Document(from) => {
                extract_page_raster(from, retained_idx, decoder, options.tmp_dir.as_deref())?
            }
        };

        if options.grayscale && !is_single_channel(&raster) {
            raster = DynamicImage::ImageLuma8(archival_grayscale(&raster.to_rgb8()));
        }

        let high_quality = hq_pages.get(retained_idx).copied().unwrap_or(false);
        let layers = codec.split(
            &raster,
            &page.words,
            &options.tier.split_options(high_quality),
            &mut timing,
        )?;
        drop(raster);
        let encoded = codec.encode(layers, &options.tier.encode_options(high_quality))?;

        if let Some(dir) = &options.img_dir {
            persist_artifacts(dir, retained_idx, &encoded.mask, &encoded.background, &encoded.foreground)?;
        }

        let (width_pt, height_pt) = store::page_media_size(doc, page_id)?;

        let bg_id = doc.add_object(image_xobject(&encoded.background, None));
        add_image_to_page(doc, page_id, bg_id, width_pt, height_pt, true)?;

        let mask_id = doc.add_object(stencil_mask_xobject(&encoded.mask));
        let fg_id = doc.add_object(image_xobject(&encoded.foreground, Some(mask_id)));
        add_image_to_page(doc, page_id, fg_id, width_pt, height_pt, false)?;

        window_pages += 1;
        if let Some(every) = options.report_every {
            if window_pages % every == 0 {
                info!("processed {} PDF pages", retained_idx + 1);
                flush_report(reporter, &mut timing, window_pages, window_start.elapsed().as_secs_f64());
                window_start = Instant::now();
                window_pages = 0;
            }
        }
    }

    if window_pages != 0 {
        flush_report(reporter, &mut timing, window_pages, window_start.elapsed().as_secs_f64());
    }

    Ok(())
}

/// Image-copy mode for [`insert_images`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Copy the original encoded image streams verbatim
    Passthrough,
    /// Decode to pixels and re-embed as raw deflate-compressed samples
    Pixmap,
}

/// Copy every page's image from a source document without recompression.
pub fn insert_images(
    from: &Document,
    to: &mut Document,
    mode: CopyMode,
    decoder: &dyn RasterDecoder,
    options: &ImagePipelineOptions,
) -> Result<()> {
    let to_pages = store::page_ids(to);
    let from_pages = store::page_ids(from);

    for (idx, page_id) in to_pages.iter().enumerate() {
        if let Some(limit) = options.stop_after {
            if idx >= limit {
                break;
            }
        }

        let from_id = *from_pages
            .get(idx)
            .ok_or_else(|| Error::MissingInput(format!("source document has no page {}", idx)))?;
        let stream = page_image_stream(from, from_id)?;

        let (width_pt, height_pt) = store::page_media_size(to, *page_id)?;
        let xobject_id = match mode {
            CopyMode::Passthrough => {
                let mut copied = stream.clone();
                copied.dict.remove(b"SMask");
                to.add_object(copied)
            }
            CopyMode::Pixmap => {
                let raster = decode_image_stream(&stream, decoder, options.tmp_dir.as_deref())?;
                to.add_object(raw_pixmap_xobject(&raster)?)
            }
        };
        add_image_to_page(to, *page_id, xobject_id, width_pt, height_pt, true)?;

        if let Some(every) = options.report_every {
            if every != 0 && idx % every == 0 {
                info!("processed {} PDF pages", idx);
            }
        }
    }
    Ok(())
}

fn is_single_channel(image: &DynamicImage) -> bool {
    matches!(
        image,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
    )
}

/// File extension for persisted artifacts of one layer codec.
fn artifact_extension(codec: LayerCodec) -> &'static str {
    match codec {
        LayerCodec::Jpeg2000 => "jp2",
        LayerCodec::Jpeg => "jpg",
        LayerCodec::Jbig2 => "jbig2",
        LayerCodec::CcittG4 => "g4",
        LayerCodec::Flate => "bin",
    }
}

fn persist_artifacts(
    dir: &Path,
    page_index: usize,
    mask: &EncodedImage,
    background: &EncodedImage,
    foreground: &EncodedImage,
) -> Result<()> {
    for (role, layer) in [("mask", mask), ("bg", background), ("fg", foreground)] {
        let name = format!(
            "{:06}_{}.{}",
            page_index,
            role,
            artifact_extension(layer.codec)
        );
        std::fs::write(dir.join(name), &layer.data)?;
    }
    Ok(())
}

/// Build an image XObject stream for an encoded layer.
fn image_xobject(layer: &EncodedImage, mask: Option<ObjectId>) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(layer.width as i64));
    dict.set("Height", Object::Integer(layer.height as i64));
    dict.set(
        "ColorSpace",
        Object::Name(if layer.components == 1 { b"DeviceGray".to_vec() } else { b"DeviceRGB".to_vec() }),
    );
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(layer.codec.filter_name().to_vec()));
    if let Some(mask_id) = mask {
        dict.set("Mask", Object::Reference(mask_id));
    }
    Stream::new(dict, layer.data.clone()).with_compression(false)
}

/// Build the stencil-mask XObject for the encoded mask layer.
fn stencil_mask_xobject(mask: &EncodedImage) -> Stream {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(mask.width as i64));
    dict.set("Height", Object::Integer(mask.height as i64));
    dict.set("ImageMask", Object::Boolean(true));
    dict.set("BitsPerComponent", Object::Integer(1));
    // Mask samples of 1 mark foreground pixels; invert the stencil sense so
    // those samples paint.
    dict.set(
        "Decode",
        Object::Array(vec![Object::Integer(1), Object::Integer(0)]),
    );
    dict.set("Filter", Object::Name(mask.codec.filter_name().to_vec()));
    Stream::new(dict, mask.data.clone()).with_compression(false)
}

/// Re-embed decoded pixels as a raw deflate-compressed image stream.
fn raw_pixmap_xobject(raster: &DynamicImage) -> Result<Stream> {
    let (samples, components) = match raster {
        DynamicImage::ImageLuma8(img) => (img.as_raw().clone(), 1u8),
        other => (other.to_rgb8().into_raw(), 3u8),
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&samples)?;
    let data = encoder.finish()?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(raster.width() as i64));
    dict.set("Height", Object::Integer(raster.height() as i64));
    dict.set(
        "ColorSpace",
        Object::Name(if components == 1 { b"DeviceGray".to_vec() } else { b"DeviceRGB".to_vec() }),
    );
    dict.set("BitsPerComponent", Object::Integer(8));
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    Ok(Stream::new(dict, data).with_compression(false))
}

/// Draw an XObject over the page's full rectangle, under or over the
/// existing content.
fn add_image_to_page(
    doc: &mut Document,
    page_id: ObjectId,
    xobject_id: ObjectId,
    width_pt: f64,
    height_pt: f64,
    underlay: bool,
) -> Result<()> {
    // Give the page its own resources dictionary before touching it; the
    // text pass shares one resources object across pages.
    let resources = resolved_resources(doc, page_id)?;
    let mut xobjects = match resources.get(b"XObject").and_then(Object::as_dict) {
        Ok(dict) => dict.clone(),
        Err(_) => Dictionary::new(),
    };
    let name = format!("Im{}", xobjects.len() + 1);
    xobjects.set(name.as_bytes(), Object::Reference(xobject_id));

    let mut resources = resources;
    resources.set("XObject", Object::Dictionary(xobjects));

    let existing = doc.get_page_content(page_id)?;
    let existing = Content::decode(&existing).map_err(|err| Error::Encode(err.to_string()))?;

    let draw = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(width_pt as f32),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(height_pt as f32),
                Object::Real(0.0),
                Object::Real(0.0),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.into_bytes())]),
        Operation::new("Q", vec![]),
    ];

    let operations: Vec<Operation> = if underlay {
        draw.into_iter().chain(existing.operations).collect()
    } else {
        existing.operations.into_iter().chain(draw).collect()
    };

    let content = Content { operations }
        .encode()
        .map_err(|err| Error::Encode(err.to_string()))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));

    let page_dict = store::page_dict_mut(doc, page_id)?;
    page_dict.set("Contents", Object::Reference(content_id));
    page_dict.set("Resources", Object::Dictionary(resources));
    Ok(())
}

/// The page's resources dictionary, with references resolved to an owned
/// copy.
fn resolved_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let page_dict = doc.get_object(page_id)?.as_dict()?;
    match page_dict.get(b"Resources") {
        Ok(Object::Dictionary(dict)) => Ok(dict.clone()),
        Ok(Object::Reference(id)) => Ok(doc.get_object(*id)?.as_dict()?.clone()),
        _ => Ok(Dictionary::new()),
    }
}

/// The sole image stream of a source document page.
fn page_image_stream(doc: &Document, page_id: ObjectId) -> Result<Stream> {
    let resources = resolved_resources(doc, page_id)?;
    let xobjects = resources
        .get(b"XObject")
        .and_then(Object::as_dict)
        .map_err(|_| Error::MissingInput("source page has no image XObjects".into()))?;

    for (_, value) in xobjects.iter() {
        let stream = match value {
            Object::Reference(id) => match doc.get_object(*id).and_then(Object::as_stream) {
                Ok(stream) => stream,
                Err(_) => continue,
            },
            Object::Stream(stream) => stream,
            _ => continue,
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Image")
            .unwrap_or(false);
        if is_image {
            return Ok(stream.clone());
        }
    }
    Err(Error::MissingInput("source page has no image XObjects".into()))
}

fn stream_filter_name(stream: &Stream) -> Option<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => Some(name.clone()),
        Ok(Object::Array(filters)) => filters
            .first()
            .and_then(|f| f.as_name().ok())
            .map(|n| n.to_vec()),
        _ => None,
    }
}

/// Decode an embedded image stream to pixels, routing wavelet codestreams
/// through the external decoder via a temporary file.
fn decode_image_stream(
    stream: &Stream,
    decoder: &dyn RasterDecoder,
    tmp_dir: Option<&Path>,
) -> Result<DynamicImage> {
    match stream_filter_name(stream).as_deref() {
        Some(b"JPXDecode") => {
            let mut builder = tempfile::Builder::new();
            builder.prefix("in").suffix(".jpx");
            let mut file = match tmp_dir {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            file.write_all(&stream.content)?;
            file.flush()?;
            decoder.decode(file.path())
        }
        _ => Ok(image::load_from_memory(&stream.content)?),
    }
}

/// Extract and decode the raster of a source document page.
fn extract_page_raster(
    from: &Document,
    page_index: usize,
    decoder: &dyn RasterDecoder,
    tmp_dir: Option<&Path>,
) -> Result<DynamicImage> {
    let from_pages = store::page_ids(from);
    let page_id = *from_pages.get(page_index).ok_or_else(|| {
        Error::MissingInput(format!("source document has no page {}", page_index))
    })?;
    let stream = page_image_stream(from, page_id)?;
    decode_image_stream(&stream, decoder, tmp_dir)
}

fn flush_report(
    reporter: Option<&Reporter>,
    timing: &mut TimingCollector,
    pages: usize,
    window_seconds: f64,
) {
    let breakdown = timing.summary();
    timing.reset();

    if let Some(reporter) = reporter {
        let per_page_ms = (window_seconds / pages as f64 * 1000.0) as u64;
        reporter.report(&json!({
            "compress_pages": { "count": pages, "time-per": per_page_ms },
            "page_time_breakdown": breakdown,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mrc::EncodedImage;

    fn encoded(codec: LayerCodec) -> EncodedImage {
        EncodedImage {
            width: 10,
            height: 20,
            components: 1,
            data: vec![1, 2, 3],
            codec,
        }
    }

    #[test]
    fn test_image_xobject_dict() {
        let stream = image_xobject(&encoded(LayerCodec::Jpeg2000), None);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"JPXDecode");
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 10);
        assert!(stream.dict.get(b"Mask").is_err());
    }

    #[test]
    fn test_foreground_references_mask() {
        let stream = image_xobject(&encoded(LayerCodec::Jpeg2000), Some((42, 0)));
        assert_eq!(
            stream.dict.get(b"Mask").unwrap().as_reference().unwrap(),
            (42, 0)
        );
    }

    #[test]
    fn test_stencil_mask_is_image_mask() {
        let stream = stencil_mask_xobject(&encoded(LayerCodec::Jbig2));
        assert!(stream.dict.get(b"ImageMask").unwrap().as_bool().unwrap());
        assert_eq!(stream.dict.get(b"BitsPerComponent").unwrap().as_i64().unwrap(), 1);
    }

    #[test]
    fn test_single_channel_detection() {
        assert!(is_single_channel(&DynamicImage::ImageLuma8(
            image::GrayImage::new(2, 2)
        )));
        assert!(!is_single_channel(&DynamicImage::ImageRgb8(
            image::RgbImage::new(2, 2)
        )));
    }

    #[test]
    fn test_artifact_extensions() {
        assert_eq!(artifact_extension(LayerCodec::Jbig2), "jbig2");
        assert_eq!(artifact_extension(LayerCodec::Jpeg2000), "jp2");
    }

    #[test]
    fn test_raw_pixmap_roundtrip_dims() {
        let raster = DynamicImage::ImageRgb8(image::RgbImage::new(4, 3));
        let stream = raw_pixmap_xobject(&raster).unwrap();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 4);
        assert_eq!(stream.dict.get(b"Height").unwrap().as_i64().unwrap(), 3);
        assert_eq!(
            stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"FlateDecode"
        );
    }
}
