//! Mixed-raster-content decomposition and encoding contracts.
//!
//! The pixel-level split of a page image into mask/background/foreground
//! layers and their compression are collaborator concerns, consumed through
//! the [`MrcCodec`] capability trait so tests can substitute fakes without
//! invoking real codecs.

use image::{DynamicImage, GrayImage};

use crate::error::Result;
use crate::ocr::WordBox;
use crate::telemetry::TimingCollector;

/// Default background-layer encoder slope for the standard tier.
pub const DEFAULT_BG_SLOPE: u32 = 47_000;
/// Default foreground-layer encoder slope for the standard tier.
pub const DEFAULT_FG_SLOPE: u32 = 49_000;
/// Default background-layer encoder slope for the high-quality tier.
pub const DEFAULT_HQ_BG_SLOPE: u32 = 47_000;
/// Default foreground-layer encoder slope for the high-quality tier.
pub const DEFAULT_HQ_FG_SLOPE: u32 = 47_000;

/// Raw layers produced by the decomposition step; per-page scope only.
#[derive(Debug)]
pub struct MrcLayers {
    /// Binary selector between foreground and background
    pub mask: GrayImage,
    /// Background layer (page paper, illustrations)
    pub background: DynamicImage,
    /// Foreground layer (text-colored pixels)
    pub foreground: DynamicImage,
}

/// Codec used for one encoded layer, determining its PDF stream filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCodec {
    /// JPEG2000 codestream (`/JPXDecode`)
    Jpeg2000,
    /// Baseline JPEG (`/DCTDecode`)
    Jpeg,
    /// JBIG2 generic region (`/JBIG2Decode`)
    Jbig2,
    /// CCITT Group 4 (`/CCITTFaxDecode`)
    CcittG4,
    /// Deflate-compressed raw samples (`/FlateDecode`)
    Flate,
}

impl LayerCodec {
    /// The PDF stream filter name for this codec.
    pub fn filter_name(self) -> &'static [u8] {
        match self {
            LayerCodec::Jpeg2000 => b"JPXDecode",
            LayerCodec::Jpeg => b"DCTDecode",
            LayerCodec::Jbig2 => b"JBIG2Decode",
            LayerCodec::CcittG4 => b"CCITTFaxDecode",
            LayerCodec::Flate => b"FlateDecode",
        }
    }
}

/// One encoded layer: compressed bytes plus the geometry and codec needed to
/// embed it as an image stream.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Pixel width of the encoded layer
    pub width: u32,
    /// Pixel height of the encoded layer
    pub height: u32,
    /// Number of color components (1 or 3)
    pub components: u8,
    /// Compressed byte stream
    pub data: Vec<u8>,
    /// Codec the bytes were produced with
    pub codec: LayerCodec,
}

/// The three encoded layers of one page.
#[derive(Debug)]
pub struct EncodedLayers {
    /// Encoded binary mask
    pub mask: EncodedImage,
    /// Encoded background layer
    pub background: EncodedImage,
    /// Encoded foreground layer
    pub foreground: EncodedImage,
}

/// Options for the decomposition step.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitOptions {
    /// Downsampling factor for the background layer; `None` keeps full
    /// resolution
    pub bg_downsample: Option<u32>,
    /// Whether to denoise the mask layer
    pub denoise_mask: bool,
}

/// Options for the encoding step.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Encoder slope for the background layer
    pub bg_slope: u32,
    /// Encoder slope for the foreground layer
    pub fg_slope: u32,
    /// Encode the mask as JBIG2 instead of CCITT G4
    pub jbig2: bool,
}

/// Per-tier encoding parameters, resolved once per run.
#[derive(Debug, Clone, Copy)]
pub struct TierParams {
    /// Standard-tier background slope
    pub bg_slope: u32,
    /// Standard-tier foreground slope
    pub fg_slope: u32,
    /// High-quality-tier background slope
    pub hq_bg_slope: u32,
    /// High-quality-tier foreground slope
    pub hq_fg_slope: u32,
    /// Background downsampling for the standard tier; the high-quality tier
    /// never downsamples
    pub bg_downsample: Option<u32>,
    /// Mask denoising policy, shared by both tiers
    pub denoise_mask: bool,
    /// Mask codec selection, shared by both tiers
    pub jbig2: bool,
}

impl Default for TierParams {
    fn default() -> Self {
        Self {
            bg_slope: DEFAULT_BG_SLOPE,
            fg_slope: DEFAULT_FG_SLOPE,
            hq_bg_slope: DEFAULT_HQ_BG_SLOPE,
            hq_fg_slope: DEFAULT_HQ_FG_SLOPE,
            bg_downsample: None,
            denoise_mask: false,
            jbig2: false,
        }
    }
}

impl TierParams {
    /// Split options for a page on the given tier.
    pub fn split_options(&self, high_quality: bool) -> SplitOptions {
        SplitOptions {
            bg_downsample: if high_quality { None } else { self.bg_downsample },
            denoise_mask: self.denoise_mask,
        }
    }

    /// Encode options for a page on the given tier.
    pub fn encode_options(&self, high_quality: bool) -> EncodeOptions {
        EncodeOptions {
            bg_slope: if high_quality { self.hq_bg_slope } else { self.bg_slope },
            fg_slope: if high_quality { self.hq_fg_slope } else { self.fg_slope },
            jbig2: self.jbig2,
        }
    }
}

/// Capability interface for the MRC decomposition/encoding collaborator.
pub trait MrcCodec {
    /// Split a page image into mask, background, and foreground layers,
    /// guided by the page's word boxes. May record timing samples, including
    /// the per-page heartbeat stage.
    fn split(
        &self,
        image: &DynamicImage,
        words: &[WordBox],
        options: &SplitOptions,
        timing: &mut TimingCollector,
    ) -> Result<MrcLayers>;

    /// Encode the three layers into compressed byte streams.
    fn encode(&self, layers: MrcLayers, options: &EncodeOptions) -> Result<EncodedLayers>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_params_select_slopes() {
        let params = TierParams {
            bg_slope: 1,
            fg_slope: 2,
            hq_bg_slope: 3,
            hq_fg_slope: 4,
            bg_downsample: Some(3),
            denoise_mask: true,
            jbig2: false,
        };

        let standard = params.encode_options(false);
        assert_eq!((standard.bg_slope, standard.fg_slope), (1, 2));
        let hq = params.encode_options(true);
        assert_eq!((hq.bg_slope, hq.fg_slope), (3, 4));

        assert_eq!(params.split_options(false).bg_downsample, Some(3));
        assert_eq!(params.split_options(true).bg_downsample, None);
    }

    #[test]
    fn test_filter_names() {
        assert_eq!(LayerCodec::Jpeg2000.filter_name(), b"JPXDecode");
        assert_eq!(LayerCodec::Jbig2.filter_name(), b"JBIG2Decode");
    }
}
