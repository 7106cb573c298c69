//! External raster codec process.
//!
//! Wavelet-coded page images (JPEG2000) are decoded by an external
//! executable, invoked synchronously through temporary files. The subprocess
//! is wrapped in the [`RasterDecoder`] capability trait so tests can
//! substitute a fake without shelling out.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use log::debug;
use tempfile::TempDir;

use crate::error::{Error, Result};

/// Default JPEG2000 decoder executable.
pub const KDU_EXPAND: &str = "kdu_expand";

/// Decodes one raster file into pixels.
pub trait RasterDecoder {
    /// Decode the file at `path`. Non-zero exit or stderr output from an
    /// underlying process is fatal for the page.
    fn decode(&self, path: &Path) -> Result<DynamicImage>;
}

/// JPEG2000 decoder backed by the Kakadu `kdu_expand` executable.
#[derive(Debug, Clone)]
pub struct KakaduDecoder {
    executable: PathBuf,
    tmp_dir: Option<PathBuf>,
}

impl Default for KakaduDecoder {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(KDU_EXPAND),
            tmp_dir: None,
        }
    }
}

impl KakaduDecoder {
    /// Create a decoder using the default executable name, resolved via
    /// `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific decoder executable.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Place intermediate files under the given directory instead of the
    /// system temp dir.
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("jp2-decode");
        let dir = match &self.tmp_dir {
            Some(base) => builder.tempdir_in(base)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

impl RasterDecoder for KakaduDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        // The decoder wants real files on both ends; the scratch dir and its
        // contents are removed as soon as we have the pixels.
        let scratch = self.scratch_dir()?;
        let out_path = scratch.path().join("out.tif");

        debug!("decoding {} via {}", path.display(), self.executable.display());
        let output = Command::new(&self.executable)
            .arg("-i")
            .arg(path)
            .arg("-o")
            .arg(&out_path)
            .output()
            .map_err(|err| Error::CodecFailure {
                command: self.executable.display().to_string(),
                reason: err.to_string(),
            })?;

        if !output.status.success() || !output.stderr.is_empty() {
            return Err(Error::CodecFailure {
                command: self.executable.display().to_string(),
                reason: if output.status.success() {
                    String::from_utf8_lossy(&output.stderr).into_owned()
                } else {
                    format!("exit status {}", output.status)
                },
            });
        }

        let image = image::open(&out_path)?;
        drop(scratch);
        Ok(image)
    }
}

/// Whether a file path names a wavelet-coded (JPEG2000) raster that needs the
/// external decoder.
pub fn is_jpeg2000_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref ext) if ext == "jp2" || ext == "jpx"
    )
}

/// Load a page raster, routing JPEG2000 files through the external decoder
/// and everything else through the `image` crate.
pub fn load_page_raster(path: &Path, decoder: &dyn RasterDecoder) -> Result<DynamicImage> {
    if is_jpeg2000_path(path) {
        decoder.decode(path)
    } else {
        Ok(image::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg2000_path_detection() {
        assert!(is_jpeg2000_path(Path::new("page_0001.jp2")));
        assert!(is_jpeg2000_path(Path::new("page_0001.JPX")));
        assert!(!is_jpeg2000_path(Path::new("page_0001.png")));
        assert!(!is_jpeg2000_path(Path::new("page_0001")));
    }

    #[test]
    fn test_missing_executable_is_codec_failure() {
        let decoder = KakaduDecoder::new().with_executable("definitely-not-a-real-decoder");
        let err = decoder.decode(Path::new("in.jp2")).unwrap_err();
        assert!(matches!(err, Error::CodecFailure { .. }));
    }
}
