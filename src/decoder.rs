//! Decoding: file bytes to pixel buffers.
//!
//! Every format family owns an ordered [`FallbackChain`] of strategies.
//! A chain tries each strategy in turn and returns the first image produced;
//! the order is part of the contract and can be inspected with
//! [`FallbackChain::names`].

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageReader, RgbImage, RgbaImage};
use jpeg_decoder::PixelFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::animation::{self, FrameSequence};
use crate::error::DecodeError;
use crate::raw;

/// A decoded bitmap shared between caches and the UI
pub type Bitmap = Arc<RgbaImage>;

/// RAW file extensions (common camera formats)
pub const RAW_EXTENSIONS: &[&str] = &[
    "nef", "nrw", "dng", "cr2", "cr3", "crw", "arw", "srf", "sr2", "raf", "orf", "rw2", "pef",
    "srw", "erf", "kdc", "dcr", "mos", "mrw", "3fr", "iiq", "raw", "rwl", "x3f",
];

/// Image format family, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
    Bmp,
    Webp,
    Gif,
    Raw,
}

impl ImageKind {
    /// Classify a path by extension; `None` for anything we don't decode
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            other if RAW_EXTENSIONS.contains(&other) => Some(Self::Raw),
            _ => None,
        }
    }

    pub fn is_raw(self) -> bool {
        self == Self::Raw
    }

    /// Stable name used in the cache database
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Bmp => "BMP",
            Self::Webp => "WEBP",
            Self::Gif => "GIF",
            Self::Raw => "RAW",
        }
    }

    /// Inverse of [`ImageKind::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "JPEG" => Some(Self::Jpeg),
            "PNG" => Some(Self::Png),
            "BMP" => Some(Self::Bmp),
            "WEBP" => Some(Self::Webp),
            "GIF" => Some(Self::Gif),
            "RAW" => Some(Self::Raw),
            _ => None,
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a path or fail with `Unsupported`
pub fn classify(path: &Path) -> Result<ImageKind, DecodeError> {
    ImageKind::from_path(path).ok_or_else(|| DecodeError::Unsupported(path.display().to_string()))
}

/// Downscale to fit inside a `max_size` square. Never upscales.
pub fn fit_within(image: DynamicImage, max_size: u32) -> DynamicImage {
    if image.width() <= max_size && image.height() <= max_size {
        return image;
    }
    image.resize(max_size, max_size, FilterType::Triangle)
}

/// One way of producing an image from a file.
///
/// `max_size` is the thumbnail bound, or `None` for a full-size decode.
/// Strategies may return larger images; the chain downscales afterwards.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, path: &Path, max_size: Option<u32>) -> Result<DynamicImage, DecodeError>;
}

/// Result of a chain run, naming the strategy that succeeded
pub struct ChainOutcome {
    pub strategy: &'static str,
    pub image: DynamicImage,
}

/// Ordered list of decode strategies
pub struct FallbackChain {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl FallbackChain {
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy names in the order they are tried
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order until one yields an image
    pub fn run(&self, path: &Path, max_size: Option<u32>) -> Result<ChainOutcome, DecodeError> {
        for strategy in &self.strategies {
            match strategy.attempt(path, max_size) {
                Ok(image) => {
                    let image = match max_size {
                        Some(max) => fit_within(image, max),
                        None => image,
                    };
                    log::trace!(
                        "{} decoded {} ({}x{})",
                        strategy.name(),
                        path.display(),
                        image.width(),
                        image.height()
                    );
                    return Ok(ChainOutcome {
                        strategy: strategy.name(),
                        image,
                    });
                }
                Err(e) => {
                    log::debug!("{} failed for {}: {}", strategy.name(), path.display(), e);
                }
            }
        }
        log::info!("❌ All decode strategies failed for {}", path.display());
        Err(DecodeError::Exhausted(self.strategies.len()))
    }
}

/// Decode a JPEG stream directly at reduced resolution.
///
/// The DCT is scaled by 1/2, 1/4 or 1/8 to the smallest size where at least
/// one axis still covers `max_size` (or full size if smaller). The caller
/// fits the result within the bound afterwards.
pub fn decode_jpeg_scaled<R: Read>(
    reader: R,
    max_size: u32,
) -> Result<DynamicImage, DecodeError> {
    let mut decoder = jpeg_decoder::Decoder::new(reader);
    decoder.read_info()?;

    let target = max_size.min(u32::from(u16::MAX)) as u16;
    let (width, height) = decoder.scale(target, target)?;
    let pixels = decoder.decode()?;
    let info = decoder
        .info()
        .ok_or_else(|| jpeg_decoder::Error::Format("missing frame header".into()))?;

    let (w, h) = (u32::from(width), u32::from(height));
    #[allow(unreachable_patterns)]
    let image = match info.pixel_format {
        PixelFormat::RGB24 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        PixelFormat::L8 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        // Big-endian samples; keep the high byte
        PixelFormat::L16 => {
            let luma = pixels.chunks_exact(2).map(|p| p[0]).collect();
            GrayImage::from_raw(w, h, luma).map(DynamicImage::ImageLuma8)
        }
        PixelFormat::CMYK32 => {
            let rgb = pixels
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - u16::from(p[3]);
                    [0, 1, 2].map(|i| (((255 - u16::from(p[i])) * k) / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(w, h, rgb).map(DynamicImage::ImageRgb8)
        }
        _ => None,
    };

    image.ok_or_else(|| jpeg_decoder::Error::Format("unexpected pixel buffer size".into()).into())
}

/// JPEG decode at reduced resolution (standard chain, level 1)
pub struct ScaledJpegDecode;

impl DecodeStrategy for ScaledJpegDecode {
    fn name(&self) -> &'static str {
        "scaled-jpeg"
    }

    fn attempt(&self, path: &Path, max_size: Option<u32>) -> Result<DynamicImage, DecodeError> {
        if ImageKind::from_path(path) != Some(ImageKind::Jpeg) {
            return Err(DecodeError::Unsupported("scaled decode is JPEG only".into()));
        }
        let Some(max_size) = max_size else {
            return Err(DecodeError::Unsupported("scaled decode needs a target size".into()));
        };
        let file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
        decode_jpeg_scaled(BufReader::new(file), max_size)
    }
}

/// Full decode through the `image` crate; the chain resizes afterwards
pub struct LibraryDecode;

impl DecodeStrategy for LibraryDecode {
    fn name(&self) -> &'static str {
        "image-library"
    }

    fn attempt(&self, path: &Path, _max_size: Option<u32>) -> Result<DynamicImage, DecodeError> {
        let reader = ImageReader::open(path)
            .map_err(|e| DecodeError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| DecodeError::io(path, e))?;
        Ok(reader.decode()?)
    }
}

/// Thumbnail chain for JPEG/PNG/BMP/WEBP/GIF
pub fn standard_chain() -> FallbackChain {
    FallbackChain::new(vec![Box::new(ScaledJpegDecode), Box::new(LibraryDecode)])
}

/// The decoding seam used by the cache store and the coordinator
pub trait ImageSource: Send + Sync {
    fn decode_thumbnail(&self, path: &Path, max_size: u32) -> Result<RgbaImage, DecodeError>;
    fn decode_full(&self, path: &Path) -> Result<RgbaImage, DecodeError>;
    fn decode_animation(&self, path: &Path) -> Result<FrameSequence, DecodeError>;
}

/// Format-aware decoder holding one chain per format family
pub struct Decoder {
    standard: FallbackChain,
    raw_thumbnail: FallbackChain,
    raw_full: FallbackChain,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::with_chains(standard_chain(), raw::thumbnail_chain(), raw::full_chain())
    }
}

impl Decoder {
    pub fn with_chains(
        standard: FallbackChain,
        raw_thumbnail: FallbackChain,
        raw_full: FallbackChain,
    ) -> Self {
        Self {
            standard,
            raw_thumbnail,
            raw_full,
        }
    }

    /// Decode a thumbnail bounded by `max_size`, reporting the winning strategy
    pub fn decode_thumbnail_traced(
        &self,
        path: &Path,
        max_size: u32,
    ) -> Result<ChainOutcome, DecodeError> {
        let kind = classify(path)?;
        ensure_readable(path)?;
        let chain = if kind.is_raw() {
            &self.raw_thumbnail
        } else {
            &self.standard
        };
        chain.run(path, Some(max_size))
    }

    /// Pixel dimensions of the full image without decoding it where possible
    pub fn get_dimensions(&self, path: &Path) -> Result<(u32, u32), DecodeError> {
        if classify(path)?.is_raw() {
            raw::dimensions(path)
        } else {
            Ok(image::image_dimensions(path)?)
        }
    }
}

impl ImageSource for Decoder {
    fn decode_thumbnail(&self, path: &Path, max_size: u32) -> Result<RgbaImage, DecodeError> {
        Ok(self.decode_thumbnail_traced(path, max_size)?.image.to_rgba8())
    }

    fn decode_full(&self, path: &Path) -> Result<RgbaImage, DecodeError> {
        let kind = classify(path)?;
        ensure_readable(path)?;
        if kind.is_raw() {
            Ok(self.raw_full.run(path, None)?.image.to_rgba8())
        } else {
            Ok(LibraryDecode.attempt(path, None)?.to_rgba8())
        }
    }

    fn decode_animation(&self, path: &Path) -> Result<FrameSequence, DecodeError> {
        let kind = classify(path)?;
        ensure_readable(path)?;
        animation::decode(path, kind)
    }
}

/// Missing and unauthorized files fail here instead of once per strategy
fn ensure_readable(path: &Path) -> Result<(), DecodeError> {
    fs::metadata(path)
        .map(|_| ())
        .map_err(|e| DecodeError::io(path, e))
}
