/// RAW image decoding module
///
/// Camera raw files are decoded through an ordered fallback chain:
/// 1. Embedded JPEG preview found by scanning the container (`thumbnail.rs`)
/// 2. Half-resolution sensor decode with camera white balance (`loader.rs`)
/// 3. Embedded preview located via container metadata tags (`preview.rs`)
/// 4. General-purpose library decode (slowest, most compatible)

pub mod loader;
pub mod preview;
pub mod thumbnail;

use std::path::Path;

use crate::decoder::{FallbackChain, LibraryDecode};
use crate::error::DecodeError;

pub use loader::HalfSizeSensorDecode;
pub use preview::{LargestEmbeddedPreview, TaggedPreview};
pub use thumbnail::EmbeddedPreviewScan;

/// Thumbnail chain, fastest first
pub fn thumbnail_chain() -> FallbackChain {
    FallbackChain::new(vec![
        Box::new(EmbeddedPreviewScan),
        Box::new(HalfSizeSensorDecode),
        Box::new(TaggedPreview),
        Box::new(LibraryDecode),
    ])
}

/// Full-size chain: the biggest preview the camera stored wins
pub fn full_chain() -> FallbackChain {
    FallbackChain::new(vec![
        Box::new(LargestEmbeddedPreview),
        Box::new(TaggedPreview),
        Box::new(HalfSizeSensorDecode),
        Box::new(LibraryDecode),
    ])
}

/// Dimensions of a RAW file: metadata tags first, sensor decode as last resort
pub fn dimensions(path: &Path) -> Result<(u32, u32), DecodeError> {
    if let Some(dims) = preview::tagged_dimensions(path) {
        return Ok(dims);
    }
    loader::sensor_dimensions(path)
}
