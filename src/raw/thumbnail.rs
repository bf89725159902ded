use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{Cursor, Read};
use std::ops::Range;
use std::path::Path;

use crate::decoder::{decode_jpeg_scaled, DecodeStrategy};
use crate::error::DecodeError;

/// JPEG Start Of Image followed by a marker prefix
const JPEG_START: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Progressively larger prefixes to scan, with the minimum preview size in
/// bytes accepted in each. Most cameras store the preview near the start.
const SCAN_TIERS: [(usize, usize); 3] = [
    (256 * 1024, 50_000),
    (512 * 1024, 30_000),
    (8 * 1024 * 1024, 10_000),
];

/// Stop collecting start markers after this many per tier
const MAX_STARTS: usize = 16;

/// Level 1: embedded JPEG preview found by scanning the container bytes.
///
/// Containers often carry a tiny EXIF thumbnail ahead of the real preview,
/// so the first candidate that covers `max_size` wins. The largest smaller
/// one is only used when nothing covers the bound.
pub struct EmbeddedPreviewScan;

impl DecodeStrategy for EmbeddedPreviewScan {
    fn name(&self) -> &'static str {
        "embedded-preview"
    }

    fn attempt(&self, path: &Path, max_size: Option<u32>) -> Result<DynamicImage, DecodeError> {
        let largest_tier = SCAN_TIERS[SCAN_TIERS.len() - 1].0;
        let data = read_prefix(path, largest_tier)?;
        let mut fallback: Option<DynamicImage> = None;
        let mut tried = Vec::new();

        for (tier_bytes, min_size) in SCAN_TIERS {
            let window = &data[..data.len().min(tier_bytes)];
            for range in jpeg_candidates(window, MAX_STARTS) {
                if range.len() < min_size || tried.contains(&range.start) {
                    continue;
                }
                tried.push(range.start);
                let Ok(image) = decode_candidate(&window[range.clone()], max_size) else {
                    continue;
                };
                if covers(&image, max_size) {
                    log::debug!(
                        "📸 Embedded preview at {}..{} in {}",
                        range.start,
                        range.end,
                        path.display()
                    );
                    return Ok(image);
                }
                let larger = fallback
                    .as_ref()
                    .map_or(true, |best| area(&image) > area(best));
                if larger {
                    fallback = Some(image);
                }
            }
        }

        match fallback {
            Some(image) => {
                log::debug!(
                    "Only a {}x{} embedded preview in {}",
                    image.width(),
                    image.height(),
                    path.display()
                );
                Ok(image)
            }
            None => Err(DecodeError::NoPreview),
        }
    }
}

fn covers(image: &DynamicImage, max_size: Option<u32>) -> bool {
    match max_size {
        Some(max) => image.width().max(image.height()) >= max,
        None => true,
    }
}

fn area(image: &DynamicImage) -> u64 {
    u64::from(image.width()) * u64::from(image.height())
}

/// Read at most `max_bytes` from the start of a file
pub(crate) fn read_prefix(path: &Path, max_bytes: usize) -> Result<Vec<u8>, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
    let mut data = Vec::new();
    file.take(max_bytes as u64)
        .read_to_end(&mut data)
        .map_err(|e| DecodeError::io(path, e))?;
    Ok(data)
}

/// Byte ranges that look like complete JPEG streams, in file order
pub(crate) fn jpeg_candidates(data: &[u8], max_starts: usize) -> Vec<Range<usize>> {
    data.windows(JPEG_START.len())
        .enumerate()
        .filter(|(_, window)| *window == JPEG_START)
        .map(|(i, _)| i)
        .take(max_starts)
        .filter_map(|start| jpeg_end(data, start).map(|end| start..end))
        .collect()
}

/// Walk the marker segments of a JPEG starting at `start` and return the
/// offset just past its EOI. Segments are skipped by length, so previews
/// nested inside APP1 don't end the outer image early.
fn jpeg_end(data: &[u8], start: usize) -> Option<usize> {
    let mut pos = start + 2;
    loop {
        // Fill bytes may pad any marker
        while data.get(pos) == Some(&0xFF) && data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if data.get(pos) != Some(&0xFF) {
            return None;
        }
        let marker = *data.get(pos + 1)?;
        pos += 2;

        match marker {
            0xD9 => return Some(pos),
            0x01 | 0xD0..=0xD7 => continue,
            _ => {
                let len = usize::from(u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]));
                if len < 2 {
                    return None;
                }
                pos += len;

                // Start Of Scan: entropy-coded data runs until a real marker
                if marker == 0xDA {
                    loop {
                        let byte = *data.get(pos)?;
                        let next = *data.get(pos + 1)?;
                        let restart = (0xD0..=0xD7).contains(&next);
                        if byte == 0xFF && next != 0x00 && next != 0xFF && !restart {
                            break;
                        }
                        pos += if byte == 0xFF && next != 0xFF { 2 } else { 1 };
                    }
                }
            }
        }
    }
}

/// Decode one candidate, at reduced resolution when a bound is given
pub(crate) fn decode_candidate(
    bytes: &[u8],
    max_size: Option<u32>,
) -> Result<DynamicImage, DecodeError> {
    match max_size {
        Some(max) => decode_jpeg_scaled(Cursor::new(bytes), max),
        None => Ok(image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?),
    }
}
