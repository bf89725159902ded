//! Previews located through container metadata, and the largest embedded
//! JPEG for full-size viewing.
use exif::{In, Tag};
use image::DynamicImage;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::thumbnail::{decode_candidate, jpeg_candidates};
use crate::decoder::DecodeStrategy;
use crate::error::DecodeError;

/// Largest file read in full when hunting for the biggest preview
const MAX_FULL_SCAN_BYTES: u64 = 256 * 1024 * 1024;

/// Level 3: preview referenced by `JPEGInterchangeFormat` tags in any IFD.
///
/// Slower than the marker scan (the whole container is parsed) but finds
/// previews stored past the scanned prefix.
pub struct TaggedPreview;

impl DecodeStrategy for TaggedPreview {
    fn name(&self) -> &'static str {
        "tagged-preview"
    }

    fn attempt(&self, path: &Path, max_size: Option<u32>) -> Result<DynamicImage, DecodeError> {
        let exif = read_exif(path)?;
        let buf = exif.buf();

        let mut offsets: HashMap<In, usize> = HashMap::new();
        let mut lengths: HashMap<In, usize> = HashMap::new();
        for field in exif.fields() {
            let Some(value) = field.value.get_uint(0) else {
                continue;
            };
            match field.tag {
                Tag::JPEGInterchangeFormat => {
                    offsets.insert(field.ifd_num, value as usize);
                }
                Tag::JPEGInterchangeFormatLength => {
                    lengths.insert(field.ifd_num, value as usize);
                }
                _ => {}
            }
        }

        // Largest preview first
        let mut previews: Vec<(usize, usize)> = offsets
            .iter()
            .filter_map(|(ifd, &offset)| lengths.get(ifd).map(|&len| (offset, len)))
            .filter(|&(offset, len)| len > 0 && offset.saturating_add(len) <= buf.len())
            .collect();
        previews.sort_by(|a, b| b.1.cmp(&a.1));

        for (offset, len) in previews {
            match decode_candidate(&buf[offset..offset + len], max_size) {
                Ok(image) => return Ok(image),
                Err(e) => log::debug!("Tagged preview at {} unusable: {}", offset, e),
            }
        }
        Err(DecodeError::NoPreview)
    }
}

/// Full-size level 1: the largest decodable JPEG anywhere in the file
pub struct LargestEmbeddedPreview;

impl DecodeStrategy for LargestEmbeddedPreview {
    fn name(&self) -> &'static str {
        "largest-embedded-preview"
    }

    fn attempt(&self, path: &Path, max_size: Option<u32>) -> Result<DynamicImage, DecodeError> {
        let file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
        let mut buffer = Vec::new();
        file.take(MAX_FULL_SCAN_BYTES)
            .read_to_end(&mut buffer)
            .map_err(|e| DecodeError::io(path, e))?;

        let mut candidates = jpeg_candidates(&buffer, usize::MAX);
        candidates.sort_by(|a, b| b.len().cmp(&a.len()));

        for range in candidates {
            if let Ok(image) = decode_candidate(&buffer[range.clone()], max_size) {
                log::debug!(
                    "🔥 Largest preview {:.1}MB ({}x{}) in {}",
                    range.len() as f64 / 1024.0 / 1024.0,
                    image.width(),
                    image.height(),
                    path.display()
                );
                return Ok(image);
            }
        }
        Err(DecodeError::NoPreview)
    }
}

fn read_exif(path: &Path) -> Result<exif::Exif, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::io(path, e))?;
    let mut reader = BufReader::new(file);
    exif::Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| DecodeError::Raw(format!("container metadata: {}", e)))
}

/// Image size recorded in the primary IFD, if any
pub fn tagged_dimensions(path: &Path) -> Option<(u32, u32)> {
    let exif = read_exif(path).ok()?;
    let read = |tags: [Tag; 2]| {
        tags.iter().find_map(|&tag| {
            exif.get_field(tag, In::PRIMARY)
                .and_then(|f| f.value.get_uint(0))
        })
    };
    let width = read([Tag::PixelXDimension, Tag::ImageWidth])?;
    let height = read([Tag::PixelYDimension, Tag::ImageLength])?;
    (width > 0 && height > 0).then_some((width, height))
}
