//! Fixtures shared by the store and coordinator tests.

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::animation::FrameSequence;
use crate::decoder::{Decoder, ImageSource};
use crate::error::DecodeError;

/// Write a gradient JPEG and return its path
pub fn write_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&image)
        .unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

/// Real decoder that counts its calls and can be slowed down
pub struct CountingSource {
    inner: Decoder,
    delay: Duration,
    thumbnails: AtomicUsize,
    full: AtomicUsize,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Decoder::default(),
            delay,
            thumbnails: AtomicUsize::new(0),
            full: AtomicUsize::new(0),
        }
    }

    pub fn thumbnail_calls(&self) -> usize {
        self.thumbnails.load(Ordering::SeqCst)
    }

    pub fn full_calls(&self) -> usize {
        self.full.load(Ordering::SeqCst)
    }
}

impl ImageSource for CountingSource {
    fn decode_thumbnail(&self, path: &Path, max_size: u32) -> Result<RgbaImage, DecodeError> {
        self.thumbnails.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.decode_thumbnail(path, max_size)
    }

    fn decode_full(&self, path: &Path) -> Result<RgbaImage, DecodeError> {
        self.full.fetch_add(1, Ordering::SeqCst);
        self.inner.decode_full(path)
    }

    fn decode_animation(&self, path: &Path) -> Result<FrameSequence, DecodeError> {
        self.inner.decode_animation(path)
    }
}
