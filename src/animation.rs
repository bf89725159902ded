//! Multi-frame decoding for GIF and animated WebP.
//!
//! Playback timing belongs to the viewer; this module only produces the
//! frames and their delays.

use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, DynamicImage, Frame};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::decoder::{Bitmap, DecodeStrategy, ImageKind, LibraryDecode};
use crate::error::DecodeError;

/// Delays below this are treated as "unspecified" by most encoders
pub const MIN_FRAME_DELAY_MS: u32 = 10;

/// Delay substituted for frames below [`MIN_FRAME_DELAY_MS`]
pub const CLAMPED_FRAME_DELAY_MS: u32 = 100;

/// One frame and how long it stays on screen
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub image: Bitmap,
    pub duration_ms: u32,
}

/// Finite, restartable sequence of frames
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<AnimationFrame>,
}

impl FrameSequence {
    pub fn new(frames: Vec<AnimationFrame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// More than one frame
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Iterate once from the first frame
    pub fn iter(&self) -> impl Iterator<Item = &AnimationFrame> {
        self.frames.iter()
    }

    /// Iterate forever, restarting after the last frame
    pub fn looped(&self) -> impl Iterator<Item = &AnimationFrame> {
        self.frames.iter().cycle()
    }

    pub fn total_duration(&self) -> Duration {
        let ms: u64 = self.frames.iter().map(|f| u64::from(f.duration_ms)).sum();
        Duration::from_millis(ms)
    }
}

/// Clamp runaway delays (0ms, 1ms...) up to a sane minimum
pub fn clamp_delay(ms: u32) -> u32 {
    if ms < MIN_FRAME_DELAY_MS {
        CLAMPED_FRAME_DELAY_MS
    } else {
        ms
    }
}

fn frame_delay_ms(frame: &Frame) -> u32 {
    let (numer, denom) = frame.delay().numer_denom_ms();
    if denom == 0 {
        return 0;
    }
    numer / denom
}

fn into_sequence(frames: Vec<Frame>) -> FrameSequence {
    FrameSequence::new(
        frames
            .into_iter()
            .map(|frame| {
                let duration_ms = clamp_delay(frame_delay_ms(&frame));
                AnimationFrame {
                    image: Arc::new(frame.into_buffer()),
                    duration_ms,
                }
            })
            .collect(),
    )
}

/// Decode every frame of `path`. Still images yield a single frame.
pub fn decode(path: &Path, kind: ImageKind) -> Result<FrameSequence, DecodeError> {
    let open = || {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| DecodeError::io(path, e))
    };

    match kind {
        ImageKind::Gif => {
            let frames = GifDecoder::new(open()?)?.into_frames().collect_frames()?;
            Ok(into_sequence(frames))
        }
        ImageKind::Webp => {
            let decoder = WebPDecoder::new(open()?)?;
            if decoder.has_animation() {
                Ok(into_sequence(decoder.into_frames().collect_frames()?))
            } else {
                let image = DynamicImage::from_decoder(decoder)?;
                Ok(still(image))
            }
        }
        _ => Ok(still(LibraryDecode.attempt(path, None)?)),
    }
}

fn still(image: DynamicImage) -> FrameSequence {
    FrameSequence::new(vec![AnimationFrame {
        image: Arc::new(image.to_rgba8()),
        duration_ms: 0,
    }])
}
