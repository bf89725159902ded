//! RAW sensor data loader
//!
//! Loads the actual sensor data (not the embedded JPEG) and demosaics it at
//! half resolution: every 2x2 Bayer block becomes one RGB pixel. That skips
//! interpolation entirely and is roughly four times cheaper than a full
//! demosaic, which is plenty for grid thumbnails.

use image::{DynamicImage, RgbImage};
use rawloader::{RawImage, RawImageData};
use std::path::Path;

use crate::decoder::DecodeStrategy;
use crate::error::DecodeError;

/// Display gamma applied to linear sensor values
const GAMMA: f32 = 1.0 / 2.2;

/// Level 2: half-size sensor decode with camera white balance
pub struct HalfSizeSensorDecode;

impl DecodeStrategy for HalfSizeSensorDecode {
    fn name(&self) -> &'static str {
        "half-size-sensor"
    }

    fn attempt(&self, path: &Path, _max_size: Option<u32>) -> Result<DynamicImage, DecodeError> {
        let raw = load_raw(path)?;
        let rgb = half_size_rgb(&raw)?;
        log::debug!(
            "📷 Sensor decode {}x{} -> {}x{} for {}",
            raw.width,
            raw.height,
            rgb.width(),
            rgb.height(),
            path.display()
        );
        Ok(DynamicImage::ImageRgb8(rgb))
    }
}

fn load_raw(path: &Path) -> Result<RawImage, DecodeError> {
    // rawloader is CPU-bound; callers run this on a blocking task
    rawloader::decode_file(path).map_err(|e| DecodeError::Raw(format!("{:?}", e)))
}

/// Active sensor area after crops
pub fn sensor_dimensions(path: &Path) -> Result<(u32, u32), DecodeError> {
    let raw = load_raw(path)?;
    let (x0, x1, y0, y1) = active_area(&raw)?;
    Ok(((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Camera white balance normalized so green is 1.0
///
/// Some cameras only report three coefficients (NaN in the fourth slot) and
/// some report none at all; both fall back sensibly.
pub fn normalized_white_balance(coeffs: [f32; 4]) -> [f32; 4] {
    let valid = |v: f32| v.is_finite() && v > 0.0;
    if !valid(coeffs[0]) || !valid(coeffs[1]) || !valid(coeffs[2]) {
        return [1.0; 4];
    }
    let g = coeffs[1].max(0.001);
    let g2 = if valid(coeffs[3]) { coeffs[3] } else { coeffs[1] };
    [coeffs[0] / g, 1.0, coeffs[2] / g, g2 / g]
}

/// Crop rectangle as (x0, x1, y0, y1)
fn active_area(raw: &RawImage) -> Result<(usize, usize, usize, usize), DecodeError> {
    let [top, right, bottom, left] = raw.crops;
    let x1 = raw.width.saturating_sub(right);
    let y1 = raw.height.saturating_sub(bottom);
    if x1 < left + 2 || y1 < top + 2 {
        return Err(DecodeError::Raw("sensor area smaller than one block".into()));
    }
    Ok((left, x1, top, y1))
}

/// 2x2 superpixel demosaic with black/white level scaling and white balance
pub fn half_size_rgb(raw: &RawImage) -> Result<RgbImage, DecodeError> {
    if raw.cpp != 1 && raw.cpp != 3 {
        return Err(DecodeError::Raw(format!("{} components per pixel", raw.cpp)));
    }
    let (x0, x1, y0, y1) = active_area(raw)?;
    let out_w = (x1 - x0) / 2;
    let out_h = (y1 - y0) / 2;
    let wb = normalized_white_balance(raw.wb_coeffs);

    let expected = raw.width * raw.height * raw.cpp;
    let len = match &raw.data {
        RawImageData::Integer(v) => v.len(),
        RawImageData::Float(v) => v.len(),
    };
    if len < expected {
        return Err(DecodeError::Raw("truncated sensor data".into()));
    }

    // Linear 0..1 value of one sample for color slot `c`
    let sample = |index: usize, c: usize| -> f32 {
        match &raw.data {
            RawImageData::Integer(values) => {
                let black = f32::from(raw.blacklevels[c]);
                let white = f32::from(raw.whitelevels[c]).max(black + 1.0);
                ((f32::from(values[index]) - black) / (white - black)).clamp(0.0, 1.0)
            }
            RawImageData::Float(values) => values[index].clamp(0.0, 1.0),
        }
    };

    let mut out = RgbImage::new(out_w as u32, out_h as u32);
    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sum = [0.0f32; 3];
            let mut count = [0u32; 3];
            for dy in 0..2 {
                for dx in 0..2 {
                    let row = y0 + oy * 2 + dy;
                    let col = x0 + ox * 2 + dx;
                    let base = row * raw.width + col;
                    if raw.cpp == 1 {
                        // 0 = red, 1 = green, 2 = blue, 3 = second green / emerald
                        let c = raw.cfa.color_at(row, col).min(3);
                        let channel = if c == 3 { 1 } else { c };
                        sum[channel] += sample(base, c) * wb[c];
                        count[channel] += 1;
                    } else {
                        for c in 0..3 {
                            sum[c] += sample(base * 3 + c, c) * wb[c];
                            count[c] += 1;
                        }
                    }
                }
            }
            let pixel = [0, 1, 2].map(|c| {
                let linear = if count[c] == 0 {
                    0.0
                } else {
                    sum[c] / count[c] as f32
                };
                (linear.clamp(0.0, 1.0).powf(GAMMA) * 255.0 + 0.5) as u8
            });
            out.put_pixel(ox as u32, oy as u32, image::Rgb(pixel));
        }
    }
    Ok(out)
}
