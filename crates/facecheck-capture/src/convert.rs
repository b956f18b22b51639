//! Raw camera buffer conversion: packed YUYV and GREY to RGB, dark-frame check.

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConvertError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, ConvertError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected || width % 2 != 0 {
        return Err(ConvertError::InvalidLength { expected, actual: yuyv.len() });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(ConvertError::InvalidLength { expected, actual: yuyv.len() })
}

/// Replicate an 8-bit intensity buffer into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, ConvertError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(ConvertError::InvalidLength { expected, actual: grey.len() });
    }
    let rgb: Vec<u8> = grey[..expected].iter().flat_map(|&g| [g, g, g]).collect();
    RgbImage::from_raw(width, height, rgb).ok_or(ConvertError::InvalidLength { expected, actual: grey.len() })
}

/// True if more than `threshold_pct` of pixels have all channels below 32.
///
/// Cameras often deliver black frames while auto-exposure settles.
pub fn is_dark_frame(rgb: &RgbImage, threshold_pct: f32) -> bool {
    let total = rgb.pixels().len();
    if total == 0 {
        return true;
    }
    let dark_count = rgb.pixels().filter(|p| p.0.iter().all(|&c| c < 32)).count();
    (dark_count as f32 / total as f32) > threshold_pct
}
