//! Frame helpers: intensity conversion, cropping, color spaces,
//! global histogram equalization, CLAHE.

use crate::types::FaceRegion;
use image::{GrayImage, Luma, RgbImage};

/// BT.601 luma of an 8-bit RGB pixel.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Convert an RGB frame to a single intensity channel.
pub fn to_intensity(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let p = rgb.get_pixel(x, y);
        Luma([luma(p[0], p[1], p[2])])
    })
}

/// Average pixel brightness (0.0–255.0).
pub fn mean_brightness(gray: &[u8]) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    gray.iter().map(|&b| b as f64).sum::<f64>() / gray.len() as f64
}

/// Copy the pixels under `region` out of `rgb`. The region is clipped to
/// the frame first; an entirely outside region yields an empty image.
pub fn crop(rgb: &RgbImage, region: &FaceRegion) -> RgbImage {
    match region.clamp_to(rgb.width(), rgb.height()) {
        Some(r) => image::imageops::crop_imm(rgb, r.x, r.y, r.width, r.height).to_image(),
        None => RgbImage::new(0, 0),
    }
}

/// Mirror an out-of-range index back into `0..n` without repeating the edge
/// pixel (`gfedcb|abcdefgh|gfedcba`).
pub fn reflect_101(i: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let n = n as isize;
    let mut i = i;
    while i < 0 || i >= n {
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
    }
    i as usize
}

/// Full-range BT.601 RGB → YCbCr.
pub fn rgb_to_ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (to_u8(y), to_u8(cb), to_u8(cr))
}

/// Full-range BT.601 YCbCr → RGB.
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> (u8, u8, u8) {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    (to_u8(r), to_u8(g), to_u8(b))
}

/// RGB → HSV in the common 8-bit layout: hue in [0, 180), saturation and
/// value in [0, 255].
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let v = max as f32;
    let diff = (max - min) as f32;

    let s = if max == 0 { 0.0 } else { 255.0 * diff / v };

    let h = if diff == 0.0 {
        0.0
    } else {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        let mut h = if max == r {
            60.0 * (gf - bf) / diff
        } else if max == g {
            120.0 + 60.0 * (bf - rf) / diff
        } else {
            240.0 + 60.0 * (rf - gf) / diff
        };
        if h < 0.0 {
            h += 360.0;
        }
        h / 2.0
    };

    let mut h = h.round() as u32;
    if h >= 180 {
        h -= 180;
    }
    (h as u8, to_u8(s), max)
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Global histogram equalization in-place.
///
/// The darkest occupied level maps to 0 and the cumulative distribution of
/// the remaining levels is stretched over 0–255. A single-level image is
/// left at that level.
pub fn equalize_histogram(gray: &mut [u8]) {
    if gray.is_empty() {
        return;
    }

    let mut hist = [0u32; 256];
    for &p in gray.iter() {
        hist[p as usize] += 1;
    }

    let total = gray.len() as u32;
    let first = hist.iter().position(|&c| c > 0).unwrap_or(0);
    if hist[first] == total {
        return;
    }

    let scale = 255.0 / (total - hist[first]) as f32;
    let mut lut = [0u8; 256];
    let mut sum = 0u32;
    for level in (first + 1)..256 {
        sum += hist[level];
        lut[level] = to_u8(sum as f32 * scale);
    }

    for p in gray.iter_mut() {
        *p = lut[*p as usize];
    }
}

/// Apply Contrast-Limited Adaptive Histogram Equalization (CLAHE) in-place.
///
/// Divides the image into a square grid of tiles, computes a clipped
/// histogram per tile, builds CDFs, and uses bilinear interpolation between
/// tile CDFs for smooth output. `clip_limit` is relative to the mean bin
/// height: a tile bin is capped at `clip_limit * tile_pixels / 256`.
pub fn clahe_enhance(gray: &mut [u8], width: u32, height: u32, tiles: u32, clip_limit: f32) {
    let w = width as usize;
    let h = height as usize;
    if w == 0 || h == 0 || tiles == 0 || gray.len() < w * h {
        return;
    }

    let tx = tiles as usize;
    let ty = tiles as usize;
    let tile_w = w / tx;
    let tile_h = h / ty;
    if tile_w == 0 || tile_h == 0 {
        return;
    }
    let tile_pixels = tile_w * tile_h;
    let clip = ((clip_limit * tile_pixels as f32) / 256.0).max(1.0) as u32;

    let mut cdfs: Vec<[f32; 256]> = Vec::with_capacity(tx * ty);

    for row in 0..ty {
        for col in 0..tx {
            let mut hist = [0u32; 256];
            let y0 = row * tile_h;
            let x0 = col * tile_w;

            for y in y0..y0 + tile_h {
                for x in x0..x0 + tile_w {
                    hist[gray[y * w + x] as usize] += 1;
                }
            }

            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let redist = excess / 256;
            let leftover = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += redist;
                if i < leftover {
                    *bin += 1;
                }
            }

            let mut cdf = [0f32; 256];
            cdf[0] = hist[0] as f32;
            for i in 1..256 {
                cdf[i] = cdf[i - 1] + hist[i] as f32;
            }
            let scale = 255.0 / tile_pixels as f32;
            for v in cdf.iter_mut() {
                *v = (*v * scale).clamp(0.0, 255.0);
            }
            cdfs.push(cdf);
        }
    }

    for y in 0..h {
        for x in 0..w {
            let pixel = gray[y * w + x] as usize;

            let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, (ty - 1) as f32);
            let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, (tx - 1) as f32);

            let r0 = fy as usize;
            let c0 = fx as usize;
            let r1 = (r0 + 1).min(ty - 1);
            let c1 = (c0 + 1).min(tx - 1);

            let dy = fy - r0 as f32;
            let dx = fx - c0 as f32;

            let tl = cdfs[r0 * tx + c0][pixel];
            let tr = cdfs[r0 * tx + c1][pixel];
            let bl = cdfs[r1 * tx + c0][pixel];
            let br = cdfs[r1 * tx + c1][pixel];

            let top = tl * (1.0 - dx) + tr * dx;
            let bot = bl * (1.0 - dx) + br * dx;
            let val = top * (1.0 - dy) + bot * dy;

            gray[y * w + x] = to_u8(val);
        }
    }
}
